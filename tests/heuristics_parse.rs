use catalog_extract::config::Config;
use catalog_extract::heuristics::{
    detect_category, extract_product_info_from_text, extract_tables, extract_tables_from_text,
    specs_from_tables, ColumnSplit,
};
use catalog_extract::postprocess::clean_markdown;

const PAGE: &str = "**MB2300 Blower**\n\
Model: MB-2300\n\
Brand: Maruyama\n\
Weight: 4.5 kg\n\
Quiet operation\n\
Reduced noise for residential use\n\
# **High power output**";

#[test]
fn extracts_fields_from_catalog_text() {
    let cfg = Config::default();
    let info = extract_product_info_from_text(PAGE, &cfg);

    assert_eq!(info.product_name, "MB2300");
    assert_eq!(info.model_number, "MB-2300");
    assert_eq!(info.brand, "Maruyama");
    assert_eq!(info.product_description, "High power output");

    let labels: Vec<&str> = info.specifications.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["Model", "Brand", "Weight"]);
    assert_eq!(info.specifications[2].value, "4.5 kg");

    let names: Vec<&str> = info.features.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Model", "Brand", "Weight", "Quiet operation"]);
    assert_eq!(
        info.features[3].description.as_deref(),
        Some("Reduced noise for residential use")
    );
}

#[test]
fn image_tags_are_ignored() {
    let cfg = Config::default();
    let info = extract_product_info_from_text("![img-0.jpeg](img-0.jpeg)\n**X100 Saw**", &cfg);
    assert_eq!(info.product_name, "X100");
}

#[test]
fn whitespace_aligned_blocks_become_typed_tables() {
    let text = "Specification  Value  Unit\n\
Weight  4.5  kg\n\
Displacement\t23.6\tcc\n\
Plain line\n\
Feature  Benefit\n\
Quiet  Low noise";

    let tables = extract_tables_from_text(text);
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].table_type.as_deref(), Some("specifications"));
    assert_eq!(tables[0].rows.len(), 2);
    assert_eq!(tables[1].table_type.as_deref(), Some("features"));
    assert_eq!(tables[1].headers, vec!["Feature", "Benefit"]);

    let specs = specs_from_tables(&tables);
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[1].label, "Displacement");
    assert_eq!(specs[1].value, "23.6");
    assert_eq!(specs[1].unit.as_deref(), Some("cc"));
}

#[test]
fn key_value_lines_are_features_only_inside_the_window() {
    let cfg = Config::default();
    assert_eq!(cfg.text.feature_window, 50);

    // Blank lines are skipped, so the spec line sits at index 49 or 50.
    let inside = format!("{}Weight: 4.5 kg", "\n".repeat(49));
    let info = extract_product_info_from_text(&inside, &cfg);
    assert_eq!(info.features.len(), 1);
    assert_eq!(info.features[0].name, "Weight");

    let outside = format!("{}Weight: 4.5 kg", "\n".repeat(50));
    let info = extract_product_info_from_text(&outside, &cfg);
    assert!(info.features.is_empty());
    assert_eq!(info.specifications.len(), 1);
    assert_eq!(info.specifications[0].label, "Weight");
    assert_eq!(info.specifications[0].value, "4.5 kg");
}

#[test]
fn bold_key_takes_the_next_line_as_its_value() {
    let cfg = Config::default();
    let text = "**X100 Saw**\n**Power**\n\nOutput: 2.5 kW\nBrand: Echo";
    let info = extract_product_info_from_text(text, &cfg);

    // The blank line is not skipped when looking ahead.
    assert_eq!(info.features[0].name, "Power");
    assert_eq!(info.features[0].description.as_deref(), Some(""));

    let text = "**X100 Saw**\n**Power**\nOutput: 2.5 kW\nBrand: Echo";
    let info = extract_product_info_from_text(text, &cfg);
    let names: Vec<&str> = info.features.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Power", "Brand"]);
    assert_eq!(info.features[0].description.as_deref(), Some("Output: 2.5 kW"));

    // The consumed value line is not parsed again.
    let labels: Vec<&str> = info.specifications.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["Brand"]);
}

#[test]
fn repeated_spec_label_keeps_its_position() {
    let cfg = Config::default();
    let info = extract_product_info_from_text("Weight: 4 kg\nColour: red\nWeight: 5 kg", &cfg);

    let specs: Vec<(&str, &str)> = info
        .specifications
        .iter()
        .map(|s| (s.label.as_str(), s.value.as_str()))
        .collect();
    assert_eq!(specs, vec![("Weight", "5 kg"), ("Colour", "red")]);
}

#[test]
fn fallback_name_only_rejects_plain_digits() {
    let cfg = Config::default();
    // Vulgar fractions are numeric but not digits.
    let info = extract_product_info_from_text("½½½½½½½½½½½½", &cfg);
    assert_eq!(info.product_name, "½½½½½½½½½½½½");
}

#[test]
fn tab_split_ignores_double_spaced_lines() {
    let text = "Specification\tValue\nWide  gap\nWeight\t4.5 kg";

    let tabs = extract_tables(text, ColumnSplit::Tabs);
    assert_eq!(tabs.len(), 1);
    assert_eq!(tabs[0].headers, vec!["Specification", "Value"]);
    assert_eq!(tabs[0].rows, vec![vec!["Weight".to_string(), "4.5 kg".to_string()]]);

    let spaced = extract_tables(text, ColumnSplit::Whitespace);
    assert_eq!(spaced[0].rows.len(), 2);
    assert_eq!(spaced[0].rows[0], vec!["Wide".to_string(), "gap".to_string()]);
}

#[test]
fn category_uses_patterns_then_fallbacks() {
    let cfg = Config::default();
    assert_eq!(detect_category(PAGE, &cfg), "Blower");
    assert_eq!(detect_category("Maruyama brush head", &cfg), "Brush Cutter");
    assert_eq!(detect_category("25.4cc chain drive", &cfg), "Chainsaw");
    assert_eq!(detect_category("Nothing to see", &cfg), "Power Equipment");
}

#[test]
fn cleanup_normalizes_line_endings_and_control_chars() {
    let cfg = Config::default();
    let cleaned = clean_markdown(&cfg, "a\u{7}b  \r\nc\td\t\n");
    assert_eq!(cleaned, "ab\nc\td\n");
}
