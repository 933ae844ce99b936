//! Regex heuristics that turn OCR markdown into a weak product record.
//!
//! Nothing here is authoritative: the output is a best-effort guess used when
//! no LLM is involved, and as a cross-check of what the LLM returns.

use crate::{
    config::Config,
    product::{ProductFeature, ProductSpecification, ProductTable},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($pat).expect($pat));
    };
}

re!(IMAGE_TAG, r"!\[.*?\]\(.*?\)");
re!(TABLE_LINE, r"^\|.*\|$");
re!(BOLD_TOKEN, r"\*\*([^*\s]+)\s");
re!(LEADING_TOKEN, r"^([A-Za-z0-9\-]+)");
re!(MODEL, r"(?i)Model[:\s]+([A-Z0-9\-]+)");
re!(BRAND, r"(?i)Brand[:\s]+(\w+)");
re!(SPEC_LINE, r"^([A-Za-z\s]+):\s*(.+)$");
re!(BOLD_FEATURE, r"^\*\*([^*]+)\*\*\s*(.*)");
re!(KEY_VALUE_FEATURE, r"^([A-Za-z0-9.\s]+?)\s*[:\-–]\s*(.*)$");
re!(BOLD_SPAN, r"\*\*(.+?)\*\*");
re!(COLUMN_SPLIT, r"\s{2,}|\t");

/// Characters that mark a line as structured rather than a plain continuation.
const STRUCTURE_MARKERS: [&str; 3] = [":", "**", "|"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeuristicProduct {
    pub product_name: String,
    pub product_description: String,
    pub model_number: String,
    pub brand: String,
    pub specifications: Vec<ProductSpecification>,
    pub features: Vec<ProductFeature>,
}

impl HeuristicProduct {
    /// Inserts or overwrites a specification, keeping first-seen order.
    fn upsert_spec(&mut self, label: &str, value: &str) {
        match self.specifications.iter_mut().find(|s| s.label == label) {
            Some(spec) => spec.value = value.to_string(),
            None => self.specifications.push(ProductSpecification::new(label, value)),
        }
    }
}

pub fn strip_image_tags(text: &str) -> String {
    IMAGE_TAG.replace_all(text, "").into_owned()
}

fn is_plain_continuation(line: &str) -> bool {
    !line.is_empty() && !STRUCTURE_MARKERS.iter().any(|m| line.contains(m))
}

fn capture(re: &Regex, line: &str, group: usize) -> Option<String> {
    re.captures(line)
        .and_then(|c| c.get(group))
        .map(|m| m.as_str().trim().to_string())
}

pub fn extract_product_info_from_text(text: &str, cfg: &Config) -> HeuristicProduct {
    let text = strip_image_tags(text);
    let lines: Vec<&str> = text.split('\n').collect();
    let window = cfg.text.feature_window;
    let mut info = HeuristicProduct::default();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        if line.is_empty() || TABLE_LINE.is_match(line) {
            i += 1;
            continue;
        }

        if info.product_name.is_empty() {
            if let Some(name) = capture(&BOLD_TOKEN, line, 1) {
                info.product_name = name;
                i += 1;
                continue;
            }
            if let Some(tok) = capture(&LEADING_TOKEN, line, 1) {
                info.product_name = tok;
            }
        }

        if let Some(model) = capture(&MODEL, line, 1) {
            info.model_number = model;
        }
        if let Some(brand) = capture(&BRAND, line, 1) {
            info.brand = brand;
        }
        if let Some(caps) = SPEC_LINE.captures(line) {
            info.upsert_spec(caps[1].trim(), caps[2].trim());
        }

        if i < window {
            if let Some(caps) = BOLD_FEATURE.captures(line) {
                let key = caps[1].trim().to_string();
                let mut value = caps[2].trim().to_string();
                if value.is_empty() && i + 1 < lines.len() {
                    let next = lines[i + 1].trim();
                    if !next.is_empty() {
                        value = next.to_string();
                        i += 1;
                    }
                }
                info.features.push(ProductFeature::new(key, value));
                i += 1;
                continue;
            }

            if let Some(caps) = KEY_VALUE_FEATURE.captures(line) {
                let key = caps[1].trim().to_string();
                let mut value = caps[2].trim().to_string();
                if value.is_empty() && i + 1 < lines.len() {
                    let next = lines[i + 1].trim();
                    if is_plain_continuation(next) {
                        value = next.to_string();
                        i += 1;
                    }
                }
                info.features.push(ProductFeature::new(key, value));
                i += 1;
                continue;
            }
        }

        if i + 1 < lines.len() {
            let next = lines[i + 1].trim();
            if is_plain_continuation(next) {
                info.features.push(ProductFeature::new(line, next));
                i += 2;
                continue;
            }
        }

        if info.product_description.is_empty() && line.contains('#') && line.contains("**") {
            if let Some(desc) = capture(&BOLD_SPAN, line, 1) {
                info.product_description = desc;
            }
        }

        i += 1;
    }

    if info.product_name.is_empty() {
        if let Some(line) = lines.iter().map(|l| l.trim()).find(|l| {
            l.chars().count() > 10 && !l.chars().all(|c| c.is_ascii_digit())
        }) {
            info.product_name = line.to_string();
        }
    }

    if info.product_description.is_empty() {
        let desc: Vec<&str> = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| l.chars().count() > 20)
            .take(3)
            .collect();
        info.product_description = desc.join(" ");
    }

    info
}

/// How a table line is cut into cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSplit {
    /// A tab or any run of two or more whitespace characters.
    Whitespace,
    /// Tabs only. A double-spaced line without tabs is one cell, so it
    /// neither adds a row nor ends the current table.
    Tabs,
}

impl ColumnSplit {
    fn cells(self, line: &str) -> Vec<String> {
        let parts: Vec<&str> = match self {
            ColumnSplit::Whitespace => COLUMN_SPLIT.split(line).collect(),
            ColumnSplit::Tabs => line.split('\t').collect(),
        };
        parts
            .into_iter()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Splits whitespace-aligned blocks of lines into tables.
pub fn extract_tables_from_text(text: &str) -> Vec<ProductTable> {
    extract_tables(text, ColumnSplit::Whitespace)
}

/// A line with a tab or a double space and at least two cells starts a table
/// (its cells become headers) or adds a row. Any other non-blank line ends
/// the current table.
pub fn extract_tables(text: &str, split: ColumnSplit) -> Vec<ProductTable> {
    let mut tables = Vec::new();
    let mut current: Option<ProductTable> = None;

    for raw in text.split('\n') {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if line.contains('\t') || line.contains("  ") {
            let columns = split.cells(line);

            if columns.len() >= 2 {
                match current.as_mut() {
                    None => {
                        let table_type = classify_table_type(&columns).to_string();
                        current = Some(ProductTable {
                            headers: columns,
                            rows: Vec::new(),
                            table_type: Some(table_type),
                        });
                    }
                    Some(t) => t.rows.push(columns),
                }
            }
        } else if let Some(t) = current.take() {
            tables.push(t);
        }
    }

    if let Some(t) = current {
        tables.push(t);
    }
    tables
}

pub fn classify_table_type(headers: &[String]) -> &'static str {
    let header_text = headers.join(" ").to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| header_text.contains(w));

    if has(&["spec", "specification", "technical", "dimension"]) {
        "specifications"
    } else if has(&["feature", "benefit", "capability"]) {
        "features"
    } else if has(&["compare", "comparison", "vs"]) {
        "comparison"
    } else {
        "general"
    }
}

/// Rows of specification tables as `label, value[, unit]`.
pub fn specs_from_tables(tables: &[ProductTable]) -> Vec<ProductSpecification> {
    tables
        .iter()
        .filter(|t| t.table_type.as_deref() == Some("specifications"))
        .flat_map(|t| t.rows.iter())
        .filter(|row| row.len() >= 2)
        .map(|row| ProductSpecification {
            label: row[0].clone(),
            value: row[1].clone(),
            unit: row.get(2).cloned(),
        })
        .collect()
}

fn split_pipe_cell(cell: &str) -> Option<ProductSpecification> {
    let parts: Vec<&str> = cell.split(" | ").collect();
    match parts.as_slice() {
        [label, value] => Some(ProductSpecification::new(label.trim(), value.trim())),
        _ => None,
    }
}

/// Specifications packed as `label | value` in the second cell of rows and header.
pub fn specs_from_pipe_cells(tables: &[ProductTable]) -> Vec<ProductSpecification> {
    let mut specs = Vec::new();
    for table in tables {
        for row in &table.rows {
            if row.len() >= 2 {
                specs.extend(split_pipe_cell(&row[1]));
            }
        }
        if table.headers.len() >= 2 {
            specs.extend(split_pipe_cell(&table.headers[1]));
        }
    }
    specs
}

/// Title-cases like a word processor: a letter is upper-cased when it does not
/// follow another letter.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

pub fn detect_category(raw_text: &str, cfg: &Config) -> String {
    let text = raw_text.to_lowercase();
    let has = |w: &str| text.contains(w);

    for cat in &cfg.categories.patterns {
        if cat.patterns.iter().any(|p| has(&p.to_lowercase())) {
            return title_case(&cat.name);
        }
    }

    if has("maruyama") {
        if has("brush") || has("cutter") {
            return "Brush Cutter".into();
        } else if has("chainsaw") {
            return "Chainsaw".into();
        } else if has("blower") {
            return "Blower".into();
        }
    }

    if has("cc") || has("engine") {
        if has("brush") || has("cutter") {
            return "Brush Cutter".into();
        } else if has("chain") {
            return "Chainsaw".into();
        }
    }

    cfg.categories.default.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_matches_word_boundaries() {
        assert_eq!(title_case("brush cutter"), "Brush Cutter");
        assert_eq!(title_case("x-ray VISION"), "X-Ray Vision");
    }

    #[test]
    fn pipe_cells_need_exactly_two_parts() {
        assert!(split_pipe_cell("Weight | 5 kg").is_some());
        assert!(split_pipe_cell("a | b | c").is_none());
        assert!(split_pipe_cell("plain").is_none());
    }
}
