use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub hashing: Hashing,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub ocr: Ocr,
    #[serde(default)]
    pub llm: Llm,
    #[serde(default)]
    pub images: Images,
    #[serde(default)]
    pub text: Text,
    #[serde(default)]
    pub categories: Categories,
    #[serde(default)]
    pub frontend: Frontend,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub resume: bool,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            resume: true,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub out_dir: String,
    pub cache_dir: String,
    /// Root of the asset folder images are written under (`<dam_dir>/<pdf stem>/...`).
    pub dam_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "output".into(),
            cache_dir: ".catalog-extract-cache".into(),
            dam_dir: "dam".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Hashing {
    pub mode: String,
    pub fast_window_bytes: u64,
}
impl Default for Hashing {
    fn default() -> Self {
        Self {
            mode: "fast_2x16mb".into(),
            fast_window_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_input_file_bytes: u64,
    pub max_input_pages: u32,
    pub job_timeout_seconds: u64,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_file_bytes: 512 * 1024 * 1024,
            max_input_pages: 1000,
            job_timeout_seconds: 0,
        }
    }
}

/// External collaborators. Each command is an argv vector that reads one JSON
/// request on stdin and writes one JSON response on stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Engine {
    pub ocr_command: Vec<String>,
    pub llm_command: Vec<String>,
    pub timeout_seconds: u64,
    pub doctor_timeout_seconds: u64,
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for Engine {
    fn default() -> Self {
        Self {
            ocr_command: vec!["python3".into(), "scripts/ocr_runner.py".into()],
            llm_command: vec!["python3".into(), "scripts/llm_runner.py".into()],
            timeout_seconds: 600,
            doctor_timeout_seconds: 30,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ocr {
    pub model: String,
    pub use_cache: bool,
}
impl Default for Ocr {
    fn default() -> Self {
        Self {
            model: "mistral-ocr-latest".into(),
            use_cache: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Llm {
    pub model: String,
    pub temperature: f32,
    pub max_completion_tokens: u32,
    pub metadata_model: String,
    pub metadata_temperature: f32,
    pub metadata_max_tokens: u32,
    /// Drop `unit` from LLM specifications in combined mode.
    pub strip_units: bool,
    /// Ask the LLM for a cleaner name/description after heuristic parsing.
    pub refine_heuristic: bool,
}
impl Default for Llm {
    fn default() -> Self {
        Self {
            model: "llama-3.1-8b-instant".into(),
            temperature: 0.1,
            max_completion_tokens: 2048,
            metadata_model: "llama3-8b-8192".into(),
            metadata_temperature: 0.3,
            metadata_max_tokens: 512,
            strip_units: true,
            refine_heuristic: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Images {
    pub min_pixel_size: f64,
    pub edge_margin: f64,
    pub column_tolerance: f64,
    /// Drop images that are neither edge-anchored nor in the bottom-right quadrant.
    pub drop_unanchored: bool,
}
impl Default for Images {
    fn default() -> Self {
        Self {
            min_pixel_size: 100.0,
            edge_margin: 10.0,
            column_tolerance: 5.0,
            drop_unanchored: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Text {
    /// Lines (by index) eligible for `KEY: value` feature extraction.
    pub feature_window: usize,
    pub normalize_unicode: bool,
    pub strip_image_tags: bool,
    pub control_chars_to_sanitize: Vec<u8>,
}
impl Default for Text {
    fn default() -> Self {
        Self {
            feature_window: 50,
            normalize_unicode: false,
            strip_image_tags: false,
            control_chars_to_sanitize: (0u8..32).filter(|c| !matches!(c, 9 | 10 | 13)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryPattern {
    pub name: String,
    pub patterns: Vec<String>,
}

impl CategoryPattern {
    fn new(name: &str, patterns: &[&str]) -> Self {
        Self {
            name: name.into(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Categories {
    pub default: String,
    /// Checked in order; first hit wins.
    pub patterns: Vec<CategoryPattern>,
}
impl Default for Categories {
    fn default() -> Self {
        Self {
            default: "Power Equipment".into(),
            patterns: vec![
                CategoryPattern::new("brush cutter", &["brush cutter", "brushcutter", "brush-cutter"]),
                CategoryPattern::new("chainsaw", &["chainsaw", "chain saw", "chain-saw"]),
                CategoryPattern::new("lawn mower", &["lawn mower", "lawnmower", "mower"]),
                CategoryPattern::new("trimmer", &["trimmer", "string trimmer", "line trimmer"]),
                CategoryPattern::new("blower", &["blower", "leaf blower", "garden blower"]),
                CategoryPattern::new("hedge trimmer", &["hedge trimmer", "hedge cutter"]),
                CategoryPattern::new("power tool", &["power tool", "power equipment"]),
                CategoryPattern::new("garden tool", &["garden tool", "garden equipment"]),
                CategoryPattern::new(
                    "outdoor equipment",
                    &["outdoor equipment", "outdoor power equipment"],
                ),
                CategoryPattern::new(
                    "construction tool",
                    &["construction tool", "construction equipment"],
                ),
                CategoryPattern::new(
                    "agricultural equipment",
                    &["agricultural", "farm equipment", "farming"],
                ),
                CategoryPattern::new("forestry equipment", &["forestry", "logging equipment"]),
                CategoryPattern::new(
                    "landscaping equipment",
                    &["landscaping", "landscape equipment"],
                ),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Frontend {
    pub rating: String,
    pub review_count: String,
    /// Category used by the organized-data converter.
    pub catalog_category: String,
    /// OCR image ids skipped entirely in heuristic mode.
    pub skip_image_ids: Vec<String>,
    /// OCR image ids kept on disk but left out of catalog thumbnails.
    pub skip_thumbnail_ids: Vec<String>,
}
impl Default for Frontend {
    fn default() -> Self {
        Self {
            rating: "4.5".into(),
            review_count: "128".into(),
            catalog_category: "Blowers".into(),
            skip_image_ids: Vec::new(),
            skip_thumbnail_ids: vec!["img-0.jpeg".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub write_raw_text: bool,
    pub write_report_json: bool,
    pub write_ocr_json: bool,
    /// Keep `base64_data` in structured/organized JSON.
    pub include_base64: bool,
    /// Frontend JSON references DAM paths instead of inline base64.
    pub frontend_use_paths: bool,
    pub report_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            write_raw_text: true,
            write_report_json: true,
            write_ocr_json: false,
            include_base64: false,
            frontend_use_paths: true,
            report_filename: "report.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub keep_engine_stderr: bool,
    pub dump_effective_config: bool,
    /// Log prompts and raw LLM replies at debug level.
    pub log_llm_exchanges: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_engine_stderr: true,
            dump_effective_config: true,
            log_llm_exchanges: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Security {
    pub reject_url_inputs: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
        }
    }
}
