use crate::{layout::LayoutSummary, product::ExtractionType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    pub path: String,
    pub file_bytes: u64,
    pub file_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub mode: ExtractionType,
    pub input: InputInfo,
    pub started: String,
    pub finished: String,
    pub pages: usize,
    pub text_length: usize,
    #[serde(default)]
    pub layout: Option<LayoutSummary>,
    pub images: usize,
    pub tables: usize,
    pub specifications: usize,
    pub features: usize,
    pub product_name: String,
    pub category: String,
    /// Files written by the job, relative to the job directory where possible.
    pub outputs: Vec<String>,
    pub warnings: Vec<String>,
}
