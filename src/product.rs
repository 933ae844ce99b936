use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSpecification {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl ProductSpecification {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            unit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductFeature {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ProductFeature {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            category: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub local_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_data: Option<String>,
    pub page_number: u32,
    pub size_estimate: u64,
    pub image_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductInfo {
    pub product_name: String,
    pub product_description: String,
    pub model_number: String,
    pub brand: String,
    pub category: String,
    pub specifications: Vec<ProductSpecification>,
    pub features: Vec<ProductFeature>,
    pub tables: Vec<ProductTable>,
    pub images: Vec<ProductImage>,
    pub thumbnail_image: Option<String>,
    pub rating: String,
    pub review_count: String,
    pub raw_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "kebab-case")]
pub enum ExtractionType {
    /// Layout-sorted images + OCR text + LLM structuring.
    Combined,
    /// OCR with images + LLM structuring + table specs.
    Structured,
    /// OCR text + LLM structuring, no images.
    TextOnly,
    /// OCR with images + regex heuristics, LLM optional.
    Heuristic,
}

impl ExtractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionType::Combined => "improved_combined",
            ExtractionType::Structured => "structured",
            ExtractionType::TextOnly => "text_only",
            ExtractionType::Heuristic => "heuristic",
        }
    }

    pub fn wants_images(&self) -> bool {
        !matches!(self, ExtractionType::TextOnly)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub source_pdf: String,
    pub extraction_timestamp: String,
    pub extraction_type: ExtractionType,
    pub total_pages: usize,
    pub total_images: usize,
    pub total_text_length: usize,
    pub total_tables: usize,
    #[serde(default)]
    pub images_folder: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub products: Vec<ProductInfo>,
    pub metadata: ExtractionMetadata,
}
