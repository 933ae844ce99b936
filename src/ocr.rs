//! OCR service response model and the on-disk response cache.
//!
//! The shape follows the page/markdown/images layout returned by the OCR
//! provider; unknown fields are ignored so newer responses still load.

use crate::{
    config::Config,
    engine::{Engine, OcrRequest},
    layout::BBox,
    util::{ensure_dir, file_stem, hash_file, sha256_hex, write_json},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrResponse {
    #[serde(default)]
    pub pages: Vec<OcrPage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrPage {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub markdown: String,
    #[serde(default)]
    pub images: Vec<OcrImage>,
    #[serde(default)]
    pub dimensions: Option<PageDimensions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrImage {
    pub id: String,
    #[serde(default)]
    pub top_left_x: Option<f64>,
    #[serde(default)]
    pub top_left_y: Option<f64>,
    #[serde(default)]
    pub bottom_right_x: Option<f64>,
    #[serde(default)]
    pub bottom_right_y: Option<f64>,
    #[serde(default)]
    pub image_base64: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageDimensions {
    #[serde(default)]
    pub dpi: u32,
    pub width: f64,
    pub height: f64,
}

impl OcrImage {
    pub fn bbox(&self) -> Option<BBox> {
        Some(BBox {
            x0: self.top_left_x?,
            y0: self.top_left_y?,
            x1: self.bottom_right_x?,
            y1: self.bottom_right_y?,
        })
    }

    /// The payload, if present and non-empty.
    pub fn payload(&self) -> Option<&str> {
        self.image_base64.as_deref().filter(|s| !s.trim().is_empty())
    }
}

impl OcrResponse {
    /// Every page's markdown, joined with a single newline.
    pub fn combined_markdown(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.markdown.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn total_images(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}

pub fn load_response(path: &Path) -> Result<OcrResponse> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading OCR response: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing OCR response: {}", path.display()))
}

pub fn save_response(path: &Path, resp: &OcrResponse) -> Result<()> {
    write_json(path, resp)
}

pub fn request_for(cfg: &Config, input: &Path, include_images: bool) -> OcrRequest {
    OcrRequest {
        input_pdf: input.display().to_string(),
        file_name: file_stem(input),
        model: cfg.ocr.model.clone(),
        include_image_base64: include_images,
    }
}

fn cache_path(cfg: &Config, input: &Path, include_images: bool) -> Result<PathBuf> {
    let file_hash = hash_file(cfg, input)
        .with_context(|| format!("hashing input: {}", input.display()))?;
    let key = sha256_hex(format!("{}:{}:{}", file_hash, include_images, cfg.ocr.model).as_bytes());
    Ok(PathBuf::from(&cfg.paths.cache_dir).join(format!("{key}.ocr.json")))
}

/// Runs OCR through `engine`, reusing a cached response for the same file,
/// model and image setting when `ocr.use_cache` is on.
pub fn cached_ocr(
    cfg: &Config,
    engine: &dyn Engine,
    input: &Path,
    include_images: bool,
) -> Result<OcrResponse> {
    let cache = if cfg.ocr.use_cache {
        Some(cache_path(cfg, input, include_images)?)
    } else {
        None
    };

    if let Some(path) = cache.as_deref() {
        if path.exists() {
            info!("using cached OCR response {}", path.display());
            return load_response(path);
        }
    }

    info!(
        "running OCR on {} (model={} images={})",
        input.display(),
        cfg.ocr.model,
        include_images
    );
    let resp = engine.ocr(&request_for(cfg, input, include_images))?;
    debug!(
        pages = resp.pages.len(),
        images = resp.total_images(),
        "OCR response received"
    );

    if let Some(path) = cache.as_deref() {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        save_response(path, &resp)?;
    }
    Ok(resp)
}
