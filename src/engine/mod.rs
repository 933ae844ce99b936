pub mod process;
pub mod types;

use crate::ocr::OcrResponse;
use anyhow::Result;

pub use types::{ChatMessage, ChatRequest, ChatResponse, EngineDiag, OcrRequest};

/// The OCR and LLM services the extractor depends on.
pub trait Engine {
    fn doctor(&self) -> Result<EngineDiag>;
    fn ocr(&self, req: &OcrRequest) -> Result<OcrResponse>;
    fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;
}
