pub mod cli;
pub mod config;
pub mod dam;
pub mod engine;
pub mod frontend;
pub mod heuristics;
pub mod layout;
pub mod ocr;
pub mod pipeline;
pub mod postprocess;
pub mod product;
pub mod report;
pub mod structure;
pub mod util;
