use anyhow::Result;
use catalog_extract::config::Config;
use catalog_extract::dam;
use catalog_extract::engine::{ChatRequest, ChatResponse, Engine, EngineDiag, OcrRequest};
use catalog_extract::ocr::OcrResponse;
use catalog_extract::pipeline::{self, Pipeline};
use catalog_extract::product::ExtractionType;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

const REPLY: &str = r#"Here you go:
```json
{
  "product_name": "MB2300",
  "product_description": "Backpack blower",
  "brand": "Maruyama",
  "category": "Blower",
  "specifications": [{"label": "Power", "value": "0.8", "unit": "kW"}],
  "features": [{"name": "Quiet", "description": "Low noise"}]
}
```"#;

struct FakeEngine {
    reply: String,
    ocr_requests: RefCell<Vec<OcrRequest>>,
    chat_requests: RefCell<Vec<ChatRequest>>,
}

impl FakeEngine {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ocr_requests: RefCell::new(Vec::new()),
            chat_requests: RefCell::new(Vec::new()),
        }
    }
}

impl Engine for FakeEngine {
    fn doctor(&self) -> Result<EngineDiag> {
        Ok(EngineDiag {
            ocr_ok: true,
            llm_ok: true,
            ocr_info: None,
            llm_info: None,
            errors: Vec::new(),
        })
    }

    fn ocr(&self, req: &OcrRequest) -> Result<OcrResponse> {
        self.ocr_requests.borrow_mut().push(req.clone());
        Ok(catalog_ocr())
    }

    fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.chat_requests.borrow_mut().push(req.clone());
        Ok(ChatResponse {
            content: Some(self.reply.clone()),
            error: None,
        })
    }
}

fn png_data_url(width: u32, height: u32) -> String {
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height))
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .expect("encode png");
    dam::data_url("image/png", &png)
}

/// An image whose pixel size matches its box.
fn image(id: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Value {
    json!({
        "id": id,
        "top_left_x": x0,
        "top_left_y": y0,
        "bottom_right_x": x1,
        "bottom_right_y": y1,
        "image_base64": png_data_url((x1 - x0) as u32, (y1 - y0) as u32)
    })
}

fn catalog_ocr() -> OcrResponse {
    serde_json::from_value(json!({
        "model": "fake-ocr",
        "pages": [
            {
                "index": 0,
                "markdown": "**MB2300 Blower**\nModel: MB-2300\nBrand: Maruyama",
                "dimensions": {"dpi": 200, "width": 1000.0, "height": 1000.0},
                "images": [
                    image("img-0.jpeg", 0.0, 0.0, 300.0, 300.0),
                    image("img-1.jpeg", 600.0, 600.0, 800.0, 800.0)
                ]
            },
            {
                "index": 1,
                "markdown": "Specification\tValue\nWeight\t4.5 kg",
                "dimensions": {"dpi": 200, "width": 1000.0, "height": 1000.0},
                "images": []
            }
        ]
    }))
    .expect("valid OCR response")
}

struct Fixture {
    _tmp: tempfile::TempDir,
    cfg: Config,
    input: PathBuf,
    job_dir: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().expect("tempdir");
    let input = tmp.path().join("catalog.pdf");
    std::fs::write(&input, b"%PDF-1.4 fake catalog").expect("write input");

    let mut cfg = Config::default();
    cfg.paths.cache_dir = tmp.path().join("cache").display().to_string();
    cfg.logging.write_to_file = false;

    Fixture {
        job_dir: tmp.path().join("job"),
        cfg,
        input,
        _tmp: tmp,
    }
}

fn read_json(path: &Path) -> Value {
    let raw = std::fs::read_to_string(path).expect("read output");
    serde_json::from_str(&raw).expect("parse output")
}

#[test]
fn combined_mode_orders_images_and_structures_text() {
    let fx = fixture();
    let pipeline = Pipeline::new(&fx.cfg, FakeEngine::new(REPLY));
    let out = pipeline
        .run_job(&fx.input, &fx.job_dir, ExtractionType::Combined, None)
        .expect("job runs");

    assert!(out.documents.contains(&"catalog_improved_combined.json".to_string()));
    assert!(out.documents.contains(&"catalog_raw_text.txt".to_string()));
    assert!(fx.job_dir.join("dam/catalog/page_01_image_01.jpg").exists());
    assert!(fx.job_dir.join("dam/catalog/page_01_image_02.jpg").exists());
    assert!(fx.job_dir.join("report.json").exists());

    let doc = read_json(&fx.job_dir.join("catalog_improved_combined.json"));
    assert_eq!(doc["category"], json!(["Blower"]));
    let p = &doc["products"][0];
    assert_eq!(p["product_name"], "MB2300");
    assert_eq!(p["mainImage"], "dam/catalog/page_01_image_01.jpg");
    assert_eq!(p["images_folder"], "dam/catalog");
    assert_eq!(p["image_details"][0]["image_type"], "feature");
    assert_eq!(p["image_details"][1]["image_type"], "product");
    assert_eq!(p["image_details"][1]["id"], "img-1.jpeg");
    assert_eq!(p["specifications"][0], json!({"label": "Power", "value": "0.8"}));
    assert!(p["mainImageBase64"].as_str().unwrap_or("").starts_with("data:image/jpeg;base64,"));

    let layout = out.report.layout.expect("layout summary");
    assert_eq!((layout.feature, layout.product), (1, 1));
    assert!(out.report.warnings.is_empty());

    let chats = pipeline.engine().chat_requests.borrow();
    assert_eq!(chats.len(), 1);
    assert!(chats[0].messages[0].content.contains("Use the detected category: Blower"));
}

#[test]
fn structured_mode_merges_table_specs_and_strips_payloads() {
    let fx = fixture();
    let pipeline = Pipeline::new(&fx.cfg, FakeEngine::new(REPLY));
    pipeline
        .run_job(&fx.input, &fx.job_dir, ExtractionType::Structured, None)
        .expect("job runs");

    let data = read_json(&fx.job_dir.join("structured_data.json"));
    let p = &data["products"][0];
    assert_eq!(p["specifications"][0], json!({"label": "Power", "value": "0.8", "unit": "kW"}));
    assert_eq!(p["specifications"][1], json!({"label": "Weight", "value": "4.5 kg"}));
    assert_eq!(p["images"][0]["id"], "img-0.jpeg");
    assert_eq!(p["images"][0]["image_type"], "product");
    assert!(p["images"][0].get("base64_data").is_none());
    assert_eq!(data["metadata"]["extraction_type"], "structured");
    assert_eq!(data["metadata"]["total_tables"], 1);

    let front = read_json(&fx.job_dir.join("frontend_data.json"));
    let f = &front["products"][0];
    assert_eq!(f["mainImage"], "dam/catalog/page_01_image_01.jpg");
    assert_eq!(f["thumbnails"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(f["specifications"][0]["value"], "0.8 kW");
}

#[test]
fn text_only_mode_skips_images() {
    let fx = fixture();
    let pipeline = Pipeline::new(&fx.cfg, FakeEngine::new(REPLY));
    let out = pipeline
        .run_job(&fx.input, &fx.job_dir, ExtractionType::TextOnly, None)
        .expect("job runs");

    assert!(!pipeline.engine().ocr_requests.borrow()[0].include_image_base64);
    assert!(!fx.job_dir.join("dam").exists());
    assert_eq!(out.report.images, 0);

    let doc = read_json(&fx.job_dir.join("catalog_text_only.json"));
    let p = &doc["products"][0];
    assert_eq!(p["extraction_type"], "text_only");
    assert_eq!(p["mainImage"], "");
    assert_eq!(p["brand"], "Maruyama");
}

#[test]
fn heuristic_mode_needs_no_llm() {
    let fx = fixture();
    let pipeline = Pipeline::new(&fx.cfg, FakeEngine::new(REPLY));
    let out = pipeline
        .run_job(&fx.input, &fx.job_dir, ExtractionType::Heuristic, None)
        .expect("job runs");

    assert!(pipeline.engine().chat_requests.borrow().is_empty());
    assert_eq!(out.report.product_name, "MB2300");

    let data = read_json(&fx.job_dir.join("data.json"));
    let p = &data["products"][0];
    assert_eq!(p["category"], "Blowers");
    // No description was found; the sentence keeps the empty slot.
    assert_eq!(p["detailedDescription"], "This is a  designed for professional use.");
    // img-0.jpeg is the main image but not a thumbnail.
    assert_eq!(p["thumbnails"].as_array().map(|a| a.len()), Some(1));
    assert!(p["mainImage"].as_str().unwrap_or("").starts_with("data:image/jpeg;base64,"));

    let organized = read_json(&fx.job_dir.join("catalog_organized_data.json"));
    assert_eq!(organized["metadata"]["total_images"], 2);
    assert!(organized["all_extracted_images"][0].get("base64_data").is_none());
    assert_eq!(
        organized["products"][0]["product_images"][1],
        "dam/catalog/page_01_image_02.jpg"
    );
}

#[test]
fn saved_images_are_jpeg_whatever_the_payload_format() {
    let fx = fixture();
    let pipeline = Pipeline::new(&fx.cfg, FakeEngine::new(REPLY));
    pipeline
        .run_job(&fx.input, &fx.job_dir, ExtractionType::Structured, None)
        .expect("job runs");

    let bytes = std::fs::read(fx.job_dir.join("dam/catalog/page_01_image_01.jpg")).expect("image");
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
}

#[test]
fn undecodable_image_is_skipped_with_a_warning() {
    for mode in [ExtractionType::Structured, ExtractionType::Heuristic] {
        let fx = fixture();
        let mut ocr = catalog_ocr();
        ocr.pages[0].images[1].image_base64 = Some("data:image/jpeg;base64,@@@@".into());

        let pipeline = Pipeline::new(&fx.cfg, FakeEngine::new(REPLY));
        let out = pipeline
            .run_job(&fx.input, &fx.job_dir, mode, Some(ocr))
            .expect("job still runs");

        assert_eq!(out.report.images, 1, "{mode:?}");
        assert!(fx.job_dir.join("dam/catalog/page_01_image_01.jpg").exists());
        assert!(!fx.job_dir.join("dam/catalog/page_01_image_02.jpg").exists());
        assert!(
            out.report.warnings.iter().any(|w| w.contains("img-1.jpeg")),
            "{mode:?}: {:?}",
            out.report.warnings
        );
    }
}

#[test]
fn combined_mode_leaves_out_unreadable_images() {
    let fx = fixture();
    let mut ocr = catalog_ocr();
    ocr.pages[0].images[1].image_base64 = Some("aGk=".into());

    let pipeline = Pipeline::new(&fx.cfg, FakeEngine::new(REPLY));
    let out = pipeline
        .run_job(&fx.input, &fx.job_dir, ExtractionType::Combined, Some(ocr))
        .expect("job still runs");

    let layout = out.report.layout.expect("layout summary");
    assert_eq!((layout.total, layout.feature, layout.product), (1, 0, 1));
    assert_eq!(out.report.images, 1);
    assert!(out.report.warnings.iter().any(|w| w.contains("readable payload")));
}

#[test]
fn metadata_refinement_sends_plain_text() {
    let mut fx = fixture();
    fx.cfg.llm.refine_heuristic = true;
    let pipeline = Pipeline::new(&fx.cfg, FakeEngine::new(REPLY));
    let out = pipeline
        .run_job(&fx.input, &fx.job_dir, ExtractionType::Heuristic, None)
        .expect("job runs");

    let chats = pipeline.engine().chat_requests.borrow();
    assert_eq!(chats.len(), 1);
    let prompt = &chats[0].messages[0].content;
    assert!(prompt.contains("Text:\nMB2300 Blower\nModel: MB-2300"));
    assert!(!prompt.contains("**MB2300 Blower**"));

    assert_eq!(out.report.product_name, "MB2300");
    let data = read_json(&fx.job_dir.join("data.json"));
    assert_eq!(
        data["products"][0]["detailedDescription"],
        "This is a Backpack blower designed for professional use."
    );
}

#[test]
fn unparseable_llm_reply_degrades_to_empty_record() {
    let fx = fixture();
    let pipeline = Pipeline::new(&fx.cfg, FakeEngine::new("I cannot help with that."));
    let out = pipeline
        .run_job(&fx.input, &fx.job_dir, ExtractionType::Combined, None)
        .expect("job still runs");

    assert_eq!(out.report.product_name, "");
    assert_eq!(out.report.category, "Blower");
    assert!(out
        .report
        .warnings
        .iter()
        .any(|w| w.contains("no product name")));
}

#[test]
fn supplied_ocr_response_bypasses_the_engine() {
    let fx = fixture();
    let pipeline = Pipeline::new(&fx.cfg, FakeEngine::new(REPLY));
    let out = pipeline
        .run_job(
            &fx.input,
            &fx.job_dir,
            ExtractionType::Heuristic,
            Some(catalog_ocr()),
        )
        .expect("job runs");

    assert!(pipeline.engine().ocr_requests.borrow().is_empty());
    assert_eq!(out.report.pages, 2);
    assert!(out.raw_text.contains("Weight\t4.5 kg"));
}

#[test]
fn page_limit_is_enforced() {
    let mut fx = fixture();
    fx.cfg.limits.max_input_pages = 1;
    let pipeline = Pipeline::new(&fx.cfg, FakeEngine::new(REPLY));
    let err = pipeline
        .run_job(&fx.input, &fx.job_dir, ExtractionType::TextOnly, None)
        .unwrap_err();
    assert!(err.to_string().contains("max_input_pages"));
}

#[test]
fn ocr_responses_are_cached_per_file() {
    let fx = fixture();
    let engine = FakeEngine::new(REPLY);

    let first = pipeline::extract_raw_text(&engine, &fx.cfg, &fx.input).expect("first run");
    let second = pipeline::extract_raw_text(&engine, &fx.cfg, &fx.input).expect("second run");

    assert_eq!(first, second);
    assert_eq!(engine.ocr_requests.borrow().len(), 1);
    assert!(first.starts_with("**MB2300 Blower**"));
}

#[test]
fn convert_uses_stem_without_text_suffix() {
    let fx = fixture();
    let text_path = fx.input.with_file_name("catalog_text.txt");
    std::fs::write(&text_path, "**MB2300 Blower**\nModel: MB-2300").expect("write text");

    let engine = FakeEngine::new(REPLY);
    let doc = pipeline::convert_text(&engine, &fx.cfg, &text_path).expect("convert");

    let p = &doc.products[0];
    assert_eq!(p.source_pdf, "catalog");
    assert_eq!(p.rating, "4.5");
    assert_eq!(p.review_count, "128");
    assert_eq!(p.specifications[0].value, "0.8 kW");
    assert_eq!(
        pipeline::default_convert_output(&text_path).file_name().and_then(|s| s.to_str()),
        Some("catalog_text_frontend.json")
    );
}
