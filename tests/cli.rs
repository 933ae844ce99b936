//! Binary-level checks for the commands that need no OCR or LLM service.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

fn cmd(dir: &std::path::Path) -> Command {
    let mut c = Command::cargo_bin("catalog-extract").unwrap();
    c.current_dir(dir);
    c
}

#[test]
fn test_help() {
    let tmp = tempfile::tempdir().unwrap();
    cmd(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("convert"));
}

#[test]
fn test_parse_prints_heuristic_record() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("page_text.txt"),
        "**MB2300 Blower**\nModel: MB-2300\nBrand: Maruyama\n",
    )
    .unwrap();

    cmd(tmp.path())
        .args(["parse", "--input", "page_text.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"model_number\": \"MB-2300\""))
        .stdout(predicate::str::contains("\"category\": \"Blower\""));
}

#[test]
fn test_layout_reads_saved_ocr() {
    let tmp = tempfile::tempdir().unwrap();
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(image::RgbImage::new(400, 400))
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    let ocr = serde_json::json!({
        "pages": [{
            "index": 0,
            "markdown": "",
            "dimensions": {"dpi": 72, "width": 1000, "height": 1000},
            "images": [{
                "id": "img-0.jpeg",
                "top_left_x": 0, "top_left_y": 0,
                "bottom_right_x": 400, "bottom_right_y": 400,
                "image_base64": catalog_extract::dam::data_url("image/png", &png)
            }]
        }]
    });
    std::fs::write(tmp.path().join("ocr.json"), ocr.to_string()).unwrap();

    cmd(tmp.path())
        .args(["layout", "--ocr-json", "ocr.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"product\""));
}

#[test]
fn test_run_rejects_urls() {
    let tmp = tempfile::tempdir().unwrap();
    cmd(tmp.path())
        .args(["run", "--input", "https://example.com/catalog.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("URL inputs are disabled"));
}

#[test]
fn test_run_rejects_non_pdf() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("notes.txt"), "hello").unwrap();
    cmd(tmp.path())
        .args(["run", "--input", "notes.txt", "--mode", "text-only"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("input is not a PDF"));
}
