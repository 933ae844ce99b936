//! Image persistence under the asset folder (`<dam>/<pdf stem>/`).

use crate::{
    layout::ArrangedImage,
    product::ProductImage,
    util::ensure_dir,
};
use anyhow::{anyhow, Context, Result};
use base64::{prelude::BASE64_STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, ImageReader};
use regex::Regex;
use std::io::Cursor;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};

static DATA_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^data:(?P<mime_type>[^;,]+)(?:;[^,]*)?,(?P<data>.*)$")
        .expect("valid data URL regex")
});

pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64_STANDARD.encode(data))
}

/// Decodes a raw base64 string or a `data:` URL. The MIME type defaults to JPEG.
pub fn decode_image_payload(payload: &str) -> Result<(String, Vec<u8>)> {
    let payload = payload.trim();
    let (mime, b64) = match DATA_URL_RE.captures(payload) {
        Some(caps) => (
            caps.name("mime_type").map(|m| m.as_str()).unwrap_or("image/jpeg"),
            caps.name("data").map(|m| m.as_str()).unwrap_or(""),
        ),
        None => ("image/jpeg", payload),
    };
    let cleaned: String = b64.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64_STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| anyhow!("invalid base64 image payload: {e}"))?;
    Ok((mime.to_string(), bytes))
}

/// Pixel size read from the image header, without decoding the pixels.
pub fn payload_dimensions(payload: &str) -> Result<(u32, u32)> {
    let (_, bytes) = decode_image_payload(payload)?;
    let reader = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .context("reading image header")?;
    reader
        .into_dimensions()
        .map_err(|e| anyhow!("unreadable image data: {e}"))
}

/// Decodes any supported format and re-encodes it as baseline JPEG.
pub fn to_jpeg(payload: &str) -> Result<Vec<u8>> {
    let (_, bytes) = decode_image_payload(payload)?;
    let img = image::load_from_memory(&bytes).map_err(|e| anyhow!("unreadable image data: {e}"))?;
    // The JPEG encoder rejects alpha channels.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut jpeg = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .context("encoding JPEG")?;
    Ok(jpeg)
}

pub fn image_filename(page_number: u32, index: usize) -> String {
    format!("page_{:02}_image_{:02}.jpg", page_number, index + 1)
}

/// Asset-relative path as it appears in JSON: always `/`-separated.
pub fn dam_url(dam_dir: &str, stem: &str, filename: &str) -> String {
    format!("{}/{}/{}", dam_dir.trim_end_matches('/'), stem, filename)
}

/// Label for an OCR image id in structured mode. Page one is always the product shot.
pub fn classify_image_id(image_id: &str, page_number: u32) -> &'static str {
    let id = image_id.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| id.contains(w));

    if page_number == 1 {
        "product"
    } else if has(&["diagram", "schematic", "blueprint"]) {
        "diagram"
    } else if has(&["chart", "graph", "plot"]) {
        "chart"
    } else if has(&["logo", "brand"]) {
        "logo"
    } else if has(&["table", "spec"]) {
        "table"
    } else {
        "product"
    }
}

/// One image to write, independent of how it was ordered.
pub struct PendingImage<'a> {
    pub index: usize,
    pub id: String,
    pub page_number: u32,
    pub image_type: String,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub payload: &'a str,
}

impl<'a> From<&'a ArrangedImage> for PendingImage<'a> {
    fn from(a: &'a ArrangedImage) -> Self {
        PendingImage {
            index: a.index,
            id: format!("img-{}.jpeg", a.index),
            page_number: a.image.page_number,
            image_type: a.kind.as_str().to_string(),
            width: Some(a.image.pixel_width),
            height: Some(a.image.pixel_height),
            payload: &a.image.data,
        }
    }
}

/// Images written by [`save_images`], plus one message per image that could
/// not be decoded.
#[derive(Debug, Default)]
pub struct SavedImages {
    pub images: Vec<ProductImage>,
    pub failed: Vec<String>,
}

/// Writes `pending` to `<base>/<dam_dir>/<stem>/` as JPEG. Returned
/// `local_path`s are relative to `base`. A bad payload skips that image only;
/// filesystem errors abort.
pub fn save_images(
    pending: &[PendingImage<'_>],
    base: &Path,
    dam_dir: &str,
    stem: &str,
) -> Result<SavedImages> {
    let mut out = SavedImages::default();
    if pending.is_empty() {
        return Ok(out);
    }

    let out_dir = base.join(dam_dir).join(stem);
    ensure_dir(&out_dir)?;

    for p in pending {
        let jpeg = match to_jpeg(p.payload) {
            Ok(v) => v,
            Err(e) => {
                warn!("skipping image {} on page {}: {e:#}", p.id, p.page_number);
                out.failed
                    .push(format!("image {} on page {} not saved: {e:#}", p.id, p.page_number));
                continue;
            }
        };
        let filename = image_filename(p.page_number, p.index);
        let path = out_dir.join(&filename);
        std::fs::write(&path, &jpeg).with_context(|| format!("writing {}", path.display()))?;

        info!("saved image: {} (type: {})", path.display(), p.image_type);
        out.images.push(ProductImage {
            id: p.id.clone(),
            filename: filename.clone(),
            local_path: Some(dam_url(dam_dir, stem, &filename)),
            base64_data: Some(data_url("image/jpeg", &jpeg)),
            page_number: p.page_number,
            size_estimate: jpeg.len() as u64,
            image_type: p.image_type.clone(),
            width: p.width,
            height: p.height,
        });
    }
    Ok(out)
}

/// Writes layout-arranged images; `image_type` comes from the layout bucket.
pub fn save_arranged(
    images: &[ArrangedImage],
    base: &Path,
    dam_dir: &str,
    stem: &str,
) -> Result<SavedImages> {
    let pending: Vec<PendingImage<'_>> = images.iter().map(PendingImage::from).collect();
    save_images(&pending, base, dam_dir, stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn decodes_data_url_and_raw_payloads() {
        let (mime, bytes) = decode_image_payload("data:image/png;base64,aGk=").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"hi");

        let (mime, bytes) = decode_image_payload("aGk=").unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(bytes, b"hi");
    }

    fn png_payload(w: u32, h: u32) -> String {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::new(w, h));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();
        data_url("image/png", &png)
    }

    #[test]
    fn dimensions_come_from_the_image_not_the_payload_size() {
        assert_eq!(payload_dimensions(&png_payload(37, 12)).unwrap(), (37, 12));
        assert!(payload_dimensions("aGk=").is_err());
    }

    #[test]
    fn png_is_saved_as_jpeg() {
        let tmp = tempfile::tempdir().unwrap();
        let payload = png_payload(120, 80);
        let pending = [
            PendingImage {
                index: 0,
                id: "img-0.jpeg".into(),
                page_number: 2,
                image_type: "product".into(),
                width: None,
                height: None,
                payload: &payload,
            },
            PendingImage {
                index: 1,
                id: "img-1.jpeg".into(),
                page_number: 2,
                image_type: "product".into(),
                width: None,
                height: None,
                payload: "@@not base64@@",
            },
        ];

        let out = save_images(&pending, tmp.path(), "dam", "cat").unwrap();
        assert_eq!(out.images.len(), 1);
        assert_eq!(out.failed.len(), 1);
        assert!(out.failed[0].contains("img-1.jpeg"));

        let img = &out.images[0];
        assert_eq!(img.local_path.as_deref(), Some("dam/cat/page_02_image_01.jpg"));
        assert!(img.base64_data.as_deref().unwrap().starts_with("data:image/jpeg;base64,"));

        let bytes = std::fs::read(tmp.path().join("dam/cat/page_02_image_01.jpg")).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(img.size_estimate, bytes.len() as u64);
        assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (120, 80));
        assert!(!tmp.path().join("dam/cat/page_02_image_02.jpg").exists());
    }

    #[test]
    fn filenames_are_one_based_and_padded() {
        assert_eq!(image_filename(3, 0), "page_03_image_01.jpg");
        assert_eq!(image_filename(12, 10), "page_12_image_11.jpg");
    }

    #[test]
    fn id_keywords_only_apply_after_first_page() {
        assert_eq!(classify_image_id("diagram-1", 1), "product");
        assert_eq!(classify_image_id("Wiring_Diagram", 2), "diagram");
        assert_eq!(classify_image_id("spec-sheet", 3), "table");
        assert_eq!(classify_image_id("img-4.jpeg", 3), "product");
    }
}
