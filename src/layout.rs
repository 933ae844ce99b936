//! Image layout classification.
//!
//! Catalog pages put the hero shot of a product against the top or left page
//! edge, and the smaller feature call-outs elsewhere (typically a grid in the
//! lower-right area). Images are split into those two buckets by where their
//! bounding box starts, then the feature bucket is read column by column.

use crate::{config::Config, dam, ocr::OcrResponse};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// Axis-aligned box in page coordinates, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Product,
    Feature,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Product => "product",
            ImageKind::Feature => "feature",
        }
    }
}

/// An image as found on a page, before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedImage {
    /// Position in discovery order across the whole document.
    pub source_index: usize,
    pub page_number: u32,
    pub id: String,
    pub bbox: BBox,
    pub page_width: f64,
    pub page_height: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    #[serde(skip)]
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrangedImage {
    pub index: usize,
    pub kind: ImageKind,
    pub image: PlacedImage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSummary {
    pub total: usize,
    pub feature: usize,
    pub product: usize,
    pub skipped_small: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arrangement {
    pub images: Vec<ArrangedImage>,
    pub summary: LayoutSummary,
}

/// Bucket for an image starting at `bbox`, or `None` when it should be dropped.
///
/// Coordinates are truncated toward zero before comparison.
pub fn classify(bbox: &BBox, page_width: f64, page_height: f64, cfg: &Config) -> Option<ImageKind> {
    let x0 = bbox.x0.trunc();
    let y0 = bbox.y0.trunc();

    if x0 > page_width / 2.0 && y0 > page_height / 2.0 {
        return Some(ImageKind::Feature);
    }

    let margin = cfg.images.edge_margin;
    if x0 < margin || y0 < margin {
        return Some(ImageKind::Product);
    }

    if cfg.images.drop_unanchored {
        None
    } else {
        Some(ImageKind::Feature)
    }
}

pub fn is_too_small(width: f64, height: f64, cfg: &Config) -> bool {
    width < cfg.images.min_pixel_size || height < cfg.images.min_pixel_size
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Orders images left-to-right, then top-to-bottom within a column.
///
/// Boxes whose left edges lie within `tolerance` of a column's first box are
/// in that column. Columns are sorted by their left edge, images inside a
/// column by their top edge.
pub fn column_order<T, F>(items: &mut Vec<T>, tolerance: f64, bbox_of: F)
where
    F: Fn(&T) -> BBox,
{
    if items.len() < 2 {
        return;
    }

    let mut keyed: Vec<(usize, T)> = Vec::with_capacity(items.len());
    let mut by_x: Vec<T> = std::mem::take(items);
    by_x.sort_by(|a, b| cmp_f64(bbox_of(a).x0, bbox_of(b).x0));

    let mut column = 0usize;
    let mut anchor: Option<f64> = None;
    for item in by_x {
        let x0 = bbox_of(&item).x0;
        match anchor {
            Some(a) if (x0 - a).abs() <= tolerance => {}
            Some(_) => {
                column += 1;
                anchor = Some(x0);
            }
            None => anchor = Some(x0),
        }
        keyed.push((column, item));
    }

    keyed.sort_by(|(ca, a), (cb, b)| {
        let (ba, bb) = (bbox_of(a), bbox_of(b));
        ca.cmp(cb)
            .then_with(|| cmp_f64(ba.y0, bb.y0))
            .then_with(|| cmp_f64(ba.x0, bb.x0))
    });

    items.extend(keyed.into_iter().map(|(_, item)| item));
}

/// Classifies and orders `images`: the sorted feature bucket first, then the
/// product bucket in discovery order, renumbered from zero.
pub fn arrange(images: Vec<PlacedImage>, cfg: &Config) -> Arrangement {
    let mut summary = LayoutSummary::default();
    let mut features = Vec::new();
    let mut products = Vec::new();

    for img in images {
        if is_too_small(img.pixel_width, img.pixel_height, cfg) {
            info!(
                "skipping image {} on page {} due to small size: {}x{}",
                img.id, img.page_number, img.pixel_width, img.pixel_height
            );
            summary.skipped_small += 1;
            continue;
        }

        match classify(&img.bbox, img.page_width, img.page_height, cfg) {
            Some(ImageKind::Feature) => features.push(img),
            Some(ImageKind::Product) => products.push(img),
            None => {
                debug!("dropping unanchored image {} on page {}", img.id, img.page_number);
                summary.dropped += 1;
            }
        }
    }

    column_order(&mut features, cfg.images.column_tolerance, |p| p.bbox);

    summary.feature = features.len();
    summary.product = products.len();
    summary.total = features.len() + products.len();

    let arranged = features
        .into_iter()
        .map(|img| (ImageKind::Feature, img))
        .chain(products.into_iter().map(|img| (ImageKind::Product, img)))
        .enumerate()
        .map(|(index, (kind, image))| ArrangedImage { index, kind, image })
        .collect();

    Arrangement {
        images: arranged,
        summary,
    }
}

/// Collects every image in `resp` that has a box and a readable payload.
/// Pixel sizes come from the image itself, not the box.
///
/// A page without dimensions is sized by the furthest image extent on it.
pub fn placed_images(resp: &OcrResponse) -> Vec<PlacedImage> {
    let mut out = Vec::new();
    let mut source_index = 0usize;

    for (page_idx, page) in resp.pages.iter().enumerate() {
        let (page_width, page_height) = match page.dimensions {
            Some(d) => (d.width, d.height),
            None => page
                .images
                .iter()
                .filter_map(|i| i.bbox())
                .fold((0.0f64, 0.0f64), |(w, h), b| (w.max(b.x1), h.max(b.y1))),
        };
        info!(
            "page {}: width = {} px, height = {} px",
            page_idx + 1,
            page_width,
            page_height
        );

        for img in &page.images {
            let Some(bbox) = img.bbox() else {
                warn!("image {} on page {} has no bounding box", img.id, page_idx + 1);
                continue;
            };
            let Some(data) = img.payload() else {
                warn!("no base64 data found for image {} on page {}", img.id, page_idx + 1);
                continue;
            };
            let (pixel_width, pixel_height) = match dam::payload_dimensions(data) {
                Ok(dims) => dims,
                Err(e) => {
                    warn!("skipping image {} on page {}: {e:#}", img.id, page_idx + 1);
                    continue;
                }
            };
            out.push(PlacedImage {
                source_index,
                page_number: page_idx as u32 + 1,
                id: img.id.clone(),
                bbox,
                page_width,
                page_height,
                pixel_width: f64::from(pixel_width),
                pixel_height: f64::from(pixel_height),
                data: data.to_string(),
            });
            source_index += 1;
        }
    }

    out
}
