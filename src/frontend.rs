//! Frontend-facing JSON documents.
//!
//! Field names here are a contract with the product-page UI, including the
//! mixed `snake_case`/`camelCase` spelling.

use crate::{
    config::Config,
    heuristics::{specs_from_pipe_cells, HeuristicProduct},
    product::{
        ExtractionResult, ExtractionType, ProductFeature, ProductImage, ProductSpecification,
        ProductTable,
    },
    structure::StructuredProduct,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureOut {
    pub name: String,
    pub description: String,
}

impl From<&ProductFeature> for FeatureOut {
    fn from(f: &ProductFeature) -> Self {
        Self {
            name: f.name.clone(),
            description: f.description.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecOut {
    pub label: String,
    pub value: String,
}

/// `"{value} {unit}"`, trimmed; just the value when there is no unit.
pub fn spec_display_value(spec: &ProductSpecification) -> String {
    format!("{} {}", spec.value, spec.unit.as_deref().unwrap_or(""))
        .trim()
        .to_string()
}

impl From<&ProductSpecification> for SpecOut {
    fn from(s: &ProductSpecification) -> Self {
        Self {
            label: s.label.clone(),
            value: spec_display_value(s),
        }
    }
}

fn features_out(features: &[ProductFeature]) -> Vec<FeatureOut> {
    features.iter().map(FeatureOut::from).collect()
}

fn specs_out(specs: &[ProductSpecification]) -> Vec<SpecOut> {
    specs.iter().map(SpecOut::from).collect()
}

pub fn strip_base64(images: &mut [ProductImage]) {
    for img in images {
        img.base64_data = None;
    }
}

pub fn strip_result_base64(result: &mut ExtractionResult) {
    for p in &mut result.products {
        strip_base64(&mut p.images);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendProduct {
    pub product_name: String,
    pub product_description: String,
    pub category: String,
    pub rating: String,
    #[serde(rename = "reviewCount")]
    pub review_count: String,
    #[serde(rename = "detailedDescription")]
    pub detailed_description: String,
    pub features: Vec<FeatureOut>,
    pub specifications: Vec<SpecOut>,
    #[serde(rename = "mainImage")]
    pub main_image: String,
    pub thumbnails: Vec<String>,
    pub images_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_details: Option<Vec<ProductImage>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendDocument {
    pub products: Vec<FrontendProduct>,
}

/// Frontend shape of a structured extraction. With `use_paths` images are
/// referenced by DAM path and listed (without payloads) in `image_details`;
/// otherwise they are inlined as data URLs.
pub fn to_frontend(result: &ExtractionResult, use_paths: bool) -> FrontendDocument {
    let products = result
        .products
        .iter()
        .map(|p| {
            let thumbnails: Vec<String> = if use_paths {
                p.images.iter().filter_map(|i| i.local_path.clone()).collect()
            } else {
                p.images.iter().filter_map(|i| i.base64_data.clone()).collect()
            };
            let image_details = use_paths.then(|| {
                let mut details = p.images.clone();
                strip_base64(&mut details);
                details
            });

            FrontendProduct {
                product_name: p.product_name.clone(),
                product_description: p.product_description.clone(),
                category: p.category.clone(),
                rating: p.rating.clone(),
                review_count: p.review_count.clone(),
                detailed_description: p.product_description.clone(),
                features: features_out(&p.features),
                specifications: specs_out(&p.specifications),
                main_image: thumbnails.first().cloned().unwrap_or_default(),
                thumbnails,
                images_folder: result.metadata.images_folder.clone(),
                image_details,
            }
        })
        .collect();
    FrontendDocument { products }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedProduct {
    pub product_name: String,
    pub product_description: String,
    pub category: String,
    pub rating: String,
    #[serde(rename = "reviewCount")]
    pub review_count: String,
    #[serde(rename = "detailedDescription")]
    pub detailed_description: String,
    pub features: Vec<FeatureOut>,
    pub specifications: Vec<SpecOut>,
    #[serde(rename = "mainImage")]
    pub main_image: String,
    #[serde(rename = "mainImageBase64")]
    pub main_image_base64: String,
    pub thumbnails: Vec<String>,
    #[serde(rename = "thumbnailsBase64")]
    pub thumbnails_base64: Vec<String>,
    pub images_folder: String,
    pub image_details: Vec<ProductImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedDocument {
    pub category: Vec<String>,
    pub products: Vec<CombinedProduct>,
}

/// Layout-sorted images plus the LLM record. `images_folder` is empty when
/// no image was kept.
pub fn combined_document(
    cfg: &Config,
    structured: &StructuredProduct,
    images: &[ProductImage],
    images_folder: &str,
) -> CombinedDocument {
    let thumbnails: Vec<String> = images.iter().filter_map(|i| i.local_path.clone()).collect();
    let thumbnails_base64: Vec<String> =
        images.iter().filter_map(|i| i.base64_data.clone()).collect();

    CombinedDocument {
        category: vec![structured.category.clone()],
        products: vec![CombinedProduct {
            product_name: structured.product_name.clone(),
            product_description: structured.product_description.clone(),
            category: structured.category.clone(),
            rating: cfg.frontend.rating.clone(),
            review_count: cfg.frontend.review_count.clone(),
            detailed_description: String::new(),
            features: features_out(&structured.features),
            specifications: specs_out(&structured.specifications),
            main_image: thumbnails.first().cloned().unwrap_or_default(),
            main_image_base64: thumbnails_base64.first().cloned().unwrap_or_default(),
            thumbnails,
            thumbnails_base64,
            images_folder: if images.is_empty() {
                String::new()
            } else {
                images_folder.to_string()
            },
            image_details: images.to_vec(),
        }],
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextOnlyProduct {
    pub product_name: String,
    pub product_description: String,
    pub category: String,
    pub brand: String,
    pub model_number: String,
    pub rating: String,
    #[serde(rename = "reviewCount")]
    pub review_count: String,
    #[serde(rename = "detailedDescription")]
    pub detailed_description: String,
    pub features: Vec<FeatureOut>,
    pub specifications: Vec<SpecOut>,
    #[serde(default)]
    pub tables: Vec<ProductTable>,
    #[serde(rename = "mainImage")]
    pub main_image: String,
    pub thumbnails: Vec<String>,
    pub raw_text: String,
    pub extraction_type: String,
    pub source_pdf: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextOnlyDocument {
    pub products: Vec<TextOnlyProduct>,
}

pub fn text_only_document(result: &ExtractionResult) -> TextOnlyDocument {
    let products = result
        .products
        .iter()
        .map(|p| TextOnlyProduct {
            product_name: p.product_name.clone(),
            product_description: p.product_description.clone(),
            category: p.category.clone(),
            brand: p.brand.clone(),
            model_number: p.model_number.clone(),
            rating: p.rating.clone(),
            review_count: p.review_count.clone(),
            detailed_description: p.product_description.clone(),
            features: features_out(&p.features),
            specifications: specs_out(&p.specifications),
            tables: p.tables.clone(),
            main_image: String::new(),
            thumbnails: Vec::new(),
            raw_text: p.raw_text.clone(),
            extraction_type: ExtractionType::TextOnly.as_str().to_string(),
            source_pdf: result.metadata.source_pdf.clone(),
        })
        .collect();
    TextOnlyDocument { products }
}

/// Text-only document straight from an LLM record, for converting saved text.
pub fn text_only_from_structured(
    cfg: &Config,
    structured: &StructuredProduct,
    raw_text: &str,
    source: &str,
) -> TextOnlyDocument {
    TextOnlyDocument {
        products: vec![TextOnlyProduct {
            product_name: structured.product_name.clone(),
            product_description: structured.product_description.clone(),
            category: structured.category.clone(),
            brand: structured.brand.clone(),
            model_number: structured.model_number.clone(),
            rating: structured
                .rating
                .clone()
                .unwrap_or_else(|| cfg.frontend.rating.clone()),
            review_count: structured
                .review_count
                .clone()
                .unwrap_or_else(|| cfg.frontend.review_count.clone()),
            detailed_description: structured.product_description.clone(),
            features: features_out(&structured.features),
            specifications: specs_out(&structured.specifications),
            tables: Vec::new(),
            main_image: String::new(),
            thumbnails: Vec::new(),
            raw_text: raw_text.to_string(),
            extraction_type: ExtractionType::TextOnly.as_str().to_string(),
            source_pdf: source.to_string(),
        }],
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizedProduct {
    pub product_name: String,
    pub product_description: String,
    pub model_number: String,
    pub brand: String,
    pub specifications: Vec<ProductSpecification>,
    pub features: Vec<ProductFeature>,
    pub tables: Vec<ProductTable>,
    pub product_images: Vec<String>,
    pub thumbnail_image: String,
    pub all_page_images: Vec<ProductImage>,
    pub raw_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizedMetadata {
    pub total_pages: usize,
    pub total_images: usize,
    pub total_text_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizedDocument {
    pub source_pdf: String,
    pub extraction_timestamp: String,
    pub products: Vec<OrganizedProduct>,
    pub all_extracted_images: Vec<ProductImage>,
    pub metadata: OrganizedMetadata,
}

pub struct OrganizedInput<'a> {
    pub source_pdf: &'a str,
    pub timestamp: String,
    pub total_pages: usize,
    pub raw_text: &'a str,
    pub info: &'a HeuristicProduct,
    pub tables: &'a [ProductTable],
    pub images: &'a [ProductImage],
}

pub fn organized_document(input: OrganizedInput<'_>) -> OrganizedDocument {
    let paths: Vec<String> = input
        .images
        .iter()
        .filter_map(|i| i.local_path.clone())
        .collect();

    let product = OrganizedProduct {
        product_name: input.info.product_name.clone(),
        product_description: input.info.product_description.clone(),
        model_number: input.info.model_number.clone(),
        brand: input.info.brand.clone(),
        specifications: input.info.specifications.clone(),
        features: input.info.features.clone(),
        tables: input.tables.to_vec(),
        thumbnail_image: paths.first().cloned().unwrap_or_default(),
        product_images: paths,
        all_page_images: input.images.to_vec(),
        raw_text: input.raw_text.to_string(),
    };

    OrganizedDocument {
        source_pdf: input.source_pdf.to_string(),
        extraction_timestamp: input.timestamp,
        products: vec![product],
        all_extracted_images: input.images.to_vec(),
        metadata: OrganizedMetadata {
            total_pages: input.total_pages,
            total_images: input.images.len(),
            total_text_length: input.raw_text.chars().count(),
        },
    }
}

pub fn strip_organized_base64(doc: &mut OrganizedDocument) {
    strip_base64(&mut doc.all_extracted_images);
    for p in &mut doc.products {
        strip_base64(&mut p.all_page_images);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub product_name: String,
    pub product_description: String,
    pub category: String,
    pub rating: String,
    #[serde(rename = "reviewCount")]
    pub review_count: String,
    #[serde(rename = "detailedDescription")]
    pub detailed_description: String,
    pub features: Vec<FeatureOut>,
    pub specifications: Vec<SpecOut>,
    #[serde(rename = "mainImage")]
    pub main_image: String,
    pub thumbnails: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub products: Vec<CatalogProduct>,
}

/// UI document derived from organized data. Must be built before payloads
/// are stripped from `doc`.
pub fn catalog_document(cfg: &Config, doc: &OrganizedDocument) -> CatalogDocument {
    let products = doc
        .products
        .iter()
        .map(|p| {
            let thumbnails: Vec<String> = p
                .all_page_images
                .iter()
                .filter(|i| !cfg.frontend.skip_thumbnail_ids.contains(&i.id))
                .filter_map(|i| i.base64_data.clone())
                .collect();
            let main_image = p
                .all_page_images
                .first()
                .and_then(|i| i.base64_data.clone())
                .unwrap_or_default();
            CatalogProduct {
                product_name: p.product_name.clone(),
                product_description: p.product_description.clone(),
                category: cfg.frontend.catalog_category.clone(),
                rating: cfg.frontend.rating.clone(),
                review_count: cfg.frontend.review_count.clone(),
                detailed_description: format!(
                    "This is a {} designed for professional use.",
                    p.product_description
                ),
                features: features_out(&p.features),
                specifications: specs_out(&specs_from_pipe_cells(&p.tables)),
                main_image,
                thumbnails,
            }
        })
        .collect();
    CatalogDocument { products }
}
