//! LLM structuring: prompts, reply parsing and normalisation.
//!
//! LLM replies are free text that usually, but not always, contain a JSON
//! object, sometimes fenced, sometimes truncated, occasionally with Python
//! style quotes. Every failure here degrades to an empty record rather than
//! aborting the job.

use crate::{
    config::Config,
    engine::{ChatMessage, ChatRequest, Engine},
    postprocess::markdown_to_text,
    product::{ProductFeature, ProductSpecification},
};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Full catalog record with `{label, value, unit}` specifications.
    Catalog,
    /// Catalog record pinned to a detected category, no units.
    Combined,
    /// Frontend-ready record with rating defaults.
    Frontend,
    /// Product name and description only.
    Metadata,
}

pub fn build_prompt(kind: PromptKind, text: &str, detected_category: Option<&str>) -> String {
    match kind {
        PromptKind::Catalog => format!(
            r#"You are an expert system for extracting structured product information from scanned product catalogs.

Extract the following fields in JSON format from the provided text:
- product_name: The main product name/title
- product_description: A comprehensive description of the product
- model_number: Product model number or SKU
- brand: Brand name
- category: Product category
- specifications: List of {{label, value, unit}} objects for technical specifications
- features: List of {{name, description}} objects for product features

Rules:
1. Use only information present in the input text
2. If a field is not found, use empty string or empty array
3. For specifications, extract label-value pairs from tables or lists
4. For features, extract feature names and descriptions
5. Return valid JSON only

Input text:
"""
{text}
"""

Output JSON:"#
        ),
        PromptKind::Combined => {
            let category = detected_category.unwrap_or("");
            format!(
                r#"You are an expert at structuring product information from raw text into a clean JSON format.

Convert the following raw text into a structured JSON format with these fields:
- product_name: The main product name/title (usually the model number)
- product_description: A comprehensive description of the product
- category: Product category (use: {category})
- brand: Brand name (extract from text)
- model_number: Product model/SKU (usually same as product_name)
- features: Array of {{name, description}} objects for product features
- specifications: Array of {{label, value}} objects for technical specifications (NO unit field)

Rules:
1. Extract only information that's clearly present in the text
2. Use the detected category: {category}
3. For specifications, look for label-value pairs in tables or lists
4. For features, extract feature names and descriptions
5. Brand is usually mentioned in the text (e.g., Maruyama, Honda, etc.)
6. DO NOT include 'unit' field in specifications - only 'label' and 'value'
7. Return valid JSON only

Raw text:
"""
{text}
"""

Output JSON:"#
            )
        }
        PromptKind::Frontend => format!(
            r#"You are an expert at structuring product information from raw text into a clean JSON format for frontend applications.

Convert the following raw text into a structured JSON format with these fields:
- product_name: The main product name/title
- product_description: A comprehensive description
- category: Product category
- brand: Brand name
- model_number: Product model/SKU
- features: Array of {{name, description}} objects
- specifications: Array of {{label, value, unit}} objects
- rating: Default "4.5"
- reviewCount: Default "128"

Rules:
1. Extract only information that's clearly present in the text
2. Use empty strings for missing fields
3. For specifications, look for label-value pairs in tables or lists
4. For features, extract feature names and descriptions
5. Return valid JSON only

Raw text:
"""
{text}
"""

Output JSON:"#
        ),
        PromptKind::Metadata => format!(
            r#"You are an intelligent assistant. From the following product-related OCR text, extract the **product_name** and **product_description**.

- product_name: Use the actual title (4-10 words max, no model/brand codes)
- product_description: What it is, what it does, and who it's for in clean English.

Return JSON only like:
{{
  "product_name": "Electric Industrial Blower",
  "product_description": "A high-speed blower designed for industrial cooling and ventilation systems."
}}

Text:
{text}"#
        ),
    }
}

pub fn chat_request(cfg: &Config, kind: PromptKind, prompt: String) -> ChatRequest {
    let (model, temperature, max_tokens) = match kind {
        PromptKind::Metadata => (
            cfg.llm.metadata_model.clone(),
            cfg.llm.metadata_temperature,
            cfg.llm.metadata_max_tokens,
        ),
        _ => (
            cfg.llm.model.clone(),
            cfg.llm.temperature,
            cfg.llm.max_completion_tokens,
        ),
    };
    ChatRequest {
        model,
        messages: vec![ChatMessage::user(prompt)],
        temperature,
        max_completion_tokens: max_tokens,
    }
}

/// The JSON-bearing part of an LLM reply: the body of a ```json fence, else
/// of the first plain fence, else the whole trimmed reply.
pub fn extract_json_block(content: &str) -> Result<&str> {
    let text = content.trim();
    if text.is_empty() {
        bail!("LLM returned empty response");
    }

    if let Some((_, rest)) = text.split_once("```json") {
        return Ok(rest.split("```").next().unwrap_or(rest));
    }
    if text.contains("```") {
        return Ok(text.split("```").nth(1).unwrap_or(""));
    }
    Ok(text)
}

/// Parses the object in an LLM reply, repairing the common failure shapes:
/// prose around the object, unbalanced closing braces and single quotes.
pub fn parse_lenient_object(content: &str) -> Result<Map<String, Value>> {
    let block = extract_json_block(content)?;

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(block.trim()) {
        return Ok(map);
    }

    let start = block
        .find('{')
        .ok_or_else(|| anyhow!("no JSON object found in model response"))?;
    let mut candidate = block[start..].to_string();
    match candidate.rfind('}') {
        Some(end) if balance(&candidate[..=end]) == 0 => candidate.truncate(end + 1),
        _ => {
            let missing = balance(&candidate).max(0) as usize;
            candidate.push_str(&"}".repeat(missing));
        }
    }

    if candidate.starts_with("{'") {
        candidate = candidate.replace('\'', "\"");
    }

    match serde_json::from_str::<Value>(&candidate)
        .with_context(|| "parsing repaired JSON object")?
    {
        Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object, got {}", kind_name(&other)),
    }
}

fn balance(s: &str) -> i64 {
    s.chars().fold(0i64, |acc, c| match c {
        '{' => acc + 1,
        '}' => acc - 1,
        _ => acc,
    })
}

fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The product fields an LLM reply is normalised into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredProduct {
    pub product_name: String,
    pub product_description: String,
    pub model_number: String,
    pub brand: String,
    pub category: String,
    pub specifications: Vec<ProductSpecification>,
    pub features: Vec<ProductFeature>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub review_count: Option<String>,
}

impl StructuredProduct {
    pub fn empty(category: Option<&str>) -> Self {
        Self {
            category: category.unwrap_or_default().to_string(),
            ..Default::default()
        }
    }

    pub fn from_json(map: &Map<String, Value>, strip_units: bool) -> Self {
        let specifications = map
            .get("specifications")
            .map(|v| specs_from_value(v, strip_units))
            .unwrap_or_default();
        let features = map
            .get("features")
            .map(features_from_value)
            .unwrap_or_default();

        Self {
            product_name: text_field(map, "product_name"),
            product_description: text_field(map, "product_description"),
            model_number: text_field(map, "model_number"),
            brand: text_field(map, "brand"),
            category: text_field(map, "category"),
            specifications,
            features,
            rating: map.get("rating").map(scalar_text).filter(|s| !s.is_empty()),
            review_count: map
                .get("reviewCount")
                .map(scalar_text)
                .filter(|s| !s.is_empty()),
        }
    }
}

/// Strings stay strings, numbers and bools are rendered, arrays join with ", ".
fn scalar_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> String {
    map.get(key).map(scalar_text).unwrap_or_default()
}

fn specs_from_value(v: &Value, strip_units: bool) -> Vec<ProductSpecification> {
    let Value::Array(items) = v else {
        // Some models answer with a flat `{label: value}` object instead.
        return match v {
            Value::Object(m) => m
                .iter()
                .map(|(k, v)| ProductSpecification::new(k.clone(), scalar_text(v)))
                .collect(),
            _ => Vec::new(),
        };
    };

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let label = text_field(obj, "label");
            if label.is_empty() {
                return None;
            }
            let unit = if strip_units {
                None
            } else {
                Some(text_field(obj, "unit")).filter(|u| !u.is_empty())
            };
            Some(ProductSpecification {
                label,
                value: text_field(obj, "value"),
                unit,
            })
        })
        .collect()
}

fn features_from_value(v: &Value) -> Vec<ProductFeature> {
    let Value::Array(items) = v else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(ProductFeature {
                name: s.trim().to_string(),
                description: None,
                category: None,
            }),
            Value::Object(obj) => {
                let name = text_field(obj, "name");
                if name.is_empty() {
                    return None;
                }
                Some(ProductFeature {
                    name,
                    description: Some(text_field(obj, "description")).filter(|d| !d.is_empty()),
                    category: Some(text_field(obj, "category")).filter(|c| !c.is_empty()),
                })
            }
            _ => None,
        })
        .collect()
}

fn ask(engine: &dyn Engine, cfg: &Config, kind: PromptKind, prompt: String) -> Result<Map<String, Value>> {
    if cfg.debug.log_llm_exchanges {
        debug!("prompt sent to LLM:\n{prompt}");
    }
    let req = chat_request(cfg, kind, prompt);
    let resp = engine.chat(&req)?;
    let content = resp.content.unwrap_or_default();
    if cfg.debug.log_llm_exchanges {
        debug!("LLM raw content: {content}");
    }
    parse_lenient_object(&content)
}

/// Structures `text` with the LLM. Never fails: on any error the empty
/// record is returned, carrying `detected_category` if one was given.
pub fn structure_text(
    engine: &dyn Engine,
    cfg: &Config,
    kind: PromptKind,
    text: &str,
    detected_category: Option<&str>,
) -> StructuredProduct {
    info!("structuring {} characters of text with the LLM", text.chars().count());
    let prompt = build_prompt(kind, text, detected_category);
    let strip_units = kind == PromptKind::Combined && cfg.llm.strip_units;

    match ask(engine, cfg, kind, prompt) {
        Ok(map) => {
            let mut product = StructuredProduct::from_json(&map, strip_units);
            if product.category.is_empty() {
                if let Some(cat) = detected_category {
                    product.category = cat.to_string();
                }
            }
            info!("structured text to JSON; category: {}", product.category);
            product
        }
        Err(err) => {
            error!("failed to structure text with the LLM: {err:#}");
            StructuredProduct::empty(detected_category)
        }
    }
}

/// A cleaner product name and description, if the LLM produced either.
/// Markdown markers are removed from `text` before it is sent.
pub fn refine_metadata(engine: &dyn Engine, cfg: &Config, text: &str) -> Option<(String, String)> {
    let prompt = build_prompt(PromptKind::Metadata, &markdown_to_text(text), None);
    match ask(engine, cfg, PromptKind::Metadata, prompt) {
        Ok(map) => {
            let name = text_field(&map, "product_name");
            let desc = text_field(&map, "product_description");
            if name.is_empty() && desc.is_empty() {
                None
            } else {
                Some((name, desc))
            }
        }
        Err(err) => {
            error!("metadata refinement failed: {err:#}");
            None
        }
    }
}
