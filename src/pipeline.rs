use crate::{
    config::Config,
    dam::{self, PendingImage},
    engine::Engine,
    frontend,
    heuristics::{self, ColumnSplit},
    layout::{self, LayoutSummary},
    ocr::{self, OcrResponse},
    postprocess,
    product::{
        ExtractionMetadata, ExtractionResult, ExtractionType, ProductImage, ProductInfo,
        ProductTable,
    },
    report::{InputInfo, JobReport},
    structure::{self, PromptKind, StructuredProduct},
    util::{ensure_dir, file_stem, hash_file, now_rfc3339, write_json},
};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct Pipeline<E: Engine> {
    cfg: Config,
    engine: E,
}

#[derive(Debug)]
pub struct JobOutput {
    pub raw_text: String,
    pub report: JobReport,
    /// Written documents, relative to the job directory.
    pub documents: Vec<String>,
}

/// What a mode produced, before anything is written.
struct ModeOutcome {
    documents: Vec<(String, serde_json::Value)>,
    layout: Option<LayoutSummary>,
    images: usize,
    tables: usize,
    specifications: usize,
    features: usize,
    product_name: String,
    category: String,
}

struct Job<'a> {
    input: &'a Path,
    job_dir: &'a Path,
    stem: String,
    started: Instant,
    warnings: Vec<String>,
}

fn doc<T: Serialize>(name: impl Into<String>, value: &T) -> Result<(String, serde_json::Value)> {
    Ok((name.into(), serde_json::to_value(value)?))
}

impl<E: Engine> Pipeline<E> {
    pub fn new(cfg: &Config, engine: E) -> Self {
        Self {
            cfg: cfg.clone(),
            engine,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Runs one extraction. `ocr_override` replaces the OCR call with a saved response.
    pub fn run_job(
        &self,
        input: &Path,
        job_dir: &Path,
        mode: ExtractionType,
        ocr_override: Option<OcrResponse>,
    ) -> Result<JobOutput> {
        let started_at = now_rfc3339();
        let mut job = Job {
            input,
            job_dir,
            stem: file_stem(input),
            started: Instant::now(),
            warnings: Vec::new(),
        };
        ensure_dir(job_dir)?;

        let file_bytes = std::fs::metadata(input)
            .with_context(|| format!("stat input: {}", input.display()))?
            .len();
        let file_hash = hash_file(&self.cfg, input)
            .with_context(|| format!("hashing input: {}", input.display()))?;

        info!("extraction mode={} input={}", mode.as_str(), input.display());

        let ocr = match ocr_override {
            Some(resp) => {
                info!("using supplied OCR response ({} pages)", resp.pages.len());
                resp
            }
            None => ocr::cached_ocr(&self.cfg, &self.engine, input, mode.wants_images())?,
        };
        self.check_deadline(&job)?;

        if ocr.pages.len() > self.cfg.limits.max_input_pages as usize {
            return Err(anyhow!("input exceeds max_input_pages: {}", ocr.pages.len()));
        }
        if ocr.pages.is_empty() {
            warn!("OCR returned no pages for {}", input.display());
            job.warnings.push("OCR returned no pages".into());
        }
        if self.cfg.output.write_ocr_json {
            ocr::save_response(&job_dir.join("ocr.json"), &ocr)?;
        }

        let raw_text = postprocess::clean_markdown(&self.cfg, &ocr.combined_markdown());
        info!(
            "extracted {} characters of text from {} pages",
            raw_text.chars().count(),
            ocr.pages.len()
        );

        let outcome = match mode {
            ExtractionType::Combined => self.run_combined(&mut job, &ocr, &raw_text)?,
            ExtractionType::Structured => self.run_structured(&mut job, &ocr, &raw_text)?,
            ExtractionType::TextOnly => self.run_text_only(&mut job, &ocr, &raw_text)?,
            ExtractionType::Heuristic => self.run_heuristic(&mut job, &ocr, &raw_text)?,
        };

        let mut documents = Vec::new();
        for (name, value) in &outcome.documents {
            write_json(&job_dir.join(name), value)?;
            info!("saved {}", job_dir.join(name).display());
            documents.push(name.clone());
        }

        if self.cfg.output.write_raw_text {
            let name = format!("{}_raw_text.txt", job.stem);
            std::fs::write(job_dir.join(&name), &raw_text)
                .with_context(|| format!("writing {name}"))?;
            documents.push(name);
        }

        let report = JobReport {
            mode,
            input: InputInfo {
                path: input.display().to_string(),
                file_bytes,
                file_hash,
            },
            started: started_at,
            finished: now_rfc3339(),
            pages: ocr.pages.len(),
            text_length: raw_text.chars().count(),
            layout: outcome.layout,
            images: outcome.images,
            tables: outcome.tables,
            specifications: outcome.specifications,
            features: outcome.features,
            product_name: outcome.product_name,
            category: outcome.category,
            outputs: documents.clone(),
            warnings: job.warnings,
        };

        if self.cfg.output.write_report_json {
            write_json(&job_dir.join(&self.cfg.output.report_filename), &report)?;
        }
        log_summary(&report);

        Ok(JobOutput {
            raw_text,
            report,
            documents,
        })
    }

    fn check_deadline(&self, job: &Job<'_>) -> Result<()> {
        let limit = self.cfg.limits.job_timeout_seconds;
        if limit > 0 && job.started.elapsed().as_secs() > limit {
            return Err(anyhow!("job timeout exceeded: {}s", limit));
        }
        Ok(())
    }

    fn images_folder(&self, stem: &str) -> String {
        dam::dam_url(&self.cfg.paths.dam_dir, stem, "")
            .trim_end_matches('/')
            .to_string()
    }

    fn run_combined(
        &self,
        job: &mut Job<'_>,
        ocr: &OcrResponse,
        raw_text: &str,
    ) -> Result<ModeOutcome> {
        let placed = layout::placed_images(ocr);
        if placed.len() < ocr.total_images() {
            job.warnings.push(format!(
                "{} OCR images had no bounding box or readable payload",
                ocr.total_images() - placed.len()
            ));
        }
        let arrangement = layout::arrange(placed, &self.cfg);
        info!(
            "found {} usable images ({} feature, {} product, {} too small)",
            arrangement.summary.total,
            arrangement.summary.feature,
            arrangement.summary.product,
            arrangement.summary.skipped_small
        );

        let saved = dam::save_arranged(
            &arrangement.images,
            job.job_dir,
            &self.cfg.paths.dam_dir,
            &job.stem,
        )?;
        job.warnings.extend(saved.failed);
        let images = saved.images;
        self.check_deadline(job)?;

        let detected = heuristics::detect_category(raw_text, &self.cfg);
        debug!("detected category: {detected}");
        let structured = structure::structure_text(
            &self.engine,
            &self.cfg,
            PromptKind::Combined,
            raw_text,
            Some(&detected),
        );
        if structured.product_name.is_empty() {
            job.warnings.push("LLM returned no product name".into());
        }

        let document = frontend::combined_document(
            &self.cfg,
            &structured,
            &images,
            &self.images_folder(&job.stem),
        );

        Ok(ModeOutcome {
            documents: vec![doc(format!("{}_improved_combined.json", job.stem), &document)?],
            layout: Some(arrangement.summary),
            images: images.len(),
            tables: 0,
            specifications: structured.specifications.len(),
            features: structured.features.len(),
            product_name: structured.product_name,
            category: structured.category,
        })
    }

    /// OCR images in page order, optionally dropping ids in `skip_ids`.
    /// Images that fail to decode are left out and noted in the job warnings.
    fn save_in_discovery_order(
        &self,
        job: &mut Job<'_>,
        ocr: &OcrResponse,
        skip_ids: &[String],
    ) -> Result<Vec<ProductImage>> {
        let mut pending = Vec::new();
        for (page_idx, page) in ocr.pages.iter().enumerate() {
            let page_number = page_idx as u32 + 1;
            info!("found {} images on page {}", page.images.len(), page_number);
            for img in &page.images {
                if skip_ids.contains(&img.id) {
                    debug!("skipping image {} by id", img.id);
                    continue;
                }
                let Some(payload) = img.payload() else {
                    warn!("no base64 data found for image {} on page {}", img.id, page_number);
                    job.warnings
                        .push(format!("image {} on page {} has no payload", img.id, page_number));
                    continue;
                };
                let bbox = img.bbox();
                pending.push(PendingImage {
                    index: pending.len(),
                    id: img.id.clone(),
                    page_number,
                    image_type: dam::classify_image_id(&img.id, page_number).to_string(),
                    width: bbox.map(|b| b.width()),
                    height: bbox.map(|b| b.height()),
                    payload,
                });
            }
        }
        let saved = dam::save_images(&pending, job.job_dir, &self.cfg.paths.dam_dir, &job.stem)?;
        job.warnings.extend(saved.failed);
        Ok(saved.images)
    }

    /// Tab-separated tables, page by page.
    fn page_tables(&self, ocr: &OcrResponse) -> Vec<ProductTable> {
        let tables: Vec<ProductTable> = ocr
            .pages
            .iter()
            .flat_map(|p| {
                heuristics::extract_tables(
                    &postprocess::clean_markdown(&self.cfg, &p.markdown),
                    ColumnSplit::Tabs,
                )
            })
            .collect();
        info!("extracted {} tables", tables.len());
        tables
    }

    #[allow(clippy::too_many_arguments)]
    fn extraction_result(
        &self,
        job: &Job<'_>,
        mode: ExtractionType,
        ocr: &OcrResponse,
        raw_text: &str,
        structured: StructuredProduct,
        tables: Vec<ProductTable>,
        images: Vec<ProductImage>,
    ) -> ExtractionResult {
        let mut specifications = structured.specifications;
        specifications.extend(heuristics::specs_from_tables(&tables));

        let images_folder = (!images.is_empty()).then(|| self.images_folder(&job.stem));
        let total_tables = tables.len();
        let total_images = images.len();

        let product = ProductInfo {
            product_name: structured.product_name,
            product_description: structured.product_description,
            model_number: structured.model_number,
            brand: structured.brand,
            category: structured.category,
            specifications,
            features: structured.features,
            tables,
            thumbnail_image: images.first().and_then(|i| i.local_path.clone()),
            images,
            rating: self.cfg.frontend.rating.clone(),
            review_count: self.cfg.frontend.review_count.clone(),
            raw_text: raw_text.to_string(),
        };

        ExtractionResult {
            products: vec![product],
            metadata: ExtractionMetadata {
                source_pdf: job.input.display().to_string(),
                extraction_timestamp: now_rfc3339(),
                extraction_type: mode,
                total_pages: ocr.pages.len(),
                total_images,
                total_text_length: raw_text.chars().count(),
                total_tables,
                images_folder,
            },
        }
    }

    fn outcome_from_result(
        result: &ExtractionResult,
        documents: Vec<(String, serde_json::Value)>,
    ) -> ModeOutcome {
        let p = result.products.first();
        ModeOutcome {
            documents,
            layout: None,
            images: result.metadata.total_images,
            tables: result.metadata.total_tables,
            specifications: p.map(|p| p.specifications.len()).unwrap_or(0),
            features: p.map(|p| p.features.len()).unwrap_or(0),
            product_name: p.map(|p| p.product_name.clone()).unwrap_or_default(),
            category: p.map(|p| p.category.clone()).unwrap_or_default(),
        }
    }

    fn run_structured(
        &self,
        job: &mut Job<'_>,
        ocr: &OcrResponse,
        raw_text: &str,
    ) -> Result<ModeOutcome> {
        let structured =
            structure::structure_text(&self.engine, &self.cfg, PromptKind::Catalog, raw_text, None);
        self.check_deadline(job)?;

        let images = self.save_in_discovery_order(job, ocr, &[])?;
        info!("total images processed: {}", images.len());
        let tables = self.page_tables(ocr);

        let mut result = self.extraction_result(
            job,
            ExtractionType::Structured,
            ocr,
            raw_text,
            structured,
            tables,
            images,
        );

        let frontend_doc = frontend::to_frontend(&result, self.cfg.output.frontend_use_paths);
        if !self.cfg.output.include_base64 {
            frontend::strip_result_base64(&mut result);
        }

        let documents = vec![
            doc("structured_data.json", &result)?,
            doc("frontend_data.json", &frontend_doc)?,
        ];
        Ok(Self::outcome_from_result(&result, documents))
    }

    fn run_text_only(
        &self,
        job: &mut Job<'_>,
        ocr: &OcrResponse,
        raw_text: &str,
    ) -> Result<ModeOutcome> {
        let structured =
            structure::structure_text(&self.engine, &self.cfg, PromptKind::Catalog, raw_text, None);
        self.check_deadline(job)?;
        let tables = self.page_tables(ocr);

        let result = self.extraction_result(
            job,
            ExtractionType::TextOnly,
            ocr,
            raw_text,
            structured,
            tables,
            Vec::new(),
        );
        let text_doc = frontend::text_only_document(&result);

        let documents = vec![
            doc("structured_data.json", &result)?,
            doc(format!("{}_text_only.json", job.stem), &text_doc)?,
        ];
        Ok(Self::outcome_from_result(&result, documents))
    }

    fn run_heuristic(
        &self,
        job: &mut Job<'_>,
        ocr: &OcrResponse,
        raw_text: &str,
    ) -> Result<ModeOutcome> {
        let images = self.save_in_discovery_order(job, ocr, &self.cfg.frontend.skip_image_ids)?;
        let info = heuristics::extract_product_info_from_text(raw_text, &self.cfg);
        let tables = heuristics::extract_tables_from_text(raw_text);
        debug!(?info, "heuristic product record");

        let mut organized = frontend::organized_document(frontend::OrganizedInput {
            source_pdf: &job.input.display().to_string(),
            timestamp: now_rfc3339(),
            total_pages: ocr.pages.len(),
            raw_text,
            info: &info,
            tables: &tables,
            images: &images,
        });

        if self.cfg.llm.refine_heuristic {
            self.check_deadline(job)?;
            for product in &mut organized.products {
                match structure::refine_metadata(&self.engine, &self.cfg, &product.raw_text) {
                    Some((name, desc)) => {
                        if !name.is_empty() {
                            product.product_name = name;
                        }
                        if !desc.is_empty() {
                            product.product_description = desc;
                        }
                    }
                    None => job
                        .warnings
                        .push("metadata refinement returned nothing".into()),
                }
            }
        }

        let catalog = frontend::catalog_document(&self.cfg, &organized);
        if !self.cfg.output.include_base64 {
            frontend::strip_organized_base64(&mut organized);
        }

        let product = organized.products.first();
        Ok(ModeOutcome {
            documents: vec![
                doc(format!("{}_organized_data.json", job.stem), &organized)?,
                doc("data.json", &catalog)?,
            ],
            layout: None,
            images: images.len(),
            tables: tables.len(),
            specifications: info.specifications.len(),
            features: info.features.len(),
            product_name: product.map(|p| p.product_name.clone()).unwrap_or_default(),
            category: self.cfg.frontend.catalog_category.clone(),
        })
    }
}

fn log_summary(report: &JobReport) {
    info!("{}", "=".repeat(50));
    info!("EXTRACTION SUMMARY ({})", report.mode.as_str());
    info!("{}", "=".repeat(50));
    info!("product: {}", report.product_name);
    info!("category: {}", report.category);
    info!("pages: {}", report.pages);
    info!("features: {}", report.features);
    info!("specifications: {}", report.specifications);
    info!("tables: {}", report.tables);
    match &report.layout {
        Some(l) => info!(
            "images: {} (features: {}, product: {})",
            report.images, l.feature, l.product
        ),
        None => info!("images: {}", report.images),
    }
    info!("text length: {} characters", report.text_length);
    for w in &report.warnings {
        warn!("{w}");
    }
    info!("{}", "=".repeat(50));
}

/// OCR text only, cleaned.
pub fn extract_raw_text(engine: &dyn Engine, cfg: &Config, input: &Path) -> Result<String> {
    let resp = ocr::cached_ocr(cfg, engine, input, false)?;
    let text = postprocess::clean_markdown(cfg, &resp.combined_markdown());
    info!(
        "extracted {} characters of text from {} pages",
        text.chars().count(),
        resp.pages.len()
    );
    Ok(text)
}

/// Source name for a saved text file: the stem without `_text`/`_raw` suffixes.
pub fn source_name_for_text(path: &Path) -> String {
    file_stem(path).replace("_text", "").replace("_raw", "")
}

/// Default output path for converting `text_path`: `.txt` becomes `_frontend.json`.
pub fn default_convert_output(text_path: &Path) -> PathBuf {
    let stem = file_stem(text_path);
    text_path.with_file_name(format!("{stem}_frontend.json"))
}

/// Converts saved OCR text into the text-only frontend document.
pub fn convert_text(
    engine: &dyn Engine,
    cfg: &Config,
    text_path: &Path,
) -> Result<frontend::TextOnlyDocument> {
    let raw_text = std::fs::read_to_string(text_path)
        .with_context(|| format!("reading text file: {}", text_path.display()))?;
    let source = source_name_for_text(text_path);
    let structured =
        structure::structure_text(engine, cfg, PromptKind::Frontend, &raw_text, None);
    Ok(frontend::text_only_from_structured(
        cfg,
        &structured,
        &raw_text,
        &source,
    ))
}
