use crate::{
    config::Config,
    engine::{process::ProcessEngine, Engine},
    heuristics, layout, ocr,
    pipeline::{self, Pipeline},
    product::ExtractionType,
    util::{ensure_dir, file_stem, preview, sha256_hex, write_json},
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "catalog-extract")]
#[command(about = "Product catalog PDF extractor (OCR + layout + LLM structuring)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./catalog-extract.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the OCR and LLM commands respond.
    Doctor {},
    /// OCR a PDF and save its raw text.
    Text {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Parse saved text with the regex heuristics. No engine is used.
    Parse {
        #[arg(long)]
        input: PathBuf,
    },
    /// Show how the images of a saved OCR response would be arranged.
    Layout {
        #[arg(long)]
        ocr_json: PathBuf,
    },
    Run {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = ExtractionType::Combined)]
        mode: ExtractionType,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Use a saved OCR response instead of calling the OCR command.
        #[arg(long)]
        ocr_json: Option<PathBuf>,
    },
    /// Convert saved text into the frontend JSON shape.
    Convert {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(p) => Config::load(&p)?,
        None => Config::default(),
    };

    let init_default_logging = || {
        let log_path = resolve_log_path(&cfg, None);
        init_logging(&args, &cfg, log_path.as_deref())
    };

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_default_logging()?;
            doctor(&cfg)
        }
        Command::Text { input, out } => {
            let _guard = init_default_logging()?;
            text(&cfg, input, out.as_deref())
        }
        // Engine-free inspection commands leave no files behind.
        Command::Parse { input } => {
            let _guard = init_logging(&args, &cfg, None)?;
            parse(&cfg, input)
        }
        Command::Layout { ocr_json } => {
            let _guard = init_logging(&args, &cfg, None)?;
            layout_plan(&cfg, ocr_json)
        }
        Command::Convert { input, out } => {
            let _guard = init_default_logging()?;
            convert(&cfg, input, out.as_deref())
        }
        Command::Run {
            input,
            mode,
            out_dir,
            ocr_json,
        } => run(
            &args,
            &cfg,
            input,
            *mode,
            out_dir.as_deref(),
            ocr_json.as_deref(),
        ),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("catalog-extract.toml");
    default.exists().then_some(default)
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr.
    let console_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine = ProcessEngine::new(cfg)?;
    let diag = engine.doctor()?;
    print_json(&diag)
}

fn text(cfg: &Config, input: &Path, out: Option<&Path>) -> Result<()> {
    validate_input(cfg, input, Some("pdf"))?;
    let engine = ProcessEngine::new(cfg)?;
    let raw = pipeline::extract_raw_text(&engine, cfg, input)?;

    let out_path = out.map(PathBuf::from).unwrap_or_else(|| {
        PathBuf::from(&cfg.paths.out_dir).join(format!("{}_text.txt", file_stem(input)))
    });
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    std::fs::write(&out_path, &raw).with_context(|| format!("writing {}", out_path.display()))?;
    info!("raw text saved to {}", out_path.display());

    println!("--- first 500 characters ---");
    println!("{}", preview(&raw, 500));
    Ok(())
}

fn parse(cfg: &Config, input: &Path) -> Result<()> {
    validate_input(cfg, input, None)?;
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("reading text file: {}", input.display()))?;
    let text = crate::postprocess::clean_markdown(cfg, &raw);

    let product = heuristics::extract_product_info_from_text(&text, cfg);
    let tables = heuristics::extract_tables_from_text(&text);
    print_json(&serde_json::json!({
        "input": input,
        "category": heuristics::detect_category(&text, cfg),
        "product": product,
        "tables": tables,
    }))
}

fn layout_plan(cfg: &Config, ocr_json: &Path) -> Result<()> {
    let resp = ocr::load_response(ocr_json)?;
    let arrangement = layout::arrange(layout::placed_images(&resp), cfg);
    print_json(&arrangement)
}

fn convert(cfg: &Config, input: &Path, out: Option<&Path>) -> Result<()> {
    validate_input(cfg, input, None)?;
    let engine = ProcessEngine::new(cfg)?;
    let document = pipeline::convert_text(&engine, cfg, input)?;

    let out_path = out
        .map(PathBuf::from)
        .unwrap_or_else(|| pipeline::default_convert_output(input));
    write_json(&out_path, &document)?;
    info!("frontend data saved to {}", out_path.display());

    if let Some(p) = document.products.first() {
        println!("product: {}", p.product_name);
        println!("category: {}", p.category);
        println!("features: {}", p.features.len());
        println!("specifications: {}", p.specifications.len());
    }
    println!("output: {}", out_path.display());
    Ok(())
}

/// Job id: config hash, input hash and mode, so each mode gets its own directory.
pub fn job_id(cfg: &Config, input_hash: &str, mode: ExtractionType) -> String {
    let cfg_hash = sha256_hex(cfg.normalized_for_hash().as_bytes());
    sha256_hex(format!("{}:{}:{}", cfg_hash, input_hash, mode.as_str()).as_bytes())
}

fn run(
    args: &Args,
    cfg: &Config,
    input: &Path,
    mode: ExtractionType,
    out_override: Option<&Path>,
    ocr_json: Option<&Path>,
) -> Result<()> {
    validate_input(cfg, input, Some("pdf"))?;

    let input_hash = crate::util::hash_file(cfg, input)
        .with_context(|| format!("hashing input: {}", input.display()))?;
    let job_id = job_id(cfg, &input_hash, mode);

    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    let job_dir = out_root.join(&job_id);

    if job_dir.exists() && !cfg.global.resume {
        return Err(anyhow!(
            "job_dir already exists and resume=false: {}",
            job_dir.display()
        ));
    }

    ensure_dir(&job_dir)?;
    ensure_dir(&job_dir.join("logs"))?;

    let log_path = resolve_log_path(cfg, Some(&job_dir));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    info!("job_id={job_id} mode={} out={}", mode.as_str(), job_dir.display());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(job_dir.join("effective-config.toml"), raw)?;
    }

    if cfg.ocr.use_cache {
        ensure_dir(Path::new(&cfg.paths.cache_dir))?;
    }

    let ocr_override = match ocr_json {
        Some(p) => Some(ocr::load_response(p)?),
        None => None,
    };

    let engine = ProcessEngine::new(cfg)?;
    let pipeline = Pipeline::new(cfg, engine);
    let output = pipeline.run_job(input, &job_dir, mode, ocr_override)?;

    if cfg.global.print_summary {
        print_json(&serde_json::json!({
            "job_id": job_id,
            "job_dir": job_dir,
            "mode": mode.as_str(),
            "product_name": output.report.product_name,
            "outputs": output.documents,
            "warnings": output.report.warnings,
            "status": "ok"
        }))?;
    }

    Ok(())
}

/// Rejects URLs, missing files, oversized files and, when `ext` is given,
/// other extensions.
pub fn validate_input(cfg: &Config, input: &Path, ext: Option<&str>) -> Result<()> {
    let input_str = input.display().to_string();

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }

    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    let size = std::fs::metadata(input)
        .with_context(|| format!("stat input: {}", input.display()))?
        .len();
    if size > cfg.limits.max_input_file_bytes {
        return Err(anyhow!(
            "input exceeds max_input_file_bytes ({} > {}): {}",
            size,
            cfg.limits.max_input_file_bytes,
            input.display()
        ));
    }

    if let Some(want) = ext {
        match input.extension().and_then(|s| s.to_str()) {
            Some(got) if !got.eq_ignore_ascii_case(want) => {
                return Err(anyhow!("input is not a {}: {}", want.to_uppercase(), input.display()));
            }
            Some(_) => {}
            None => warn!(
                "input has no extension; assuming {}: {}",
                want.to_uppercase(),
                input.display()
            ),
        }
    }

    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}

fn resolve_log_path(cfg: &Config, job_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(job_dir) = job_dir {
        return Some(job_dir.join("logs").join("catalog-extract.log"));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("logs").join("catalog-extract.log"))
}
