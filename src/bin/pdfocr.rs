//! CLI binary for edgequake-pdfocr.
//!
//! A thin shim over the library crate: maps flags (and the deployment env
//! variables) to `OcrConfig`, submits every input to one `OcrService`, and
//! renders one progress bar per job from polled status.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_pdfocr::pipeline::document::run_blocking;
use edgequake_pdfocr::{
    analyze, default_output_path, DocumentBackend, ExistingTextPolicy, JobId, JobStatus,
    JobStatusView, OcrConfig, OcrEngine, OcrService, OcrmypdfEngine, PdfOcrError, PdfiumBackend,
    SharedBackend, TextLayerMode,
};
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One scan, output next to it as scan_OCR.pdf
  pdfocr scan.pdf

  # Explicit output file, English only
  pdfocr -l eng scan.pdf -o searchable.pdf

  # A batch, three at a time, into one folder
  pdfocr -j 3 --output-dir out/ *.pdf

  # Is everything installed?
  pdfocr --check-deps

  # Page count and text-layer status only
  pdfocr --inspect-only --json scan.pdf

ENVIRONMENT VARIABLES:
  OCR_LANGUAGE          Tesseract language spec (default spa+eng)
  PAGES_PER_CHUNK       Pages per engine invocation (default 25)
  OCR_TIMEOUT_SECONDS   Per-chunk engine timeout (default 1200)
  MAX_PAGES_TOTAL       Page ceiling per document (default 300)
  MAX_UPLOAD_MB         Input size ceiling in MiB (default 50)
  OUTPUT_FOLDER         Where <stem>_OCR.pdf files are written
  PDFIUM_LIB_PATH       pdfium shared library (file or directory)

SYSTEM REQUIREMENTS:
  ocrmypdf, tesseract-ocr (+ language packs), qpdf, ghostscript, libpdfium
"#;

/// Add a searchable text layer to scanned PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "pdfocr",
    version,
    about = "Add a searchable text layer to scanned PDFs, chunk by chunk",
    long_about = "Split scanned PDFs into page chunks, run ocrmypdf on each chunk with a \
timeout, and merge the results into a searchable PDF that keeps the original page images.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files to process.
    #[arg(required_unless_present = "check_deps")]
    inputs: Vec<PathBuf>,

    /// Output file (single input only). Default: <stem>_OCR.pdf.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for outputs. Default: next to each input.
    #[arg(long, env = "OUTPUT_FOLDER")]
    output_dir: Option<PathBuf>,

    /// Tesseract language spec, e.g. eng or spa+eng.
    #[arg(short, long, env = "OCR_LANGUAGE", default_value = "spa+eng")]
    language: String,

    /// Pages per engine invocation.
    #[arg(long, env = "PAGES_PER_CHUNK", default_value_t = 25)]
    pages_per_chunk: usize,

    /// Per-chunk engine timeout in seconds.
    #[arg(long, env = "OCR_TIMEOUT_SECONDS", default_value_t = 1200)]
    timeout: u64,

    /// Reject documents with more pages than this.
    #[arg(long, env = "MAX_PAGES_TOTAL", default_value_t = 300)]
    max_pages: usize,

    /// Reject input files larger than this many MiB.
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 50)]
    max_size_mb: u64,

    /// Treatment of pages that already contain text.
    #[arg(long, value_enum, default_value = "skip-text")]
    text_layer: TextLayerArg,

    /// Copy documents whose pages all have text instead of running OCR.
    #[arg(long)]
    reuse_text: bool,

    /// ocrmypdf optimisation level (0–3).
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=3))]
    optimize: u8,

    /// Do not straighten skewed pages.
    #[arg(long)]
    no_deskew: bool,

    /// Do not auto-rotate pages.
    #[arg(long)]
    no_rotate: bool,

    /// Keep the engine's cleaned page images in the output.
    #[arg(long)]
    clean_final: bool,

    /// Documents processed at the same time.
    #[arg(short, long, env = "PDFOCR_JOBS", default_value_t = 2)]
    jobs: usize,

    /// Parent directory for per-job scratch space.
    #[arg(long, env = "PDFOCR_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// pdfium shared library (file or directory).
    #[arg(long)]
    pdfium_lib: Option<PathBuf>,

    /// ocrmypdf executable.
    #[arg(long, env = "OCRMYPDF_PATH", default_value = "ocrmypdf")]
    ocrmypdf: PathBuf,

    /// Output a JSON summary instead of text.
    #[arg(long)]
    json: bool,

    /// Disable progress bars.
    #[arg(long, env = "PDFOCR_NO_PROGRESS")]
    no_progress: bool,

    /// Print page count and text-layer status only, no OCR.
    #[arg(long)]
    inspect_only: bool,

    /// Report missing external tools and exit.
    #[arg(long)]
    check_deps: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFOCR_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TextLayerArg {
    SkipText,
    RedoOcr,
    ForceOcr,
}

impl From<TextLayerArg> for TextLayerMode {
    fn from(v: TextLayerArg) -> Self {
        match v {
            TextLayerArg::SkipText => TextLayerMode::SkipText,
            TextLayerArg::RedoOcr => TextLayerMode::RedoOcr,
            TextLayerArg::ForceOcr => TextLayerMode::ForceOcr,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The bars carry the per-job feedback; library INFO logs would tear them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let engine = Arc::new(OcrmypdfEngine::new(&cli.ocrmypdf));
    let backend: SharedBackend = Arc::new(PdfiumBackend::new(cli.pdfium_lib.clone()));

    // ── Dependency check ─────────────────────────────────────────────────
    if cli.check_deps {
        return check_deps(engine.as_ref(), &backend).await;
    }

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        return inspect(&cli, &backend).await;
    }

    // ── Build service ────────────────────────────────────────────────────
    if cli.output.is_some() && cli.inputs.len() > 1 {
        bail!("--output takes a single input; use --output-dir for batches");
    }
    let config = build_config(&cli)?;
    let service = OcrService::with_components(config, engine, backend);

    // ── Submit ───────────────────────────────────────────────────────────
    let started = Instant::now();
    let mut submitted: Vec<(PathBuf, JobId)> = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let output = output_for(&cli, input);
        let id = service
            .submit(input.clone(), output)
            .await
            .with_context(|| format!("Failed to submit {}", input.display()))?;
        submitted.push((input.clone(), id));
    }

    // ── Wait ─────────────────────────────────────────────────────────────
    let wait_all = async {
        if show_progress {
            follow_with_bars(&service, &submitted).await
        } else {
            join_all(submitted.iter().map(|(_, id)| service.wait(id)))
                .await
                .into_iter()
                .map(|r| r.map(|job| JobStatusView::from(&job)))
                .collect::<Result<Vec<_>, PdfOcrError>>()
                .context("Lost track of a job")
        }
    };
    // Engines run in their own process groups and miss the terminal's
    // SIGINT; returning drops the workers, which kills them.
    let finals = tokio::select! {
        finals = wait_all => finals?,
        _ = tokio::signal::ctrl_c() => {
            for (_, id) in &submitted {
                let _ = service.cancel(id).await;
            }
            bail!("Interrupted; {} job(s) cancelled", submitted.len());
        }
    };

    // ── Report ───────────────────────────────────────────────────────────
    let failed = finals
        .iter()
        .filter(|v| v.status != JobStatus::Completed)
        .count();

    if cli.json {
        let report: Vec<_> = submitted
            .iter()
            .zip(&finals)
            .map(|((input, _), view)| serde_json::json!({ "input": input, "job": view }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        for ((input, _), view) in submitted.iter().zip(&finals) {
            print_outcome(input, view);
        }
        eprintln!(
            "{}  {}/{} documents  {:.1}s",
            if failed == 0 { green("✔") } else { red("✘") },
            finals.len() - failed,
            finals.len(),
            started.elapsed().as_secs_f64()
        );
    }

    if failed > 0 {
        bail!("{failed} of {} documents failed", finals.len());
    }
    Ok(())
}

/// Map CLI args to `OcrConfig`.
fn build_config(cli: &Cli) -> Result<OcrConfig> {
    let mut builder = OcrConfig::builder()
        .language(cli.language.clone())
        .pages_per_chunk(cli.pages_per_chunk)
        .chunk_timeout_secs(cli.timeout)
        .max_pages_total(cli.max_pages)
        .max_input_bytes(cli.max_size_mb.saturating_mul(1024 * 1024))
        .text_layer(cli.text_layer.into())
        .optimize(cli.optimize)
        .deskew(!cli.no_deskew)
        .rotate_pages(!cli.no_rotate)
        .clean_final(cli.clean_final)
        .max_concurrent_jobs(cli.jobs)
        // Every input is submitted up front; none may bounce off the queue.
        .max_pending_jobs(cli.inputs.len());
    if cli.reuse_text {
        builder = builder.existing_text(ExistingTextPolicy::ReuseWhenPresent);
    }
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    builder.build().context("Invalid configuration")
}

fn output_for(cli: &Cli, input: &Path) -> PathBuf {
    if let Some(ref out) = cli.output {
        return out.clone();
    }
    let dir = cli
        .output_dir
        .clone()
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    default_output_path(input, &dir)
}

async fn check_deps(engine: &dyn OcrEngine, backend: &SharedBackend) -> Result<()> {
    let mut missing = Vec::new();
    let backend_check = run_blocking(backend, |b: &dyn DocumentBackend| b.check_available()).await;
    for result in [engine.check_dependencies().await, backend_check] {
        match result {
            Ok(()) => {}
            Err(PdfOcrError::DependencyMissing { tools }) => missing.extend(tools),
            Err(e) => return Err(e).context("Dependency check failed"),
        }
    }
    if missing.is_empty() {
        println!("{} all external tools found", green("✔"));
        Ok(())
    } else {
        println!("{} missing: {}", red("✘"), bold(&missing.join(", ")));
        Err(PdfOcrError::DependencyMissing { tools: missing }.into())
    }
}

async fn inspect(cli: &Cli, backend: &SharedBackend) -> Result<()> {
    let mut infos = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let info = analyze(backend, input)
            .await
            .with_context(|| format!("Failed to inspect {}", input.display()))?;
        infos.push((input, info));
    }

    if cli.json {
        let report: Vec<_> = infos
            .iter()
            .map(|(input, info)| serde_json::json!({ "input": input, "document": info }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise metadata")?
        );
    } else {
        for (input, info) in &infos {
            println!("File:         {}", input.display());
            println!("Pages:        {}", info.page_count);
            println!("Size:         {} bytes", info.file_size);
            let text = if info.text_layer == Some(true) { "yes" } else { "no" };
            println!("Text layer:   {}", text);
        }
    }
    Ok(())
}

/// Poll every job until all are terminal, one bar per job.
async fn follow_with_bars(
    service: &OcrService,
    jobs: &[(PathBuf, JobId)],
) -> Result<Vec<JobStatusView>> {
    let multi = MultiProgress::new();
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos:>3}%  {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

    let bars: Vec<ProgressBar> = jobs
        .iter()
        .map(|(input, _)| {
            let bar = multi.add(ProgressBar::new(100));
            bar.set_style(style.clone());
            bar.set_prefix(short_name(input));
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        })
        .collect();

    loop {
        let views = join_all(jobs.iter().map(|(_, id)| service.status(id)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, PdfOcrError>>()
            .context("Lost track of a job")?;

        for (bar, view) in bars.iter().zip(&views) {
            if bar.is_finished() {
                continue;
            }
            bar.set_position(view.progress as u64);
            bar.set_message(view.message.clone());
            match view.status {
                JobStatus::Completed => bar.finish_with_message(green("done")),
                JobStatus::Error => bar.abandon_with_message(red("failed")),
                _ => {}
            }
        }

        if views.iter().all(|v| v.status.is_terminal()) {
            return Ok(views);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

fn print_outcome(input: &Path, view: &JobStatusView) {
    match (&view.status, &view.output_path, &view.error) {
        (JobStatus::Completed, Some(out), _) => eprintln!(
            "  {} {}  →  {}  {}",
            green("✓"),
            input.display(),
            bold(&out.display().to_string()),
            dim(&format!("{} pages", view.pages_processed.unwrap_or(0))),
        ),
        (_, _, Some(err)) => {
            eprintln!("  {} {}  {}", red("✗"), input.display(), red(&err.to_string()));
            if let Some(ref diag) = err.diagnostic {
                for line in diag.lines() {
                    eprintln!("      {}", dim(line));
                }
            }
        }
        _ => eprintln!("  {} {}  {}", red("✗"), input.display(), view.message),
    }
}

fn short_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    if name.chars().count() > 24 {
        let head: String = name.chars().take(23).collect();
        format!("{head}…")
    } else {
        name
    }
}
