//! CLI binary for edgequake-figex.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_figex::{
    probe_capabilities, CapabilityMatrix, DocumentOutcome, ExecutionMode, ExtractionConfig,
    ExtractionProgressCallback, Extractor, ProgressCallback, ProgressState, RunPlan, RunReport,
    Strategy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Per-document log lines printed above the bar.
///
/// The bar's position is driven by polling [`ProgressState`], not by these
/// events; documents only report when they start and finish.
struct CliProgressCallback {
    bar: ProgressBar,
    documents: AtomicUsize,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new(bar: ProgressBar) -> Arc<Self> {
        Arc::new(Self {
            bar,
            documents: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, documents: usize, total_units: u64) {
        self.documents.store(documents, Ordering::SeqCst);
        self.bar.set_length(total_units);
        self.bar.set_style(bar_style());
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{documents} document(s), ~{total_units} work units"))
        ));
    }

    fn on_document_start(&self, _index: usize, path: &Path, strategy: Strategy) {
        self.bar.set_message(format!(
            "{} ({})",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            strategy
        ));
    }

    fn on_document_complete(&self, index: usize, outcome: &DocumentOutcome) {
        let total = self.documents.load(Ordering::SeqCst);
        let mark = if outcome.is_clean() {
            green("✓")
        } else if outcome.figures.is_empty() && outcome.page_images.is_empty() {
            red("✗")
        } else {
            cyan("⚠")
        };
        self.failures
            .fetch_add(outcome.failures.len(), Ordering::SeqCst);
        self.bar.println(format!(
            "  {} [{:>3}/{:<3}] {}  {}  {}",
            mark,
            index + 1,
            total,
            outcome.path.display(),
            dim(&format!("{}", outcome.strategy)),
            dim(&format!(
                "{} image(s), {} figure(s), {} failure(s)",
                outcome.page_images.len(),
                outcome.figures.len(),
                outcome.failures.len()
            )),
        ));
        if let Some(first) = outcome.failures.first() {
            let msg = first.to_string();
            let msg = if msg.chars().count() > 100 {
                format!("{}\u{2026}", msg.chars().take(99).collect::<String>())
            } else {
                msg
            };
            self.bar.println(format!("      {}", red(&msg)));
        }
    }

    fn on_run_complete(&self, documents: usize, figures: usize) {
        self.bar.finish_and_clear();
        let failures = self.failures.load(Ordering::SeqCst);
        eprintln!(
            "{} {} figure(s) from {} document(s){}",
            if failures == 0 { green("✔") } else { cyan("⚠") },
            bold(&figures.to_string()),
            documents,
            if failures == 0 {
                String::new()
            } else {
                format!("  ({} failure(s))", red(&failures.to_string()))
            }
        );
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  \
         [{bar:42.green/238}] {pos:>4}/{len} units {percent:>3}%  \
         ⏱ {elapsed_precise}  {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS)
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    bar.set_prefix("Preparing");
    bar.set_message("Probing tools and page counts…");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Unpack embedded images from every document
  figex paper.pdf book.djvu slides.pptx -o figures

  # Render pages and detect figures
  figex --vision paper.pdf

  # Confirm ambiguous regions with OCR (German + English)
  figex --vision --ocr --ocr-lang deu+eng scan.djvu

  # One job at a time
  figex --vision --serial paper.pdf

  # Show which tools are installed
  figex --probe

  # Show the plan without extracting anything
  figex --plan --vision *.pdf

  # JSON report
  figex --vision --json paper.pdf > report.json

STRATEGIES:
  render             pdftoppm / ddjvu per page, then figure detection
  convert+render     soffice → PDF, then render
  extract-embedded   pdfimages -all
  extract-djvu       djvuextract BG44 probe + ddjvu render per page
  extract-container  unpack media from docx / odt / epub
  convert+extract    soffice → DOCX, then unpack media
  unsupported        nothing usable for this file type

EXTERNAL TOOLS (all optional; missing ones narrow the strategies):
  poppler-utils   pdftoppm, pdfinfo, pdfimages
  djvulibre       ddjvu, djvused, djvuextract
  libreoffice     soffice
  tesseract       OCR confirmation

ENVIRONMENT VARIABLES:
  RUST_LOG        Override the log filter (e.g. edgequake_figex=debug)
"#;

/// Extract figures from PDF, DJVU, office and ebook documents.
#[derive(Parser, Debug)]
#[command(
    name = "figex",
    version,
    about = "Extract figures from PDF, DJVU, office and ebook documents",
    long_about = "Extract figures and illustrations from documents. By default embedded images \
are unpacked; with --vision every page is rendered and figure regions are detected and cropped. \
External tools are optional and probed at start-up.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input documents.
    #[arg(required_unless_present = "probe")]
    inputs: Vec<PathBuf>,

    /// Output root; each document gets <OUTPUT>/<basename>/.
    #[arg(short, long, env = "FIGEX_OUTPUT", default_value = "figures")]
    output: PathBuf,

    /// Render pages and detect figures on them.
    #[arg(long, env = "FIGEX_VISION")]
    vision: bool,

    /// Confirm ambiguous regions with tesseract (implies --vision).
    #[arg(long, env = "FIGEX_OCR")]
    ocr: bool,

    /// Tesseract language(s), e.g. eng or deu+eng.
    #[arg(long, env = "FIGEX_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Run one job at a time.
    #[arg(long, env = "FIGEX_SERIAL")]
    serial: bool,

    /// Concurrent render / extraction jobs. Default: number of cores (min 2).
    #[arg(long, env = "FIGEX_RENDER_JOBS",
          value_parser = clap::value_parser!(u32).range(1..))]
    render_jobs: Option<u32>,

    /// Concurrent classification jobs. Default: number of cores (min 2).
    #[arg(long, env = "FIGEX_CLASSIFY_JOBS",
          value_parser = clap::value_parser!(u32).range(1..))]
    classify_jobs: Option<u32>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "FIGEX_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Print the capability matrix and exit.
    #[arg(long)]
    probe: bool,

    /// Print the strategy and work estimate per document and exit.
    #[arg(long)]
    plan: bool,

    /// Print the report (or plan / probe) as JSON on stdout.
    #[arg(long, env = "FIGEX_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "FIGEX_NO_PROGRESS")]
    no_progress: bool,

    /// Progress bar refresh interval in milliseconds.
    #[arg(long, env = "FIGEX_POLL_MS", default_value_t = 100)]
    poll_ms: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FIGEX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FIGEX_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar and the per-document lines carry the same information.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.probe && !cli.plan;
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

    let bar = if show_progress {
        Some(spinner())
    } else {
        None
    };

    // ── Capabilities ─────────────────────────────────────────────────────
    let caps = probe_capabilities()
        .await
        .context("Failed to probe external tools")?;

    if cli.probe {
        print_capabilities(&caps, cli.json)?;
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = bar
        .as_ref()
        .map(|b| CliProgressCallback::new(b.clone()) as ProgressCallback);
    let config = build_config(&cli, progress_cb)?;
    let extractor = Extractor::new(config, caps);

    if cli.plan {
        let plan = extractor
            .plan(&cli.inputs)
            .await
            .context("Failed to plan extraction")?;
        print_plan(&plan, cli.json)?;
        return Ok(());
    }

    // ── Run extraction ───────────────────────────────────────────────────
    // The run executes on its own task; this task polls the shared counter
    // to move the bar.
    let progress = extractor.progress();
    let inputs = cli.inputs.clone();
    let mut handle = tokio::spawn(async move { extractor.run(&inputs).await });

    let report = match bar {
        Some(ref bar) => {
            let mut ticker = tokio::time::interval(Duration::from_millis(cli.poll_ms.max(10)));
            loop {
                tokio::select! {
                    joined = &mut handle => break joined,
                    _ = ticker.tick() => update_bar(bar, &progress),
                }
            }
        }
        None => handle.await,
    }
    .context("Extraction task panicked")?
    .context("Extraction failed")?;

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(&report, show_progress);
    }

    Ok(())
}

fn update_bar(bar: &ProgressBar, progress: &ProgressState) {
    let total = progress.total();
    if bar.length() != Some(total) {
        bar.set_length(total);
    }
    bar.set_position(progress.processed());
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .output_root(&cli.output)
        .use_vision(cli.vision || cli.ocr)
        .use_ocr(cli.ocr)
        .ocr_language(cli.ocr_lang.clone())
        .render_dpi(cli.dpi)
        .execution(if cli.serial {
            ExecutionMode::Serial
        } else {
            ExecutionMode::Parallel
        });

    if let Some(n) = cli.render_jobs {
        builder = builder.acquire_concurrency(n as usize);
    }
    if let Some(n) = cli.classify_jobs {
        builder = builder.classify_concurrency(n as usize);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_capabilities(caps: &CapabilityMatrix, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(caps).context("Failed to serialise capabilities")?
        );
        return Ok(());
    }
    for (name, on) in caps.entries() {
        println!(
            "{:<20} {}",
            name,
            if on { green("yes") } else { red("no") }
        );
    }
    Ok(())
}

fn print_plan(plan: &RunPlan, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(plan).context("Failed to serialise plan")?
        );
        return Ok(());
    }
    for p in &plan.documents {
        println!(
            "{}  {}  {}  {}",
            p.document.path.display(),
            dim(&format!("{} / {} page(s)", p.document.kind, p.document.pages)),
            cyan(&p.strategy.to_string()),
            dim(&format!("~{} unit(s)", p.estimated_units)),
        );
    }
    println!("{} ~{} work units", bold("Total:"), plan.total_units);
    Ok(())
}

fn print_summary(report: &RunReport, callback_printed: bool) {
    if !callback_printed {
        for doc in &report.documents {
            eprintln!(
                "{}  {}  {} image(s), {} figure(s)",
                doc.path.display(),
                doc.strategy,
                doc.page_images.len(),
                doc.figures.len()
            );
            for f in &doc.failures {
                eprintln!("  {} {}", red("✗"), f);
            }
        }
    }
    eprintln!(
        "   {} documents  /  {} images  /  {} figures  —  {}ms total",
        dim(&report.documents.len().to_string()),
        dim(&report.page_image_count().to_string()),
        dim(&report.figure_count().to_string()),
        report.duration_ms,
    );
}
