//! Run orchestration: the entry points of the library.
//!
//! ## Run lifecycle
//!
//! ```text
//! inputs ─▶ validate (fatal errors only here)
//!        ─▶ probe page counts
//!        ─▶ estimate total ─▶ progress.reset(total)
//!        ─▶ for each document, FIFO:
//!               dispatch ─▶ acquire (acquire pool) ─▶ classify (classify pool)
//!               ─▶ drop the folder if it stayed empty
//!        ─▶ progress.finish()            processed == total from here on
//!        ─▶ RunReport
//! ```
//!
//! Documents run one after another; parallelism lives inside a document's
//! stages. Once the first document starts, nothing aborts the batch: every
//! failure becomes a [`crate::error::JobError`] in the report and the log.

use crate::capability::CapabilityMatrix;
use crate::config::ExtractionConfig;
use crate::document::{Document, DocumentKind};
use crate::error::{FigexError, JobError};
use crate::output::{DocumentOutcome, PlannedDocument, RunPlan, RunReport};
use crate::pipeline::acquire::Acquirer;
use crate::pipeline::dispatch;
use crate::pipeline::estimate;
use crate::pipeline::figures::{FigureDetector, FIGURES_DIR};
use crate::pipeline::ocr::{OcrEngine, TesseractOcr};
use crate::pipeline::pool::TaskPool;
use crate::progress::ProgressState;
use crate::tools::{SystemToolRunner, ToolRunner};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use vision_kit::{ImageprocToolkit, VisionToolkit};

/// Extract figures from `inputs` with capabilities probed from the system.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(RunReport)` once every document has been attempted, even if some or
/// all of them produced nothing (check each outcome's `failures`).
///
/// # Errors
/// Returns `Err(FigexError)` only before the run starts:
/// - no inputs, input missing or unreadable
/// - output root cannot be created
pub async fn extract<P: AsRef<Path>>(
    inputs: &[P],
    config: &ExtractionConfig,
) -> Result<RunReport, FigexError> {
    if inputs.is_empty() {
        return Err(FigexError::NoInputs);
    }
    let caps = probe_capabilities().await?;
    Extractor::new(config.clone(), caps).run(inputs).await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync<P: AsRef<Path>>(
    inputs: &[P],
    config: &ExtractionConfig,
) -> Result<RunReport, FigexError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FigexError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(inputs, config))
}

/// Dispatch plan and work estimate for `inputs`, without running anything.
pub async fn plan<P: AsRef<Path>>(
    inputs: &[P],
    config: &ExtractionConfig,
) -> Result<RunPlan, FigexError> {
    let caps = probe_capabilities().await?;
    Extractor::new(config.clone(), caps).plan(inputs).await
}

/// [`CapabilityMatrix::probe`] against the real system, off the async threads.
pub async fn probe_capabilities() -> Result<CapabilityMatrix, FigexError> {
    tokio::task::spawn_blocking(|| CapabilityMatrix::probe(&SystemToolRunner))
        .await
        .map_err(|e| FigexError::Internal(format!("Capability probe panicked: {}", e)))
}

/// A configured extraction run.
///
/// Collaborators default to the real ones (system tools, imageproc
/// toolkit, tesseract when OCR is requested) and can each be replaced.
pub struct Extractor {
    config: ExtractionConfig,
    caps: CapabilityMatrix,
    runner: Arc<dyn ToolRunner>,
    toolkit: Arc<dyn VisionToolkit>,
    ocr: Option<Arc<dyn OcrEngine>>,
    progress: Arc<ProgressState>,
}

impl Extractor {
    pub fn new(config: ExtractionConfig, caps: CapabilityMatrix) -> Self {
        Self {
            config,
            caps,
            runner: Arc::new(SystemToolRunner),
            toolkit: Arc::new(ImageprocToolkit),
            ocr: None,
            progress: Arc::new(ProgressState::default()),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_toolkit(mut self, toolkit: Arc<dyn VisionToolkit>) -> Self {
        self.toolkit = toolkit;
        self
    }

    /// Use `ocr` instead of initialising tesseract.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    /// Shared progress counter; poll it from another task while [`Self::run`] runs.
    pub fn progress(&self) -> Arc<ProgressState> {
        Arc::clone(&self.progress)
    }

    pub fn capabilities(&self) -> &CapabilityMatrix {
        &self.caps
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Vision-assisted mode requested and the toolkit available.
    pub fn vision_enabled(&self) -> bool {
        self.config.use_vision && self.caps.vision_toolkit
    }

    /// Validate inputs, sniff their types and probe page counts.
    pub async fn open_documents<P: AsRef<Path>>(&self, inputs: &[P]) -> Result<Vec<Document>, FigexError> {
        if inputs.is_empty() {
            return Err(FigexError::NoInputs);
        }
        let docs = inputs
            .iter()
            .map(|p| Document::open(p, &self.config.output_root))
            .collect::<Result<Vec<_>, _>>()?;

        let acquirer = Acquirer::new(Arc::clone(&self.runner), &self.config);
        let caps = self.caps;
        tokio::task::spawn_blocking(move || {
            docs.into_iter()
                .map(|doc| {
                    let probe = match doc.kind {
                        DocumentKind::Pdf if caps.render_pdf => true,
                        DocumentKind::Djvu if caps.handle_djvu => true,
                        DocumentKind::Pdf | DocumentKind::Djvu => false,
                        _ => true,
                    };
                    let pages = if probe {
                        acquirer.page_count(&doc.path, doc.kind).unwrap_or_else(|e| {
                            warn!("{}: page count unavailable: {}", doc.path.display(), e);
                            0
                        })
                    } else {
                        0
                    };
                    doc.with_pages(pages)
                })
                .collect()
        })
        .await
        .map_err(|e| FigexError::Internal(format!("Page probe panicked: {}", e)))
    }

    /// Dispatch plan and estimate for `inputs`.
    pub async fn plan<P: AsRef<Path>>(&self, inputs: &[P]) -> Result<RunPlan, FigexError> {
        let docs = self.open_documents(inputs).await?;
        let vision = self.vision_enabled();
        let costs = &self.config.costs;
        let total_units = estimate::estimate_total(&docs, &self.caps, vision, costs);
        let documents = docs
            .into_iter()
            .map(|doc| PlannedDocument {
                strategy: dispatch::select(doc.kind, &self.caps, vision),
                estimated_units: estimate::document_cost(&doc, &self.caps, vision, costs),
                document: doc,
            })
            .collect();
        Ok(RunPlan {
            documents,
            capabilities: self.caps,
            total_units,
        })
    }

    /// Process every input document.
    ///
    /// # Errors
    /// Only before the first document starts; see [`extract`].
    pub async fn run<P: AsRef<Path>>(&self, inputs: &[P]) -> Result<RunReport, FigexError> {
        let started = Instant::now();
        let docs = self.open_documents(inputs).await?;

        let root = &self.config.output_root;
        std::fs::create_dir_all(root).map_err(|e| FigexError::OutputDirFailed {
            path: root.clone(),
            source: e,
        })?;

        let vision = self.vision_enabled();
        let total = estimate::estimate_total(&docs, &self.caps, vision, &self.config.costs);
        self.progress.reset(total);
        info!(
            "Run: {} document(s), ~{} work units, vision={}, mode={:?}",
            docs.len(),
            total,
            vision,
            self.config.execution
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_start(docs.len(), total);
        }

        let detector = if vision {
            let ocr = self.resolve_ocr().await;
            Some(Arc::new(FigureDetector::new(
                Arc::clone(&self.toolkit),
                ocr,
                self.config.candidates.clone(),
                self.config.thresholds.clone(),
            )))
        } else {
            None
        };

        let stages = Stages {
            acquirer: Acquirer::new(Arc::clone(&self.runner), &self.config),
            acquire_pool: TaskPool::new(
                self.config.acquire_cap(),
                self.config.execution,
                Arc::clone(&self.progress),
            ),
            classify_pool: TaskPool::new(
                self.config.classify_cap(),
                self.config.execution,
                Arc::clone(&self.progress),
            ),
            detector,
        };

        let mut outcomes = Vec::with_capacity(docs.len());
        for (index, doc) in docs.iter().enumerate() {
            let outcome = self.process_document(index, docs.len(), doc, &stages).await;
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_document_complete(index, &outcome);
            }
            outcomes.push(outcome);
        }

        self.progress.finish();
        let report = RunReport {
            documents: outcomes,
            capabilities: self.caps,
            progress: self.progress.snapshot(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Run complete: {} figure(s) from {} image(s), {} failure(s), {}ms",
            report.figure_count(),
            report.page_image_count(),
            report.failure_count(),
            report.duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_complete(report.documents.len(), report.figure_count());
        }
        Ok(report)
    }

    async fn process_document(
        &self,
        index: usize,
        count: usize,
        doc: &Document,
        stages: &Stages,
    ) -> DocumentOutcome {
        let vision = stages.detector.is_some();
        let strategy = dispatch::select(doc.kind, &self.caps, vision);
        info!(
            "[{}/{}] {} ({}, {} page(s)) → {}",
            index + 1,
            count,
            doc.path.display(),
            doc.kind,
            doc.pages,
            strategy
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_start(index, &doc.path, strategy);
        }

        let mut outcome = DocumentOutcome::new(doc, strategy);
        if let Err(e) = std::fs::create_dir_all(&doc.output_dir) {
            let err = JobError::OutputUnwritable {
                path: doc.output_dir.clone(),
                detail: e.to_string(),
            };
            warn!("{}", err);
            stages.acquire_pool.record_skipped();
            outcome.failures.push(err);
            return outcome;
        }

        let acquired = stages
            .acquirer
            .acquire(doc, strategy, &self.caps, &stages.acquire_pool)
            .await;
        outcome.strategy = acquired.strategy;
        outcome.page_images = acquired.images;
        outcome.failures = acquired.failures;

        if let Some(ref detector) = stages.detector {
            let (figures, failures) = Arc::clone(detector)
                .classify_all(
                    &outcome.page_images,
                    &doc.output_dir.join(FIGURES_DIR),
                    &stages.classify_pool,
                )
                .await;
            outcome.figures = figures;
            outcome.failures.extend(failures);
        }

        remove_if_empty(&doc.output_dir);
        debug!(
            "{}: {} image(s), {} figure(s), {} failure(s)",
            doc.path.display(),
            outcome.page_images.len(),
            outcome.figures.len(),
            outcome.failures.len()
        );
        outcome
    }

    /// OCR engine for this run, or `None` to classify heuristically.
    async fn resolve_ocr(&self) -> Option<Arc<dyn OcrEngine>> {
        if !self.config.use_ocr {
            return None;
        }
        if let Some(ref ocr) = self.ocr {
            return Some(Arc::clone(ocr));
        }
        if !self.caps.ocr {
            warn!("OCR requested but tesseract is not installed; continuing without OCR");
            return None;
        }
        let runner = Arc::clone(&self.runner);
        let language = self.config.ocr_language.clone();
        let init = tokio::task::spawn_blocking(move || TesseractOcr::initialize(runner, &language))
            .await
            .unwrap_or_else(|e| {
                Err(JobError::OcrUnavailable {
                    detail: e.to_string(),
                })
            });
        match init {
            Ok(engine) => Some(Arc::new(engine)),
            Err(e) => {
                warn!("{}; continuing without OCR", e);
                None
            }
        }
    }
}

/// Per-run stage machinery shared by every document.
struct Stages {
    acquirer: Acquirer,
    acquire_pool: TaskPool,
    classify_pool: TaskPool,
    detector: Option<Arc<FigureDetector>>,
}

/// Remove `dir` if nothing was written into it.
fn remove_if_empty(dir: &Path) {
    let empty = std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if empty {
        match std::fs::remove_dir(dir) {
            Ok(()) => debug!("Removed empty folder {}", dir.display()),
            Err(e) => debug!("Could not remove {}: {}", dir.display(), e),
        }
    }
}
