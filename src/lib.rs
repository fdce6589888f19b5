//! # edgequake-figex
//!
//! Extract figures and illustrations from PDF, DJVU, office and ebook
//! documents.
//!
//! ## Two modes
//!
//! - **Unpack** (default): pull out what the document already stores as
//!   images: embedded PDF images, DJVU background layers, media inside
//!   docx / odt / epub containers.
//! - **Vision-assisted** (`use_vision`): rasterise every page, propose
//!   rectangular regions, and keep the ones that look like figures rather
//!   than blocks of text. OCR can confirm ambiguous regions (`use_ocr`).
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Sniff     magic bytes → PDF / DJVU / zip container / legacy doc
//!  ├─ 2. Dispatch  kind × capabilities × mode → strategy
//!  ├─ 3. Estimate  work units for the progress total
//!  ├─ 4. Acquire   external tools, bounded pool (spawn_blocking)
//!  ├─ 5. Classify  candidates → verdict → cropped PNGs, bounded pool
//!  └─ 6. Report    per-document figures + absorbed failures
//! ```
//!
//! External tools (`pdftoppm`, `pdfimages`, `pdfinfo`, `ddjvu`, `djvused`,
//! `djvuextract`, `soffice`, `tesseract`) are probed once per run; a missing
//! tool narrows the strategies instead of failing the run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_figex::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .output_root("figures")
//!         .use_vision(true)
//!         .build()?;
//!     let report = extract(&["paper.pdf", "scan.djvu"], &config).await?;
//!     println!("{} figure(s)", report.figure_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `figex` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-figex = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod capability;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod tools;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use capability::CapabilityMatrix;
pub use config::{
    CandidateParams, ClassifierThresholds, EstimatorCosts, ExecutionMode, ExtractionConfig,
    ExtractionConfigBuilder, GlyphFilter,
};
pub use document::{Document, DocumentKind};
pub use error::{FigexError, JobError};
pub use extract::{extract, extract_sync, plan, probe_capabilities, Extractor};
pub use output::{DocumentOutcome, FigureBox, FigureRecord, PlannedDocument, RunPlan, RunReport};
pub use pipeline::dispatch::Strategy;
pub use pipeline::ocr::{OcrEngine, OcrReading, TesseractOcr};
pub use progress::{
    ExtractionProgressCallback, NoopProgressCallback, ProgressCallback, ProgressSnapshot,
    ProgressState,
};
pub use tools::{SystemToolRunner, ToolInvocation, ToolOutput, ToolRunner};
