//! Error types for the edgequake-figex library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`FigexError`] — **Fatal**: the run cannot start at all (input file
//!   missing, output root not writable, invalid configuration). Returned as
//!   `Err(FigexError)` from the top-level `extract*` functions. Nothing raises
//!   it once documents have started processing.
//!
//! * [`JobError`] — **Non-fatal**: one render, extraction or classification
//!   job failed. It is logged, recorded inside
//!   [`crate::output::DocumentOutcome`], and the batch moves on. The work unit
//!   is still counted so progress always reaches 100 %.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-figex library.
///
/// Job-level failures use [`JobError`] and are stored in
/// [`crate::output::DocumentOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum FigexError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The run was started without any input document.
    #[error("No input documents were given")]
    NoInputs,

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create the output root or a document folder.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single job.
///
/// Every variant corresponds to a "skip and continue" path: the job produced
/// nothing (or less than expected), and the rest of the document and batch
/// carry on.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum JobError {
    /// The external tool is not installed.
    #[error("{tool}: not available on this system")]
    ToolUnavailable { tool: String },

    /// The external tool ran but exited with a failure status.
    #[error("{tool}: execution failed: {detail}")]
    ToolExecutionFailure { tool: String, detail: String },

    /// The tool reported success but its expected output file is missing or too small.
    #[error("{tool}: expected output '{path}' missing or undersized")]
    MissingOutput { tool: String, path: PathBuf },

    /// A raster image could not be decoded.
    #[error("Cannot decode image '{path}': {detail}")]
    UndecodableImage { path: PathBuf, detail: String },

    /// The OCR engine could not be initialised.
    #[error("OCR unavailable: {detail}")]
    OcrUnavailable { detail: String },

    /// No strategy exists for the detected type with the current capabilities.
    #[error("Unsupported file type '{kind}' for '{path}'")]
    UnsupportedFileType { path: PathBuf, kind: String },

    /// A zip-based container could not be read or unpacked.
    #[error("Container '{path}' could not be unpacked: {detail}")]
    ContainerFailure { path: PathBuf, detail: String },

    /// A document folder or scratch directory could not be created.
    #[error("Cannot prepare output folder '{path}': {detail}")]
    OutputUnwritable { path: PathBuf, detail: String },

    /// An accepted figure could not be written to disk.
    #[error("Failed to write figure '{path}': {detail}")]
    FigureWriteFailed { path: PathBuf, detail: String },

    /// A worker thread panicked while running a job.
    #[error("Worker panicked: {detail}")]
    WorkerPanicked { detail: String },
}
