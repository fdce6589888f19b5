//! Pipeline stages for figure extraction.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and lets tests swap a collaborator (tool
//! runner, vision toolkit, OCR engine) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! document ──▶ dispatch ──▶ acquire ──▶ figures ──────────────────────▶ opencv_figures/
//!  (type +     (strategy)   (render /   (candidates ─▶ classify ─▶ write)
//!   pages)                   extract)
//!                  │            │            │
//!               estimate      pool         pool
//!             (progress      (acquire     (classify
//!               total)         cap)         cap)
//! ```
//!
//! 1. [`dispatch`]   — pick one acquisition strategy from type + capabilities
//! 2. [`estimate`]   — heuristic work-unit total for the progress bar
//! 3. [`pool`]       — bounded `spawn_blocking` fan-out; one unit per job
//! 4. [`acquire`]    — external render / extract / convert jobs, zip unpacking
//! 5. [`candidates`] — region proposals and text density on one raster
//! 6. [`classify`]   — accept / reject a candidate (density, edges, OCR)
//! 7. [`ocr`]        — OCR engine seam and the tesseract implementation
//! 8. [`figures`]    — per-image classification pass that writes accepted crops

pub mod acquire;
pub mod candidates;
pub mod classify;
pub mod dispatch;
pub mod estimate;
pub mod figures;
pub mod ocr;
pub mod pool;
