//! Run results: what each document produced and what went wrong.
//!
//! A run never fails because of a single document, so the report is the
//! inspectable channel for absorbed failures: every [`JobError`] ends up in
//! its document's `failures` list in addition to the log.

use crate::capability::CapabilityMatrix;
use crate::document::{Document, DocumentKind};
use crate::error::JobError;
use crate::pipeline::dispatch::Strategy;
use crate::progress::ProgressSnapshot;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pixel rectangle of an accepted figure inside its source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FigureBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl From<vision_kit::BoundingBox> for FigureBox {
    fn from(b: vision_kit::BoundingBox) -> Self {
        Self {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
        }
    }
}

/// One figure file written to `opencv_figures/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureRecord {
    /// Page or extracted image the figure was cut from.
    pub source: PathBuf,
    /// Written figure file.
    pub path: PathBuf,
    /// 1-based position among the accepted figures of `source`.
    pub index: usize,
    pub bbox: FigureBox,
    pub text_density: f64,
}

/// Everything one document produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub strategy: Strategy,
    pub output_dir: PathBuf,
    /// Raster images produced by rendering or extraction, sorted by name.
    pub page_images: Vec<PathBuf>,
    pub figures: Vec<FigureRecord>,
    pub failures: Vec<JobError>,
}

impl DocumentOutcome {
    pub fn new(doc: &Document, strategy: Strategy) -> Self {
        Self {
            path: doc.path.clone(),
            kind: doc.kind,
            strategy,
            output_dir: doc.output_dir.clone(),
            page_images: Vec::new(),
            figures: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// True when nothing went wrong for this document.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of [`crate::extract::Extractor::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub documents: Vec<DocumentOutcome>,
    pub capabilities: CapabilityMatrix,
    /// Final counter state; `processed == total` and `percent == 100`.
    pub progress: ProgressSnapshot,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn figure_count(&self) -> usize {
        self.documents.iter().map(|d| d.figures.len()).sum()
    }

    pub fn page_image_count(&self) -> usize {
        self.documents.iter().map(|d| d.page_images.len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.documents.iter().map(|d| d.failures.len()).sum()
    }
}

/// What would happen to one document, without running anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedDocument {
    pub document: Document,
    pub strategy: Strategy,
    pub estimated_units: u64,
}

/// Output of [`crate::extract::plan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    pub documents: Vec<PlannedDocument>,
    pub capabilities: CapabilityMatrix,
    /// Estimated work units, ≥ 1.
    pub total_units: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(figures: usize, failures: usize) -> DocumentOutcome {
        DocumentOutcome {
            path: PathBuf::from("a.pdf"),
            kind: DocumentKind::Pdf,
            strategy: Strategy::RenderThenDetect,
            output_dir: PathBuf::from("out/a"),
            page_images: vec![PathBuf::from("out/a/page_0001.png")],
            figures: (1..=figures)
                .map(|i| FigureRecord {
                    source: PathBuf::from("out/a/page_0001.png"),
                    path: PathBuf::from(format!("out/a/opencv_figures/page_0001_figure_{i}.png")),
                    index: i,
                    bbox: FigureBox {
                        x: 0,
                        y: 0,
                        width: 10,
                        height: 10,
                    },
                    text_density: 0.0,
                })
                .collect(),
            failures: (0..failures)
                .map(|_| JobError::ToolUnavailable {
                    tool: "pdftoppm".into(),
                })
                .collect(),
        }
    }

    #[test]
    fn report_counts_sum_documents() {
        let report = RunReport {
            documents: vec![outcome(2, 0), outcome(3, 1)],
            capabilities: CapabilityMatrix::all(),
            progress: ProgressSnapshot {
                processed: 4,
                total: 4,
                percent: 100.0,
            },
            duration_ms: 12,
        };
        assert_eq!(report.figure_count(), 5);
        assert_eq!(report.page_image_count(), 2);
        assert_eq!(report.failure_count(), 1);
        assert!(report.documents[0].is_clean());
        assert!(!report.documents[1].is_clean());
    }

    #[test]
    fn report_serialises_to_json() {
        let report = RunReport {
            documents: vec![outcome(1, 1)],
            capabilities: CapabilityMatrix::builtin_only(),
            progress: ProgressSnapshot {
                processed: 1,
                total: 1,
                percent: 100.0,
            },
            duration_ms: 1,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("RenderThenDetect"));
        assert!(json.contains("page_0001_figure_1.png"));
    }
}
