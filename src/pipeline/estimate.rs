//! Work estimation: the progress bar's `total`.
//!
//! The figure is a heuristic, not a count. A rendered document costs two
//! units per page (render + classify); extraction with classification costs a
//! flat average because the number of embedded images is unknown up front.
//! [`crate::progress::ProgressState::finish`] reconciles any mismatch at the
//! end of the run.

use crate::capability::CapabilityMatrix;
use crate::config::EstimatorCosts;
use crate::document::{Document, DocumentKind};
use crate::pipeline::dispatch::{self, Strategy};

/// Estimated units for one document.
///
/// `vision` is the effective vision-assisted flag.
pub fn document_cost(
    doc: &Document,
    caps: &CapabilityMatrix,
    vision: bool,
    costs: &EstimatorCosts,
) -> u64 {
    let pages = doc.pages.max(1) as u64;
    match dispatch::select(doc.kind, caps, vision) {
        Strategy::Unsupported => costs.unsupported,
        s if vision && s.renders_pages() => pages * costs.render_multiplier,
        _ if vision => costs.extraction_average,
        _ => match doc.kind {
            DocumentKind::Djvu => pages,
            _ => 1,
        },
    }
}

/// Sum of [`document_cost`] over `docs`, floored at 1.
pub fn estimate_total(
    docs: &[Document],
    caps: &CapabilityMatrix,
    vision: bool,
    costs: &EstimatorCosts,
) -> u64 {
    docs.iter()
        .map(|d| document_cost(d, caps, vision, costs))
        .sum::<u64>()
        .max(1)
}
