//! Figure/text classification of one candidate region.
//!
//! ## Decision order
//!
//! First match wins; later checks are not evaluated.
//!
//! | # | Condition | Verdict |
//! |---|-----------|---------|
//! | 1 | density > `dense_text` (20) | accept iff the region has graphics |
//! | 2 | density < `sparse_text` (2) | accept |
//! | 3 | density > `pure_text` (10) | reject: pure text |
//! | 4 | OCR confirms a text block | reject |
//! | 5 | otherwise | accept iff the region has graphics |
//!
//! "Has graphics" means the Canny edge-pixel share lies strictly inside
//! `(edge_density_min, edge_density_max)`: blank regions have too few edges,
//! photographs and dense halftones too many.
//!
//! [`decide`] is the pure decision function. OCR is passed as a closure so it
//! only runs for regions that reach step 4.

use crate::config::ClassifierThresholds;
use crate::pipeline::ocr::OcrEngine;
use image::GrayImage;
use tracing::debug;
use vision_kit::VisionToolkit;

/// Outcome of classifying one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }

    fn from_bool(accept: bool) -> Self {
        if accept {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }
}

/// Apply the decision table.
///
/// `ocr_confirms_text` is only called when the table reaches step 4; pass
/// `|| false` when OCR is disabled or unavailable.
pub fn decide<F>(
    density: f64,
    has_graphics: bool,
    ocr_confirms_text: F,
    t: &ClassifierThresholds,
) -> Verdict
where
    F: FnOnce() -> bool,
{
    if density > t.dense_text {
        return Verdict::from_bool(has_graphics);
    }
    if density < t.sparse_text {
        return Verdict::Accept;
    }
    if density > t.pure_text {
        return Verdict::Reject;
    }
    if ocr_confirms_text() {
        return Verdict::Reject;
    }
    Verdict::from_bool(has_graphics)
}

/// Edge-pixel share of `region` lies strictly inside the configured band.
pub fn has_graphical_content(
    toolkit: &dyn VisionToolkit,
    region: &GrayImage,
    t: &ClassifierThresholds,
) -> bool {
    let pixels = region.width() as f64 * region.height() as f64;
    if pixels == 0.0 {
        return false;
    }
    let edges = toolkit.edges(region, t.canny_low, t.canny_high);
    let share = toolkit.count_nonzero(&edges) as f64 / pixels;
    share > t.edge_density_min && share < t.edge_density_max
}

/// Classifier bound to a toolkit, thresholds and an optional OCR engine.
pub struct FigureClassifier<'a> {
    toolkit: &'a dyn VisionToolkit,
    thresholds: &'a ClassifierThresholds,
    ocr: Option<&'a dyn OcrEngine>,
}

impl<'a> FigureClassifier<'a> {
    pub fn new(
        toolkit: &'a dyn VisionToolkit,
        thresholds: &'a ClassifierThresholds,
        ocr: Option<&'a dyn OcrEngine>,
    ) -> Self {
        Self {
            toolkit,
            thresholds,
            ocr,
        }
    }

    /// Classify a candidate region whose text density is already known.
    pub fn classify(&self, region: &GrayImage, density: f64) -> Verdict {
        let has_graphics = has_graphical_content(self.toolkit, region, self.thresholds);
        decide(
            density,
            has_graphics,
            || self.ocr_confirms_text(region),
            self.thresholds,
        )
    }

    fn ocr_confirms_text(&self, region: &GrayImage) -> bool {
        let Some(ocr) = self.ocr else {
            return false;
        };
        match ocr.recognize(region) {
            Ok(reading) => {
                reading.mean_confidence > self.thresholds.ocr_min_confidence
                    && reading.word_count() > self.thresholds.ocr_min_words
            }
            Err(e) => {
                // Unconfirmed, not fatal: fall through to the graphics test.
                debug!("OCR failed on region: {}", e);
                false
            }
        }
    }
}
