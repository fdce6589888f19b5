//! Configuration types for figure extraction.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across worker threads, serialise the tunables for
//! a run report, and diff two runs to understand why their outputs differ.
//!
//! The detector and classifier constants are empirical. They live in
//! [`CandidateParams`], [`ClassifierThresholds`] and [`EstimatorCosts`] as
//! named fields so callers can override them instead of patching code.

use crate::error::FigexError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a figure-extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_figex::{ExecutionMode, ExtractionConfig};
///
/// let config = ExtractionConfig::builder()
///     .output_root("out")
///     .use_vision(true)
///     .execution(ExecutionMode::Serial)
///     .build()
///     .unwrap();
/// assert!(config.use_vision);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Root folder; each document gets `<output_root>/<basename>/`. Default: `figures`.
    pub output_root: PathBuf,

    /// Vision-assisted mode: render pages and detect figures on them. Default: false.
    ///
    /// Without it, documents are only unpacked (embedded images, container
    /// members) and nothing is classified.
    pub use_vision: bool,

    /// Confirm ambiguous regions with OCR. Requires `use_vision`. Default: false.
    pub use_ocr: bool,

    /// Parallel or strictly serial job execution. Default: [`ExecutionMode::Parallel`].
    pub execution: ExecutionMode,

    /// Concurrency cap for render / extraction jobs. Default: `max(2, cores)`.
    pub acquire_concurrency: usize,

    /// Concurrency cap for per-image classification jobs. Default: `max(2, cores)`.
    pub classify_concurrency: usize,

    /// Rendering resolution passed to the page rasteriser. Range: 72–600. Default: 200.
    pub render_dpi: u32,

    /// Tesseract language code. Default: `eng`.
    pub ocr_language: String,

    /// DJVU background layers at or below this size are treated as empty. Default: 200.
    pub min_layer_bytes: u64,

    /// Rendered pages / converted documents at or below this size are discarded. Default: 1000.
    pub min_render_bytes: u64,

    /// Region-proposal constants.
    pub candidates: CandidateParams,

    /// Figure/text decision constants.
    pub thresholds: ClassifierThresholds,

    /// Work-estimate constants for the progress total.
    pub costs: EstimatorCosts,

    /// Optional document-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("figures"),
            use_vision: false,
            use_ocr: false,
            execution: ExecutionMode::default(),
            acquire_concurrency: default_concurrency(),
            classify_concurrency: default_concurrency(),
            render_dpi: 200,
            ocr_language: "eng".to_string(),
            min_layer_bytes: 200,
            min_render_bytes: 1000,
            candidates: CandidateParams::default(),
            thresholds: ClassifierThresholds::default(),
            costs: EstimatorCosts::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("output_root", &self.output_root)
            .field("use_vision", &self.use_vision)
            .field("use_ocr", &self.use_ocr)
            .field("execution", &self.execution)
            .field("acquire_concurrency", &self.acquire_concurrency)
            .field("classify_concurrency", &self.classify_concurrency)
            .field("render_dpi", &self.render_dpi)
            .field("ocr_language", &self.ocr_language)
            .field("min_layer_bytes", &self.min_layer_bytes)
            .field("min_render_bytes", &self.min_render_bytes)
            .field("candidates", &self.candidates)
            .field("thresholds", &self.thresholds)
            .field("costs", &self.costs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Concurrency cap for the acquisition stage under the configured mode.
    pub fn acquire_cap(&self) -> usize {
        match self.execution {
            ExecutionMode::Parallel => self.acquire_concurrency,
            ExecutionMode::Serial => 1,
        }
    }

    /// Concurrency cap for the classification stage under the configured mode.
    pub fn classify_cap(&self) -> usize {
        match self.execution {
            ExecutionMode::Parallel => self.classify_concurrency,
            ExecutionMode::Serial => 1,
        }
    }
}

/// `max(2, available hardware parallelism)`.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(2)
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.output_root = root.into();
        self
    }

    pub fn use_vision(mut self, v: bool) -> Self {
        self.config.use_vision = v;
        self
    }

    pub fn use_ocr(mut self, v: bool) -> Self {
        self.config.use_ocr = v;
        self
    }

    pub fn execution(mut self, mode: ExecutionMode) -> Self {
        self.config.execution = mode;
        self
    }

    pub fn acquire_concurrency(mut self, n: usize) -> Self {
        self.config.acquire_concurrency = n.max(1);
        self
    }

    pub fn classify_concurrency(mut self, n: usize) -> Self {
        self.config.classify_concurrency = n.max(1);
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn min_layer_bytes(mut self, bytes: u64) -> Self {
        self.config.min_layer_bytes = bytes;
        self
    }

    pub fn min_render_bytes(mut self, bytes: u64) -> Self {
        self.config.min_render_bytes = bytes;
        self
    }

    pub fn candidates(mut self, params: CandidateParams) -> Self {
        self.config.candidates = params;
        self
    }

    pub fn thresholds(mut self, thresholds: ClassifierThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn costs(mut self, costs: EstimatorCosts) -> Self {
        self.config.costs = costs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, FigexError> {
        let c = &self.config;
        if c.output_root.as_os_str().is_empty() {
            return Err(FigexError::InvalidConfig(
                "Output root must not be empty".into(),
            ));
        }
        if c.use_ocr && !c.use_vision {
            return Err(FigexError::InvalidConfig(
                "OCR confirmation requires vision-assisted mode".into(),
            ));
        }
        if c.acquire_concurrency == 0 || c.classify_concurrency == 0 {
            return Err(FigexError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        let p = &c.candidates;
        if !(0.0..=1.0).contains(&p.min_area_fraction)
            || !(0.0..=1.0).contains(&p.max_area_fraction)
            || p.min_area_fraction > p.max_area_fraction
        {
            return Err(FigexError::InvalidConfig(format!(
                "Candidate area fractions must satisfy 0 ≤ min ≤ max ≤ 1, got {}..{}",
                p.min_area_fraction, p.max_area_fraction
            )));
        }
        let t = &c.thresholds;
        if !(t.sparse_text < t.pure_text && t.pure_text <= t.dense_text) {
            return Err(FigexError::InvalidConfig(format!(
                "Density thresholds must satisfy sparse < pure ≤ dense, got {} / {} / {}",
                t.sparse_text, t.pure_text, t.dense_text
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the task pool schedules jobs.
///
/// Both modes produce the same set of output files; serial exists as a
/// safety valve for environments where many concurrent tool processes are
/// unstable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Up to the configured cap of jobs in flight per stage. (default)
    #[default]
    Parallel,
    /// One job at a time, in submission order.
    Serial,
}

// ── Tunables ─────────────────────────────────────────────────────────────

/// Constants of the region-proposal pass and the text-density measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateParams {
    /// Adaptive-threshold neighbourhood for the proposal mask.
    pub block_size: u32,
    /// Offset subtracted from the local mean for the proposal mask.
    pub threshold_offset: f32,
    /// Square dilation kernel size.
    pub dilate_kernel: u32,
    /// Dilation repetitions.
    pub dilate_iterations: u32,
    /// Boxes smaller than this share of the image area are dropped.
    pub min_area_fraction: f64,
    /// Boxes larger than this share of the image area are dropped.
    pub max_area_fraction: f64,
    /// Boxes narrower or shorter than this (pixels) are dropped.
    pub min_side: u32,
    /// Padding added on each side, as a share of the box's width / height.
    pub padding_fraction: f64,
    /// Adaptive-threshold neighbourhood for the density pass.
    pub density_block_size: u32,
    /// Offset for the density pass.
    pub density_threshold_offset: f32,
    /// Closing kernel for the density pass.
    pub close_kernel: u32,
    /// Shape window for "text-like" components.
    pub glyph: GlyphFilter,
    /// Density is reported per this many pixels.
    pub density_scale: f64,
}

impl Default for CandidateParams {
    fn default() -> Self {
        Self {
            block_size: 25,
            threshold_offset: 15.0,
            dilate_kernel: 5,
            dilate_iterations: 3,
            min_area_fraction: 0.01,
            max_area_fraction: 0.70,
            min_side: 100,
            padding_fraction: 0.05,
            density_block_size: 15,
            density_threshold_offset: 10.0,
            close_kernel: 3,
            glyph: GlyphFilter::default(),
            density_scale: 10_000.0,
        }
    }
}

/// Open intervals a connected component must fall into to count as a glyph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlyphFilter {
    pub min_height: u32,
    pub max_height: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub min_area: u64,
}

impl Default for GlyphFilter {
    fn default() -> Self {
        Self {
            min_height: 5,
            max_height: 50,
            min_width: 3,
            max_width: 200,
            min_aspect: 0.2,
            max_aspect: 10.0,
            min_area: 20,
        }
    }
}

/// Decision constants of the figure/text classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierThresholds {
    /// Above this density a region is only a figure if it also has graphics.
    pub dense_text: f64,
    /// Above this density (and not above `dense_text`) a region is pure text.
    pub pure_text: f64,
    /// Below this density a region is accepted outright.
    pub sparse_text: f64,
    /// Edge-pixel share must be strictly above this to count as graphics.
    pub edge_density_min: f64,
    /// Edge-pixel share must be strictly below this to count as graphics.
    pub edge_density_max: f64,
    /// Canny low hysteresis threshold.
    pub canny_low: f32,
    /// Canny high hysteresis threshold.
    pub canny_high: f32,
    /// OCR mean confidence must be strictly above this to confirm text.
    pub ocr_min_confidence: f32,
    /// OCR word count must be strictly above this to confirm text.
    pub ocr_min_words: usize,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            dense_text: 20.0,
            pure_text: 10.0,
            sparse_text: 2.0,
            edge_density_min: 0.005,
            edge_density_max: 0.15,
            canny_low: 50.0,
            canny_high: 150.0,
            ocr_min_confidence: 70.0,
            ocr_min_words: 25,
        }
    }
}

/// Per-document work-unit costs used for the progress total.
///
/// These are estimates for a progress bar, not a certified count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorCosts {
    /// Units per page when pages are rendered and then classified.
    pub render_multiplier: u64,
    /// Flat cost for extracting and classifying an unknown number of images.
    pub extraction_average: u64,
    /// Cost of a document no strategy can handle.
    pub unsupported: u64,
}

impl Default for EstimatorCosts {
    fn default() -> Self {
        Self {
            render_multiplier: 2,
            extraction_average: 6,
            unsupported: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ExtractionConfig::default();
        assert_eq!(c.render_dpi, 200);
        assert!(!c.use_vision);
        assert!(!c.use_ocr);
        assert_eq!(c.execution, ExecutionMode::Parallel);
        assert_eq!(c.min_layer_bytes, 200);
        assert_eq!(c.min_render_bytes, 1000);
        assert_eq!(c.thresholds.dense_text, 20.0);
        assert_eq!(c.costs.extraction_average, 6);
    }

    #[test]
    fn debug_lists_blank_page_thresholds() {
        let c = ExtractionConfig::builder()
            .min_layer_bytes(321)
            .min_render_bytes(4321)
            .build()
            .unwrap();
        let shown = format!("{:?}", c);
        assert!(shown.contains("min_layer_bytes: 321"), "{shown}");
        assert!(shown.contains("min_render_bytes: 4321"), "{shown}");
    }

    #[test]
    fn default_concurrency_is_at_least_two() {
        assert!(default_concurrency() >= 2);
        assert!(ExtractionConfig::default().acquire_concurrency >= 2);
        assert!(ExtractionConfig::default().classify_concurrency >= 2);
    }

    #[test]
    fn serial_mode_caps_at_one() {
        let c = ExtractionConfig::builder()
            .execution(ExecutionMode::Serial)
            .acquire_concurrency(8)
            .build()
            .unwrap();
        assert_eq!(c.acquire_cap(), 1);
        assert_eq!(c.classify_cap(), 1);
    }

    #[test]
    fn builder_clamps_dpi_and_concurrency() {
        let c = ExtractionConfig::builder()
            .render_dpi(5000)
            .acquire_concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.render_dpi, 600);
        assert_eq!(c.acquire_concurrency, 1);
    }

    #[test]
    fn ocr_without_vision_is_rejected() {
        let err = ExtractionConfig::builder().use_ocr(true).build().unwrap_err();
        assert!(matches!(err, FigexError::InvalidConfig(_)));
    }

    #[test]
    fn empty_output_root_is_rejected() {
        let err = ExtractionConfig::builder().output_root("").build().unwrap_err();
        assert!(err.to_string().contains("Output root"));
    }

    #[test]
    fn inverted_density_thresholds_are_rejected() {
        let thresholds = ClassifierThresholds {
            sparse_text: 12.0,
            ..ClassifierThresholds::default()
        };
        assert!(ExtractionConfig::builder()
            .thresholds(thresholds)
            .build()
            .is_err());
    }

    #[test]
    fn thresholds_round_trip_through_json() {
        let t = ClassifierThresholds::default();
        let json = serde_json::to_string(&t).unwrap();
        let back: ClassifierThresholds = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
