//! Per-image classification pass: propose, classify, write accepted crops.
//!
//! One image is one work unit. Accepted regions are cut from the *colour*
//! image and written as
//! `<document folder>/opencv_figures/<image stem>_figure_<i>.png`, where `i`
//! counts accepted candidates in descending-area order. The numbering
//! depends only on the image's pixels, so serial and parallel runs write the
//! same file names.

use crate::config::{CandidateParams, ClassifierThresholds};
use crate::document::stem_of;
use crate::error::JobError;
use crate::output::FigureRecord;
use crate::pipeline::candidates::{self, FigureCandidate};
use crate::pipeline::classify::FigureClassifier;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::pool::TaskPool;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use vision_kit::VisionToolkit;

/// Name of the figure folder inside each document folder.
pub const FIGURES_DIR: &str = "opencv_figures";

/// Raster formats the detector reads.
const CLASSIFIABLE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff"];

/// Whether `path` is an image the classification pass should read.
pub fn is_classifiable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| CLASSIFIABLE_EXTENSIONS.contains(&e.as_str()))
}

/// `<stem>_figure_<index>.png`.
pub fn figure_file_name(source: &Path, index: usize) -> String {
    format!("{}_figure_{}.png", stem_of(source), index)
}

/// What one image yielded: the figures written and the writes that failed.
#[derive(Debug, Default)]
pub struct ImageOutcome {
    pub figures: Vec<FigureRecord>,
    pub failures: Vec<JobError>,
}

/// Candidate generator + classifier, shareable across pool workers.
pub struct FigureDetector {
    toolkit: Arc<dyn VisionToolkit>,
    ocr: Option<Arc<dyn OcrEngine>>,
    params: CandidateParams,
    thresholds: ClassifierThresholds,
}

impl FigureDetector {
    pub fn new(
        toolkit: Arc<dyn VisionToolkit>,
        ocr: Option<Arc<dyn OcrEngine>>,
        params: CandidateParams,
        thresholds: ClassifierThresholds,
    ) -> Self {
        Self {
            toolkit,
            ocr,
            params,
            thresholds,
        }
    }

    /// Accepted candidates of one decoded image, in output order.
    pub fn detect(&self, image: &DynamicImage) -> Vec<FigureCandidate> {
        let gray = self.toolkit.grayscale(image);
        let classifier = FigureClassifier::new(
            self.toolkit.as_ref(),
            &self.thresholds,
            self.ocr.as_deref(),
        );
        candidates::propose(self.toolkit.as_ref(), &gray, &self.params)
            .into_iter()
            .filter(|c| {
                let region = candidates::crop(&gray, c.bbox);
                classifier.classify(&region, c.text_density).is_accept()
            })
            .collect()
    }

    /// Decode `source`, detect figures and write them under `figures_dir`.
    ///
    /// A failed write is recorded and the remaining figures are still
    /// written; only decode and folder errors fail the whole image.
    pub fn process_image(&self, source: &Path, figures_dir: &Path) -> Result<ImageOutcome, JobError> {
        let image = image::open(source).map_err(|e| JobError::UndecodableImage {
            path: source.to_path_buf(),
            detail: e.to_string(),
        })?;

        let accepted = self.detect(&image);
        debug!("{}: {} figure(s)", source.display(), accepted.len());
        if accepted.is_empty() {
            return Ok(ImageOutcome::default());
        }

        std::fs::create_dir_all(figures_dir).map_err(|e| JobError::OutputUnwritable {
            path: figures_dir.to_path_buf(),
            detail: e.to_string(),
        })?;

        let mut outcome = ImageOutcome {
            figures: Vec::with_capacity(accepted.len()),
            failures: Vec::new(),
        };
        for (i, c) in accepted.iter().enumerate() {
            let index = i + 1;
            let path = figures_dir.join(figure_file_name(source, index));
            let written = image
                .crop_imm(c.bbox.x, c.bbox.y, c.bbox.width, c.bbox.height)
                .save_with_format(&path, image::ImageFormat::Png);
            match written {
                Ok(()) => outcome.figures.push(FigureRecord {
                    source: source.to_path_buf(),
                    path,
                    index,
                    bbox: c.bbox.into(),
                    text_density: c.text_density,
                }),
                Err(e) => {
                    let err = JobError::FigureWriteFailed {
                        path,
                        detail: e.to_string(),
                    };
                    warn!("{}", err);
                    outcome.failures.push(err);
                }
            }
        }
        Ok(outcome)
    }

    /// Classify every classifiable image on `pool`.
    ///
    /// Returns the written figures sorted by `(source, index)` and the
    /// per-image failures.
    pub async fn classify_all(
        self: Arc<Self>,
        images: &[PathBuf],
        figures_dir: &Path,
        pool: &TaskPool,
    ) -> (Vec<FigureRecord>, Vec<JobError>) {
        let jobs: Vec<PathBuf> = images.iter().filter(|p| is_classifiable(p)).cloned().collect();
        let dir = figures_dir.to_path_buf();
        let results = pool
            .run(jobs, move |path| self.process_image(&path, &dir))
            .await;

        let mut figures = Vec::new();
        let mut failures = Vec::new();
        for r in results {
            match r {
                Ok(outcome) => {
                    figures.extend(outcome.figures);
                    failures.extend(outcome.failures);
                }
                Err(e) => {
                    warn!("{}", e);
                    failures.push(e);
                }
            }
        }
        figures.sort_by(|a, b| a.source.cmp(&b.source).then(a.index.cmp(&b.index)));
        (figures, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionMode;
    use crate::pipeline::testing::ScriptedToolkit;
    use crate::progress::ProgressState;
    use image::{Rgb, RgbImage};
    use vision_kit::BoundingBox;

    fn detector(boxes: Vec<BoundingBox>) -> Arc<FigureDetector> {
        Arc::new(FigureDetector::new(
            Arc::new(ScriptedToolkit {
                boxes,
                ..Default::default()
            }),
            None,
            CandidateParams::default(),
            ClassifierThresholds::default(),
        ))
    }

    fn page(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(1000, 1000, Rgb([250, 250, 250]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn extension_filter() {
        assert!(is_classifiable(Path::new("a/page_0001.png")));
        assert!(is_classifiable(Path::new("img-003.JPG")));
        assert!(is_classifiable(Path::new("scan.tiff")));
        assert!(!is_classifiable(Path::new("diagram.svg")));
        assert!(!is_classifiable(Path::new("img-004.jb2e")));
    }

    #[test]
    fn figures_are_numbered_by_area() {
        let dir = tempfile::tempdir().unwrap();
        let src = page(dir.path(), "page_0001.png");
        let det = detector(vec![
            BoundingBox::new(600, 600, 150, 150),
            BoundingBox::new(100, 100, 300, 300),
        ]);
        let figs = dir.path().join(FIGURES_DIR);
        let records = det.process_image(&src, &figs).unwrap().figures;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, figs.join("page_0001_figure_1.png"));
        assert_eq!(records[0].bbox.width, 330);
        assert_eq!(records[1].path, figs.join("page_0001_figure_2.png"));
        let first = image::open(&records[0].path).unwrap();
        assert_eq!((first.width(), first.height()), (330, 330));
    }

    #[test]
    fn nothing_accepted_writes_no_folder() {
        let dir = tempfile::tempdir().unwrap();
        let src = page(dir.path(), "page_0001.png");
        let figs = dir.path().join(FIGURES_DIR);
        assert!(detector(vec![]).process_image(&src, &figs).unwrap().figures.is_empty());
        assert!(!figs.exists());
    }

    #[test]
    fn failed_write_keeps_figures_already_written() {
        let dir = tempfile::tempdir().unwrap();
        let src = page(dir.path(), "page_0001.png");
        let det = detector(vec![
            BoundingBox::new(600, 600, 150, 150),
            BoundingBox::new(100, 100, 300, 300),
        ]);
        let figs = dir.path().join(FIGURES_DIR);
        // A directory squatting on the second figure's name blocks that write.
        std::fs::create_dir_all(figs.join("page_0001_figure_2.png")).unwrap();

        let outcome = det.process_image(&src, &figs).unwrap();
        assert_eq!(outcome.figures.len(), 1);
        assert_eq!(outcome.figures[0].path, figs.join("page_0001_figure_1.png"));
        assert!(outcome.figures[0].path.is_file());
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            &outcome.failures[0],
            JobError::FigureWriteFailed { path, .. } if path == &figs.join("page_0001_figure_2.png")
        ));
    }

    #[tokio::test]
    async fn classify_all_reports_write_failures_next_to_figures() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![page(dir.path(), "page_0001.png")];
        let figs = dir.path().join(FIGURES_DIR);
        std::fs::create_dir_all(figs.join("page_0001_figure_2.png")).unwrap();
        let progress = Arc::new(ProgressState::new(1));
        let pool = TaskPool::new(1, ExecutionMode::Serial, Arc::clone(&progress));
        let det = detector(vec![
            BoundingBox::new(100, 100, 300, 300),
            BoundingBox::new(600, 600, 150, 150),
        ]);

        let (figures, failures) = det.classify_all(&images, &figs, &pool).await;
        assert_eq!(figures.len(), 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(progress.processed(), 1);
    }

    #[test]
    fn garbage_is_undecodable() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("img-000.png");
        std::fs::write(&src, b"not a png").unwrap();
        let err = detector(vec![])
            .process_image(&src, &dir.path().join(FIGURES_DIR))
            .unwrap_err();
        assert!(matches!(err, JobError::UndecodableImage { .. }));
    }

    #[tokio::test]
    async fn classify_all_counts_each_classifiable_image() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![
            page(dir.path(), "page_0001.png"),
            page(dir.path(), "page_0002.png"),
            dir.path().join("cover.svg"),
        ];
        let progress = Arc::new(ProgressState::new(10));
        let pool = TaskPool::new(2, ExecutionMode::Parallel, Arc::clone(&progress));
        let det = detector(vec![BoundingBox::new(100, 100, 300, 300)]);

        let (figures, failures) = det
            .classify_all(&images, &dir.path().join(FIGURES_DIR), &pool)
            .await;
        assert!(failures.is_empty());
        assert_eq!(progress.processed(), 2);
        let names: Vec<String> = figures
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page_0001_figure_1.png", "page_0002_figure_1.png"]);
    }
}
