//! OCR confirmation engine.
//!
//! The classifier only asks one question of OCR: "is this region a block of
//! confidently recognised prose?". [`OcrEngine`] returns the raw reading
//! (mean confidence and text); the thresholds live with the classifier.
//!
//! [`TesseractOcr`] drives the `tesseract` CLI through [`ToolRunner`] and
//! parses its TSV output, so tests run against a scripted runner.

use crate::error::JobError;
use crate::tools::{ToolInvocation, ToolRunner};
use image::{GrayImage, ImageFormat};
use std::sync::Arc;
use tracing::debug;

/// TSV row level of a single recognised word.
const WORD_LEVEL: &str = "5";

/// Result of recognising one region.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrReading {
    /// Mean word confidence, 0–100. 0 when nothing was recognised.
    pub mean_confidence: f32,
    pub text: String,
}

impl OcrReading {
    /// Whitespace-separated tokens in the recognised text.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Text recognition over a grayscale region.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, region: &GrayImage) -> Result<OcrReading, JobError>;
}

/// [`OcrEngine`] backed by the `tesseract` command-line tool.
pub struct TesseractOcr {
    runner: Arc<dyn ToolRunner>,
    language: String,
}

impl std::fmt::Debug for TesseractOcr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TesseractOcr")
            .field("language", &self.language)
            .finish()
    }
}

impl TesseractOcr {
    /// Check that tesseract runs and knows every language in `language`
    /// (`eng`, or `eng+fra` style combinations).
    pub fn initialize(runner: Arc<dyn ToolRunner>, language: &str) -> Result<Self, JobError> {
        let out = runner
            .run(&ToolInvocation::new("tesseract").arg("--list-langs"))
            .map_err(|e| JobError::OcrUnavailable {
                detail: e.to_string(),
            })?;

        // Older releases print the list on stderr.
        let installed: Vec<&str> = out
            .stdout
            .lines()
            .chain(out.stderr.lines())
            .map(str::trim)
            .collect();
        if let Some(missing) = language
            .split('+')
            .find(|lang| !installed.contains(lang))
        {
            return Err(JobError::OcrUnavailable {
                detail: format!("language '{}' is not installed", missing),
            });
        }

        debug!("tesseract ready (language={})", language);
        Ok(Self {
            runner,
            language: language.to_string(),
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, region: &GrayImage) -> Result<OcrReading, JobError> {
        let scratch = tempfile::Builder::new()
            .prefix("figex-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| JobError::ToolExecutionFailure {
                tool: "tesseract".into(),
                detail: format!("scratch file: {}", e),
            })?;
        region
            .save_with_format(scratch.path(), ImageFormat::Png)
            .map_err(|e| JobError::ToolExecutionFailure {
                tool: "tesseract".into(),
                detail: format!("scratch write: {}", e),
            })?;

        let inv = ToolInvocation::new("tesseract")
            .arg(scratch.path())
            .args(["stdout", "-l", self.language.as_str(), "--psm", "3", "tsv"]);
        let out = self.runner.run(&inv)?;
        Ok(parse_tsv(&out.stdout))
    }
}

/// Mean confidence and text of the word rows in tesseract's TSV output.
///
/// Rows with a negative confidence are layout rows (blocks, lines) or
/// empty detections and are skipped.
pub fn parse_tsv(tsv: &str) -> OcrReading {
    let mut confidence_sum = 0.0f32;
    let mut words: Vec<&str> = Vec::new();

    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 11 || cols[0] != WORD_LEVEL {
            continue;
        }
        let Ok(conf) = cols[10].trim().parse::<f32>() else {
            continue;
        };
        let text = cols.get(11).map(|t| t.trim()).unwrap_or("");
        if conf < 0.0 || text.is_empty() {
            continue;
        }
        confidence_sum += conf;
        words.push(text);
    }

    let mean_confidence = if words.is_empty() {
        0.0
    } else {
        confidence_sum / words.len() as f32
    };
    OcrReading {
        mean_confidence,
        text: words.join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    struct Scripted {
        langs: &'static str,
        tsv: String,
    }

    impl ToolRunner for Scripted {
        fn run(&self, inv: &ToolInvocation) -> Result<ToolOutput, JobError> {
            let args = inv.arg_strings();
            if args.first().map(String::as_str) == Some("--list-langs") {
                return Ok(ToolOutput {
                    stdout: self.langs.to_string(),
                    stderr: String::new(),
                });
            }
            assert_eq!(&args[1..], ["stdout", "-l", "eng", "--psm", "3", "tsv"]);
            assert!(std::path::Path::new(&args[0]).exists(), "region not written");
            Ok(ToolOutput {
                stdout: self.tsv.clone(),
                stderr: String::new(),
            })
        }
    }

    fn tsv(rows: &[&str]) -> String {
        let mut s = String::from(HEADER);
        for r in rows {
            s.push('\n');
            s.push_str(r);
        }
        s
    }

    #[test]
    fn parses_word_rows_only() {
        let out = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t",
            "4\t1\t1\t1\t1\t0\t0\t0\t100\t20\t-1\t",
            "5\t1\t1\t1\t1\t1\t0\t0\t30\t20\t90.5\tHello",
            "5\t1\t1\t1\t1\t2\t35\t0\t30\t20\t80.5\tworld",
            "5\t1\t1\t1\t1\t3\t70\t0\t30\t20\t-1\t",
        ]);
        let r = parse_tsv(&out);
        assert_eq!(r.text, "Hello world");
        assert_eq!(r.word_count(), 2);
        assert!((r.mean_confidence - 85.5).abs() < 1e-4);
    }

    #[test]
    fn empty_output_reads_as_nothing() {
        let r = parse_tsv(HEADER);
        assert_eq!(r.mean_confidence, 0.0);
        assert_eq!(r.word_count(), 0);
        assert_eq!(parse_tsv("").word_count(), 0);
    }

    #[test]
    fn initialize_requires_the_language() {
        let runner: Arc<dyn ToolRunner> = Arc::new(Scripted {
            langs: "List of available languages (2):\neng\nosd\n",
            tsv: String::new(),
        });
        assert!(TesseractOcr::initialize(Arc::clone(&runner), "eng").is_ok());
        let err = TesseractOcr::initialize(runner, "eng+deu").unwrap_err();
        assert!(matches!(err, JobError::OcrUnavailable { ref detail } if detail.contains("deu")));
    }

    #[test]
    fn missing_binary_is_ocr_unavailable() {
        struct Nothing;
        impl ToolRunner for Nothing {
            fn run(&self, inv: &ToolInvocation) -> Result<ToolOutput, JobError> {
                Err(JobError::ToolUnavailable {
                    tool: inv.program.clone(),
                })
            }
        }
        let err = TesseractOcr::initialize(Arc::new(Nothing), "eng").unwrap_err();
        assert!(matches!(err, JobError::OcrUnavailable { .. }));
    }

    #[test]
    fn recognize_writes_region_and_parses_reply() {
        let runner = Arc::new(Scripted {
            langs: "eng\n",
            tsv: tsv(&["5\t1\t1\t1\t1\t1\t0\t0\t30\t20\t75\tFigure"]),
        });
        let ocr = TesseractOcr::initialize(runner, "eng").unwrap();
        let reading = ocr.recognize(&GrayImage::new(40, 20)).unwrap();
        assert_eq!(reading.text, "Figure");
        assert_eq!(reading.mean_confidence, 75.0);
    }
}
