//! Capability matrix: which external tools this run may use.
//!
//! Probed once before a run and passed by value afterwards. Nothing mutates
//! it mid-run, so every worker can read it without synchronisation.

use crate::tools::{ToolInvocation, ToolRunner};
use crate::error::JobError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Booleans describing the usable tools and toolkits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilityMatrix {
    /// `pdftoppm` + `pdfinfo`: rasterise PDF pages and count them.
    pub render_pdf: bool,
    /// `pdfimages`: dump embedded PDF rasters.
    pub extract_pdf_images: bool,
    /// `ddjvu` + `djvused` + `djvuextract`: render, count and probe DJVU pages.
    pub handle_djvu: bool,
    /// `soffice`: convert office / ebook documents to PDF or DOCX.
    pub convert_documents: bool,
    /// Unpack zip-based containers (in-process).
    pub extract_containers: bool,
    /// Figure detection toolkit (compiled in).
    pub vision_toolkit: bool,
    /// `tesseract`: OCR confirmation.
    pub ocr: bool,
}

impl CapabilityMatrix {
    /// Everything available. Mostly useful for tests and planning.
    pub fn all() -> Self {
        Self {
            render_pdf: true,
            extract_pdf_images: true,
            handle_djvu: true,
            convert_documents: true,
            extract_containers: true,
            vision_toolkit: true,
            ocr: true,
        }
    }

    /// Only the in-process capabilities; no external tool.
    pub fn builtin_only() -> Self {
        Self {
            extract_containers: true,
            vision_toolkit: true,
            ..Self::default()
        }
    }

    /// Probe the environment through `runner`.
    ///
    /// A tool counts as present when it can be spawned at all; several of
    /// these print their usage and exit non-zero for `--help`.
    pub fn probe(runner: &dyn ToolRunner) -> Self {
        let has = |program: &str, args: &[&str]| -> bool {
            let inv = ToolInvocation::new(program).args(args);
            let present = !matches!(runner.run(&inv), Err(JobError::ToolUnavailable { .. }));
            debug!("probe {}: {}", program, if present { "found" } else { "missing" });
            present
        };

        let matrix = Self {
            render_pdf: has("pdftoppm", &["-v"]) && has("pdfinfo", &["-v"]),
            extract_pdf_images: has("pdfimages", &["-v"]),
            handle_djvu: has("ddjvu", &["--help"])
                && has("djvused", &["--help"])
                && has("djvuextract", &[]),
            convert_documents: has("soffice", &["--version"]),
            extract_containers: true,
            vision_toolkit: true,
            ocr: has("tesseract", &["--version"]),
        };
        info!("Capabilities: {}", matrix.summary());
        matrix
    }

    /// One-line `name=yes/no` listing for logs.
    pub fn summary(&self) -> String {
        self.entries()
            .iter()
            .map(|(name, on)| format!("{}={}", name, if *on { "yes" } else { "no" }))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `(name, available)` pairs in a stable order.
    pub fn entries(&self) -> [(&'static str, bool); 7] {
        [
            ("render_pdf", self.render_pdf),
            ("extract_pdf_images", self.extract_pdf_images),
            ("handle_djvu", self.handle_djvu),
            ("convert_documents", self.convert_documents),
            ("extract_containers", self.extract_containers),
            ("vision_toolkit", self.vision_toolkit),
            ("ocr", self.ocr),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;

    /// Pretends only the listed programs are installed; `ddjvu` always exits 1.
    struct Installed(Vec<&'static str>);

    impl ToolRunner for Installed {
        fn run(&self, inv: &ToolInvocation) -> Result<ToolOutput, JobError> {
            if !self.0.contains(&inv.program.as_str()) {
                return Err(JobError::ToolUnavailable {
                    tool: inv.program.clone(),
                });
            }
            if inv.program == "ddjvu" {
                return Err(JobError::ToolExecutionFailure {
                    tool: inv.program.clone(),
                    detail: "usage".into(),
                });
            }
            Ok(ToolOutput::default())
        }
    }

    #[test]
    fn nothing_installed_leaves_builtins() {
        let m = CapabilityMatrix::probe(&Installed(vec![]));
        assert_eq!(m, CapabilityMatrix::builtin_only());
    }

    #[test]
    fn non_zero_exit_still_counts_as_present() {
        let m = CapabilityMatrix::probe(&Installed(vec!["ddjvu", "djvused", "djvuextract"]));
        assert!(m.handle_djvu);
        assert!(!m.render_pdf);
    }

    #[test]
    fn render_needs_both_poppler_tools() {
        let m = CapabilityMatrix::probe(&Installed(vec!["pdftoppm"]));
        assert!(!m.render_pdf);
        let m = CapabilityMatrix::probe(&Installed(vec!["pdftoppm", "pdfinfo", "pdfimages"]));
        assert!(m.render_pdf);
        assert!(m.extract_pdf_images);
    }

    #[test]
    fn summary_lists_every_entry() {
        let s = CapabilityMatrix::all().summary();
        assert_eq!(s.matches("=yes").count(), 7);
        assert!(s.contains("ocr=yes"));
    }
}
