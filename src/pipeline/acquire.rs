//! Page acquisition: turn a document into raster images on disk.
//!
//! One [`Acquirer`] method per external job, each blocking and each safe to
//! run on a pool worker. [`Acquirer::acquire`] fans them out through the
//! [`TaskPool`] according to the dispatched [`Strategy`].
//!
//! ## Output naming
//!
//! Every file name is derived from the job's input, never from a counter
//! shared between workers:
//!
//! | Strategy | Files |
//! |----------|-------|
//! | render (PDF / DJVU) | `page_<NNNN>.png`, page number zero-padded to 4 |
//! | `ExtractEmbeddedDjvu` | `page_<NNNN>.png` for pages that carry a background layer |
//! | `ExtractEmbedded` | whatever `pdfimages -all <doc> img` produces (`img-000.png`, `img-001.jpg`, …) |
//! | containers | member file names, directories dropped |
//!
//! Scratch files (converted documents, DJVU layers) go into a `tempfile`
//! directory inside the document folder, unique per document and removed
//! when the strategy finishes.

use crate::capability::CapabilityMatrix;
use crate::config::ExtractionConfig;
use crate::document::{Document, DocumentKind};
use crate::error::JobError;
use crate::pipeline::dispatch::{self, Strategy};
use crate::pipeline::pool::TaskPool;
use crate::tools::{expect_artifact, ToolInvocation, ToolRunner};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// `Pages:          12` in `pdfinfo` output.
static RE_PDFINFO_PAGES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Pages:\s+(\d+)\s*$").unwrap());

/// Extensions unpacked from zip-based containers.
const CONTAINER_IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "svg", "wmf", "emf",
];

/// `page_0007.png` for page 7.
pub fn page_image_name(page: usize) -> String {
    format!("page_{:04}.png", page)
}

/// Raster images produced for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquired {
    /// The strategy that actually ran (differs from the dispatched one after
    /// a failed conversion).
    pub strategy: Strategy,
    pub images: Vec<PathBuf>,
    pub failures: Vec<JobError>,
}

impl Acquired {
    fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            images: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn absorb<T>(&mut self, results: Vec<Result<T, JobError>>, mut keep: impl FnMut(&mut Self, T)) {
        for r in results {
            match r {
                Ok(v) => keep(self, v),
                Err(e) => {
                    warn!("{}", e);
                    self.failures.push(e);
                }
            }
        }
    }
}

/// Runs render / extract / convert jobs for one run's configuration.
#[derive(Clone)]
pub struct Acquirer {
    runner: Arc<dyn ToolRunner>,
    dpi: u32,
    min_layer_bytes: u64,
    min_render_bytes: u64,
}

impl std::fmt::Debug for Acquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquirer")
            .field("dpi", &self.dpi)
            .field("min_layer_bytes", &self.min_layer_bytes)
            .field("min_render_bytes", &self.min_render_bytes)
            .finish()
    }
}

impl Acquirer {
    pub fn new(runner: Arc<dyn ToolRunner>, config: &ExtractionConfig) -> Self {
        Self {
            runner,
            dpi: config.render_dpi,
            min_layer_bytes: config.min_layer_bytes,
            min_render_bytes: config.min_render_bytes,
        }
    }

    // ── Page counts ──────────────────────────────────────────────────────

    /// Page count of a PDF or DJVU; 1 for every other kind.
    pub fn page_count(&self, path: &Path, kind: DocumentKind) -> Result<usize, JobError> {
        match kind {
            DocumentKind::Pdf => self.pdf_page_count(path),
            DocumentKind::Djvu => self.djvu_page_count(path),
            _ => Ok(1),
        }
    }

    pub fn pdf_page_count(&self, pdf: &Path) -> Result<usize, JobError> {
        let out = self.runner.run(&ToolInvocation::new("pdfinfo").arg(pdf))?;
        parse_pdfinfo_pages(&out.stdout).ok_or_else(|| JobError::ToolExecutionFailure {
            tool: "pdfinfo".into(),
            detail: "no page count in output".into(),
        })
    }

    pub fn djvu_page_count(&self, djvu: &Path) -> Result<usize, JobError> {
        let out = self
            .runner
            .run(&ToolInvocation::new("djvused").args(["-e", "n"]).arg(djvu))?;
        out.stdout
            .lines()
            .next()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .ok_or_else(|| JobError::ToolExecutionFailure {
                tool: "djvused".into(),
                detail: "no page count in output".into(),
            })
    }

    // ── Single jobs ──────────────────────────────────────────────────────

    /// Rasterise one PDF page (1-based) to `out_dir/page_NNNN.png`.
    pub fn render_pdf_page(&self, pdf: &Path, out_dir: &Path, page: usize) -> Result<PathBuf, JobError> {
        let target = out_dir.join(page_image_name(page));
        // -singlefile appends ".png" to the root itself.
        let root = target.with_extension("");
        let dpi = self.dpi.to_string();
        let page_arg = page.to_string();
        let inv = ToolInvocation::new("pdftoppm")
            .args(["-png", "-r", dpi.as_str()])
            .args(["-f", page_arg.as_str(), "-l", page_arg.as_str(), "-singlefile"])
            .arg(pdf)
            .arg(&root);
        self.runner.run(&inv)?;
        expect_artifact("pdftoppm", &target, 0)
    }

    /// Rasterise one DJVU page (1-based) to `out_dir/page_NNNN.png`.
    pub fn render_djvu_page(&self, djvu: &Path, out_dir: &Path, page: usize) -> Result<PathBuf, JobError> {
        let target = out_dir.join(page_image_name(page));
        self.run_ddjvu(djvu, page, &target)?;
        expect_artifact("ddjvu", &target, 0)
    }

    fn run_ddjvu(&self, djvu: &Path, page: usize, target: &Path) -> Result<(), JobError> {
        let inv = ToolInvocation::new("ddjvu")
            .arg("-format=png")
            .arg(format!("-page={}", page))
            .arg(djvu)
            .arg(target);
        self.runner.run(&inv).map(|_| ())
    }

    /// Dump every embedded raster of a PDF into `out_dir` as `img-*`.
    ///
    /// `pdfimages` writes into a private scratch directory first so only the
    /// files of this call are returned, never older `img*` entries.
    pub fn extract_pdf_images(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, JobError> {
        let scratch = scratch_dir(out_dir, "_pdfimages")?;
        let inv = ToolInvocation::new("pdfimages")
            .arg("-all")
            .arg(pdf)
            .arg(scratch.path().join("img"));
        self.runner.run(&inv)?;
        let mut images = Vec::new();
        for produced in files_with_prefix(scratch.path(), "img") {
            let Some(name) = produced.file_name() else {
                continue;
            };
            let target = out_dir.join(name);
            std::fs::rename(&produced, &target).map_err(|e| JobError::OutputUnwritable {
                path: target.clone(),
                detail: e.to_string(),
            })?;
            images.push(target);
        }
        debug!("pdfimages: {} image(s) from {}", images.len(), pdf.display());
        Ok(images)
    }

    /// Render one DJVU page if it carries a background (BG44) layer.
    ///
    /// Layers of at most `min_layer_bytes` are blank scans; renders of at
    /// most `min_render_bytes` are discarded. Both cases yield `Ok(None)`.
    pub fn extract_djvu_page(
        &self,
        djvu: &Path,
        out_dir: &Path,
        scratch: &Path,
        page: usize,
    ) -> Result<Option<PathBuf>, JobError> {
        let layer = scratch.join(format!("page_{}.iw44", page));
        let mut layer_arg = OsString::from("BG44=");
        layer_arg.push(&layer);
        let inv = ToolInvocation::new("djvuextract")
            .arg(djvu)
            .arg(layer_arg)
            .arg(format!("-page={}", page));
        // Bitonal pages have no BG44 chunk and make djvuextract fail.
        let layer_ok = match self.runner.run(&inv) {
            Ok(_) => expect_artifact("djvuextract", &layer, self.min_layer_bytes).is_ok(),
            Err(e) => {
                debug!("DJVU page {}: {}", page, e);
                false
            }
        };
        let _ = std::fs::remove_file(&layer);
        if !layer_ok {
            debug!("DJVU page {}: no usable background layer", page);
            return Ok(None);
        }

        let target = out_dir.join(page_image_name(page));
        self.run_ddjvu(djvu, page, &target)?;
        if expect_artifact("ddjvu", &target, self.min_render_bytes).is_err() {
            debug!("DJVU page {}: render below {} bytes, dropped", page, self.min_render_bytes);
            let _ = std::fs::remove_file(&target);
            return Ok(None);
        }
        Ok(Some(target))
    }

    /// Convert `input` to `format` (`pdf`, `docx`) inside `out_dir` with soffice.
    pub fn convert(
        &self,
        input: &Path,
        out_dir: &Path,
        format: &str,
        min_bytes: u64,
    ) -> Result<PathBuf, JobError> {
        let inv = ToolInvocation::new("soffice")
            .args(["--headless", "--convert-to", format, "--outdir"])
            .arg(out_dir)
            .arg(input);
        self.runner.run(&inv)?;
        let produced = first_with_extension(out_dir, format)
            .unwrap_or_else(|| out_dir.join(format!("{}.{}", crate::document::stem_of(input), format)));
        expect_artifact("soffice", &produced, min_bytes)
    }

    // ── Strategies ───────────────────────────────────────────────────────

    /// Run `strategy` for `doc`, fanning jobs out on `pool`.
    ///
    /// Never fails: every job error is logged and recorded in the result.
    /// A failed [`Strategy::ConvertThenRender`] falls through to
    /// [`dispatch::fallback`].
    pub async fn acquire(
        &self,
        doc: &Document,
        strategy: Strategy,
        caps: &CapabilityMatrix,
        pool: &TaskPool,
    ) -> Acquired {
        let mut acquired = Acquired::new(strategy);

        if strategy == Strategy::ConvertThenRender {
            if self.convert_then_render(doc, pool, &mut acquired).await {
                return finish(acquired);
            }
            acquired.strategy = dispatch::fallback(doc.kind, caps);
            info!(
                "{}: conversion failed, falling back to {}",
                doc.path.display(),
                acquired.strategy
            );
        }

        let src = doc.path.clone();
        let dir = doc.output_dir.clone();
        match acquired.strategy {
            Strategy::RenderThenDetect => {
                self.render_pages(src, doc.kind, doc.pages, &dir, pool, &mut acquired)
                    .await;
            }
            Strategy::ExtractEmbedded => {
                let this = self.clone();
                let results = pool
                    .run(vec![()], move |_| this.extract_pdf_images(&src, &dir))
                    .await;
                acquired.absorb(results, |a, imgs| a.images.extend(imgs));
            }
            Strategy::ExtractEmbeddedDjvu => {
                self.extract_djvu(doc, pool, &mut acquired).await;
            }
            Strategy::ExtractContainerImages => {
                let results = pool
                    .run(vec![()], move |_| extract_container(&src, &dir))
                    .await;
                acquired.absorb(results, |a, imgs| a.images.extend(imgs));
            }
            Strategy::ConvertThenExtractZip => {
                let this = self.clone();
                let results = pool
                    .run(vec![()], move |_| {
                        let scratch = scratch_dir(&dir, "_convert")?;
                        let docx = this.convert(&src, scratch.path(), "docx", 0)?;
                        extract_container(&docx, &dir)
                    })
                    .await;
                acquired.absorb(results, |a, imgs| a.images.extend(imgs));
            }
            Strategy::Unsupported => {
                pool.record_skipped();
                let e = JobError::UnsupportedFileType {
                    path: doc.path.clone(),
                    kind: doc.kind.to_string(),
                };
                warn!("{}", e);
                acquired.failures.push(e);
            }
            // Handled above; fallback never selects it.
            Strategy::ConvertThenRender => {}
        }

        finish(acquired)
    }

    async fn render_pages(
        &self,
        source: PathBuf,
        kind: DocumentKind,
        pages: usize,
        out_dir: &Path,
        pool: &TaskPool,
        acquired: &mut Acquired,
    ) {
        if pages == 0 {
            pool.record_skipped();
            acquired.failures.push(unknown_page_count(kind));
            return;
        }
        let this = self.clone();
        let dir = out_dir.to_path_buf();
        let results = pool
            .run((1..=pages).collect(), move |page| match kind {
                DocumentKind::Djvu => this.render_djvu_page(&source, &dir, page),
                _ => this.render_pdf_page(&source, &dir, page),
            })
            .await;
        acquired.absorb(results, |a, img| a.images.push(img));
    }

    /// Returns false when conversion failed and a fallback should run.
    async fn convert_then_render(&self, doc: &Document, pool: &TaskPool, acquired: &mut Acquired) -> bool {
        let this = self.clone();
        let src = doc.path.clone();
        let dir = doc.output_dir.clone();
        let min_bytes = self.min_render_bytes;
        let mut converted = pool
            .run(vec![()], move |_| {
                let scratch = scratch_dir(&dir, "_convert")?;
                let pdf = this.convert(&src, scratch.path(), "pdf", min_bytes)?;
                let pages = this.pdf_page_count(&pdf)?;
                Ok((scratch, pdf, pages))
            })
            .await;

        match converted.pop() {
            Some(Ok((scratch, pdf, pages))) => {
                self.render_pages(pdf, DocumentKind::Pdf, pages, &doc.output_dir, pool, acquired)
                    .await;
                drop(scratch);
                true
            }
            Some(Err(e)) => {
                warn!("{}", e);
                acquired.failures.push(e);
                false
            }
            None => false,
        }
    }

    async fn extract_djvu(&self, doc: &Document, pool: &TaskPool, acquired: &mut Acquired) {
        if doc.pages == 0 {
            pool.record_skipped();
            acquired.failures.push(unknown_page_count(DocumentKind::Djvu));
            return;
        }
        let scratch = match scratch_dir(&doc.output_dir, "_djvu") {
            Ok(s) => s,
            Err(e) => {
                pool.record_skipped();
                acquired.failures.push(e);
                return;
            }
        };
        let this = self.clone();
        let src = doc.path.clone();
        let dir = doc.output_dir.clone();
        let layers = scratch.path().to_path_buf();
        let results = pool
            .run((1..=doc.pages).collect(), move |page| {
                this.extract_djvu_page(&src, &dir, &layers, page)
            })
            .await;
        acquired.absorb(results, |a, img| a.images.extend(img));
        drop(scratch);
    }
}

fn finish(mut acquired: Acquired) -> Acquired {
    acquired.images.sort();
    acquired.images.dedup();
    acquired
}

fn unknown_page_count(kind: DocumentKind) -> JobError {
    JobError::ToolExecutionFailure {
        tool: if kind == DocumentKind::Djvu { "djvused" } else { "pdfinfo" }.into(),
        detail: "page count unavailable".into(),
    }
}

fn scratch_dir(parent: &Path, prefix: &str) -> Result<TempDir, JobError> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(parent)
        .map_err(|e| JobError::OutputUnwritable {
            path: parent.to_path_buf(),
            detail: e.to_string(),
        })
}

/// Page count from `pdfinfo` output.
pub fn parse_pdfinfo_pages(stdout: &str) -> Option<usize> {
    RE_PDFINFO_PAGES
        .captures(stdout)
        .and_then(|c| c[1].parse().ok())
}

// ── Containers ───────────────────────────────────────────────────────────

/// Unpack the image members of a zip-based container into `out_dir`.
///
/// Directory components are dropped, so a later member overwrites an
/// earlier one with the same file name. Thumbnails are skipped. A member
/// that cannot be written is logged and skipped; only an unreadable
/// archive fails the job.
pub fn extract_container(archive_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, JobError> {
    let fail = |detail: String| JobError::ContainerFailure {
        path: archive_path.to_path_buf(),
        detail,
    };
    let file = File::open(archive_path).map_err(|e| fail(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| fail(e.to_string()))?;

    let mut written: Vec<PathBuf> = Vec::new();
    for i in 0..archive.len() {
        let mut member = match archive.by_index(i) {
            Ok(m) => m,
            Err(e) => {
                warn!("{}: member #{} unreadable: {}", archive_path.display(), i, e);
                continue;
            }
        };
        if member.is_dir() || !is_container_image(member.name()) {
            continue;
        }
        let Some(file_name) = Path::new(member.name()).file_name().map(|n| n.to_owned()) else {
            continue;
        };
        let dest = out_dir.join(file_name);
        let copied = File::create(&dest).and_then(|mut out| std::io::copy(&mut member, &mut out));
        match copied {
            Ok(bytes) => {
                debug!("unzip {} ({} bytes)", dest.display(), bytes);
                if !written.contains(&dest) {
                    written.push(dest);
                }
            }
            Err(e) => warn!("{}: cannot write {}: {}", archive_path.display(), dest.display(), e),
        }
    }
    Ok(written)
}

/// Image member that is not a thumbnail.
pub fn is_container_image(member: &str) -> bool {
    let lower = member.to_ascii_lowercase();
    if lower.contains("/thumbnail") {
        return false;
    }
    Path::new(&lower)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| CONTAINER_IMAGE_EXTENSIONS.contains(&e))
}

fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
        })
        .collect();
    found.sort();
    found
}

fn first_with_extension(dir: &Path, ext: &str) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ext))
        .collect();
    found.sort();
    found.into_iter().next()
}
