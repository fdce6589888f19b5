//! Page-acquisition dispatch: pick one strategy per document.
//!
//! ## Transition table
//!
//! ```text
//!            vision on?
//!               │ yes                                   │ no
//!               ▼                                       │
//!   PDF  + render_pdf   ──▶ RenderThenDetect            │
//!   DJVU + handle_djvu  ──▶ RenderThenDetect            │
//!   any  + convert + render ──▶ ConvertThenRender ──┐   │
//!               │ nothing matched          on failure│  │
//!               ▼                                    ▼  ▼
//!                           fallback(kind, caps)
//!   PDF  + extract_pdf_images             ──▶ ExtractEmbedded
//!   DJVU + handle_djvu                    ──▶ ExtractEmbeddedDjvu
//!   Zip  + extract_containers             ──▶ ExtractContainerImages
//!   LegacyDoc + convert + extract_containers ──▶ ConvertThenExtractZip
//!   otherwise                             ──▶ Unsupported
//! ```
//!
//! The choice is a pure function of `(kind, capabilities, vision)`, so
//! [`crate::extract::plan`] can show it without running anything.

use crate::capability::CapabilityMatrix;
use crate::document::DocumentKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a document's raster images are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Rasterise every page (PDF via pdftoppm, DJVU via ddjvu).
    RenderThenDetect,
    /// Convert to PDF with soffice, then rasterise every page.
    ConvertThenRender,
    /// Dump the PDF's embedded raster images with pdfimages.
    ExtractEmbedded,
    /// Render only the DJVU pages that carry a non-trivial background layer.
    ExtractEmbeddedDjvu,
    /// Unpack image members of a zip-based container.
    ExtractContainerImages,
    /// Convert a legacy document to DOCX, then unpack its images.
    ConvertThenExtractZip,
    /// Nothing can handle this document.
    Unsupported,
}

impl Strategy {
    /// True for the strategies that rasterise whole pages.
    pub fn renders_pages(&self) -> bool {
        matches!(self, Strategy::RenderThenDetect | Strategy::ConvertThenRender)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RenderThenDetect => "render",
            Strategy::ConvertThenRender => "convert+render",
            Strategy::ExtractEmbedded => "extract-embedded",
            Strategy::ExtractEmbeddedDjvu => "extract-djvu",
            Strategy::ExtractContainerImages => "extract-container",
            Strategy::ConvertThenExtractZip => "convert+extract",
            Strategy::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Select the primary strategy for a document.
///
/// `vision` is the effective vision-assisted flag (requested *and* the
/// toolkit is available). Without it nothing is rendered.
pub fn select(kind: DocumentKind, caps: &CapabilityMatrix, vision: bool) -> Strategy {
    if vision {
        match kind {
            DocumentKind::Pdf if caps.render_pdf => return Strategy::RenderThenDetect,
            DocumentKind::Djvu if caps.handle_djvu => return Strategy::RenderThenDetect,
            _ => {}
        }
        if caps.convert_documents && caps.render_pdf {
            return Strategy::ConvertThenRender;
        }
    }
    fallback(kind, caps)
}

/// Strategy used when no render path applies, or after a failed
/// [`Strategy::ConvertThenRender`].
pub fn fallback(kind: DocumentKind, caps: &CapabilityMatrix) -> Strategy {
    match kind {
        DocumentKind::Pdf if caps.extract_pdf_images => Strategy::ExtractEmbedded,
        DocumentKind::Djvu if caps.handle_djvu => Strategy::ExtractEmbeddedDjvu,
        DocumentKind::ZipContainer if caps.extract_containers => {
            Strategy::ExtractContainerImages
        }
        DocumentKind::LegacyDoc if caps.convert_documents && caps.extract_containers => {
            Strategy::ConvertThenExtractZip
        }
        _ => Strategy::Unsupported,
    }
}
