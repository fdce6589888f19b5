//! Input documents: type detection and output-folder derivation.
//!
//! Types are sniffed from magic bytes rather than trusted from extensions;
//! `.epub`, `.docx` and `.odt` are all plain zip archives, and renamed files
//! are common in scanned-book collections.

use crate::error::FigexError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

const PDF_MAGIC: &[u8] = b"%PDF";
const DJVU_MAGIC: &[u8] = b"AT&TFORM";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Detected document family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Pdf,
    Djvu,
    /// Office Open XML, OpenDocument, EPUB or plain zip.
    ZipContainer,
    /// Legacy binary word-processor file (OLE2 compound document).
    LegacyDoc,
    Unknown,
}

impl DocumentKind {
    /// Classify the leading bytes of a file.
    pub fn from_magic(head: &[u8]) -> Self {
        if head.starts_with(PDF_MAGIC) {
            DocumentKind::Pdf
        } else if head.starts_with(DJVU_MAGIC) {
            DocumentKind::Djvu
        } else if head.starts_with(ZIP_MAGIC) {
            DocumentKind::ZipContainer
        } else if head.starts_with(OLE2_MAGIC) {
            DocumentKind::LegacyDoc
        } else {
            DocumentKind::Unknown
        }
    }

    /// Read the first bytes of `path` and classify them.
    pub fn detect(path: &Path) -> std::io::Result<Self> {
        let mut head = [0u8; 8];
        let mut file = std::fs::File::open(path)?;
        let mut filled = 0;
        while filled < head.len() {
            let n = file.read(&mut head[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(Self::from_magic(&head[..filled]))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Djvu => "djvu",
            DocumentKind::ZipContainer => "zip_container",
            DocumentKind::LegacyDoc => "doc_legacy",
            DocumentKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input file, immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    pub kind: DocumentKind,
    /// `<output_root>/<basename without extension>`.
    pub output_dir: PathBuf,
    /// Probed page count; 0 when unknown.
    pub pages: usize,
}

impl Document {
    /// Validate `path`, sniff its type and derive its output folder.
    ///
    /// `pages` starts at 0; the orchestrator fills it in from a page probe.
    pub fn open(path: impl AsRef<Path>, output_root: &Path) -> Result<Self, FigexError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(FigexError::FileNotFound { path });
        }
        let kind = match DocumentKind::detect(&path) {
            Ok(kind) => kind,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(FigexError::PermissionDenied { path });
            }
            Err(_) => return Err(FigexError::FileNotFound { path }),
        };
        let output_dir = output_root.join(stem_of(&path));
        debug!("Document {} → {} ({})", path.display(), output_dir.display(), kind);
        Ok(Self {
            path,
            kind,
            output_dir,
            pages: 0,
        })
    }

    pub fn with_pages(mut self, pages: usize) -> Self {
        self.pages = pages;
        self
    }

    /// File name without directory or last extension.
    pub fn stem(&self) -> String {
        stem_of(&self.path)
    }
}

/// Basename with the last extension stripped; falls back to `document`.
pub fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}
