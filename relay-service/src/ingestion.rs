//! Document ingestion.
//!
//! Turns an uploaded document into plain text for the prompt:
//! - MIME type / file extension dispatch to a [`DocumentFormat`]
//! - One extractor per format, each backed by a parsing crate
//! - ZIP archives are unpacked and their entries dispatched recursively

pub mod archive;
pub mod doc;
pub mod docx;
pub mod epub;
pub mod html;
pub mod pdf;
pub mod spreadsheet;
pub mod text;

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::LimitsConfig;
use crate::error::ProcessingError;

/// Document formats the relay can turn into prompt text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Doc,
    Text,
    Xlsx,
    Csv,
    Html,
    Epub,
    Json,
    Zip,
}

impl DocumentFormat {
    /// Map a MIME type (parameters ignored) to a format.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let parsed: mime::Mime = mime_type.trim().parse().ok()?;
        let essence = parsed.essence_str().to_ascii_lowercase();

        let format = match essence.as_str() {
            "application/pdf" => Self::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Self::Docx
            }
            "application/msword" => Self::Doc,
            "text/plain" => Self::Text,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Self::Xlsx,
            "text/csv" => Self::Csv,
            "text/html" => Self::Html,
            "application/epub+zip" => Self::Epub,
            "application/json" => Self::Json,
            "application/zip" | "application/x-zip-compressed" => Self::Zip,
            _ => return None,
        };
        Some(format)
    }

    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let format = match extension.to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "doc" => Self::Doc,
            "txt" | "text" => Self::Text,
            "xlsx" => Self::Xlsx,
            "csv" => Self::Csv,
            "html" | "htm" => Self::Html,
            "epub" => Self::Epub,
            "json" => Self::Json,
            "zip" => Self::Zip,
            _ => return None,
        };
        Some(format)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical MIME type for this format
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Self::Doc => "application/msword",
            Self::Text => "text/plain",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Csv => "text/csv",
            Self::Html => "text/html",
            Self::Epub => "application/epub+zip",
            Self::Json => "application/json",
            Self::Zip => "application/zip",
        }
    }

    /// Short lowercase name, used in logs, errors and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Doc => "doc",
            Self::Text => "text",
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
            Self::Html => "html",
            Self::Epub => "epub",
            Self::Json => "json",
            Self::Zip => "zip",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decide the format of an upload.
///
/// The declared MIME type wins. Browsers send `application/octet-stream` (or
/// nothing) for types they don't know, so in that case the file extension is
/// used instead.
pub fn resolve_format(
    mime_type: Option<&str>,
    filename: Option<&str>,
) -> Result<DocumentFormat, ProcessingError> {
    let declared = mime_type.map(str::trim).filter(|m| {
        !m.is_empty() && !m.eq_ignore_ascii_case(mime::APPLICATION_OCTET_STREAM.essence_str())
    });

    let format = match declared {
        Some(mime_type) => DocumentFormat::from_mime(mime_type),
        None => filename.map(Path::new).and_then(DocumentFormat::from_path),
    };

    format.ok_or_else(|| ProcessingError::UnsupportedFormat {
        format: declared
            .or(mime_type.filter(|m| !m.trim().is_empty()))
            .or(filename)
            .unwrap_or("unknown")
            .to_string(),
    })
}

/// Runs format extractors against files in a scratch directory
pub struct IngestionService {
    limits: LimitsConfig,
    scratch_dir: PathBuf,
}

impl IngestionService {
    pub fn new(limits: LimitsConfig, scratch_dir: PathBuf) -> Self {
        Self {
            limits,
            scratch_dir,
        }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Write uploaded bytes to a temporary file and extract its text.
    ///
    /// The temporary file is removed when this returns, whatever the outcome.
    /// Blocking: call from `spawn_blocking`.
    pub fn extract_bytes(
        &self,
        content: &[u8],
        filename: Option<&str>,
        format: DocumentFormat,
    ) -> Result<String, ProcessingError> {
        let mut file = tempfile::Builder::new()
            .prefix("document-")
            .suffix(&scratch_suffix(filename, format))
            .tempfile_in(&self.scratch_dir)
            .map_err(ProcessingError::Io)?;
        file.write_all(content).map_err(ProcessingError::Io)?;
        file.flush().map_err(ProcessingError::Io)?;

        debug!(
            path = %file.path().display(),
            bytes = content.len(),
            format = %format,
            "Upload written to scratch file"
        );

        extract_document(
            file.path(),
            Some(format.mime_type()),
            filename,
            &self.limits,
        )
    }

    /// Extract text from a file of a known format.
    pub fn extract(&self, path: &Path, format: DocumentFormat) -> Result<String, ProcessingError> {
        let mut unpack_budget = self.limits.max_archive_unpacked_bytes;
        self.extract_nested(path, format, 0, &mut unpack_budget)
    }

    /// `depth` is the number of archives enclosing `path`. `unpack_budget` is
    /// the number of bytes archives may still unpack, shared by every archive
    /// nested in the same upload.
    pub(crate) fn extract_nested(
        &self,
        path: &Path,
        format: DocumentFormat,
        depth: usize,
        unpack_budget: &mut u64,
    ) -> Result<String, ProcessingError> {
        let text = match format {
            DocumentFormat::Pdf => pdf::extract_pdf(path)?,
            DocumentFormat::Docx => docx::extract_docx(path)?,
            DocumentFormat::Doc => doc::extract_doc(path)?,
            DocumentFormat::Text => text::extract_text(path)?,
            DocumentFormat::Xlsx => spreadsheet::extract_xlsx(path)?,
            DocumentFormat::Csv => spreadsheet::extract_csv(path)?,
            DocumentFormat::Html => html::extract_html(path)?,
            DocumentFormat::Epub => epub::extract_epub(path)?,
            DocumentFormat::Json => text::extract_json(path)?,
            DocumentFormat::Zip => archive::extract_zip(self, path, depth + 1, unpack_budget)?,
        };

        if text.trim().is_empty() {
            return Err(ProcessingError::EmptyDocument {
                format: format.to_string(),
            });
        }

        info!(
            format = %format,
            depth,
            chars = text.chars().count(),
            "Document text extracted"
        );

        Ok(text)
    }
}

/// Resolve the format of a file already on disk and extract its text.
///
/// Archive entries are unpacked next to the file.
pub fn extract_document(
    path: &Path,
    mime_type: Option<&str>,
    filename: Option<&str>,
    limits: &LimitsConfig,
) -> Result<String, ProcessingError> {
    let filename = filename.or_else(|| path.file_name().and_then(|n| n.to_str()));
    let format = resolve_format(mime_type, filename)?;

    let scratch_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let ingestion = IngestionService::new(limits.clone(), scratch_dir.to_path_buf());

    ingestion.extract(path, format)
}

/// Longest part of an upload's name kept in its scratch file name
const MAX_SCRATCH_STEM_CHARS: usize = 32;

/// Scratch file suffix: a short stem of the upload's name plus the
/// extension of the resolved format.
fn scratch_suffix(filename: Option<&str>, format: DocumentFormat) -> String {
    let stem = filename
        .map(sanitize_filename)
        .map(|name| match name.rsplit_once('.') {
            Some((stem, _)) => stem.to_string(),
            None => name,
        })
        .map(|stem| stem.chars().take(MAX_SCRATCH_STEM_CHARS).collect::<String>())
        .filter(|stem| !stem.is_empty());

    match stem {
        Some(stem) => format!("-{}.{}", stem, format.name()),
        None => format!(".{}", format.name()),
    }
}

/// Sanitize a string for use as a filename
fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    base.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}
