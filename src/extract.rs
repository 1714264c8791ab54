//! Plain-text extraction for uploaded documents.
//!
//! Format parsing is delegated to `pdf-extract` for PDFs and to the OOXML readers in
//! [`office`] for DOCX/PPTX. Extraction failures are reported per file as an error string in
//! place of the text so that an upload is never aborted by a malformed document.

mod office;

use std::path::Path;
use thiserror::Error;

/// Extensions accepted by the upload endpoint.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "docx", "txt", "pptx"];

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Portable Document Format.
    Pdf,
    /// Word document.
    Docx,
    /// PowerPoint presentation.
    Pptx,
    /// Plain text.
    Txt,
}

impl DocumentKind {
    /// Detect the format from the filename extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }

    /// Canonical lowercase extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::Txt => "txt",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
            Self::Pptx => "PPTX",
            Self::Txt => "TXT",
        }
    }
}

/// Check the extension against [`ALLOWED_EXTENSIONS`].
pub fn allowed_file(filename: &str) -> bool {
    DocumentKind::from_filename(filename).is_some()
}

/// Errors raised while reading a document.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file could not be read.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The PDF parser rejected the document.
    #[error("{0}")]
    Pdf(String),
    /// The OOXML container could not be opened.
    #[error("{0}")]
    Archive(#[from] zip::result::ZipError),
    /// An OOXML part was not well-formed XML.
    #[error("{0}")]
    Xml(#[from] quick_xml::Error),
}

/// Extract the plain text of `path`.
pub fn extract_text(path: &Path, kind: DocumentKind) -> Result<String, ExtractError> {
    match kind {
        DocumentKind::Pdf => {
            pdf_extract::extract_text(path).map_err(|error| ExtractError::Pdf(error.to_string()))
        }
        DocumentKind::Docx => office::docx_text(path),
        DocumentKind::Pptx => office::pptx_text(path),
        DocumentKind::Txt => {
            let bytes = std::fs::read(path)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

/// Extract the text of `path`, substituting a descriptive message when extraction fails.
pub fn extract_or_describe(path: &Path, kind: DocumentKind) -> String {
    match extract_text(path, kind) {
        Ok(text) => text,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                format = kind.label(),
                error = %error,
                "Text extraction failed"
            );
            format!("Error extracting text from {}: {error}", kind.label())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn allowed_file_checks_extension_case_insensitively() {
        assert!(allowed_file("notes.PDF"));
        assert!(allowed_file("deck.pptx"));
        assert!(allowed_file("archive.tar.txt"));
        assert!(!allowed_file("image.png"));
        assert!(!allowed_file("pdf"));
        assert!(!allowed_file("notes."));
    }

    #[test]
    fn kind_round_trips_extension() {
        for extension in ALLOWED_EXTENSIONS {
            let kind = DocumentKind::from_filename(&format!("file.{extension}")).unwrap();
            assert_eq!(kind.extension(), extension);
        }
    }

    #[test]
    fn txt_extraction_tolerates_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"caf\xe9 au lait").unwrap();
        let text = extract_text(file.path(), DocumentKind::Txt).unwrap();
        assert!(text.starts_with("caf"));
        assert!(text.ends_with(" au lait"));
    }

    #[test]
    fn broken_pdf_is_described_instead_of_failing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a pdf").unwrap();
        let text = extract_or_describe(file.path(), DocumentKind::Pdf);
        assert!(text.starts_with("Error extracting text from PDF: "));
    }

    #[test]
    fn missing_docx_is_described_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let text = extract_or_describe(&dir.path().join("gone.docx"), DocumentKind::Docx);
        assert!(text.starts_with("Error extracting text from DOCX: "));
    }
}
