//! Text extraction for corpus documents.
//!
//! Connectors supply bytes plus a detected [`FileType`]; this module
//! returns plain UTF-8 text. Extraction failures never panic — they
//! surface as [`Error::Extraction`] and the pipeline skips that document.

use crate::error::{Error, Result};
use crate::models::FileType;

/// Extract plain text from a document's raw bytes.
pub fn extract_text(name: &str, bytes: &[u8], file_type: FileType) -> Result<String> {
    match file_type {
        FileType::Pdf => extract_pdf(name, bytes),
        FileType::Txt => extract_txt(name, bytes),
    }
}

fn extract_pdf(name: &str, bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| Error::Extraction {
        name: name.to_string(),
        reason: format!("PDF extraction failed: {}", e),
    })?;

    if text.trim().is_empty() {
        return Err(Error::Extraction {
            name: name.to_string(),
            reason: "PDF produced no text".to_string(),
        });
    }

    Ok(text)
}

fn extract_txt(name: &str, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::Extraction {
        name: name.to_string(),
        reason: format!("invalid UTF-8: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txt_extraction() {
        let text = extract_text("act.txt", "The Act regulates.".as_bytes(), FileType::Txt).unwrap();
        assert_eq!(text, "The Act regulates.");
    }

    #[test]
    fn test_txt_invalid_utf8_returns_extraction_error() {
        let err = extract_text("bad.txt", &[0xff, 0xfe, 0x00], FileType::Txt).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn test_invalid_pdf_returns_extraction_error() {
        let err = extract_text("bad.pdf", b"not a pdf", FileType::Pdf).unwrap_err();
        match err {
            Error::Extraction { name, .. } => assert_eq!(name, "bad.pdf"),
            other => panic!("expected extraction error, got {:?}", other),
        }
    }
}
