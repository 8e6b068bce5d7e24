//! Core data models used throughout counsel-rag.
//!
//! These types represent the documents, chunks, vectors, and search results
//! that flow through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File types the extraction layer understands. Anything else fails
/// ingestion for that document only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Txt,
}

impl FileType {
    /// Detect the file type from an object name's extension.
    pub fn from_name(name: &str) -> Option<FileType> {
        match name.rsplit('.').next().map(|ext| ext.to_lowercase()) {
            Some(ext) if ext == "pdf" => Some(FileType::Pdf),
            Some(ext) if ext == "txt" => Some(FileType::Txt),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Pdf => write!(f, "pdf"),
            FileType::Txt => write!(f, "txt"),
        }
    }
}

/// One source file from the corpus bucket. Created once per ingestion run;
/// reprocessing replaces it wholesale.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Opaque locator, e.g. `s3://bucket/key`.
    pub source_ref: String,
    pub file_type: FileType,
    pub size_bytes: u64,
    pub processed_at: DateTime<Utc>,
}

/// A contiguous slice of a document's extracted text; the unit of retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    /// `{document_id}_chunk_{index}`. Stable across re-chunking as long as
    /// the chunking parameters are unchanged.
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub title: String,
    pub source_ref: String,
}

/// An embedding for one chunk. All vectors in one index share a
/// dimensionality; a mismatch is rejected per chunk at upsert.
#[derive(Debug, Clone)]
pub struct EmbeddingVector {
    pub chunk_id: String,
    pub values: Vec<f32>,
    /// Length of the text that produced this vector, kept for diagnostics.
    pub source_content_length: usize,
}

/// A `(chunk, score)` pair produced by a query. Ephemeral, never persisted.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub score: f32,
}

/// Why a document failed during a run.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub document: String,
    pub reason: String,
}

/// Outcome record for one ingestion invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingRun {
    pub documents_attempted: usize,
    pub documents_succeeded: usize,
    pub documents_failed: usize,
    pub chunks_created: usize,
    pub embeddings_created: usize,
    pub elapsed_ms: u64,
    pub failures: Vec<DocumentFailure>,
    /// Set when the run was aborted wholesale (index unreachable), as
    /// opposed to per-document failures above.
    pub fatal_error: Option<String>,
    /// Set when the run stopped early at a cancellation checkpoint.
    pub cancelled: bool,
}

/// Derive a document id from its object name: lowercase, runs of
/// non-alphanumeric characters collapsed to a single underscore.
pub fn document_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            id.push('_');
            last_was_sep = true;
        }
    }
    id.trim_matches('_').to_string()
}

/// Derive a display title from the object name, falling back to the first
/// sentence of the content when the cleaned-up name is uninformative
/// (shorter than 10 characters).
pub fn document_title(name: &str, content: &str) -> String {
    let stem = match name.rfind('.') {
        Some(pos) => &name[..pos],
        None => name,
    };

    let title = stem
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if title.len() >= 10 {
        return title;
    }

    let first_sentence = content
        .split(['.', '!', '?'])
        .next()
        .unwrap_or("")
        .trim();
    if first_sentence.len() > 10 {
        let mut preview: String = first_sentence.chars().take(100).collect();
        preview.push_str("...");
        return preview;
    }

    if title.is_empty() {
        "Untitled Document".to_string()
    } else {
        title
    }
}

/// Chunk id format shared by the chunker and the index.
pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{}_chunk_{}", document_id, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_name("employment-code.pdf"), Some(FileType::Pdf));
        assert_eq!(FileType::from_name("notes.TXT"), Some(FileType::Txt));
        assert_eq!(FileType::from_name("archive.docx"), None);
        assert_eq!(FileType::from_name("no_extension"), None);
    }

    #[test]
    fn test_document_id_collapses_separators() {
        assert_eq!(
            document_id("Employment Code Act (2019).pdf"),
            "employment_code_act_2019_pdf"
        );
        assert_eq!(document_id("__weird--name__.txt"), "weird_name_txt");
    }

    #[test]
    fn test_document_id_deterministic() {
        let a = document_id("Penal-Code.pdf");
        let b = document_id("Penal-Code.pdf");
        assert_eq!(a, b);
    }

    #[test]
    fn test_title_from_filename() {
        let title = document_title("employment-code-act-2019.pdf", "irrelevant");
        assert_eq!(title, "employment code act 2019");
    }

    #[test]
    fn test_title_falls_back_to_first_sentence() {
        let title = document_title(
            "act1.pdf",
            "The Employment Code Act regulates employment relationships. More text.",
        );
        assert!(title.starts_with("The Employment Code Act"));
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_title_untitled_when_nothing_usable() {
        assert_eq!(document_title(".pdf", ""), "Untitled Document");
    }

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(chunk_id("penal_code_pdf", 3), "penal_code_pdf_chunk_3");
    }
}
