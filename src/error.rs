//! Error types for counsel-rag.
//!
//! The taxonomy separates fatal startup problems (configuration) and
//! run-fatal index failures from the recoverable, per-item classes:
//! extraction failures isolate a single document, provider failures
//! degrade to local fallbacks, validation failures reject a single chunk.

use thiserror::Error;

/// Result type alias using counsel-rag's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for counsel-rag operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing credentials or invalid settings. Fatal at startup, never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single document could not be extracted (unsupported type, corrupt
    /// content). Isolates that document only.
    #[error("Extraction failed for {name}: {reason}")]
    Extraction { name: String, reason: String },

    /// Transient embedding/generation provider failure (network, quota).
    /// Recovered locally via fallback; never surfaced as a crash.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The vector index backing store is unreachable or rejected an
    /// operation wholesale. Fatal for the current run.
    #[error("Index error: {0}")]
    Index(String),

    /// Malformed chunking parameters or a per-item rejection such as a
    /// dimension mismatch on upsert.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Object storage listing or download failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Provider(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("GOOGLE_API_KEY not set".to_string());
        assert_eq!(err.to_string(), "Configuration error: GOOGLE_API_KEY not set");
    }

    #[test]
    fn test_error_display_extraction() {
        let err = Error::Extraction {
            name: "brief.docx".to_string(),
            reason: "unsupported file type: docx".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Extraction failed for brief.docx: unsupported file type: docx"
        );
    }

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("overlap must be smaller than target size".to_string());
        assert!(err.to_string().starts_with("Validation error:"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
