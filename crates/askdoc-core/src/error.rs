//! Error taxonomy shared by the core and the application crate.
//!
//! Each variant maps to one failure class with its own recovery rule:
//!
//! | Variant | Caller sees | Side effects |
//! |---------|-------------|--------------|
//! | [`Error::Validation`] | 400 | none |
//! | [`Error::Extraction`] | 400 | uploaded file removed |
//! | [`Error::CorruptStore`] | logged only | store treated as empty |
//! | [`Error::Provider`] | 502 | none |
//! | [`Error::Storage`] | 500 | none |

/// Errors produced while ingesting documents or answering queries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad input shape, unsupported file type, oversized upload.
    #[error("{0}")]
    Validation(String),

    /// No text could be recovered from a document.
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// The persisted knowledge base does not have the expected shape.
    #[error("corrupt knowledge base: {0}")]
    CorruptStore(String),

    /// The embedding or generation backend failed or timed out.
    #[error("{provider} provider error: {message}")]
    Provider { provider: String, message: String },

    /// Reading or writing durable state failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn provider(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn storage(message: impl std::fmt::Display) -> Self {
        Error::Storage(message.to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
