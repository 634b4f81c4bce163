//! Error type shared by every catalog operation.
//!
//! | Variant | Policy |
//! |---------|--------|
//! | [`Validation`](CatalogError::Validation) | always fatal, raised immediately |
//! | [`Extraction`](CatalogError::Extraction) | keep going up to `max_errs`, then fatal |
//! | [`Embedding`](CatalogError::Embedding) | keep going up to `max_errs`, then fatal |
//! | [`Compatibility`](CatalogError::Compatibility) | always fatal, never retried |
//! | [`Store`](CatalogError::Store) | degraded to empty results on reads, fatal on writes |

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Could not index {}: {message}", path.display())]
    Extraction { path: PathBuf, message: String },

    #[error("Could not embed '{name}': {message}")]
    Embedding { name: String, message: String },

    #[error("{0} Run `agentc clean` and re-index.")]
    Compatibility(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed annotation query: {0}")]
    Annotation(String),

    #[error("Activity sink error: {0}")]
    Sink(String),

    #[error("Indexing was cancelled")]
    Cancelled,

    #[error("Malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    pub fn extraction(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        CatalogError::Extraction {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True for errors that count against the `max_errs` budget rather
    /// than aborting on first sight.
    pub fn is_keep_going(&self) -> bool {
        matches!(
            self,
            CatalogError::Extraction { .. } | CatalogError::Embedding { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
