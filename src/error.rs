//! Error types for indexing and lookup.
//!
//! Per-entry extraction failures live in [`crate::classfile::ClassParseError`];
//! they never surface here because the scanner logs and skips them.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// One archive could not be opened or read. Scoped to that archive.
    #[error("failed to read archive {path}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("index store error: {0}")]
    Store(#[from] heed::Error),

    #[error("corrupt index record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("corrupt index entry: {0}")]
    Corrupt(String),

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    pub fn archive(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Archive {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// True for errors that mean the store itself is unusable.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Record(_) | Self::Corrupt(_))
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
