use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the indexing, caching and search engine.
#[derive(Error, Debug)]
pub enum HfrError {
    /// The source file does not exist at open time
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stale or structurally invalid offset table. Triggers a rebuild.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// The asynchronous full-content hash disagrees with the stored one
    #[error("Integrity check failed for {}: expected {expected}, found {actual}", .path.display())]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    /// Cache bookkeeping inconsistency. Always a bug.
    #[error("Internal invariant violated: {0}")]
    Invariant(String),

    #[error("Sidecar error: {0}")]
    Sidecar(#[from] serde_json::Error),
}

impl HfrError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HfrError::Cancelled)
    }

    /// Short, stable name used in status events
    pub fn kind(&self) -> &'static str {
        match self {
            HfrError::NotFound(_) => "NotFound",
            HfrError::Io(_) => "IOFailure",
            HfrError::CorruptIndex(_) => "CorruptIndex",
            HfrError::IntegrityMismatch { .. } => "IntegrityMismatch",
            HfrError::Cancelled => "Cancelled",
            HfrError::Invariant(_) => "InternalInvariantViolation",
            HfrError::Sidecar(_) => "CorruptIndex",
        }
    }
}

impl HfrError {
    /// Equivalent copy for a second consumer, e.g. an event payload.
    /// Wrapped sources keep their kind and message.
    pub fn duplicate(&self) -> HfrError {
        match self {
            HfrError::NotFound(path) => HfrError::NotFound(path.clone()),
            HfrError::Io(e) => HfrError::Io(io::Error::new(e.kind(), e.to_string())),
            HfrError::CorruptIndex(reason) => HfrError::CorruptIndex(reason.clone()),
            HfrError::IntegrityMismatch {
                path,
                expected,
                actual,
            } => HfrError::IntegrityMismatch {
                path: path.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            HfrError::Cancelled => HfrError::Cancelled,
            HfrError::Invariant(reason) => HfrError::Invariant(reason.clone()),
            HfrError::Sidecar(e) => {
                HfrError::Sidecar(<serde_json::Error as serde::de::Error>::custom(e.to_string()))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, HfrError>;
