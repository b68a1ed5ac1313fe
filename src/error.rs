use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the feature store.
///
/// Read paths mostly swallow these into "not found"; write paths return them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Feature not found: {0}")]
    NotFound(String),

    #[error("Feature already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path is outside the allowed roots: {}", .0.display())]
    PathOutsideRoot(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
