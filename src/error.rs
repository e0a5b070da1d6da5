use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the retrieval core.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index artifact is corrupt: {0}")]
    IndexCorrupt(String),

    #[error("partial artifact: '{}' exists but '{}' is missing", present.display(), missing.display())]
    PartialArtifact { present: PathBuf, missing: PathBuf },

    #[error("no persisted artifacts found in '{}'", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("vector store is not ready; build or load it first")]
    NotReady,

    #[error("top_k must be greater than zero")]
    InvalidTopK,

    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl RetrievalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RetrievalError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the errors the taxonomy groups under embedding failures.
    pub fn is_embedding(&self) -> bool {
        matches!(
            self,
            RetrievalError::Embedding(_) | RetrievalError::DimensionMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
