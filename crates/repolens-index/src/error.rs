//! Error types for repolens-index.

use repolens_llm::LlmError;
use repolens_memory::{VectorFilter, VectorStoreError};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] ignore::Error),

    /// A vector's length differs from the index dimension. Fatal for the batch.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// No entries exist, or none match the filter.
    #[error("index is empty or no entries match the filter")]
    EmptyIndex,

    /// The backing store cannot be reached. The caller may retry.
    #[error("vector store unavailable: {0}")]
    Unavailable(String),

    #[error("vector store error: {0}")]
    Store(VectorStoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// A stored payload could not be decoded back into a chunk.
    #[error("invalid payload for point {point}: {reason}")]
    InvalidPayload { point: String, reason: String },

    #[error("retrieval failed for {query:?}: {source}")]
    Retrieval {
        query: String,
        filter: Option<VectorFilter>,
        source: Box<IndexError>,
    },

    #[error("{0}")]
    Other(String),
}

impl From<VectorStoreError> for IndexError {
    fn from(e: VectorStoreError) -> Self {
        match e {
            VectorStoreError::Connection(msg) => Self::Unavailable(msg),
            other => Self::Store(other),
        }
    }
}

impl IndexError {
    /// Whether the failure is transient and the operation may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Llm(e) => e.is_retryable(),
            Self::Retrieval { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
