//! Repository chunking, vector indexing and code-biased retrieval.
//!
//! Index time: a [`Chunker`] splits files into [`Chunk`]s, the [`Indexer`]
//! embeds them and upserts them into a [`VectorIndex`]. Query time: the
//! [`Retriever`] embeds the question, oversamples the index, and re-ranks
//! hits so that code outranks documentation of similar relevance.

pub mod chunk;
pub mod chunker;
pub(crate) mod context;
pub mod error;
pub mod index;
pub mod indexer;
pub mod languages;
pub mod retriever;

pub use chunk::{Chunk, ChunkId, ChunkKind, ChunkMetadata, EmbeddedChunk, RetrievedChunk};
pub use chunker::{Chunker, ChunkerConfig, FileChunker};
pub use error::{IndexError, Result};
pub use index::VectorIndex;
pub use indexer::{IndexReport, Indexer, IndexerConfig};
pub use retriever::{
    Query, RetrievalConfig, RetrievalResult, Retriever, format_sources, prefer_definition,
};
