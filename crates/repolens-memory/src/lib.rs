//! Vector storage and conversation memory.
//!
//! [`VectorStore`] abstracts the similarity-search backend (Qdrant in
//! production, [`InMemoryVectorStore`] for tests and single-process use).
//! [`ConversationMemory`] is the bounded per-session log of turns.

pub mod conversation;
pub mod in_memory_store;
pub mod qdrant_ops;
pub mod tokens;
pub mod types;
pub mod vector_store;

pub use conversation::{ConversationMemory, MemoryBound, MemoryState, WindowBudget};
pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::QdrantOps;
pub use tokens::{estimate_tokens, token_cost};
pub use types::{Turn, TurnRole};
pub use vector_store::{
    FieldCondition, FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore,
    VectorStoreError,
};
