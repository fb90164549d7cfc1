//! Embedding and chat provider abstraction.
//!
//! The RAG pipeline treats both the embedder and the answerer as external
//! capabilities behind [`LlmProvider`]. Every call made by the pipeline goes
//! through [`retry::with_retry`] so that slow or flaky providers surface as
//! typed failures instead of hanging.

pub mod any;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub mod retry;

pub use any::AnyProvider;
pub use error::LlmError;
pub use provider::{LlmProvider, Message, Role};
pub use retry::RetryPolicy;
