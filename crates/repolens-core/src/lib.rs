//! Question answering over an indexed repository.
//!
//! [`assistant::Assistant`] runs one query end to end: retrieve chunks,
//! assemble a bounded context with the session's conversation memory, ask
//! the model, and record the exchange. [`bootstrap::RepoLens`] wires the
//! pieces together from a validated [`config::Config`].

pub mod assistant;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod session;

pub use assistant::{Answer, Assistant, AssistantError};
pub use bootstrap::RepoLens;
pub use config::{Config, ConfigError};
pub use context::{AssembledContext, ContextAssembler, ContextError};
pub use session::{Session, SessionId, SessionStore};
