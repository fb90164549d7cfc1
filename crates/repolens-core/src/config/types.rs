use serde::{Deserialize, Serialize};

use crate::context::DEFAULT_SYSTEM_PROMPT;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_top_k() -> usize {
    5
}

fn default_oversample_factor() -> usize {
    3
}

fn default_code_bonus() -> f32 {
    0.05
}

fn default_score_threshold() -> f32 {
    0.2
}

fn default_memory_bound() -> usize {
    20
}

fn default_context_budget() -> usize {
    6000
}

fn default_collection_name() -> String {
    "code_chunks".into()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

/// Retrieval, memory and prompt-budget options.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RagConfig {
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_oversample_factor")]
    pub oversample_factor: usize,
    #[serde(default = "default_code_bonus")]
    pub code_bonus: f32,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    /// Maximum turns kept per session.
    #[serde(default = "default_memory_bound")]
    pub memory_bound: usize,
    /// Optional token cap on the turns kept per session.
    #[serde(default)]
    pub memory_token_budget: Option<usize>,
    /// Token budget of the assembled prompt.
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: default_embedding_dimension(),
            top_k: default_top_k(),
            oversample_factor: default_oversample_factor(),
            code_bonus: default_code_bonus(),
            score_threshold: default_score_threshold(),
            memory_bound: default_memory_bound(),
            memory_token_budget: None,
            context_budget: default_context_budget(),
            collection_name: default_collection_name(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// LLM provider backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Mock,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Read from the environment only.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Memory,
    Qdrant,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorBackend,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            qdrant_url: default_qdrant_url(),
        }
    }
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_llm_timeout")]
    pub llm_seconds: u64,
    #[serde(default = "default_embedding_timeout")]
    pub embedding_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_seconds: default_llm_timeout(),
            embedding_seconds: default_embedding_timeout(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_idle_ttl() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Seconds of inactivity after which a session is dropped.
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_seconds: default_idle_ttl(),
        }
    }
}

fn default_max_lines() -> usize {
    60
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

fn default_batch_size() -> usize {
    32
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexingConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            max_file_bytes: default_max_file_bytes(),
            batch_size: default_batch_size(),
        }
    }
}
