mod env;
mod types;


pub use types::*;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use repolens_index::{ChunkerConfig, IndexerConfig, RetrievalConfig};
use repolens_llm::RetryPolicy;
use repolens_memory::MemoryBound;

/// Every validation failure found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl Config {
    /// Load configuration from a TOML file, apply env var overrides, and
    /// validate the result.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if validation fails (the error downcasts to [`ConfigError`]).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let rag = &self.rag;

        if rag.embedding_dimension == 0 {
            problems.push("rag.embedding_dimension must be greater than 0".to_owned());
        }
        if rag.top_k == 0 {
            problems.push("rag.top_k must be greater than 0".to_owned());
        }
        if rag.oversample_factor < 2 {
            problems.push(format!(
                "rag.oversample_factor must be at least 2, got {}",
                rag.oversample_factor
            ));
        }
        if !(rag.code_bonus.is_finite() && rag.code_bonus > 0.0) {
            problems.push(format!(
                "rag.code_bonus must be a positive number, got {}",
                rag.code_bonus
            ));
        }
        if !(-1.0..=1.0).contains(&rag.score_threshold) {
            problems.push(format!(
                "rag.score_threshold must be within [-1, 1], got {}",
                rag.score_threshold
            ));
        }
        if rag.memory_bound == 0 {
            problems.push("rag.memory_bound must be greater than 0".to_owned());
        }
        if rag.memory_token_budget == Some(0) {
            problems.push("rag.memory_token_budget must be greater than 0 when set".to_owned());
        }
        if rag.context_budget == 0 {
            problems.push("rag.context_budget must be greater than 0".to_owned());
        }
        if rag.collection_name.trim().is_empty() {
            problems.push("rag.collection_name must not be empty".to_owned());
        }
        if self.indexing.max_lines == 0 {
            problems.push("indexing.max_lines must be greater than 0".to_owned());
        }
        if self.indexing.batch_size == 0 {
            problems.push("indexing.batch_size must be greater than 0".to_owned());
        }
        if self.timeouts.llm_seconds == 0 || self.timeouts.embedding_seconds == 0 {
            problems.push("timeouts must be greater than 0 seconds".to_owned());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    #[must_use]
    pub fn retrieval(&self) -> RetrievalConfig {
        RetrievalConfig {
            top_k: self.rag.top_k,
            oversample_factor: self.rag.oversample_factor,
            code_bonus: self.rag.code_bonus,
            score_threshold: self.rag.score_threshold,
        }
    }

    #[must_use]
    pub fn memory_bound(&self) -> MemoryBound {
        MemoryBound {
            max_turns: self.rag.memory_bound,
            max_tokens: self.rag.memory_token_budget,
        }
    }

    #[must_use]
    pub fn chat_retry(&self) -> RetryPolicy {
        self.retry_policy(self.timeouts.llm_seconds)
    }

    #[must_use]
    pub fn embedding_retry(&self) -> RetryPolicy {
        self.retry_policy(self.timeouts.embedding_seconds)
    }

    fn retry_policy(&self, timeout_secs: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.timeouts.max_retries,
            base_backoff: Duration::from_millis(self.timeouts.backoff_ms),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    #[must_use]
    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_lines: self.indexing.max_lines,
            max_file_bytes: self.indexing.max_file_bytes,
        }
    }

    #[must_use]
    pub fn indexer(&self) -> IndexerConfig {
        IndexerConfig {
            batch_size: self.indexing.batch_size,
        }
    }

    #[must_use]
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session.idle_ttl_seconds)
    }
}
