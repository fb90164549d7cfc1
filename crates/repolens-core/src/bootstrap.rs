//! Wiring of providers, stores and the pipeline from a [`Config`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use repolens_index::{FileChunker, IndexReport, Indexer, Retriever, VectorIndex};
use repolens_llm::AnyProvider;
use repolens_llm::openai::OpenAiProvider;
use repolens_llm::provider::LlmProvider;
use repolens_memory::{InMemoryVectorStore, QdrantOps, VectorStore};

use crate::assistant::{Answer, Assistant, AssistantError};
use crate::config::{Config, ProviderKind, VectorBackend};
use crate::context::ContextAssembler;
use crate::session::{SessionId, SessionStore};

/// Priority: CLI `--config` > `REPOLENS_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli_override: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_override {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("REPOLENS_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

/// # Errors
///
/// Returns an error if the configured provider cannot be built.
pub fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    match config.llm.provider {
        ProviderKind::OpenAi => {
            let api_key = config
                .llm
                .api_key
                .clone()
                .context("openai provider requires REPOLENS_API_KEY or OPENAI_API_KEY")?;
            Ok(AnyProvider::OpenAi(OpenAiProvider::new(
                api_key,
                config.llm.base_url.clone(),
                config.llm.model.clone(),
                config.llm.max_tokens,
                Some(config.llm.embedding_model.clone()),
            )))
        }
        #[cfg(feature = "mock")]
        ProviderKind::Mock => Ok(AnyProvider::Mock(
            repolens_llm::mock::MockProvider::default()
                .with_dimension(config.rag.embedding_dimension),
        )),
        #[cfg(not(feature = "mock"))]
        ProviderKind::Mock => bail!("mock provider requires the `mock` feature"),
    }
}

/// # Errors
///
/// Returns an error if the Qdrant client cannot be created.
pub fn create_vector_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.vector_store.backend {
        VectorBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        VectorBackend::Qdrant => {
            let ops = QdrantOps::new(&config.vector_store.qdrant_url)
                .with_context(|| format!("invalid qdrant url {}", config.vector_store.qdrant_url))?;
            Ok(Arc::new(ops))
        }
    }
}

/// A fully wired repolens instance.
pub struct RepoLens<P: LlmProvider> {
    config: Config,
    provider: Arc<P>,
    index: Arc<VectorIndex>,
    sessions: Arc<SessionStore>,
    assistant: Assistant<P>,
}

impl RepoLens<AnyProvider> {
    /// # Errors
    ///
    /// Returns an error if the provider or vector store cannot be created.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let provider = Arc::new(create_provider(&config)?);
        if !provider.supports_embeddings() {
            bail!("provider {} cannot produce embeddings", provider.name());
        }
        let store = create_vector_store(&config)?;
        Ok(Self::from_parts(config, provider, store))
    }
}

impl<P: LlmProvider> RepoLens<P> {
    #[must_use]
    pub fn from_parts(config: Config, provider: Arc<P>, store: Arc<dyn VectorStore>) -> Self {
        let index = Arc::new(
            VectorIndex::new(store, config.rag.collection_name.clone())
                .with_dimension(config.rag.embedding_dimension),
        );
        let retriever = Retriever::new(Arc::clone(&index), Arc::clone(&provider), config.retrieval())
            .with_retry_policy(config.embedding_retry());
        let assembler = ContextAssembler::new(config.rag.system_prompt.clone(), config.rag.context_budget);
        let assistant = Assistant::new(retriever, Arc::clone(&provider), assembler)
            .with_retry_policy(config.chat_retry());
        let sessions = Arc::new(SessionStore::new(config.memory_bound(), config.idle_ttl()));

        Self {
            config,
            provider,
            index,
            sessions,
            assistant,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// # Errors
    ///
    /// Returns an error if chunking, embedding or upserting fails.
    pub async fn index_repository(&self, root: &Path) -> anyhow::Result<IndexReport> {
        let indexer = Indexer::new(
            Arc::clone(&self.index),
            Arc::clone(&self.provider),
            Box::new(FileChunker::new(self.config.chunker())),
            self.config.indexer(),
        )
        .with_retry_policy(self.config.embedding_retry());
        indexer
            .index_repository(root)
            .await
            .with_context(|| format!("failed to index {}", root.display()))
    }

    /// # Errors
    ///
    /// See [`Assistant::ask`].
    pub async fn ask(&self, session: &SessionId, question: &str) -> Result<Answer, AssistantError> {
        self.assistant.ask(&self.sessions, session, question).await
    }

    /// Forget the conversation of `session`. Returns whether it existed.
    pub fn clear_session(&self, session: &SessionId) -> bool {
        self.sessions.close(session)
    }
}

#[cfg(test)]
mod tests {
    use repolens_llm::mock::MockProvider;
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn config_path_priority() {
        unsafe { std::env::remove_var("REPOLENS_CONFIG") };
        assert_eq!(resolve_config_path(None), PathBuf::from("config/default.toml"));

        unsafe { std::env::set_var("REPOLENS_CONFIG", "/etc/repolens.toml") };
        assert_eq!(resolve_config_path(None), PathBuf::from("/etc/repolens.toml"));
        assert_eq!(
            resolve_config_path(Some(Path::new("cli.toml"))),
            PathBuf::from("cli.toml")
        );
        unsafe { std::env::remove_var("REPOLENS_CONFIG") };
    }

    #[test]
    fn openai_without_key_fails() {
        let config = Config::default();
        let err = create_provider(&config).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn openai_with_key_builds() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-test".into());
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert!(provider.supports_embeddings());
    }

    #[test]
    fn memory_and_qdrant_stores() {
        let mut config = Config::default();
        assert!(create_vector_store(&config).is_ok());
        config.vector_store.backend = VectorBackend::Qdrant;
        assert!(create_vector_store(&config).is_ok());
    }

    #[tokio::test]
    async fn index_then_ask_then_clear() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("memory.rs"),
            "Alice initializes the Memory class",
        )
        .unwrap();

        let mut config = Config::default();
        config.rag.embedding_dimension = 256;
        let lens = RepoLens::from_parts(
            config,
            Arc::new(MockProvider::with_responses(vec!["It stores turns.".into()])),
            Arc::new(InMemoryVectorStore::new()),
        );

        let report = lens.index_repository(dir.path()).await.unwrap();
        assert_eq!(report.chunks_embedded, 1);

        let session = SessionId::from("cli");
        let answer = lens.ask(&session, "What does the Memory class do?").await.unwrap();
        assert_eq!(answer.text, "It stores turns.");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].chunk.metadata().path, "memory.rs");

        assert!(lens.clear_session(&session));
        assert!(lens.sessions().is_empty());
    }
}
