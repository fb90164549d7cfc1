//! Repository indexing orchestrator: chunk → diff → embed → upsert.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use repolens_llm::provider::LlmProvider;
use repolens_llm::retry::{RetryPolicy, with_retry};

use crate::chunk::{Chunk, ChunkId, EmbeddedChunk};
use crate::chunker::Chunker;
use crate::context::contextualize_for_embedding;
use crate::error::{IndexError, Result};
use crate::index::VectorIndex;

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Texts sent per `embed_batch` call.
    pub batch_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self { batch_size: 32 }
    }
}

/// Summary of an indexing run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub chunks_total: usize,
    pub chunks_embedded: usize,
    pub chunks_skipped: usize,
    /// Indexed chunks no longer produced by the repository (deleted files,
    /// trailing windows of shrunk files). They remain searchable.
    pub chunks_stale: usize,
    pub duration_ms: u64,
}

impl std::fmt::Display for IndexReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} files, {} chunks ({} embedded, {} unchanged) in {}ms",
            self.files_scanned,
            self.chunks_total,
            self.chunks_embedded,
            self.chunks_skipped,
            self.duration_ms
        )?;
        if self.chunks_stale > 0 {
            write!(f, ", {} stale", self.chunks_stale)?;
        }
        Ok(())
    }
}

pub struct Indexer<P: LlmProvider> {
    index: Arc<VectorIndex>,
    provider: Arc<P>,
    chunker: Box<dyn Chunker>,
    config: IndexerConfig,
    retry: RetryPolicy,
}

impl<P: LlmProvider> Indexer<P> {
    #[must_use]
    pub fn new(
        index: Arc<VectorIndex>,
        provider: Arc<P>,
        chunker: Box<dyn Chunker>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            index,
            provider,
            chunker,
            config,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Index every chunk under `root`, re-embedding only chunks whose content
    /// hash changed since the last run.
    ///
    /// # Errors
    ///
    /// Returns an error if walking, embedding or upserting fails. Batches
    /// upserted before the failure stay in the index.
    pub async fn index_repository(&self, root: &Path) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let chunks = self.chunker.chunk(root)?;
        let existing = self.index.content_hashes().await?;

        let mut report = IndexReport {
            files_scanned: chunks
                .iter()
                .map(|c| c.metadata().path.as_str())
                .collect::<HashSet<_>>()
                .len(),
            chunks_total: chunks.len(),
            ..IndexReport::default()
        };
        let current: HashSet<&ChunkId> = chunks.iter().map(Chunk::id).collect();
        report.chunks_stale = existing.keys().filter(|id| !current.contains(id)).count();
        if report.chunks_stale > 0 {
            tracing::warn!(
                stale = report.chunks_stale,
                "index holds chunks no longer present in the repository"
            );
        }

        let pending: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| existing.get(c.id()) != Some(&c.content_hash()))
            .collect();
        report.chunks_skipped = report.chunks_total - pending.len();
        tracing::info!(
            root = %root.display(),
            chunks = report.chunks_total,
            pending = pending.len(),
            "indexing started"
        );

        let batch_size = self.config.batch_size.max(1);
        let batches = pending.len().div_ceil(batch_size);
        for (i, batch) in pending.chunks(batch_size).enumerate() {
            report.chunks_embedded += self.embed_and_upsert(batch).await?;
            tracing::info!(progress = format_args!("{}/{batches}", i + 1), "batch indexed");
        }

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(%report, "indexing finished");
        Ok(report)
    }

    async fn embed_and_upsert(&self, batch: &[Chunk]) -> Result<usize> {
        let texts: Vec<String> = batch.iter().map(contextualize_for_embedding).collect();
        let vectors = with_retry(self.provider.name(), &self.retry, || {
            self.provider.embed_batch(&texts)
        })
        .await?;
        if vectors.len() != batch.len() {
            return Err(IndexError::Other(format!(
                "{} returned {} embeddings for {} texts",
                self.provider.name(),
                vectors.len(),
                batch.len()
            )));
        }

        let entries = batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
            .collect();
        self.index.upsert(entries).await
    }
}
