//! Code-biased semantic retrieval.
//!
//! The index is oversampled by `oversample_factor`, weak hits are dropped by
//! raw similarity, and code chunks receive `code_bonus` before the final
//! cut to `top_k`. Documentation can still win when it is clearly more
//! relevant than any code.

use std::cmp::Ordering;
use std::fmt::Write;
use std::sync::Arc;

use repolens_llm::provider::LlmProvider;
use repolens_llm::retry::{RetryPolicy, with_retry};
use repolens_memory::VectorFilter;

use crate::chunk::{ChunkKind, RetrievedChunk};
use crate::error::{IndexError, Result};
use crate::index::VectorIndex;

/// Ranked hits, best first.
pub type RetrievalResult = Vec<RetrievedChunk>;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Multiplier applied to `top_k` when querying the index.
    pub oversample_factor: usize,
    /// Added to the score of code chunks when ranking.
    pub code_bonus: f32,
    /// Minimum raw cosine similarity to accept.
    pub score_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            oversample_factor: 3,
            code_bonus: 0.05,
            score_threshold: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: String,
    pub top_k: usize,
    pub filter: Option<VectorFilter>,
}

impl Query {
    #[must_use]
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            filter: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: VectorFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

pub struct Retriever<P: LlmProvider> {
    index: Arc<VectorIndex>,
    provider: Arc<P>,
    config: RetrievalConfig,
    retry: RetryPolicy,
}

impl<P: LlmProvider> Retriever<P> {
    #[must_use]
    pub fn new(index: Arc<VectorIndex>, provider: Arc<P>, config: RetrievalConfig) -> Self {
        Self {
            index,
            provider,
            config,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// [`Query`] with the configured `top_k` and no filter.
    #[must_use]
    pub fn query(&self, text: impl Into<String>) -> Query {
        Query::new(text, self.config.top_k)
    }

    /// Retrieve the most relevant chunks for `query`.
    ///
    /// An empty index, or one where nothing matches the filter, yields an
    /// empty result.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Retrieval`] wrapping the embedding or store
    /// failure.
    pub async fn retrieve(&self, query: &Query) -> Result<RetrievalResult> {
        match self.search(query).await {
            Ok(ranked) => Ok(ranked),
            Err(IndexError::EmptyIndex) => {
                tracing::debug!(query = %query.text, "no indexed chunks match");
                Ok(Vec::new())
            }
            Err(e) => Err(IndexError::Retrieval {
                query: query.text.clone(),
                filter: query.filter.clone(),
                source: Box::new(e),
            }),
        }
    }

    async fn search(&self, query: &Query) -> Result<RetrievalResult> {
        let vector = with_retry(self.provider.name(), &self.retry, || {
            self.provider.embed(&query.text)
        })
        .await?;

        let limit = query
            .top_k
            .saturating_mul(self.config.oversample_factor.max(1));
        let hits = self
            .index
            .search(vector, limit, query.filter.clone())
            .await?;
        let fetched = hits.len();
        let ranked = rank(hits, &self.config, query.top_k);
        tracing::debug!(
            query = %query.text,
            fetched,
            returned = ranked.len(),
            "ranked retrieval hits"
        );
        Ok(ranked)
    }
}

/// Apply the threshold and code bonus, sort and truncate to `top_k`.
///
/// Ties on `rank_score` are broken by raw score, then by chunk id.
#[must_use]
pub fn rank(
    hits: Vec<RetrievedChunk>,
    config: &RetrievalConfig,
    top_k: usize,
) -> Vec<RetrievedChunk> {
    let mut ranked: Vec<_> = hits
        .into_iter()
        .filter(|h| h.score >= config.score_threshold)
        .map(|mut h| {
            h.rank_score = match h.chunk.kind() {
                ChunkKind::Code => h.score + config.code_bonus,
                ChunkKind::Doc => h.score,
            };
            h
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.rank_score
            .partial_cmp(&a.rank_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
            .then_with(|| a.chunk.id().cmp(b.chunk.id()))
    });
    ranked.truncate(top_k);
    ranked
}

/// One line per hit: `path (lines a-b) score=0.83`.
#[must_use]
pub fn format_sources(result: &[RetrievedChunk]) -> String {
    let mut out = String::new();
    for hit in result {
        let _ = writeln!(out, "{} score={:.2}", hit.chunk.display_header(), hit.score);
    }
    out
}

const DEFINITION_KEYWORDS: &[&str] = &["struct", "enum", "trait", "class", "interface", "type"];

/// Move the first code hit that defines a type named in `question` to the
/// front. Other hits keep their order.
///
/// Type names are capitalized identifiers, e.g. `Memory` in "What does the
/// Memory class do?".
pub fn prefer_definition(question: &str, hits: &mut [RetrievedChunk]) {
    let names: Vec<&str> = question
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
        .collect();
    if names.is_empty() {
        return;
    }
    let defining = hits.iter().position(|hit| {
        hit.chunk.kind() == ChunkKind::Code
            && names.iter().any(|name| defines(hit.chunk.text(), name))
    });
    if let Some(pos) = defining {
        hits[..=pos].rotate_right(1);
    }
}

fn defines(text: &str, name: &str) -> bool {
    let mut words = text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .peekable();
    while let Some(word) = words.next() {
        if DEFINITION_KEYWORDS.contains(&word) && words.peek() == Some(&name) {
            return true;
        }
    }
    false
}
