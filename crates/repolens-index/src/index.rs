//! Vector index of embedded chunks on top of a [`VectorStore`].

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use repolens_memory::{VectorFilter, VectorPoint, VectorStore};

use crate::chunk::{Chunk, ChunkId, EmbeddedChunk, RetrievedChunk};
use crate::error::{IndexError, Result};

/// Stores `(vector, chunk, metadata)` entries keyed by chunk id.
///
/// All vectors share one dimension, pinned either at construction or by the
/// first entry ever inserted. Upsert is the only mutator.
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    collection: String,
    dimension: OnceLock<usize>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("collection", &self.collection)
            .field("dimension", &self.dimension.get())
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            dimension: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn with_dimension(self, dimension: usize) -> Self {
        let _ = self.dimension.set(dimension);
        self
    }

    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Insert or replace entries, returning how many were written.
    ///
    /// The whole batch is validated first; a batch that fails writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DimensionMismatch`] if any vector has the wrong
    /// length, or a store error.
    pub async fn upsert(&self, entries: Vec<EmbeddedChunk>) -> Result<usize> {
        let Some(first) = entries.first() else {
            return Ok(0);
        };
        let batch_dim = first.vector.len();
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != batch_dim) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension.get().copied().unwrap_or(batch_dim),
                actual: bad.vector.len(),
            });
        }
        if let Some(&expected) = self.dimension.get()
            && batch_dim != expected
        {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: batch_dim,
            });
        }

        self.store
            .ensure_collection(&self.collection, batch_dim as u64)
            .await?;

        let count = entries.len();
        let points = entries
            .into_iter()
            .map(|e| VectorPoint {
                id: e.chunk.id().point_id(),
                payload: e.chunk.to_payload(),
                vector: e.vector,
            })
            .collect();
        self.store.upsert(&self.collection, points).await?;
        // Already set when a concurrent batch of the same dimension landed first.
        let _ = self.dimension.set(batch_dim);

        tracing::debug!(collection = %self.collection, count, "upserted index entries");
        Ok(count)
    }

    /// Entries most similar to `vector` among those matching `filter`, best
    /// first, at most `top_k`. `rank_score` equals `score`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::EmptyIndex`] if nothing matches,
    /// [`IndexError::DimensionMismatch`] for a query of the wrong length, or a
    /// store error.
    pub async fn search(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        filter: Option<VectorFilter>,
    ) -> Result<Vec<RetrievedChunk>> {
        if let Some(&expected) = self.dimension.get()
            && vector.len() != expected
        {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        if !self.store.collection_exists(&self.collection).await? {
            return Err(IndexError::EmptyIndex);
        }

        let hits = self
            .store
            .search(&self.collection, vector, top_k as u64, filter)
            .await?;
        if hits.is_empty() {
            return Err(IndexError::EmptyIndex);
        }

        hits.into_iter()
            .map(|hit| {
                let chunk = Chunk::from_payload(&hit.id, &hit.payload)?;
                Ok(RetrievedChunk {
                    chunk,
                    score: hit.score,
                    rank_score: hit.score,
                })
            })
            .collect()
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn len(&self) -> Result<usize> {
        let count = self.store.count(&self.collection).await?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    /// # Errors
    ///
    /// Returns a store error.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Content hash of every stored chunk, keyed by chunk id.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn content_hashes(&self) -> Result<HashMap<ChunkId, String>> {
        if !self.store.collection_exists(&self.collection).await? {
            return Ok(HashMap::new());
        }
        let rows = self.store.scroll_all(&self.collection, "chunk_id").await?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, mut fields)| {
                fields
                    .remove("content_hash")
                    .map(|hash| (ChunkId::new(id), hash))
            })
            .collect())
    }
}
