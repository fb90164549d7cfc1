//! Brute-force cosine store behind a `RwLock`.
//!
//! An `upsert` batch is applied under one write guard, so a concurrent search
//! observes either none or all of it. Searches share read guards.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::vector_store::{
    ScoredVectorPoint, ScrollResult, VectorFilter, VectorPoint, VectorStore, VectorStoreError,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type Payload = HashMap<String, serde_json::Value>;
type Collections = HashMap<String, Collection>;

struct Collection {
    dimension: usize,
    points: HashMap<String, (Vec<f32>, Payload)>,
}

impl Collection {
    fn insert_all(&mut self, points: Vec<VectorPoint>) -> Result<(), VectorStoreError> {
        if let Some(bad) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(VectorStoreError::Upsert(format!(
                "point {} has {} dimensions, collection expects {}",
                bad.id,
                bad.vector.len(),
                self.dimension
            )));
        }
        self.points
            .extend(points.into_iter().map(|p| (p.id, (p.vector, p.payload))));
        Ok(())
    }

    /// Matching points, best first; ties broken by id.
    fn nearest(&self, query: &[f32], limit: usize, filter: Option<&VectorFilter>) -> Vec<ScoredVectorPoint> {
        let mut hits: Vec<ScoredVectorPoint> = self
            .points
            .iter()
            .filter(|(_, (_, payload))| filter.is_none_or(|f| f.matches(payload)))
            .map(|(id, (vector, payload))| ScoredVectorPoint {
                id: id.clone(),
                score: cosine_similarity(query, vector),
                payload: payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        hits
    }

    fn string_fields_by(&self, key_field: &str) -> ScrollResult {
        self.points
            .values()
            .filter_map(|(_, payload)| {
                let key = payload.get(key_field)?.as_str()?;
                let fields = payload
                    .iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_owned())))
                    .collect();
                Some((key.to_owned(), fields))
            })
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<Collections>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
        err: fn(String) -> VectorStoreError,
    ) -> Result<RwLockReadGuard<'_, Collections>, VectorStoreError> {
        self.collections.read().map_err(|e| err(e.to_string()))
    }

    fn write(
        &self,
        err: fn(String) -> VectorStoreError,
    ) -> Result<RwLockWriteGuard<'_, Collections>, VectorStoreError> {
        self.collections.write().map_err(|e| err(e.to_string()))
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm(a) * norm(b);
    if denom == 0.0 { 0.0 } else { dot / denom }
}

fn missing(collection: &str, err: fn(String) -> VectorStoreError) -> VectorStoreError {
    err(format!("collection {collection} not found"))
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            let dimension = usize::try_from(vector_size)
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            let mut cols = self.write(VectorStoreError::Collection)?;
            let col = cols.entry(name.clone()).or_insert_with(|| Collection {
                dimension,
                points: HashMap::new(),
            });
            if col.dimension == dimension {
                Ok(())
            } else {
                Err(VectorStoreError::Collection(format!(
                    "collection {name} has vector size {}, requested {dimension}",
                    col.dimension
                )))
            }
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move { Ok(self.read(VectorStoreError::Collection)?.contains_key(&name)) })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.write(VectorStoreError::Upsert)?;
            cols.get_mut(&name)
                .ok_or_else(|| missing(&name, VectorStoreError::Upsert))?
                .insert_all(points)
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            let cols = self.read(VectorStoreError::Search)?;
            let col = cols
                .get(&name)
                .ok_or_else(|| missing(&name, VectorStoreError::Search))?;
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);
            Ok(col.nearest(&vector, limit, filter.as_ref()))
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            let cols = self.read(VectorStoreError::Count)?;
            Ok(cols.get(&name).map_or(0, |col| col.points.len() as u64))
        })
    }

    fn scroll_all(
        &self,
        collection: &str,
        key_field: &str,
    ) -> BoxFuture<'_, Result<ScrollResult, VectorStoreError>> {
        let name = collection.to_owned();
        let key_field = key_field.to_owned();
        Box::pin(async move {
            let cols = self.read(VectorStoreError::Scroll)?;
            let col = cols
                .get(&name)
                .ok_or_else(|| missing(&name, VectorStoreError::Scroll))?;
            Ok(col.string_fields_by(&key_field))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::vector_store::FieldValue;

    fn point(id: &str, vector: Vec<f32>, kind: &str) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector,
            payload: HashMap::from([
                ("chunk_id".into(), serde_json::json!(id)),
                ("kind".into(), serde_json::json!(kind)),
            ]),
        }
    }

    #[tokio::test]
    async fn ensure_collection_and_exists() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("test").await.unwrap());
        store.ensure_collection("test", 3).await.unwrap();
        assert!(store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_collection_idempotent() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();
        store.ensure_collection("test", 3).await.unwrap();
        assert!(store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_collection_rejects_other_size() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();
        let err = store.ensure_collection("test", 4).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::Collection(_)));
    }

    #[tokio::test]
    async fn upsert_and_search() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();

        store
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0, 0.0], "code"),
                    point("b", vec![0.0, 1.0, 0.0], "doc"),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search("test", vec![1.0, 0.0, 0.0], 2, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_id() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 2).await.unwrap();
        store
            .upsert("test", vec![point("a", vec![1.0, 0.0], "code")])
            .await
            .unwrap();
        store
            .upsert("test", vec![point("a", vec![0.0, 1.0], "doc")])
            .await
            .unwrap();

        assert_eq!(store.count("test").await.unwrap(), 1);
        let results = store.search("test", vec![0.0, 1.0], 5, None).await.unwrap();
        assert_eq!(results[0].payload["kind"], "doc");
    }

    #[tokio::test]
    async fn upsert_with_wrong_size_writes_nothing() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 2).await.unwrap();
        let err = store
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0], "code"),
                    point("b", vec![1.0, 0.0, 0.0], "code"),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Upsert(_)));
        assert_eq!(store.count("test").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_with_filter() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();
        store
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0, 0.0], "doc"),
                    point("b", vec![0.9, 0.1, 0.0], "code"),
                ],
            )
            .await
            .unwrap();

        let filter = VectorFilter::must("kind", FieldValue::text("code"));
        let results = store
            .search("test", vec![1.0, 0.0, 0.0], 10, Some(filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn equal_scores_ordered_by_id() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 2).await.unwrap();
        store
            .upsert(
                "test",
                vec![
                    point("z", vec![1.0, 0.0], "code"),
                    point("m", vec![1.0, 0.0], "code"),
                    point("a", vec![1.0, 0.0], "code"),
                ],
            )
            .await
            .unwrap();

        let ids: Vec<_> = store
            .search("test", vec![1.0, 0.0], 3, None)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, ["a", "m", "z"]);
    }

    #[tokio::test]
    async fn count_missing_collection_is_zero() {
        let store = InMemoryVectorStore::new();
        assert_eq!(store.count("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn scroll_all_extracts_strings() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();

        let points = vec![VectorPoint {
            id: "a".into(),
            vector: vec![1.0, 0.0, 0.0],
            payload: HashMap::from([
                ("name".into(), serde_json::json!("alpha")),
                ("desc".into(), serde_json::json!("first")),
                ("num".into(), serde_json::json!(42)),
            ]),
        }];
        store.upsert("test", points).await.unwrap();

        let result = store.scroll_all("test", "name").await.unwrap();
        assert_eq!(result.len(), 1);
        let fields = result.get("alpha").unwrap();
        assert_eq!(fields.get("desc").unwrap(), "first");
        assert!(!fields.contains_key("num"));
    }

    #[tokio::test]
    async fn concurrent_searches_and_upserts() {
        let store = Arc::new(InMemoryVectorStore::new());
        store.ensure_collection("test", 2).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let id = format!("p{i}");
                store
                    .upsert("test", vec![point(&id, vec![1.0, 0.0], "code")])
                    .await
                    .unwrap();
                store.search("test", vec![1.0, 0.0], 10, None).await.unwrap()
            }));
        }
        for handle in handles {
            let hits = handle.await.unwrap();
            assert!(!hits.is_empty());
            assert!(hits.iter().all(|h| h.payload.contains_key("kind")));
        }
        assert_eq!(store.count("test").await.unwrap(), 8);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b)).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_zero_vector() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryVectorStore::new();
        let dbg = format!("{store:?}");
        assert!(dbg.contains("InMemoryVectorStore"));
    }
}
