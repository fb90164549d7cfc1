use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("count error: {0}")]
    Count(String),
    #[error("scroll error: {0}")]
    Scroll(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

/// Conjunction of payload conditions applied before similarity ranking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorFilter {
    pub must: Vec<FieldCondition>,
    pub must_not: Vec<FieldCondition>,
}

impl VectorFilter {
    #[must_use]
    pub fn must(field: impl Into<String>, value: FieldValue) -> Self {
        Self::default().and(field, value)
    }

    #[must_use]
    pub fn and(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.must.push(FieldCondition {
            field: field.into(),
            value,
        });
        self
    }

    #[must_use]
    pub fn and_not(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.must_not.push(FieldCondition {
            field: field.into(),
            value,
        });
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    /// Evaluate the filter against a payload.
    #[must_use]
    pub fn matches(&self, payload: &HashMap<String, serde_json::Value>) -> bool {
        let all_must = self.must.iter().all(|cond| {
            payload
                .get(&cond.field)
                .is_some_and(|val| cond.value.matches(val))
        });
        let no_must_not = !self.must_not.iter().any(|cond| {
            payload
                .get(&cond.field)
                .is_some_and(|val| cond.value.matches(val))
        });
        all_must && no_must_not
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

impl FieldValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    fn matches(&self, val: &serde_json::Value) -> bool {
        match self {
            Self::Integer(i) => val.as_i64() == Some(*i),
            Self::Text(s) => val.as_str() == Some(s.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type ScrollResult = HashMap<String, HashMap<String, String>>;

/// Similarity-search backend.
///
/// `upsert` replaces points with an existing id. `search` is read-only and
/// returns points ranked by cosine similarity, highest first, considering only
/// points that match `filter`.
pub trait VectorStore: Send + Sync {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>>;

    /// Map every point's `key_field` value to its string payload fields.
    fn scroll_all(
        &self,
        collection: &str,
        key_field: &str,
    ) -> BoxFuture<'_, Result<ScrollResult, VectorStoreError>>;
}
