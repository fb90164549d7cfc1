//! Qdrant-backed [`VectorStore`] over gRPC.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, Distance, Filter, PointId, PointStruct,
    ScoredPoint, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder, point_id::PointIdOptions, value::Kind,
};

use crate::vector_store::{
    FieldCondition, FieldValue, ScoredVectorPoint, ScrollResult, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type QdrantResult<T> = Result<T, Box<qdrant_client::QdrantError>>;
type QdrantPayload = HashMap<String, qdrant_client::qdrant::Value>;

const SCROLL_PAGE: u32 = 100;

/// Thin wrapper over the [`Qdrant`] client for chunk collections.
#[derive(Clone)]
pub struct QdrantOps {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantOps").finish_non_exhaustive()
    }
}

impl QdrantOps {
    /// Create a client for the given gRPC URL. No request is made until first use.
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::Connection`] if the URL is rejected by the client.
    pub fn new(url: &str) -> Result<Self, VectorStoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    async fn create_if_missing(&self, collection: &str, vector_size: u64) -> QdrantResult<()> {
        if self
            .client
            .collection_exists(collection)
            .await
            .map_err(Box::new)?
        {
            return Ok(());
        }
        tracing::info!(collection, vector_size, "creating qdrant collection");
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    async fn search_points(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<Filter>,
    ) -> QdrantResult<Vec<ScoredPoint>> {
        let mut builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        if let Some(f) = filter {
            builder = builder.filter(f);
        }
        let results = self.client.search_points(builder).await.map_err(Box::new)?;
        Ok(results.result)
    }

    async fn exact_count(&self, collection: &str) -> QdrantResult<u64> {
        if !self
            .client
            .collection_exists(collection)
            .await
            .map_err(Box::new)?
        {
            return Ok(0);
        }
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(Box::new)?;
        Ok(response.result.map_or(0, |r| r.count))
    }

    async fn scroll_strings(&self, collection: &str, key_field: &str) -> QdrantResult<ScrollResult> {
        let mut result = HashMap::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .with_payload(true)
                .with_vectors(false)
                .limit(SCROLL_PAGE);
            if let Some(ref off) = offset {
                builder = builder.offset(off.clone());
            }

            let response = self.client.scroll(builder).await.map_err(Box::new)?;
            for point in &response.result {
                let Some(Kind::StringValue(key)) =
                    point.payload.get(key_field).and_then(|v| v.kind.as_ref())
                else {
                    continue;
                };
                let fields = point
                    .payload
                    .iter()
                    .filter_map(|(k, v)| match &v.kind {
                        Some(Kind::StringValue(s)) => Some((k.clone(), s.clone())),
                        _ => None,
                    })
                    .collect();
                result.insert(key.clone(), fields);
            }

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(result)
    }
}

/// Convert a JSON payload map into Qdrant's protobuf payload.
///
/// # Errors
///
/// Returns [`VectorStoreError::Serialization`] for values Qdrant cannot represent.
pub fn json_to_payload(
    payload: HashMap<String, serde_json::Value>,
) -> Result<QdrantPayload, VectorStoreError> {
    serde_json::from_value(serde_json::Value::Object(payload.into_iter().collect()))
        .map_err(|e| VectorStoreError::Serialization(e.to_string()))
}

impl VectorStore for QdrantOps {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.create_if_missing(&collection, vector_size)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let qdrant_points = points
                .into_iter()
                .map(|p| Ok(PointStruct::new(p.id, p.vector, json_to_payload(p.payload)?)))
                .collect::<Result<Vec<_>, VectorStoreError>>()?;
            // wait(true) makes the batch visible to the next search
            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, qdrant_points).wait(true))
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let qdrant_filter = filter.filter(|f| !f.is_empty()).map(vector_filter_to_qdrant);
            let results = self
                .search_points(&collection, vector, limit, qdrant_filter)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            Ok(results.into_iter().map(scored_point_to_vector).collect())
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.exact_count(&collection)
                .await
                .map_err(|e| VectorStoreError::Count(e.to_string()))
        })
    }

    fn scroll_all(
        &self,
        collection: &str,
        key_field: &str,
    ) -> BoxFuture<'_, Result<ScrollResult, VectorStoreError>> {
        let collection = collection.to_owned();
        let key_field = key_field.to_owned();
        Box::pin(async move {
            self.scroll_strings(&collection, &key_field)
                .await
                .map_err(|e| VectorStoreError::Scroll(e.to_string()))
        })
    }
}

fn vector_filter_to_qdrant(filter: VectorFilter) -> Filter {
    Filter {
        must: filter.must.into_iter().map(field_condition_to_qdrant).collect(),
        must_not: filter
            .must_not
            .into_iter()
            .map(field_condition_to_qdrant)
            .collect(),
        ..Filter::default()
    }
}

fn field_condition_to_qdrant(cond: FieldCondition) -> Condition {
    match cond.value {
        FieldValue::Integer(v) => Condition::matches(cond.field, v),
        FieldValue::Text(v) => Condition::matches(cond.field, v),
    }
}

fn scored_point_to_vector(point: ScoredPoint) -> ScoredVectorPoint {
    let payload = point
        .payload
        .into_iter()
        .filter_map(|(k, v)| {
            let json_val = match v.kind? {
                Kind::StringValue(s) => serde_json::Value::String(s),
                Kind::IntegerValue(i) => serde_json::Value::Number(i.into()),
                Kind::DoubleValue(d) => {
                    serde_json::Number::from_f64(d).map(serde_json::Value::Number)?
                }
                Kind::BoolValue(b) => serde_json::Value::Bool(b),
                _ => return None,
            };
            Some((k, json_val))
        })
        .collect();

    let id = match point.id.and_then(|pid| pid.point_id_options) {
        Some(PointIdOptions::Uuid(u)) => u,
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    };

    ScoredVectorPoint {
        id,
        score: point.score,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_valid_url() {
        assert!(QdrantOps::new("http://localhost:6334").is_ok());
    }

    #[test]
    fn new_invalid_url_is_connection_error() {
        let err = QdrantOps::new("not a valid url").unwrap_err();
        assert!(matches!(err, VectorStoreError::Connection(_)));
    }

    #[test]
    fn debug_format() {
        let ops = QdrantOps::new("http://localhost:6334").unwrap();
        assert!(format!("{ops:?}").contains("QdrantOps"));
    }

    #[test]
    fn json_to_payload_keeps_fields() {
        let payload = HashMap::from([
            ("path".to_owned(), serde_json::json!("src/lib.rs")),
            ("start_line".to_owned(), serde_json::json!(1)),
        ]);
        let converted = json_to_payload(payload).unwrap();
        assert_eq!(converted.len(), 2);
        assert!(matches!(
            converted["path"].kind,
            Some(Kind::StringValue(ref s)) if s == "src/lib.rs"
        ));
    }

    #[test]
    fn filter_conversion_splits_must_and_must_not() {
        let filter = VectorFilter::must("kind", FieldValue::text("code"))
            .and_not("language", FieldValue::text("markdown"));
        let converted = vector_filter_to_qdrant(filter);
        assert_eq!(converted.must.len(), 1);
        assert_eq!(converted.must_not.len(), 1);
        assert!(converted.should.is_empty());
    }

    #[test]
    fn scored_point_payload_round_trips_scalars() {
        let payload = json_to_payload(HashMap::from([
            ("chunk_id".to_owned(), serde_json::json!("a.rs#L1-2")),
            ("end_line".to_owned(), serde_json::json!(2)),
        ]))
        .unwrap();
        let point = ScoredPoint {
            id: Some(PointId::from("1b4e28ba-2fa1-11d2-883f-0016d3cca427".to_owned())),
            payload,
            score: 0.5,
            ..ScoredPoint::default()
        };
        let converted = scored_point_to_vector(point);
        assert_eq!(converted.id, "1b4e28ba-2fa1-11d2-883f-0016d3cca427");
        assert_eq!(converted.payload["chunk_id"], "a.rs#L1-2");
        assert_eq!(converted.payload["end_line"], 2);
    }
}
