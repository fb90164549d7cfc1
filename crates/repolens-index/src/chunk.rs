//! Chunk data model and its vector-store payload encoding.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IndexError, Result};

/// Opaque, stable identifier of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic UUID used as the vector-store point id.
    #[must_use]
    pub fn point_id(&self) -> String {
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, self.0.as_bytes()).to_string()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ChunkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Code,
    Doc,
}

impl ChunkKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Doc => "doc",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "code" => Some(Self::Code),
            "doc" => Some(Self::Doc),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub path: String,
    pub language: String,
    pub kind: ChunkKind,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
}

/// A piece of repository content. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    id: ChunkId,
    text: String,
    metadata: ChunkMetadata,
}

impl Chunk {
    #[must_use]
    pub fn new(id: impl Into<ChunkId>, text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }

    #[must_use]
    pub fn id(&self) -> &ChunkId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn metadata(&self) -> &ChunkMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn kind(&self) -> ChunkKind {
        self.metadata.kind
    }

    /// Hex blake3 digest of the text.
    #[must_use]
    pub fn content_hash(&self) -> String {
        blake3::hash(self.text.as_bytes()).to_hex().to_string()
    }

    /// `path (lines a-b)`, or just the path when the line range is unknown.
    #[must_use]
    pub fn display_header(&self) -> String {
        match (self.metadata.start_line, self.metadata.end_line) {
            (Some(start), Some(end)) => format!("{} (lines {start}-{end})", self.metadata.path),
            _ => self.metadata.path.clone(),
        }
    }

    pub(crate) fn to_payload(&self) -> HashMap<String, Value> {
        let mut payload = HashMap::from([
            ("chunk_id".to_owned(), Value::from(self.id.as_str())),
            ("text".to_owned(), Value::from(self.text.as_str())),
            ("path".to_owned(), Value::from(self.metadata.path.as_str())),
            (
                "language".to_owned(),
                Value::from(self.metadata.language.as_str()),
            ),
            ("kind".to_owned(), Value::from(self.metadata.kind.as_str())),
            ("content_hash".to_owned(), Value::from(self.content_hash())),
        ]);
        if let Some(start) = self.metadata.start_line {
            payload.insert("start_line".to_owned(), Value::from(start));
        }
        if let Some(end) = self.metadata.end_line {
            payload.insert("end_line".to_owned(), Value::from(end));
        }
        payload
    }

    pub(crate) fn from_payload(point: &str, payload: &HashMap<String, Value>) -> Result<Self> {
        let invalid = |reason: &str| IndexError::InvalidPayload {
            point: point.to_owned(),
            reason: reason.to_owned(),
        };
        let text_field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| invalid(&format!("missing string field `{name}`")))
        };
        let line_field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
        };

        let kind = ChunkKind::parse(text_field("kind")?)
            .ok_or_else(|| invalid("unknown chunk kind"))?;

        Ok(Self {
            id: ChunkId::new(text_field("chunk_id")?),
            text: text_field("text")?.to_owned(),
            metadata: ChunkMetadata {
                path: text_field("path")?.to_owned(),
                language: text_field("language")?.to_owned(),
                kind,
                start_line: line_field("start_line"),
                end_line: line_field("end_line"),
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A search hit. `score` is raw cosine similarity; `rank_score` adds the
/// retrieval policy's bonuses.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub rank_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Chunk {
        Chunk::new(
            "src/lib.rs#L1-3",
            "fn hello() { 42 }",
            ChunkMetadata {
                path: "src/lib.rs".into(),
                language: "rust".into(),
                kind: ChunkKind::Code,
                start_line: Some(1),
                end_line: Some(3),
            },
        )
    }

    #[test]
    fn point_id_is_deterministic_uuid() {
        let id = ChunkId::from("src/lib.rs#L1-3");
        assert_eq!(id.point_id(), id.point_id());
        assert_ne!(id.point_id(), ChunkId::from("src/lib.rs#L4-6").point_id());
        let parsed = uuid::Uuid::parse_str(&id.point_id()).unwrap();
        assert_eq!(parsed.get_version_num(), 5);
        assert_eq!(
            parsed,
            uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, b"src/lib.rs#L1-3")
        );
    }

    #[test]
    fn content_hash_tracks_text() {
        let a = sample();
        let b = Chunk::new("other", "fn hello() { 42 }", a.metadata().clone());
        let c = Chunk::new("src/lib.rs#L1-3", "fn hello() { 43 }", a.metadata().clone());
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn payload_decodes_to_same_chunk() {
        let chunk = sample();
        let payload = chunk.to_payload();
        assert_eq!(payload["kind"], "code");
        assert_eq!(payload["start_line"], 1);
        let decoded = Chunk::from_payload("p1", &payload).unwrap();
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn payload_without_lines() {
        let chunk = Chunk::new(
            "notes",
            "free text",
            ChunkMetadata {
                path: "NOTES.txt".into(),
                language: "text".into(),
                kind: ChunkKind::Doc,
                start_line: None,
                end_line: None,
            },
        );
        let payload = chunk.to_payload();
        assert!(!payload.contains_key("start_line"));
        assert_eq!(Chunk::from_payload("p", &payload).unwrap(), chunk);
        assert_eq!(chunk.display_header(), "NOTES.txt");
    }

    #[test]
    fn payload_missing_field_is_error() {
        let mut payload = sample().to_payload();
        payload.remove("text");
        let err = Chunk::from_payload("p9", &payload).unwrap_err();
        assert!(matches!(err, IndexError::InvalidPayload { ref point, .. } if point == "p9"));
    }

    #[test]
    fn payload_unknown_kind_is_error() {
        let mut payload = sample().to_payload();
        payload.insert("kind".into(), Value::from("image"));
        assert!(Chunk::from_payload("p", &payload).is_err());
    }

    #[test]
    fn display_header_with_lines() {
        assert_eq!(sample().display_header(), "src/lib.rs (lines 1-3)");
    }
}
