//! Embedding text generation.
//!
//! The vector for a chunk is computed from its text prefixed with the file
//! path, language and kind, which helps conceptual queries such as "where is
//! the config loaded?" land on the right file.

use crate::chunk::Chunk;

#[must_use]
pub fn contextualize_for_embedding(chunk: &Chunk) -> String {
    let meta = chunk.metadata();
    let mut text = String::with_capacity(chunk.text().len() + meta.path.len() + 48);

    text.push_str("# ");
    text.push_str(&meta.path);
    text.push('\n');
    text.push_str("# Language: ");
    text.push_str(&meta.language);
    text.push('\n');
    text.push_str("# Kind: ");
    text.push_str(meta.kind.as_str());
    text.push('\n');
    text.push_str(chunk.text());
    text
}
