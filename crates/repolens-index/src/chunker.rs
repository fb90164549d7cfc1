//! Line-window chunking of a repository tree.

use std::path::Path;

use crate::chunk::{Chunk, ChunkMetadata};
use crate::error::Result;
use crate::languages::{Lang, detect_language};

/// Turns a repository into chunks.
pub trait Chunker: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the tree cannot be walked.
    fn chunk(&self, root: &Path) -> Result<Vec<Chunk>>;
}

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Lines per chunk window.
    pub max_lines: usize,
    /// Files larger than this are skipped.
    pub max_file_bytes: u64,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_lines: 60,
            max_file_bytes: 1024 * 1024,
        }
    }
}

/// Walks the tree honouring `.gitignore`, skipping hidden entries and files
/// with unknown extensions.
#[derive(Debug, Clone, Default)]
pub struct FileChunker {
    config: ChunkerConfig,
}

impl FileChunker {
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }
}

impl Chunker for FileChunker {
    fn chunk(&self, root: &Path) -> Result<Vec<Chunk>> {
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", root.display()),
            )
            .into());
        }

        let mut chunks = Vec::new();
        let walker = ignore::WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .sort_by_file_name(std::cmp::Ord::cmp)
            .build();

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = entry.path();
            let Some(lang) = detect_language(path) else {
                continue;
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > self.config.max_file_bytes {
                tracing::debug!(path = %path.display(), size, "skipping large file");
                continue;
            }

            let source = match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    tracing::debug!(path = %path.display(), "skipping non-UTF-8 file");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let rel_path = relative_path(root, path);
            chunks.extend(chunk_text(&source, &rel_path, lang, self.config.max_lines));
        }

        Ok(chunks)
    }
}

/// Forward-slash path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Split `source` into windows of `max_lines` lines.
///
/// Line numbers are 1-based and inclusive. Windows containing only whitespace
/// are dropped.
#[must_use]
pub fn chunk_text(source: &str, rel_path: &str, lang: Lang, max_lines: usize) -> Vec<Chunk> {
    let max_lines = max_lines.max(1);
    let lines: Vec<&str> = source.lines().collect();

    lines
        .chunks(max_lines)
        .enumerate()
        .filter(|(_, window)| window.iter().any(|l| !l.trim().is_empty()))
        .map(|(i, window)| {
            let start = i * max_lines + 1;
            let end = start + window.len() - 1;
            Chunk::new(
                format!("{rel_path}#L{start}-{end}"),
                window.join("\n"),
                ChunkMetadata {
                    path: rel_path.to_owned(),
                    language: lang.id().to_owned(),
                    kind: lang.kind(),
                    start_line: Some(start),
                    end_line: Some(end),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::chunk::ChunkKind;

    #[test]
    fn windows_have_line_ranges() {
        let source = (1..=7).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk_text(&source, "src/a.rs", Lang::Rust, 3);
        let ids: Vec<_> = chunks.iter().map(|c| c.id().as_str().to_owned()).collect();
        assert_eq!(ids, ["src/a.rs#L1-3", "src/a.rs#L4-6", "src/a.rs#L7-7"]);
        assert_eq!(chunks[1].text(), "line 4\nline 5\nline 6");
        assert_eq!(chunks[2].metadata().start_line, Some(7));
    }

    #[test]
    fn blank_windows_skipped() {
        let source = "fn a() {}\n\n\n   \n\nfn b() {}";
        let chunks = chunk_text(source, "a.rs", Lang::Rust, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id().as_str(), "a.rs#L1-2");
        assert_eq!(chunks[1].id().as_str(), "a.rs#L5-6");
    }

    #[test]
    fn empty_source_yields_nothing() {
        assert!(chunk_text("", "a.rs", Lang::Rust, 10).is_empty());
    }

    #[test]
    fn zero_max_lines_treated_as_one() {
        assert_eq!(chunk_text("a\nb", "a.txt", Lang::Text, 0).len(), 2);
    }

    #[test]
    fn kind_follows_language() {
        let chunks = chunk_text("# Title", "README.md", Lang::Markdown, 10);
        assert_eq!(chunks[0].kind(), ChunkKind::Doc);
        assert_eq!(chunks[0].metadata().language, "markdown");
    }

    #[test]
    fn walks_tree_with_gitignore_and_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("target")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join("src/lib.rs"), "pub fn add() {}\n").unwrap();
        fs::write(root.join("README.md"), "# Demo\n").unwrap();
        fs::write(root.join("logo.png"), [0u8, 1, 2]).unwrap();
        fs::write(root.join("target/gen.rs"), "fn generated() {}\n").unwrap();
        fs::write(root.join(".hidden/secret.rs"), "fn secret() {}\n").unwrap();
        fs::write(root.join(".gitignore"), "target/\n").unwrap();

        let chunks = FileChunker::default().chunk(root).unwrap();
        let mut paths: Vec<_> = chunks.iter().map(|c| c.metadata().path.clone()).collect();
        paths.sort();
        assert_eq!(paths, ["README.md", "src/lib.rs"]);
    }

    #[test]
    fn skips_large_and_non_utf8_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.rs"), "x".repeat(200)).unwrap();
        fs::write(dir.path().join("bad.rs"), [0xff, 0xfe, 0xfd]).unwrap();
        fs::write(dir.path().join("ok.rs"), "fn ok() {}").unwrap();

        let chunker = FileChunker::new(ChunkerConfig {
            max_lines: 60,
            max_file_bytes: 100,
        });
        let chunks = chunker.chunk(dir.path()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata().path, "ok.rs");
    }

    #[test]
    fn missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(FileChunker::default().chunk(&missing).is_err());
    }
}
