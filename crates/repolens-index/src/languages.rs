//! Language detection from file extensions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    Bash,
    Toml,
    Json,
    Yaml,
    Markdown,
    Rst,
    Text,
}

impl Lang {
    /// Identifier stored in chunk metadata.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Bash => "bash",
            Self::Toml => "toml",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Markdown => "markdown",
            Self::Rst => "rst",
            Self::Text => "text",
        }
    }

    /// Prose formats are documentation; everything else counts as code.
    #[must_use]
    pub fn kind(self) -> ChunkKind {
        match self {
            Self::Markdown | Self::Rst | Self::Text => ChunkKind::Doc,
            _ => ChunkKind::Code,
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "rs" => Some(Lang::Rust),
        "py" | "pyi" => Some(Lang::Python),
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
        "ts" | "tsx" | "mts" | "cts" => Some(Lang::TypeScript),
        "go" => Some(Lang::Go),
        "java" => Some(Lang::Java),
        "c" | "h" => Some(Lang::C),
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => Some(Lang::Cpp),
        "sh" | "bash" | "zsh" => Some(Lang::Bash),
        "toml" => Some(Lang::Toml),
        "json" | "jsonc" => Some(Lang::Json),
        "yml" | "yaml" => Some(Lang::Yaml),
        "md" | "markdown" => Some(Lang::Markdown),
        "rst" => Some(Lang::Rst),
        "txt" => Some(Lang::Text),
        _ => None,
    }
}
