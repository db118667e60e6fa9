//! Core data models exchanged with the vault's REST server.
//!
//! These are read-only projections of remote state. Nothing here is cached;
//! each value reflects a single response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A note as returned by `GET /vault/<path>` with the note JSON accept type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub path: String,
    pub content: String,
    pub stat: NoteStat,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub frontmatter: Value,
}

/// File metadata. Timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NoteStat {
    #[serde(rename = "ctime")]
    pub created_at: i64,
    #[serde(rename = "mtime")]
    pub modified_at: i64,
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// One hit from `/search/simple/`. Higher `score` is more relevant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub filename: String,
    pub score: f64,
    #[serde(default)]
    pub matches: Vec<SearchMatch>,
}

impl SearchResult {
    /// Context snippet of the first match, or `""` when the hit carries none.
    pub fn first_context(&self) -> &str {
        self.matches
            .first()
            .map(|m| m.context.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchMatch {
    #[serde(rename = "match")]
    pub span: MatchSpan,
    pub context: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

/// Body of a directory listing. The server may omit `files` entirely.
#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct FileListing {
    #[serde(default)]
    pub files: Vec<String>,
}

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
