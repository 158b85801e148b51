//! Splits long-form markdown into a hierarchical outline that can be written to disk.
//! 將長篇 Markdown 依標題層級拆分為可寫入磁碟的大綱樹。

mod parser;
mod policy;
mod render;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use parser::{OutlineParser, UNTITLED};
pub use policy::{sanitize_title, OutlinePolicy, MAX_HEADING_DEPTH};
pub use render::render_markdown;

/// Identifier minted for every outline item before it touches disk.
/// 大綱項目在寫入磁碟前產生的識別碼。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutlineId(String);

impl OutlineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OutlineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OutlineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether an outline item materializes as a file or a folder.
/// 大綱項目要寫成檔案或資料夾。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlineKind {
    File,
    Folder,
}

/// A node of the parsed outline, untethered from any filesystem path.
/// 尚未綁定檔案路徑的大綱節點。
///
/// `title` is the display heading; `name` is the sanitized path segment used
/// when the item is materialized. Folders may carry content, which importers
/// write to an index file inside the folder. `depth` is the heading level the
/// item came from; `0` marks text that was not under any heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineItem {
    #[serde(default)]
    pub id: OutlineId,
    pub title: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: OutlineKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub children: Vec<OutlineItem>,
    #[serde(default)]
    pub depth: u8,
}

impl OutlineItem {
    pub fn file(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::build(title.into(), OutlineKind::File, content.into())
    }

    pub fn folder(title: impl Into<String>) -> Self {
        Self::build(title.into(), OutlineKind::Folder, String::new())
    }

    fn build(title: String, kind: OutlineKind, content: String) -> Self {
        Self {
            id: OutlineId::new(),
            title,
            name: String::new(),
            kind,
            content,
            children: Vec::new(),
            depth: 1,
        }
    }

    pub fn with_children(mut self, children: Vec<OutlineItem>) -> Self {
        self.children = children;
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind == OutlineKind::Folder
    }

    /// Returns the path segment for this item, deriving it from the title when
    /// `name` was left empty (e.g. items supplied by an external caller).
    /// 取得項目的路徑片段；若 `name` 為空則由標題推導。
    pub fn segment(&self, policy: &OutlinePolicy) -> String {
        if !self.name.trim().is_empty() {
            return sanitize_title(&self.name);
        }
        match self.kind {
            OutlineKind::File => policy.file_name(&self.title),
            OutlineKind::Folder => policy.folder_name(&self.title),
        }
    }

    /// Total number of items in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(OutlineItem::count).sum::<usize>()
    }
}

/// Errors raised when an outline policy cannot be honoured.
/// 大綱規則無法套用時的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutlineError {
    #[error("heading depth {0} is outside 1..=6")]
    InvalidDepth(u8),
    #[error("invalid extension `{0}`")]
    InvalidExtension(String),
    #[error("invalid index file name `{0}`")]
    InvalidIndexName(String),
}
