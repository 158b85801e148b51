use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use scriptorium_outline::OutlineId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for project items, independent of their current path.
/// 專案項目的穩定代號，不隨路徑改變。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
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

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&OutlineId> for ItemId {
    fn from(value: &OutlineId) -> Self {
        Self(value.as_str().to_string())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Variant payload of an [`Item`].
/// [`Item`] 的型別內容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemKind {
    File {
        content: String,
        /// Set when `content` is a stand-in such as `[binary: cover.png]`.
        #[serde(default, skip_serializing_if = "is_false")]
        placeholder: bool,
    },
    Folder {
        #[serde(default)]
        children: Vec<Item>,
    },
}

/// A file or folder as presented to callers.
/// 提供給呼叫端的檔案或資料夾節點。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    /// Project-relative path with `/` separators.
    pub path: String,
    #[serde(flatten)]
    pub kind: ItemKind,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size: u64,
}

impl Item {
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ItemKind::Folder { .. })
    }

    pub fn children(&self) -> &[Item] {
        match &self.kind {
            ItemKind::Folder { children } => children,
            ItemKind::File { .. } => &[],
        }
    }

    /// Text content for files that were read inline; `None` for folders and placeholders.
    pub fn content(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::File {
                content,
                placeholder: false,
            } => Some(content),
            _ => None,
        }
    }

    pub(crate) fn push_child(&mut self, child: Item) {
        if let ItemKind::Folder { children } = &mut self.kind {
            children.push(child);
        }
    }
}

/// Depth-first, pre-order walk over a forest of items.
/// 以深度優先（前序）走訪項目樹。
pub struct Items<'a> {
    pending: Vec<&'a Item>,
}

impl<'a> Items<'a> {
    pub fn new(roots: &'a [Item]) -> Self {
        Self {
            pending: roots.iter().rev().collect(),
        }
    }
}

impl<'a> Iterator for Items<'a> {
    type Item = &'a Item;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.pending.pop()?;
        self.pending.extend(item.children().iter().rev());
        Some(item)
    }
}

/// Aggregate counters over a scanned project.
/// 專案掃描後的統計資料。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub total_files: usize,
    pub total_folders: usize,
    pub total_words: usize,
    pub total_characters: usize,
    /// File count per lowercase extension; files without one are counted under `""`.
    pub file_types: BTreeMap<String, usize>,
}

impl ProjectStats {
    pub fn collect(items: &[Item]) -> Self {
        let mut stats = Self::default();
        for item in Items::new(items) {
            if item.is_folder() {
                stats.total_folders += 1;
                continue;
            }
            stats.total_files += 1;
            if let Some(content) = item.content() {
                stats.total_words += content.split_whitespace().count();
                stats.total_characters += content.chars().count();
            }
            let ext = match item.name.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
                _ => String::new(),
            };
            *stats.file_types.entry(ext).or_default() += 1;
        }
        stats
    }
}

/// Non-fatal problem met while scanning, e.g. an unreadable subdirectory.
/// 掃描時遇到的非致命問題。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub path: String,
    pub message: String,
}

/// Snapshot of a whole project as returned by `getStructure`.
/// `getStructure` 回傳的專案完整快照。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStructure {
    pub id: String,
    pub name: String,
    pub path: String,
    pub items: Vec<Item>,
    pub last_sync: DateTime<Utc>,
    pub stats: ProjectStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ScanWarning>,
}

impl ProjectStructure {
    pub fn iter(&self) -> Items<'_> {
        Items::new(&self.items)
    }

    pub fn find(&self, id: &ItemId) -> Option<&Item> {
        self.iter().find(|item| &item.id == id)
    }

    pub fn find_path(&self, path: &str) -> Option<&Item> {
        self.iter().find(|item| item.path == path)
    }
}
