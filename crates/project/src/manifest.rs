use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::item::ItemId;
use crate::paths;
use crate::util::write_atomic;

/// File name used when the configuration does not override it.
pub const DEFAULT_MANIFEST_FILE: &str = ".scriptorium_manifest.json";

/// Errors emitted while reading or writing a [`PathManifest`].
/// [`PathManifest`] 讀寫時可能拋出的錯誤。
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("manifest {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to serialize manifest {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Persistent mapping from stable item ids to project-relative paths.
/// 穩定項目代號到專案相對路徑的持久對照表。
///
/// On disk this is a flat JSON object `{ "<id>": "<relative/path>" }`.
/// Only paths move; an id never changes once handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathManifest {
    entries: BTreeMap<ItemId, String>,
}

/// Location of the manifest file inside `project_root`.
pub fn manifest_path(project_root: &Path, file_name: &str) -> PathBuf {
    project_root.join(file_name)
}

impl PathManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the manifest, treating a missing file as an empty manifest.
    /// 載入對照表；檔案不存在時回傳空表。
    pub fn load(project_root: &Path, file_name: &str) -> Result<Self, ManifestError> {
        let path = manifest_path(project_root, file_name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => return Err(ManifestError::Read { path, source }),
        };

        let raw: BTreeMap<ItemId, String> =
            serde_json::from_str(&contents).map_err(|err| ManifestError::Corrupt {
                path: path.clone(),
                reason: err.to_string(),
            })?;

        let mut entries = BTreeMap::new();
        for (id, stored) in raw {
            let normalized =
                paths::normalize_relative(&stored).map_err(|err| ManifestError::Corrupt {
                    path: path.clone(),
                    reason: format!("entry {id}: {err}"),
                })?;
            entries.insert(id, normalized);
        }
        tracing::debug!(path = %path.display(), entries = entries.len(), "loaded manifest");
        Ok(Self { entries })
    }

    /// Writes the manifest atomically so a crash never leaves a torn file.
    /// 以原子方式寫入對照表。
    pub fn save(&self, project_root: &Path, file_name: &str) -> Result<(), ManifestError> {
        let path = manifest_path(project_root, file_name);
        let payload = serde_json::to_vec_pretty(self).map_err(|source| ManifestError::Serialize {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &payload).map_err(|source| ManifestError::Write { path, source })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &str)> {
        self.entries.iter().map(|(id, path)| (id, path.as_str()))
    }

    pub fn resolve(&self, id: &ItemId) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.entries.contains_key(id)
    }

    /// Reverse lookup; linear in the number of entries.
    pub fn id_for_path(&self, path: &str) -> Option<&ItemId> {
        self.entries
            .iter()
            .find(|(_, stored)| stored.as_str() == path)
            .map(|(id, _)| id)
    }

    /// Reverse index used by scans that look up many paths at once.
    pub fn path_index(&self) -> HashMap<String, ItemId> {
        let mut index = HashMap::with_capacity(self.entries.len());
        for (id, path) in &self.entries {
            index.entry(path.clone()).or_insert_with(|| id.clone());
        }
        index
    }

    pub fn insert(&mut self, id: ItemId, path: impl Into<String>) -> Option<String> {
        self.entries.insert(id, path.into())
    }

    pub fn remove(&mut self, id: &ItemId) -> Option<String> {
        self.entries.remove(id)
    }

    /// Drops every entry at or below `prefix`, returning the removed ids.
    /// 移除位於 `prefix` 之下（含本身）的所有項目。
    pub fn remove_prefix(&mut self, prefix: &str) -> Vec<ItemId> {
        self.remove_where(|path| paths::is_within(path, prefix))
    }

    pub fn remove_where(&mut self, mut predicate: impl FnMut(&str) -> bool) -> Vec<ItemId> {
        let removed: Vec<ItemId> = self
            .entries
            .iter()
            .filter(|(_, path)| predicate(path))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &removed {
            self.entries.remove(id);
        }
        removed
    }

    /// Rewrites every entry equal to `old` or below it so it sits under `new`,
    /// returning how many entries changed. Matching is segment-aware.
    /// 將 `old` 底下的路徑改寫到 `new` 之下。
    pub fn rewrite_prefix(&mut self, old: &str, new: &str) -> usize {
        let updates: Vec<(ItemId, String)> = self
            .entries
            .iter()
            .filter_map(|(id, path)| paths::rebase(path, old, new).map(|path| (id.clone(), path)))
            .collect();
        let count = updates.len();
        for (id, path) in updates {
            self.entries.insert(id, path);
        }
        count
    }

    /// Removes entries whose path no longer exists under `project_root`.
    /// 移除磁碟上已不存在的路徑項目。
    pub fn prune_missing(&mut self, project_root: &Path) -> Vec<(ItemId, String)> {
        let stale: Vec<(ItemId, String)> = self
            .entries
            .iter()
            .filter(|(_, path)| fs::symlink_metadata(project_root.join(path.as_str())).is_err())
            .map(|(id, path)| (id.clone(), path.clone()))
            .collect();
        for (id, _) in &stale {
            self.entries.remove(id);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id(value: &str) -> ItemId {
        ItemId::from_string(value)
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let mut manifest = PathManifest::new();
        manifest.insert(id("a"), "drafts/one.md");
        manifest.insert(id("b"), "drafts");
        manifest.save(dir.path(), DEFAULT_MANIFEST_FILE).unwrap();

        let loaded = PathManifest::load(dir.path(), DEFAULT_MANIFEST_FILE).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.resolve(&id("a")), Some("drafts/one.md"));
        assert_eq!(loaded.id_for_path("drafts"), Some(&id("b")));
    }

    #[test]
    fn save_creates_the_containing_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("new-project");
        let mut manifest = PathManifest::new();
        manifest.insert(id("a"), "a.md");
        manifest.save(&root, DEFAULT_MANIFEST_FILE).unwrap();
        assert!(root.join(DEFAULT_MANIFEST_FILE).is_file());
    }

    #[test]
    fn load_missing_returns_empty() {
        let dir = tempdir().unwrap();
        let manifest = PathManifest::load(dir.path(), DEFAULT_MANIFEST_FILE).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn load_rejects_garbage_and_escaping_paths() {
        let dir = tempdir().unwrap();
        let path = manifest_path(dir.path(), DEFAULT_MANIFEST_FILE);

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            PathManifest::load(dir.path(), DEFAULT_MANIFEST_FILE),
            Err(ManifestError::Corrupt { .. })
        ));

        fs::write(&path, r#"{"x": "../outside.md"}"#).unwrap();
        assert!(matches!(
            PathManifest::load(dir.path(), DEFAULT_MANIFEST_FILE),
            Err(ManifestError::Corrupt { .. })
        ));
    }

    #[test]
    fn load_normalizes_backslashes() {
        let dir = tempdir().unwrap();
        let path = manifest_path(dir.path(), DEFAULT_MANIFEST_FILE);
        fs::write(&path, r#"{"x": "drafts\\one.md"}"#).unwrap();
        let manifest = PathManifest::load(dir.path(), DEFAULT_MANIFEST_FILE).unwrap();
        assert_eq!(manifest.resolve(&id("x")), Some("drafts/one.md"));
    }

    #[test]
    fn rewrite_prefix_moves_descendants_only() {
        let mut manifest = PathManifest::new();
        manifest.insert(id("dir"), "chapter-1");
        manifest.insert(id("inner"), "chapter-1/scene.md");
        manifest.insert(id("other"), "chapter-10/scene.md");

        assert_eq!(manifest.rewrite_prefix("chapter-1", "part/ch1"), 2);
        assert_eq!(manifest.resolve(&id("dir")), Some("part/ch1"));
        assert_eq!(manifest.resolve(&id("inner")), Some("part/ch1/scene.md"));
        assert_eq!(manifest.resolve(&id("other")), Some("chapter-10/scene.md"));
    }

    #[test]
    fn remove_prefix_returns_removed_ids() {
        let mut manifest = PathManifest::new();
        manifest.insert(id("dir"), "notes");
        manifest.insert(id("inner"), "notes/a.md");
        manifest.insert(id("keep"), "notes.md");

        let mut removed = manifest.remove_prefix("notes");
        removed.sort();
        assert_eq!(removed, vec![id("dir"), id("inner")]);
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn prune_missing_drops_stale_entries() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("kept.md"), "x").unwrap();
        let mut manifest = PathManifest::new();
        manifest.insert(id("kept"), "kept.md");
        manifest.insert(id("gone"), "gone.md");

        let stale = manifest.prune_missing(dir.path());
        assert_eq!(stale, vec![(id("gone"), "gone.md".to_string())]);
        assert!(manifest.contains(&id("kept")));
    }
}
