use std::collections::HashMap;
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::config::{extension_of, EngineConfig, ScanConfig};
use crate::item::{Item, ItemId, ItemKind, ScanWarning};
use crate::manifest::PathManifest;
use crate::paths;
use crate::util::modified_at;

/// Supplies the id for each path a scan encounters.
/// 為掃描到的每個路徑提供代號。
pub trait IdSource {
    fn id_for(&mut self, relative_path: &str) -> ItemId;
}

/// Mints a fresh id for every path; for throwaway snapshots.
#[derive(Debug, Default)]
pub struct FreshIds;

impl IdSource for FreshIds {
    fn id_for(&mut self, _relative_path: &str) -> ItemId {
        ItemId::new()
    }
}

/// Reuses manifest ids and registers untracked paths under new ids.
/// 沿用對照表中的代號，並為未追蹤路徑註冊新代號。
pub struct ManifestIds<'a> {
    manifest: &'a mut PathManifest,
    by_path: HashMap<String, ItemId>,
    registered: usize,
}

impl<'a> ManifestIds<'a> {
    pub fn new(manifest: &'a mut PathManifest) -> Self {
        let by_path = manifest.path_index();
        Self {
            manifest,
            by_path,
            registered: 0,
        }
    }

    /// Number of paths that received a new id.
    pub fn registered(&self) -> usize {
        self.registered
    }
}

impl IdSource for ManifestIds<'_> {
    fn id_for(&mut self, relative_path: &str) -> ItemId {
        if let Some(id) = self.by_path.get(relative_path) {
            return id.clone();
        }
        let id = ItemId::new();
        self.manifest.insert(id.clone(), relative_path);
        self.by_path.insert(relative_path.to_string(), id.clone());
        self.registered += 1;
        id
    }
}

/// Result of walking a directory tree.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub items: Vec<Item>,
    pub warnings: Vec<ScanWarning>,
}

/// Walks a project directory and builds the item tree.
/// 走訪專案目錄並建立項目樹。
///
/// Entries are sorted by name. Hidden entries (leading `.`) and the manifest
/// file are skipped. An unreadable subdirectory yields a warning and an empty
/// folder instead of failing the whole scan.
#[derive(Debug, Clone)]
pub struct TreeScanner {
    settings: ScanConfig,
    manifest_file: String,
}

impl TreeScanner {
    pub fn new(settings: ScanConfig, manifest_file: impl Into<String>) -> Self {
        Self {
            settings,
            manifest_file: manifest_file.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.scan.clone(), config.manifest_file_name.clone())
    }

    pub fn scan(&self, root: &Path, ids: &mut dyn IdSource) -> ScanOutcome {
        self.scan_dir(root, root, ids)
    }

    /// Builds a single item for `relative_path`, descending into folders.
    /// 為單一路徑建立項目；資料夾會遞迴掃描其內容。
    pub fn describe(
        &self,
        root: &Path,
        relative_path: &str,
        id: ItemId,
        ids: &mut dyn IdSource,
    ) -> io::Result<Item> {
        let absolute = root.join(relative_path);
        let metadata = fs::metadata(&absolute)?;
        if metadata.is_dir() {
            let outcome = self.scan_dir(root, &absolute, ids);
            let mut folder = folder_item(id, relative_path, &metadata);
            for child in outcome.items {
                folder.push_child(child);
            }
            Ok(folder)
        } else {
            Ok(self.file_item(&absolute, relative_path, id, Ok(metadata)))
        }
    }

    fn scan_dir(&self, root: &Path, dir: &Path, ids: &mut dyn IdSource) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        let mut open: Vec<(usize, Item)> = Vec::new();

        let mut walker = WalkDir::new(dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_skipped(entry));

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .and_then(|path| paths::relative_to(root, path).ok())
                        .unwrap_or_default();
                    tracing::warn!(path = %path, error = %err, "skipping unreadable entry");
                    outcome.warnings.push(ScanWarning {
                        path,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            let relative = match paths::relative_to(root, entry.path()) {
                Ok(relative) => relative,
                Err(err) => {
                    tracing::warn!(path = %entry.path().display(), error = %err, "skipping entry");
                    outcome.warnings.push(ScanWarning {
                        path: entry.path().to_string_lossy().into_owned(),
                        message: err.to_string(),
                    });
                    if entry.file_type().is_dir() {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            };

            close_until(&mut open, &mut outcome.items, entry.depth());
            let id = ids.id_for(&relative);
            let metadata = entry.metadata().map_err(io::Error::from);

            if entry.file_type().is_dir() {
                let item = match &metadata {
                    Ok(metadata) => folder_item(id, &relative, metadata),
                    Err(_) => Item {
                        id,
                        name: paths::leaf(&relative).to_string(),
                        path: relative,
                        kind: ItemKind::Folder {
                            children: Vec::new(),
                        },
                        last_modified: None,
                        size: 0,
                    },
                };
                open.push((entry.depth(), item));
            } else {
                let item = self.file_item(entry.path(), &relative, id, metadata);
                attach(&mut open, &mut outcome.items, item);
            }
        }
        close_until(&mut open, &mut outcome.items, 0);
        outcome
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if name == self.manifest_file.as_str() || name.starts_with(&format!("{}.", self.manifest_file))
        {
            return true;
        }
        self.settings.skip_hidden && name.starts_with('.')
    }

    fn file_item(
        &self,
        absolute: &Path,
        relative: &str,
        id: ItemId,
        metadata: io::Result<Metadata>,
    ) -> Item {
        let name = paths::leaf(relative).to_string();
        let (size, last_modified) = match &metadata {
            Ok(metadata) => (metadata.len(), modified_at(metadata)),
            Err(_) => (0, None),
        };

        let (content, placeholder) = if metadata.is_err() {
            (unreadable(&name), true)
        } else if self.reads_inline(&name, size) {
            match fs::read(absolute).map(String::from_utf8) {
                Ok(Ok(text)) => (text, false),
                Ok(Err(_)) => (unreadable(&name), true),
                Err(err) => {
                    tracing::warn!(path = relative, error = %err, "failed to read file content");
                    (unreadable(&name), true)
                }
            }
        } else {
            (format!("[binary: {name}]"), true)
        };

        Item {
            id,
            name,
            path: relative.to_string(),
            kind: ItemKind::File {
                content,
                placeholder,
            },
            last_modified,
            size,
        }
    }

    /// Text-like files (listed extension or none at all) under the size cap.
    fn reads_inline(&self, name: &str, size: u64) -> bool {
        if size >= self.settings.max_inline_bytes {
            return false;
        }
        match extension_of(name) {
            None => true,
            Some(ext) => self.settings.is_text_extension(ext),
        }
    }
}

fn unreadable(name: &str) -> String {
    format!("[unreadable: {name}]")
}

fn folder_item(id: ItemId, relative: &str, metadata: &Metadata) -> Item {
    Item {
        id,
        name: paths::leaf(relative).to_string(),
        path: relative.to_string(),
        kind: ItemKind::Folder {
            children: Vec::new(),
        },
        last_modified: modified_at(metadata),
        size: 0,
    }
}

fn attach(open: &mut [(usize, Item)], roots: &mut Vec<Item>, item: Item) {
    match open.last_mut() {
        Some((_, parent)) => parent.push_child(item),
        None => roots.push(item),
    }
}

/// Closes every open folder at `depth` or deeper, attaching it to its parent.
fn close_until(open: &mut Vec<(usize, Item)>, roots: &mut Vec<Item>, depth: usize) {
    while open.last().is_some_and(|(level, _)| *level >= depth) {
        if let Some((_, folder)) = open.pop() {
            attach(open, roots, folder);
        }
    }
}
