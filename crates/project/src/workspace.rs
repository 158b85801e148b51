use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::EngineConfig;
use crate::import::{ImportEntry, ImportOrchestrator, ImportReport};
use crate::item::{Item, ItemId, ProjectStats, ProjectStructure, ScanWarning};
use crate::manifest::{ManifestError, PathManifest};
use crate::paths::{self, PathError};
use crate::scanner::{ManifestIds, TreeScanner};
use crate::util::write_atomic;

const RESERVED_NAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Errors surfaced by [`ProjectWorkspace`] operations.
/// [`ProjectWorkspace`] 操作可能拋出的錯誤。
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("project root {0} does not exist or is not a directory")]
    ProjectNotFound(PathBuf),
    #[error("parent {0} does not resolve to an existing folder")]
    ParentNotFound(ItemId),
    #[error("item `{0}` not found")]
    ItemNotFound(String),
    #[error("`{0}` already exists")]
    NameCollision(String),
    #[error("invalid name `{0}`")]
    InvalidName(String),
    #[error("`{0}` is not a file")]
    NotAFile(String),
    #[error("cannot move `{from}` into `{to}`")]
    InvalidMove { from: String, to: String },
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error("manifest {path} is corrupt: {reason}")]
    ManifestCorrupt { path: PathBuf, reason: String },
    #[error("short write to `{path}`: expected {expected} bytes, found {actual}")]
    ShortWrite {
        path: String,
        expected: u64,
        actual: u64,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("{} import item(s) failed: {}", .0.len(), .0.join("; "))]
    PartialImportFailure(Vec<String>),
    #[error("{operation} changed the filesystem but the manifest could not be saved: {source}")]
    Integrity {
        operation: &'static str,
        #[source]
        source: ManifestError,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl WorkspaceError {
    /// Stable machine-readable code used in operation responses.
    /// 回應中使用的穩定錯誤代碼。
    pub fn code(&self) -> &'static str {
        match self {
            WorkspaceError::ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            WorkspaceError::ParentNotFound(_) => "PARENT_NOT_FOUND",
            WorkspaceError::ItemNotFound(_) => "ITEM_NOT_FOUND",
            WorkspaceError::NameCollision(_) => "NAME_COLLISION",
            WorkspaceError::InvalidName(_) => "INVALID_NAME",
            WorkspaceError::NotAFile(_) => "NOT_A_FILE",
            WorkspaceError::InvalidMove { .. } => "INVALID_MOVE",
            WorkspaceError::InvalidPath(_) => "INVALID_PATH",
            WorkspaceError::ManifestCorrupt { .. } => "MANIFEST_CORRUPT",
            WorkspaceError::ShortWrite { .. } => "SHORT_WRITE",
            WorkspaceError::Io { .. } => "IO_ERROR",
            WorkspaceError::PartialImportFailure(_) => "PARTIAL_IMPORT_FAILURE",
            WorkspaceError::Integrity { .. } => "INTEGRITY_ERROR",
            WorkspaceError::InvalidRequest(_) => "INVALID_REQUEST",
            WorkspaceError::Encode(_) => "ENCODE_FAILED",
        }
    }

    fn io(context: impl Into<String>, source: io::Error) -> Self {
        WorkspaceError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<ManifestError> for WorkspaceError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::Corrupt { path, reason } => {
                WorkspaceError::ManifestCorrupt { path, reason }
            }
            ManifestError::Read { path, source } | ManifestError::Write { path, source } => {
                WorkspaceError::io(format!("manifest {}", path.display()), source)
            }
            ManifestError::Serialize { path, source } => WorkspaceError::ManifestCorrupt {
                path,
                reason: source.to_string(),
            },
        }
    }
}

/// How a caller names an existing item: by stable id or by relative path.
/// 呼叫端指定既有項目的方式：穩定代號或相對路徑。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemRef {
    Id(ItemId),
    Path(String),
}

impl From<ItemId> for ItemRef {
    fn from(id: ItemId) -> Self {
        ItemRef::Id(id)
    }
}

/// A path that could not be removed during a folder delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    pub path: String,
    pub message: String,
}

/// Outcome of a delete; folder deletes may partially succeed.
/// 刪除結果；資料夾刪除可能只部分成功。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub target: String,
    pub removed_ids: Vec<ItemId>,
    pub removed_paths: Vec<String>,
    pub failed: Vec<DeleteFailure>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A project directory plus its path manifest; all mutations go through here.
/// 專案目錄與其路徑對照表；所有變更皆經由此處。
///
/// Every successful filesystem change is followed by a manifest save. When
/// that save fails the change stays on disk and the operation reports
/// [`WorkspaceError::Integrity`].
#[derive(Debug)]
pub struct ProjectWorkspace {
    root: PathBuf,
    config: EngineConfig,
    manifest: PathManifest,
    scanner: TreeScanner,
}

impl ProjectWorkspace {
    /// Opens `root`, loading its manifest (an absent manifest is empty).
    /// 開啟專案目錄並載入對照表。
    pub fn open(root: impl AsRef<Path>, config: EngineConfig) -> Result<Self, WorkspaceError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(WorkspaceError::ProjectNotFound(root));
        }
        let manifest = PathManifest::load(&root, &config.manifest_file_name)?;
        let scanner = TreeScanner::from_config(&config);
        Ok(Self {
            root,
            config,
            manifest,
            scanner,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manifest(&self) -> &PathManifest {
        &self.manifest
    }

    /// Scans the project and returns the full item tree.
    /// 掃描專案並回傳完整項目樹。
    ///
    /// Stale manifest entries are pruned and untracked paths get new ids; the
    /// manifest is saved when either happens. A failed save is reported as a
    /// warning since the scan itself succeeded.
    pub fn structure(&mut self) -> Result<ProjectStructure, WorkspaceError> {
        let pruned = self.manifest.prune_missing(&self.root);
        for (id, path) in &pruned {
            tracing::warn!(%id, path = %path, "pruned stale manifest entry");
        }

        let (outcome, registered) = {
            let mut ids = ManifestIds::new(&mut self.manifest);
            let outcome = self.scanner.scan(&self.root, &mut ids);
            let registered = ids.registered();
            (outcome, registered)
        };

        let mut warnings = outcome.warnings;
        if !pruned.is_empty() || registered > 0 {
            if let Err(err) = self
                .manifest
                .save(&self.root, &self.config.manifest_file_name)
            {
                tracing::warn!(error = %err, "failed to save manifest after scan");
                warnings.push(ScanWarning {
                    path: self.config.manifest_file_name.clone(),
                    message: err.to_string(),
                });
            }
        }

        let name = self
            .root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string());
        let stats = ProjectStats::collect(&outcome.items);
        tracing::debug!(
            files = stats.total_files,
            folders = stats.total_folders,
            registered,
            pruned = pruned.len(),
            "scanned project"
        );

        Ok(ProjectStructure {
            id: name.clone(),
            name,
            path: self.root.display().to_string(),
            items: outcome.items,
            last_sync: Utc::now(),
            stats,
            warnings,
        })
    }

    /// Resolves `target` to the relative path of an item that exists on disk.
    pub fn resolve(&self, target: &ItemRef) -> Result<String, WorkspaceError> {
        let relative = match target {
            ItemRef::Id(id) => self
                .manifest
                .resolve(id)
                .ok_or_else(|| WorkspaceError::ItemNotFound(id.to_string()))?
                .to_string(),
            ItemRef::Path(path) => paths::normalize_relative(path)?,
        };
        if relative
            .split('/')
            .any(|segment| segment == self.config.manifest_file_name)
        {
            return Err(WorkspaceError::ItemNotFound(relative));
        }
        if fs::symlink_metadata(self.absolute(&relative)).is_err() {
            if let ItemRef::Id(id) = target {
                tracing::warn!(%id, path = %relative, "manifest entry points at a missing path");
            }
            return Err(WorkspaceError::ItemNotFound(relative));
        }
        Ok(relative)
    }

    pub fn create_file(
        &mut self,
        name: &str,
        content: &str,
        parent: Option<&ItemId>,
    ) -> Result<Item, WorkspaceError> {
        let file_name = self.config.ensure_extension(&clean_name(name)?);
        self.create_file_with_id(ItemId::new(), &file_name, content, parent)
    }

    /// Creates a file named exactly `file_name` under `parent`, never overwriting.
    pub(crate) fn create_file_with_id(
        &mut self,
        id: ItemId,
        file_name: &str,
        content: &str,
        parent: Option<&ItemId>,
    ) -> Result<Item, WorkspaceError> {
        let parent_rel = self.parent_dir(parent)?;
        let file_name = clean_name(file_name)?;
        let relative = paths::join(&parent_rel, &file_name);
        let absolute = self.absolute(&relative);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&absolute)
            .map_err(|err| match err.kind() {
                ErrorKind::AlreadyExists => WorkspaceError::NameCollision(relative.clone()),
                _ => WorkspaceError::io(format!("create {relative}"), err),
            })?;
        if let Err(err) = file.write_all(content.as_bytes()).and_then(|_| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&absolute);
            return Err(WorkspaceError::io(format!("write {relative}"), err));
        }

        self.manifest.insert(id.clone(), relative.clone());
        tracing::info!(%id, path = %relative, bytes = content.len(), "created file");
        self.finish("createFile", &relative, id)
    }

    pub fn create_folder(
        &mut self,
        name: &str,
        parent: Option<&ItemId>,
    ) -> Result<Item, WorkspaceError> {
        self.create_folder_with_id(ItemId::new(), name, parent)
    }

    pub(crate) fn create_folder_with_id(
        &mut self,
        id: ItemId,
        name: &str,
        parent: Option<&ItemId>,
    ) -> Result<Item, WorkspaceError> {
        let parent_rel = self.parent_dir(parent)?;
        let folder_name = clean_name(name)?;
        let relative = paths::join(&parent_rel, &folder_name);

        fs::create_dir(self.absolute(&relative)).map_err(|err| match err.kind() {
            ErrorKind::AlreadyExists => WorkspaceError::NameCollision(relative.clone()),
            _ => WorkspaceError::io(format!("create folder {relative}"), err),
        })?;

        self.manifest.insert(id.clone(), relative.clone());
        tracing::info!(%id, path = %relative, "created folder");
        self.finish("createFolder", &relative, id)
    }

    /// Replaces the content of an existing file.
    /// 取代既有檔案的內容。
    pub fn update_content(
        &mut self,
        target: &ItemRef,
        content: &str,
    ) -> Result<Item, WorkspaceError> {
        let relative = self.resolve(target)?;
        let absolute = self.absolute(&relative);
        if !absolute.is_file() {
            return Err(WorkspaceError::NotAFile(relative));
        }
        write_atomic(&absolute, content.as_bytes())
            .map_err(|err| WorkspaceError::io(format!("write {relative}"), err))?;

        let id = self.id_for(&relative);
        tracing::info!(%id, path = %relative, bytes = content.len(), "updated content");
        self.finish("updateContent", &relative, id)
    }

    /// Renames an item in place; the id survives and descendants follow.
    /// 就地重新命名；代號不變，子項目路徑一併更新。
    pub fn rename(&mut self, target: &ItemRef, new_name: &str) -> Result<Item, WorkspaceError> {
        let old_rel = self.resolve(target)?;
        let name = clean_name(new_name)?;
        let new_rel = paths::join(paths::parent(&old_rel), &name);
        self.relocate("rename", &old_rel, &new_rel)
    }

    /// Moves an item under `new_parent` (the root when `None`), keeping its name.
    /// 將項目移至新的上層資料夾。
    pub fn move_item(
        &mut self,
        target: &ItemRef,
        new_parent: Option<&ItemId>,
    ) -> Result<Item, WorkspaceError> {
        let old_rel = self.resolve(target)?;
        let parent_rel = self.parent_dir(new_parent)?;
        if paths::is_within(&parent_rel, &old_rel) {
            return Err(WorkspaceError::InvalidMove {
                from: old_rel,
                to: parent_rel,
            });
        }
        let new_rel = paths::join(&parent_rel, paths::leaf(&old_rel));
        self.relocate("move", &old_rel, &new_rel)
    }

    fn relocate(
        &mut self,
        operation: &'static str,
        old_rel: &str,
        new_rel: &str,
    ) -> Result<Item, WorkspaceError> {
        let id = self.id_for(old_rel);
        if old_rel == new_rel {
            return self.finish(operation, new_rel, id);
        }
        let new_abs = self.absolute(new_rel);
        if fs::symlink_metadata(&new_abs).is_ok() {
            return Err(WorkspaceError::NameCollision(new_rel.to_string()));
        }
        fs::rename(self.absolute(old_rel), &new_abs)
            .map_err(|err| WorkspaceError::io(format!("{operation} {old_rel}"), err))?;

        let rewritten = self.manifest.rewrite_prefix(old_rel, new_rel);
        tracing::info!(%id, from = old_rel, to = new_rel, rewritten, "relocated item");
        self.finish(operation, new_rel, id)
    }

    /// Deletes a file, or a folder with everything inside it.
    /// 刪除檔案，或連同內容刪除資料夾。
    ///
    /// Folder deletes continue past individual failures and report them; the
    /// manifest loses exactly the entries whose paths were removed.
    pub fn delete(&mut self, target: &ItemRef) -> Result<DeleteReport, WorkspaceError> {
        let relative = self.resolve(target)?;
        let absolute = self.absolute(&relative);
        let metadata = fs::symlink_metadata(&absolute)
            .map_err(|err| WorkspaceError::io(format!("stat {relative}"), err))?;

        let mut report = DeleteReport {
            target: relative.clone(),
            ..DeleteReport::default()
        };

        if !metadata.is_dir() {
            fs::remove_file(&absolute)
                .map_err(|err| WorkspaceError::io(format!("delete {relative}"), err))?;
            report.removed_paths.push(relative.clone());
        } else {
            self.remove_tree(&absolute, &mut report);
        }

        report.removed_ids = if fs::symlink_metadata(&absolute).is_err() {
            self.manifest.remove_prefix(&relative)
        } else {
            let removed: HashSet<&str> = report.removed_paths.iter().map(String::as_str).collect();
            self.manifest.remove_where(|path| removed.contains(path))
        };

        if !report.is_complete() {
            tracing::warn!(
                path = %relative,
                failed = report.failed.len(),
                "delete left some entries behind"
            );
        }
        tracing::info!(path = %relative, removed = report.removed_paths.len(), "deleted item");

        if !report.removed_paths.is_empty() {
            self.persist("delete")?;
        }
        Ok(report)
    }

    fn remove_tree(&self, absolute: &Path, report: &mut DeleteReport) {
        for entry in WalkDir::new(absolute).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .and_then(|path| paths::relative_to(&self.root, path).ok())
                        .unwrap_or_else(|| report.target.clone());
                    report.failed.push(DeleteFailure {
                        path,
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            let relative = paths::relative_to(&self.root, entry.path())
                .unwrap_or_else(|_| entry.path().to_string_lossy().into_owned());
            let result = if entry.file_type().is_dir() {
                fs::remove_dir(entry.path())
            } else {
                fs::remove_file(entry.path())
            };
            match result {
                Ok(()) => report.removed_paths.push(relative),
                Err(err) => report.failed.push(DeleteFailure {
                    path: relative,
                    message: err.to_string(),
                }),
            }
        }
    }

    /// Writes a batch of outline items or loose files under `parent`.
    /// 在指定資料夾下批次匯入大綱項目或檔案。
    pub fn import_batch(
        &mut self,
        parent: Option<&ItemId>,
        entries: Vec<ImportEntry>,
    ) -> Result<ImportReport, WorkspaceError> {
        ImportOrchestrator::new(self).import_entries(parent, entries)
    }

    /// Relative path of the folder named by `parent`; `""` is the project root.
    pub(crate) fn parent_dir(&self, parent: Option<&ItemId>) -> Result<String, WorkspaceError> {
        let Some(id) = parent else {
            return Ok(String::new());
        };
        let relative = self
            .manifest
            .resolve(id)
            .ok_or_else(|| WorkspaceError::ParentNotFound(id.clone()))?;
        if !self.absolute(relative).is_dir() {
            return Err(WorkspaceError::ParentNotFound(id.clone()));
        }
        Ok(relative.to_string())
    }

    /// Byte length actually on disk for `relative`, compared against `expected`.
    pub(crate) fn verify_length(&self, relative: &str, expected: u64) -> Result<(), WorkspaceError> {
        let actual = fs::read(self.absolute(relative))
            .map_err(|err| WorkspaceError::io(format!("verify {relative}"), err))?
            .len() as u64;
        if actual != expected {
            return Err(WorkspaceError::ShortWrite {
                path: relative.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Id for `relative`, registering the path when it is not yet tracked.
    fn id_for(&mut self, relative: &str) -> ItemId {
        if let Some(id) = self.manifest.id_for_path(relative) {
            return id.clone();
        }
        let id = ItemId::new();
        self.manifest.insert(id.clone(), relative);
        id
    }

    /// Builds the returned item, then saves the manifest.
    fn finish(
        &mut self,
        operation: &'static str,
        relative: &str,
        id: ItemId,
    ) -> Result<Item, WorkspaceError> {
        let described = {
            let mut ids = ManifestIds::new(&mut self.manifest);
            self.scanner.describe(&self.root, relative, id, &mut ids)
        };
        self.persist(operation)?;
        described.map_err(|err| WorkspaceError::io(format!("describe {relative}"), err))
    }

    fn persist(&mut self, operation: &'static str) -> Result<(), WorkspaceError> {
        self.manifest
            .save(&self.root, &self.config.manifest_file_name)
            .map_err(|source| {
                tracing::error!(
                    operation,
                    error = %source,
                    "filesystem changed but manifest save failed"
                );
                WorkspaceError::Integrity { operation, source }
            })
    }
}

/// Validates a user-supplied item name and swaps reserved characters for `_`.
/// 驗證名稱並將保留字元替換為 `_`。
pub(crate) fn clean_name(raw: &str) -> Result<String, WorkspaceError> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let invalid = collapsed.is_empty()
        || collapsed.starts_with('.')
        || collapsed.contains(['/', '\\'])
        || collapsed.chars().any(char::is_control);
    if invalid {
        return Err(WorkspaceError::InvalidName(raw.to_string()));
    }
    Ok(collapsed
        .chars()
        .map(|ch| if RESERVED_NAME_CHARS.contains(&ch) { '_' } else { ch })
        .collect())
}
