use scriptorium_outline::{OutlineItem, OutlineKind, OutlinePolicy};
use serde::{Deserialize, Serialize};

use crate::item::ItemId;
use crate::paths;
use crate::workspace::{ProjectWorkspace, WorkspaceError};

/// A loose file supplied for import, named as it should appear on disk.
/// 以檔名指定的匯入檔案。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlob {
    pub name: String,
    #[serde(default)]
    pub content: String,
}

/// One element of an import batch.
/// 匯入批次中的單一元素。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportEntry {
    Outline(OutlineItem),
    Blob(FileBlob),
}

impl ImportEntry {
    fn into_outline(self) -> OutlineItem {
        match self {
            ImportEntry::Outline(item) => item,
            ImportEntry::Blob(blob) => {
                let mut item = OutlineItem::file(blob.name.clone(), blob.content);
                item.name = blob.name;
                item
            }
        }
    }
}

/// Lifecycle of a single item inside an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemState {
    Pending,
    Writing,
    Committed,
    Failed,
}

/// Lifecycle of the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedItem {
    pub id: ItemId,
    pub title: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: OutlineKind,
    pub state: ItemState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailure {
    pub title: String,
    /// Intended relative path, when the parent was known.
    pub path: Option<String>,
    pub code: String,
    pub message: String,
    pub state: ItemState,
}

/// Non-fatal finding on an item that was written, such as a short write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportWarning {
    pub path: String,
    pub code: String,
    pub message: String,
}

/// Per-item outcome of an import run.
/// 匯入作業的逐項結果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub state: RunState,
    pub created: Vec<ImportedItem>,
    pub failed: Vec<ImportFailure>,
    pub warnings: Vec<ImportWarning>,
}

impl Default for ImportReport {
    fn default() -> Self {
        Self {
            state: RunState::Running,
            created: Vec::new(),
            failed: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ImportReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// [`WorkspaceError::PartialImportFailure`] naming every failed item, if any.
    pub fn partial_failure(&self) -> Option<WorkspaceError> {
        if self.is_success() {
            return None;
        }
        Some(WorkspaceError::PartialImportFailure(
            self.failed
                .iter()
                .map(|failure| format!("{} ({}): {}", failure.title, failure.code, failure.message))
                .collect(),
        ))
    }

    /// Turns a report with failures into [`WorkspaceError::PartialImportFailure`].
    pub fn into_result(self) -> Result<Self, WorkspaceError> {
        match self.partial_failure() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Pending unit of work: an outline item and the folder it goes into.
struct Task<'a> {
    item: &'a OutlineItem,
    parent: Option<ItemId>,
    parent_path: String,
}

/// Materializes an outline tree into the workspace, one item at a time.
/// 將大綱樹逐項寫入工作區。
///
/// Items are written depth-first so every parent folder exists before its
/// children. A failed item never aborts the run; descendants of a failed
/// folder are reported as skipped.
pub struct ImportOrchestrator<'w> {
    workspace: &'w mut ProjectWorkspace,
    policy: OutlinePolicy,
    report: ImportReport,
}

impl<'w> ImportOrchestrator<'w> {
    pub fn new(workspace: &'w mut ProjectWorkspace) -> Self {
        let policy = workspace.config().outline.clone();
        Self {
            workspace,
            policy,
            report: ImportReport::default(),
        }
    }

    pub fn import_entries(
        self,
        parent: Option<&ItemId>,
        entries: Vec<ImportEntry>,
    ) -> Result<ImportReport, WorkspaceError> {
        let items: Vec<OutlineItem> = entries.into_iter().map(ImportEntry::into_outline).collect();
        self.import_tree(parent, &items)
    }

    /// Writes `items` under `parent`. Only an unresolvable parent fails the
    /// call as a whole; everything else lands in the report.
    pub fn import_tree(
        mut self,
        parent: Option<&ItemId>,
        items: &[OutlineItem],
    ) -> Result<ImportReport, WorkspaceError> {
        let parent_path = self.workspace.parent_dir(parent)?;
        let mut pending: Vec<Task<'_>> = items
            .iter()
            .rev()
            .map(|item| Task {
                item,
                parent: parent.cloned(),
                parent_path: parent_path.clone(),
            })
            .collect();

        while let Some(task) = pending.pop() {
            if let Some(folder) = self.import_one(&task) {
                for child in task.item.children.iter().rev() {
                    pending.push(Task {
                        item: child,
                        parent: Some(folder.0.clone()),
                        parent_path: folder.1.clone(),
                    });
                }
            }
        }

        self.report.state = RunState::Completed;
        tracing::info!(
            created = self.report.created.len(),
            failed = self.report.failed.len(),
            warnings = self.report.warnings.len(),
            "import finished"
        );
        Ok(self.report)
    }

    /// Writes one item. Returns the id and path of a created folder so the
    /// caller can queue its children.
    fn import_one(&mut self, task: &Task<'_>) -> Option<(ItemId, String)> {
        let item = task.item;
        let as_folder = item.is_folder() || !item.children.is_empty();
        let segment = if as_folder && !item.is_folder() {
            self.policy.folder_name(&item.title)
        } else if as_folder {
            item.segment(&self.policy)
        } else {
            self.workspace
                .config()
                .ensure_extension(&item.segment(&self.policy))
        };
        let path = paths::join(&task.parent_path, &segment);

        let mut state = ItemState::Pending;
        let id = self.choose_id(item);
        advance(&mut state, ItemState::Writing, &path);

        let result = if as_folder {
            self.workspace
                .create_folder_with_id(id, &segment, task.parent.as_ref())
        } else {
            self.workspace
                .create_file_with_id(id, &segment, &item.content, task.parent.as_ref())
        };

        let created = match result {
            Ok(created) => created,
            Err(err) => {
                advance(&mut state, ItemState::Failed, &path);
                self.fail(item, Some(path.clone()), &err, state);
                if as_folder {
                    self.skip_descendants(item, &path);
                }
                return None;
            }
        };

        advance(&mut state, ItemState::Committed, &path);
        self.report.created.push(ImportedItem {
            id: created.id.clone(),
            title: item.title.clone(),
            path: created.path.clone(),
            kind: if as_folder {
                OutlineKind::Folder
            } else {
                OutlineKind::File
            },
            state,
        });

        if !as_folder {
            self.verify(&created.path, &item.content);
            return None;
        }
        if !item.content.trim().is_empty() {
            self.write_index(item, &created.id, &created.path);
        }
        Some((created.id, created.path))
    }

    /// Folder body text goes to the policy's index file inside the folder.
    fn write_index(&mut self, item: &OutlineItem, folder: &ItemId, folder_path: &str) {
        let name = self.policy.index_file_name.clone();
        let path = paths::join(folder_path, &name);
        match self
            .workspace
            .create_file_with_id(ItemId::new(), &name, &item.content, Some(folder))
        {
            Ok(index) => {
                self.report.created.push(ImportedItem {
                    id: index.id,
                    title: item.title.clone(),
                    path: index.path.clone(),
                    kind: OutlineKind::File,
                    state: ItemState::Committed,
                });
                self.verify(&index.path, &item.content);
            }
            Err(err) => self.fail(item, Some(path), &err, ItemState::Failed),
        }
    }

    fn verify(&mut self, path: &str, content: &str) {
        if let Err(err) = self.workspace.verify_length(path, content.len() as u64) {
            tracing::warn!(path, error = %err, "imported file failed verification");
            self.report.warnings.push(ImportWarning {
                path: path.to_string(),
                code: err.code().to_string(),
                message: err.to_string(),
            });
        }
    }

    /// Keeps the outline id when it is free so callers can correlate results.
    fn choose_id(&self, item: &OutlineItem) -> ItemId {
        let candidate = ItemId::from(&item.id);
        if candidate.as_str().is_empty() || self.workspace.manifest().contains(&candidate) {
            ItemId::new()
        } else {
            candidate
        }
    }

    fn fail(
        &mut self,
        item: &OutlineItem,
        path: Option<String>,
        err: &WorkspaceError,
        state: ItemState,
    ) {
        tracing::warn!(title = %item.title, error = %err, "import item failed");
        self.report.failed.push(ImportFailure {
            title: item.title.clone(),
            path,
            code: err.code().to_string(),
            message: err.to_string(),
            state,
        });
    }

    fn skip_descendants(&mut self, folder: &OutlineItem, folder_path: &str) {
        let mut pending: Vec<&OutlineItem> = folder.children.iter().rev().collect();
        while let Some(item) = pending.pop() {
            self.report.failed.push(ImportFailure {
                title: item.title.clone(),
                path: None,
                code: "SKIPPED".to_string(),
                message: format!("parent folder `{folder_path}` was not created"),
                state: ItemState::Failed,
            });
            pending.extend(item.children.iter().rev());
        }
    }
}

fn advance(state: &mut ItemState, next: ItemState, path: &str) {
    debug_assert!(matches!(
        (*state, next),
        (ItemState::Pending, ItemState::Writing)
            | (ItemState::Writing, ItemState::Committed)
            | (ItemState::Writing, ItemState::Failed)
    ));
    tracing::trace!(path, from = ?*state, to = ?next, "import item state");
    *state = next;
}
