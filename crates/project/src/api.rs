//! JSON-shaped request dispatcher, one call per operation.
//! 以 JSON 形式描述的請求分派器。

use std::path::PathBuf;

use scriptorium_outline::OutlineParser;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::list_projects;
use crate::config::EngineConfig;
use crate::import::{ImportEntry, ImportOrchestrator, ImportReport};
use crate::item::{ItemId, ProjectStructure};
use crate::workspace::{ItemRef, ProjectWorkspace, WorkspaceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    GetStructure,
    CreateFile,
    CreateFolder,
    UpdateContent,
    Rename,
    Move,
    Delete,
    Import,
    ImportOutline,
    /// Lists projects under `projectRoot`, which names the projects root.
    ListProjects,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub action: Action,
    pub project_root: PathBuf,
    #[serde(default)]
    pub parent_id: Option<ItemId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub old_path: Option<String>,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub target_parent_id: Option<ItemId>,
    #[serde(default)]
    pub items: Option<Vec<ImportEntry>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub fallback_name: Option<String>,
}

impl OperationRequest {
    pub fn new(action: Action, project_root: impl Into<PathBuf>) -> Self {
        Self {
            action,
            project_root: project_root.into(),
            parent_id: None,
            name: None,
            content: None,
            old_path: None,
            item_id: None,
            new_name: None,
            target_parent_id: None,
            items: None,
            text: None,
            fallback_name: None,
        }
    }

    fn target(&self) -> Result<ItemRef, WorkspaceError> {
        match (&self.item_id, &self.old_path) {
            (Some(id), _) => Ok(ItemRef::Id(id.clone())),
            (None, Some(path)) => Ok(ItemRef::Path(path.clone())),
            (None, None) => Err(missing("itemId or oldPath")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_structure: Option<ProjectStructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl OperationResponse {
    fn failure(err: &WorkspaceError, updated_structure: Option<ProjectStructure>) -> Self {
        Self {
            success: false,
            result: None,
            updated_structure,
            error: Some(ErrorBody {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
        }
    }
}

/// Payload of a finished action. `partial` is set when the action produced a
/// report but some of its items failed.
struct Executed {
    result: Option<Value>,
    partial: Option<WorkspaceError>,
}

impl Executed {
    fn value(result: Value) -> Self {
        Self {
            result: Some(result),
            partial: None,
        }
    }

    fn import(report: &ImportReport) -> Result<Self, WorkspaceError> {
        Ok(Self {
            result: Some(serde_json::to_value(report)?),
            partial: report.partial_failure(),
        })
    }
}

/// Runs one request against the project it names and reports the outcome
/// together with a fresh structure snapshot.
/// 執行單一請求，並附上最新的專案結構。
///
/// The snapshot is attached on failure too, so callers can see any partial
/// change that did reach the disk. Import reports are returned in `result`
/// even when some items failed.
pub fn handle(request: OperationRequest, config: &EngineConfig) -> OperationResponse {
    let action = request.action;
    if action == Action::ListProjects {
        return list(&request);
    }

    let mut workspace = match ProjectWorkspace::open(&request.project_root, config.clone()) {
        Ok(workspace) => workspace,
        Err(err) => {
            tracing::warn!(?action, error = %err, "failed to open project");
            return OperationResponse::failure(&err, None);
        }
    };

    let outcome = execute(&mut workspace, request, config);
    let (structure, outcome) = match workspace.structure() {
        Ok(structure) => {
            let outcome = if action == Action::GetStructure {
                serde_json::to_value(&structure)
                    .map(Executed::value)
                    .map_err(WorkspaceError::from)
            } else {
                outcome
            };
            (Some(structure), outcome)
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to rescan project");
            let outcome = if action == Action::GetStructure {
                Err(err)
            } else {
                outcome
            };
            (None, outcome)
        }
    };

    match outcome {
        Ok(Executed {
            result,
            partial: None,
        }) => OperationResponse {
            success: true,
            result,
            updated_structure: structure,
            error: None,
        },
        Ok(Executed {
            result,
            partial: Some(err),
        }) => {
            tracing::warn!(?action, code = err.code(), error = %err, "operation partially failed");
            OperationResponse {
                result,
                ..OperationResponse::failure(&err, structure)
            }
        }
        Err(err) => {
            tracing::warn!(?action, code = err.code(), error = %err, "operation failed");
            OperationResponse::failure(&err, structure)
        }
    }
}

fn list(request: &OperationRequest) -> OperationResponse {
    let listed = list_projects(&request.project_root)
        .and_then(|catalog| serde_json::to_value(catalog).map_err(WorkspaceError::from));
    match listed {
        Ok(result) => OperationResponse {
            success: true,
            result: Some(result),
            updated_structure: None,
            error: None,
        },
        Err(err) => {
            tracing::warn!(code = err.code(), error = %err, "failed to list projects");
            OperationResponse::failure(&err, None)
        }
    }
}

fn execute(
    workspace: &mut ProjectWorkspace,
    request: OperationRequest,
    config: &EngineConfig,
) -> Result<Executed, WorkspaceError> {
    tracing::debug!(action = ?request.action, root = %request.project_root.display(), "dispatching");
    let value = match request.action {
        // Filled in from the rescan that follows every action.
        Action::GetStructure | Action::ListProjects => {
            return Ok(Executed {
                result: None,
                partial: None,
            })
        }
        Action::CreateFile => {
            let name = request.name.as_deref().ok_or_else(|| missing("name"))?;
            let content = request.content.as_deref().unwrap_or_default();
            serde_json::to_value(workspace.create_file(
                name,
                content,
                request.parent_id.as_ref(),
            )?)?
        }
        Action::CreateFolder => {
            let name = request.name.as_deref().ok_or_else(|| missing("name"))?;
            serde_json::to_value(workspace.create_folder(name, request.parent_id.as_ref())?)?
        }
        Action::UpdateContent => {
            let target = request.target()?;
            let content = request.content.as_deref().ok_or_else(|| missing("content"))?;
            serde_json::to_value(workspace.update_content(&target, content)?)?
        }
        Action::Rename => {
            let target = request.target()?;
            let new_name = request
                .new_name
                .as_deref()
                .ok_or_else(|| missing("newName"))?;
            serde_json::to_value(workspace.rename(&target, new_name)?)?
        }
        Action::Move => {
            let target = request.target()?;
            serde_json::to_value(
                workspace.move_item(&target, request.target_parent_id.as_ref())?,
            )?
        }
        Action::Delete => {
            let target = request.target()?;
            serde_json::to_value(workspace.delete(&target)?)?
        }
        Action::Import => {
            let items = request.items.ok_or_else(|| missing("items"))?;
            let report = workspace.import_batch(request.parent_id.as_ref(), items)?;
            return Executed::import(&report);
        }
        Action::ImportOutline => {
            let text = request.text.as_deref().ok_or_else(|| missing("text"))?;
            let fallback = request.fallback_name.as_deref().unwrap_or("Imported");
            let parser = OutlineParser::new(config.outline.clone())
                .map_err(|err| WorkspaceError::InvalidRequest(err.to_string()))?;
            let items = parser.parse(text, fallback);
            let report = ImportOrchestrator::new(workspace)
                .import_tree(request.parent_id.as_ref(), &items)?;
            return Executed::import(&report);
        }
    };
    Ok(Executed::value(value))
}

fn missing(field: &str) -> WorkspaceError {
    WorkspaceError::InvalidRequest(format!("missing `{field}`"))
}
