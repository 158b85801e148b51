//! Project workspace engine for Scriptorium: stable item ids over a plain
//! directory tree, scanning, mutations and outline import.
//! Scriptorium 專案工作區引擎：在一般目錄樹上提供穩定代號、掃描、變更與大綱匯入。

mod util;

pub mod api;
pub mod catalog;
pub mod config;
pub mod import;
pub mod item;
pub mod manifest;
pub mod paths;
pub mod scanner;
pub mod workspace;

pub use api::{handle, Action, ErrorBody, OperationRequest, OperationResponse};
pub use catalog::{find_project, list_projects, ProjectCatalog, ProjectKind, ProjectSummary};
pub use config::{ConfigError, EngineConfig, ScanConfig};
pub use import::{
    FileBlob, ImportEntry, ImportFailure, ImportOrchestrator, ImportReport, ImportWarning,
    ImportedItem, ItemState, RunState,
};
pub use item::{Item, ItemId, ItemKind, Items, ProjectStats, ProjectStructure, ScanWarning};
pub use manifest::{ManifestError, PathManifest, DEFAULT_MANIFEST_FILE};
pub use paths::PathError;
pub use scanner::{FreshIds, IdSource, ManifestIds, ScanOutcome, TreeScanner};
pub use workspace::{DeleteFailure, DeleteReport, ItemRef, ProjectWorkspace, WorkspaceError};
