use std::fs;

use scriptorium_outline::{OutlineParser, OutlinePolicy};
use scriptorium_project::{
    handle, Action, EngineConfig, ImportReport, ItemId, OperationRequest, OperationResponse,
    ProjectWorkspace,
};
use serde_json::json;
use tempfile::tempdir;

const MANUSCRIPT: &str = "\
# Part One
The opening.

## Arrival
They came by sea.

## Departure
They left by land.

# Part Two
## Return
Home again.
";

#[test]
fn parsed_outline_materializes_as_nested_tree() {
    let dir = tempdir().unwrap();
    let mut workspace = ProjectWorkspace::open(dir.path(), EngineConfig::default()).unwrap();
    let items = OutlineParser::default().parse(MANUSCRIPT, "Manuscript");

    let report = scriptorium_project::ImportOrchestrator::new(&mut workspace)
        .import_tree(None, &items)
        .unwrap();
    assert!(report.is_success(), "{:?}", report.failed);

    for (path, content) in [
        ("Part One/_index.md", "The opening."),
        ("Part One/Arrival.md", "They came by sea."),
        ("Part One/Departure.md", "They left by land."),
        ("Part Two/Return.md", "Home again."),
    ] {
        assert_eq!(fs::read_to_string(dir.path().join(path)).unwrap(), content);
    }
    assert!(!dir.path().join("Part Two/_index.md").exists());

    let structure = workspace.structure().unwrap();
    let part_one = structure.find_path("Part One").unwrap();
    assert!(part_one.is_folder());
    let children: Vec<_> = part_one.children().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(children, vec!["Arrival.md", "Departure.md", "_index.md"]);

    for created in &report.created {
        assert_eq!(
            workspace.manifest().resolve(&created.id),
            Some(created.path.as_str())
        );
    }
}

#[test]
fn folder_depth_policy_comes_from_config() {
    let dir = tempdir().unwrap();
    let config = EngineConfig {
        outline: OutlinePolicy {
            folder_depths: vec![1],
            ..OutlinePolicy::default()
        },
        ..EngineConfig::default()
    };
    let request = OperationRequest {
        text: Some("# Notes\nLoose thoughts.\n".into()),
        ..OperationRequest::new(Action::ImportOutline, dir.path())
    };
    let response = handle(request, &config);
    assert!(response.success, "{:?}", response.error);
    assert!(dir.path().join("Notes").is_dir());
    assert_eq!(
        fs::read_to_string(dir.path().join("Notes/_index.md")).unwrap(),
        "Loose thoughts."
    );
}

#[test]
fn json_requests_drive_a_full_session() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::default();
    let root = dir.path().to_string_lossy().into_owned();

    let send = |value: serde_json::Value| -> OperationResponse {
        let request: OperationRequest = serde_json::from_value(value).unwrap();
        handle(request, &config)
    };

    let folder = send(json!({"action": "createFolder", "projectRoot": root, "name": "Drafts"}));
    assert!(folder.success);
    let folder_id = folder.result.unwrap()["id"].as_str().unwrap().to_string();

    let file = send(json!({
        "action": "createFile",
        "projectRoot": root,
        "name": "chapter",
        "content": "Once upon a time",
        "parentId": folder_id,
    }));
    assert!(file.success);
    let file_json = file.result.unwrap();
    assert_eq!(file_json["path"], "Drafts/chapter.md");
    assert_eq!(file_json["type"], "file");
    let structure = file.updated_structure.unwrap();
    assert_eq!(structure.stats.total_words, 4);

    let renamed = send(json!({
        "action": "rename",
        "projectRoot": root,
        "itemId": folder_id,
        "newName": "Manuscript",
    }));
    assert!(renamed.success);
    let file_id = ItemId::from_string(file_json["id"].as_str().unwrap());
    let moved_file = renamed.updated_structure.unwrap();
    assert_eq!(
        moved_file.find(&file_id).map(|item| item.path.as_str()),
        Some("Manuscript/chapter.md")
    );

    let collision = send(json!({
        "action": "createFile",
        "projectRoot": root,
        "name": "chapter.md",
        "parentId": folder_id,
    }));
    assert!(!collision.success);
    assert_eq!(collision.error.unwrap().code, "NAME_COLLISION");

    let imported = send(json!({
        "action": "import",
        "projectRoot": root,
        "items": [
            {"name": "notes.txt", "content": "loose"},
            {"title": "Outline", "type": "file", "content": "# x"}
        ],
    }));
    assert!(imported.success, "{:?}", imported.error);
    let report: ImportReport = serde_json::from_value(imported.result.unwrap()).unwrap();
    assert_eq!(report.created.len(), 2);

    let deleted = send(json!({"action": "delete", "projectRoot": root, "oldPath": "Manuscript"}));
    assert!(deleted.success);
    let remaining = deleted.updated_structure.unwrap();
    let names: Vec<_> = remaining.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["Outline.md", "notes.txt"]);
}

#[test]
fn partial_import_failure_still_returns_structure() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("Taken.md"), "existing").unwrap();
    let request = OperationRequest {
        items: Some(vec![
            serde_json::from_value(json!({"title": "Taken", "type": "file", "content": "new"}))
                .unwrap(),
            serde_json::from_value(json!({"title": "Fresh", "type": "file", "content": "ok"}))
                .unwrap(),
        ]),
        ..OperationRequest::new(Action::Import, dir.path())
    };
    let response = handle(request, &EngineConfig::default());

    assert!(!response.success);
    let error = response.error.unwrap();
    assert_eq!(error.code, "PARTIAL_IMPORT_FAILURE");
    assert!(error.message.contains("Taken (NAME_COLLISION)"), "{}", error.message);

    let report: ImportReport = serde_json::from_value(response.result.unwrap()).unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].path, "Fresh.md");
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].title, "Taken");
    assert_eq!(report.failed[0].code, "NAME_COLLISION");

    let structure = response.updated_structure.unwrap();
    let fresh = structure.find_path("Fresh.md").unwrap();
    assert_eq!(fresh.id, report.created[0].id);
    assert_eq!(
        fs::read_to_string(dir.path().join("Taken.md")).unwrap(),
        "existing"
    );
}
