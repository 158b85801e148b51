use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn cli(project: &Path) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("scriptorium-cli")?;
    cmd.current_dir(project)
        .env_remove("RUST_LOG")
        .args(["--project", project.to_str().unwrap()]);
    Ok(cmd)
}

fn manifest_id_for(project: &Path, path: &str) -> Result<String, Box<dyn Error>> {
    let raw = fs::read_to_string(project.join(".scriptorium_manifest.json"))?;
    let manifest: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)?;
    manifest
        .iter()
        .find(|(_, value)| value.as_str() == Some(path))
        .map(|(id, _)| id.clone())
        .ok_or_else(|| format!("{path} not in manifest").into())
}

#[test]
fn create_rename_and_scan() -> Result<(), Box<dyn Error>> {
    let project = tempdir()?;

    cli(project.path())?
        .args(["create-folder", "Drafts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created folder Drafts"));
    let drafts = manifest_id_for(project.path(), "Drafts")?;

    cli(project.path())?
        .args([
            "create-file",
            "chapter",
            "--parent",
            &drafts,
            "--content",
            "The first line.",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Drafts/chapter.md"));

    cli(project.path())?
        .args(["rename", "--id", &drafts, "Manuscript"])
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(project.path().join("Manuscript/chapter.md"))?,
        "The first line."
    );
    assert_eq!(manifest_id_for(project.path(), "Manuscript")?, drafts);

    cli(project.path())?
        .arg("scan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Manuscript/"))
        .stdout(predicate::str::contains("chapter.md"))
        .stdout(predicate::str::contains("1 files, 1 folders, 3 words"));
    Ok(())
}

#[test]
fn write_and_delete_by_path() -> Result<(), Box<dyn Error>> {
    let project = tempdir()?;
    fs::write(project.path().join("notes.md"), "old")?;

    cli(project.path())?
        .args(["write", "--path", "notes.md", "--content", "new text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 8 bytes"));
    assert_eq!(fs::read_to_string(project.path().join("notes.md"))?, "new text");

    cli(project.path())?
        .args(["delete", "--path", "notes.md"])
        .assert()
        .success();
    assert!(!project.path().join("notes.md").exists());
    Ok(())
}

#[test]
fn collisions_fail_with_message() -> Result<(), Box<dyn Error>> {
    let project = tempdir()?;
    fs::write(project.path().join("taken.md"), "keep")?;

    cli(project.path())?
        .args(["create-file", "taken", "--content", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(fs::read_to_string(project.path().join("taken.md"))?, "keep");
    Ok(())
}

#[test]
fn outline_preview_does_not_touch_project() -> Result<(), Box<dyn Error>> {
    let project = tempdir()?;
    let source = project.path().join("book.md");
    fs::write(&source, "# Intro\n## A\nalpha\n## B\nbeta\n")?;

    cli(project.path())?
        .args(["outline", source.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Intro/"))
        .stdout(predicate::str::contains("  A.md"))
        .stdout(predicate::str::contains("  B.md"));
    assert!(!project.path().join("Intro").exists());
    Ok(())
}

#[test]
fn import_writes_outline_tree() -> Result<(), Box<dyn Error>> {
    let project = tempdir()?;
    let source_dir = tempdir()?;
    let source = source_dir.path().join("novel.md");
    fs::write(&source, "Epigraph.\n\n# Part\n## Scene\nRain.\n")?;

    cli(project.path())?
        .args(["import", source.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 3 item(s), 0 failed"));

    assert_eq!(fs::read_to_string(project.path().join("novel.md"))?, "Epigraph.");
    assert_eq!(fs::read_to_string(project.path().join("Part/Scene.md"))?, "Rain.");
    Ok(())
}

#[test]
fn op_runs_json_requests() -> Result<(), Box<dyn Error>> {
    let project = tempdir()?;
    let request = serde_json::json!({
        "action": "createFile",
        "projectRoot": project.path(),
        "name": "from-json",
        "content": "hello",
    });

    let output = cli(project.path())?
        .arg("op")
        .write_stdin(request.to_string())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let response: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(response["success"], true);
    assert_eq!(response["result"]["path"], "from-json.md");
    assert_eq!(
        response["updatedStructure"]["stats"]["totalFiles"],
        serde_json::json!(1)
    );

    let bad = serde_json::json!({"action": "delete", "projectRoot": project.path(), "oldPath": "../x"});
    cli(project.path())?
        .arg("op")
        .write_stdin(bad.to_string())
        .assert()
        .failure()
        .stdout(predicate::str::contains("INVALID_PATH"));
    Ok(())
}

#[test]
fn projects_lists_by_kind() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    fs::create_dir_all(root.path().join("books/Sea_Stories"))?;
    fs::create_dir_all(root.path().join("scripts/pilot"))?;

    cli(root.path())?
        .arg("projects")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sea Stories  [books/Sea_Stories]"))
        .stdout(predicate::str::contains("pilot  [scripts/pilot]"))
        .stdout(predicate::str::contains("2 project(s)"));

    cli(root.path())?
        .args(["projects", "--id", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no project `missing`"));
    Ok(())
}
