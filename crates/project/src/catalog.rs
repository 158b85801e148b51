//! Project discovery under a shared projects root.
//! 在專案總目錄下依類型尋找專案。
//!
//! Layout: `<root>/books/<project>`, `<root>/scripts/<project>` and
//! `<root>/blog_posts/<project>`. Every visible directory one level below a
//! kind directory is a project; its directory name is its id.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::workspace::WorkspaceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Book,
    Script,
    Blog,
}

impl ProjectKind {
    pub const ALL: [ProjectKind; 3] = [ProjectKind::Book, ProjectKind::Script, ProjectKind::Blog];

    /// Directory under the projects root holding projects of this kind.
    /// 此類型專案所在的子目錄名稱。
    pub fn directory(self) -> &'static str {
        match self {
            ProjectKind::Book => "books",
            ProjectKind::Script => "scripts",
            ProjectKind::Blog => "blog_posts",
        }
    }
}

/// One project found under the projects root.
/// 專案總目錄下找到的單一專案。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    /// Directory name with underscores shown as spaces.
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ProjectKind,
    /// `/`-separated path relative to the projects root.
    pub path: String,
}

impl ProjectSummary {
    /// Absolute project root, suitable for [`crate::ProjectWorkspace::open`].
    pub fn root(&self, projects_root: &Path) -> PathBuf {
        projects_root.join(self.kind.directory()).join(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCatalog {
    pub books: Vec<ProjectSummary>,
    pub scripts: Vec<ProjectSummary>,
    pub blogs: Vec<ProjectSummary>,
}

impl ProjectCatalog {
    pub fn iter(&self) -> impl Iterator<Item = &ProjectSummary> {
        self.books
            .iter()
            .chain(self.scripts.iter())
            .chain(self.blogs.iter())
    }

    pub fn len(&self) -> usize {
        self.books.len() + self.scripts.len() + self.blogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot_mut(&mut self, kind: ProjectKind) -> &mut Vec<ProjectSummary> {
        match kind {
            ProjectKind::Book => &mut self.books,
            ProjectKind::Script => &mut self.scripts,
            ProjectKind::Blog => &mut self.blogs,
        }
    }
}

/// Lists every project under `projects_root`, grouped by kind and sorted by
/// name. Missing kind directories are simply empty.
/// 列出專案總目錄下的所有專案，依類型分組並依名稱排序。
pub fn list_projects(projects_root: &Path) -> Result<ProjectCatalog, WorkspaceError> {
    if !projects_root.is_dir() {
        return Err(WorkspaceError::ProjectNotFound(projects_root.to_path_buf()));
    }
    let mut catalog = ProjectCatalog::default();
    for kind in ProjectKind::ALL {
        *catalog.slot_mut(kind) = projects_of_kind(projects_root, kind)?;
    }
    tracing::debug!(
        root = %projects_root.display(),
        books = catalog.books.len(),
        scripts = catalog.scripts.len(),
        blogs = catalog.blogs.len(),
        "listed projects"
    );
    Ok(catalog)
}

/// Looks a project up by id; books are searched first, then scripts, then blogs.
pub fn find_project(
    projects_root: &Path,
    id: &str,
) -> Result<Option<ProjectSummary>, WorkspaceError> {
    let catalog = list_projects(projects_root)?;
    let found = catalog.iter().find(|project| project.id == id).cloned();
    Ok(found)
}

fn projects_of_kind(
    projects_root: &Path,
    kind: ProjectKind,
) -> Result<Vec<ProjectSummary>, WorkspaceError> {
    let dir = projects_root.join(kind.directory());
    match dir.metadata() {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => return Ok(Vec::new()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(WorkspaceError::Io {
                context: format!("failed to inspect {}", dir.display()),
                source,
            })
        }
    }

    let mut projects = Vec::new();
    for entry in WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable project entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            tracing::warn!(path = %entry.path().display(), "skipping project with non UTF-8 name");
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        projects.push(ProjectSummary {
            id: name.to_string(),
            title: name.replace('_', " "),
            kind,
            path: format!("{}/{name}", kind.directory()),
        });
    }
    Ok(projects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn groups_projects_by_kind() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("books/The_Long_Road")).unwrap();
        fs::create_dir_all(dir.path().join("books/Atlas")).unwrap();
        fs::create_dir_all(dir.path().join("books/.trash")).unwrap();
        fs::write(dir.path().join("books/readme.md"), "not a project").unwrap();
        fs::create_dir_all(dir.path().join("blog_posts/weekly")).unwrap();

        let catalog = list_projects(dir.path()).unwrap();
        let books: Vec<_> = catalog.books.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(books, vec!["Atlas", "The Long Road"]);
        assert!(catalog.scripts.is_empty());
        assert_eq!(catalog.blogs[0].path, "blog_posts/weekly");
        assert_eq!(catalog.blogs[0].kind, ProjectKind::Blog);
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn find_returns_root_of_match() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("scripts/pilot")).unwrap();

        let found = find_project(dir.path(), "pilot").unwrap().unwrap();
        assert_eq!(found.kind, ProjectKind::Script);
        assert_eq!(found.root(dir.path()), dir.path().join("scripts").join("pilot"));
        assert!(find_project(dir.path(), "missing").unwrap().is_none());
    }

    #[test]
    fn missing_root_is_reported() {
        let dir = tempdir().unwrap();
        let err = list_projects(&dir.path().join("absent")).unwrap_err();
        assert_eq!(err.code(), "PROJECT_NOT_FOUND");
    }

    #[test]
    fn summaries_serialize_with_type_tag() {
        let summary = ProjectSummary {
            id: "Atlas".into(),
            title: "Atlas".into(),
            kind: ProjectKind::Book,
            path: "books/Atlas".into(),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["type"], "book");
    }
}
