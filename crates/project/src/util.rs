use std::fs::{self, File, Metadata};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Writes data atomically by using a hidden temporary sibling followed by rename.
/// Missing parent directories are created first.
/// 以隱藏的臨時檔案搭配 rename 實現原子寫入。
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = temp_sibling(path);
    let result = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let hidden = if name.starts_with('.') {
        format!("{name}.tmp")
    } else {
        format!(".{name}.tmp")
    };
    path.with_file_name(hidden)
}

/// Modification time of a filesystem entry, when the platform reports one.
pub fn modified_at(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_replaces_contents_and_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("notes.md");
        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "second");
        assert!(!dir.path().join(".notes.md.tmp").exists());
    }

    #[test]
    fn write_atomic_creates_missing_parents() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("state/nested/manifest.json");
        write_atomic(&target, b"{}").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "{}");
    }

    #[test]
    fn temp_sibling_is_hidden() {
        assert_eq!(
            temp_sibling(Path::new("/p/.manifest.json")),
            PathBuf::from("/p/.manifest.json.tmp")
        );
        assert_eq!(
            temp_sibling(Path::new("/p/a.md")),
            PathBuf::from("/p/.a.md.tmp")
        );
    }
}
