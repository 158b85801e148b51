//! Project-relative path helpers. Relative paths are plain strings with `/`
//! separators so they serialize identically on every platform.
//! 專案相對路徑工具；一律以 `/` 分隔的字串表示。

use std::path::{Component, Path};

use thiserror::Error;

/// Reasons a path cannot be used as a project-relative path.
/// 路徑無法作為專案相對路徑的原因。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path `{0}` is absolute")]
    Absolute(String),
    #[error("path `{0}` escapes the project root")]
    EscapesRoot(String),
    #[error("path `{0}` is not valid UTF-8")]
    NotUtf8(String),
    #[error("empty path does not name a project item")]
    Empty,
}

/// Normalizes a caller-supplied relative path: unifies separators, drops `.`
/// segments and rejects absolute paths or `..`.
/// 正規化相對路徑；拒絕絕對路徑與 `..`。
pub fn normalize_relative(raw: &str) -> Result<String, PathError> {
    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(PathError::Absolute(raw.to_string()));
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(PathError::EscapesRoot(raw.to_string())),
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(segments.join("/"))
}

/// Converts `absolute` to a normalized path relative to `root`.
pub fn relative_to(root: &Path, absolute: &Path) -> Result<String, PathError> {
    let display = absolute.to_string_lossy().into_owned();
    let stripped = absolute
        .strip_prefix(root)
        .map_err(|_| PathError::EscapesRoot(display.clone()))?;

    let mut segments = Vec::new();
    for component in stripped.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| PathError::NotUtf8(display.clone()))?;
                segments.push(part);
            }
            Component::CurDir => {}
            _ => return Err(PathError::EscapesRoot(display)),
        }
    }
    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(segments.join("/"))
}

/// Joins a child name onto a parent path; an empty parent means the root.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Parent of a relative path, `""` for root-level items.
pub fn parent(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Final segment of a relative path.
pub fn leaf(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, leaf)| leaf)
}

/// Whether `path` equals `prefix` or lies below it, comparing whole segments.
/// `chapter-10` is not within `chapter-1`.
pub fn is_within(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => !prefix.is_empty() && rest.starts_with('/'),
        None => false,
    }
}

/// Replaces the `old` prefix of `path` with `new`, if `path` is within `old`.
pub fn rebase(path: &str, old: &str, new: &str) -> Option<String> {
    if old.is_empty() || !is_within(path, old) {
        return None;
    }
    Some(format!("{new}{}", &path[old.len()..]))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
