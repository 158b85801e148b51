use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use scriptorium_outline::{sanitize_title, OutlinePolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::manifest::DEFAULT_MANIFEST_FILE;
use crate::util::write_atomic;

const CONFIG_VERSION: u32 = 1;
const DEFAULT_MAX_INLINE_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Tunables shared by every workspace operation.
/// 所有工作區操作共用的設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_manifest_file_name")]
    pub manifest_file_name: String,
    #[serde(default = "default_extension")]
    pub default_extension: String,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub outline: OutlinePolicy,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_manifest_file_name() -> String {
    DEFAULT_MANIFEST_FILE.to_string()
}

fn default_extension() -> String {
    "md".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            manifest_file_name: default_manifest_file_name(),
            default_extension: default_extension(),
            scan: ScanConfig::default(),
            outline: OutlinePolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `path`; a missing file yields the defaults.
    /// 從檔案載入設定；檔案不存在時使用預設值。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config: EngineConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        config.sanitize();
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref().to_path_buf();
        let payload = serde_json::to_vec_pretty(self).map_err(|source| ConfigError::Serialize {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &payload).map_err(|source| ConfigError::Write { path, source })
    }

    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }
        let manifest = sanitize_title(&self.manifest_file_name);
        self.manifest_file_name = if manifest == self.manifest_file_name {
            manifest
        } else {
            default_manifest_file_name()
        };
        self.default_extension = normalize_extension(&self.default_extension);
        if self.default_extension.is_empty() {
            self.default_extension = default_extension();
        }
        self.scan.sanitize();
        self.outline.sanitize();
    }

    /// Appends the default extension when `name` has none.
    /// 檔名沒有副檔名時補上預設副檔名。
    pub fn ensure_extension(&self, name: &str) -> String {
        if has_extension(name) {
            name.to_string()
        } else {
            format!("{name}.{}", self.default_extension)
        }
    }
}

/// Rules for turning files into item content during a scan.
/// 掃描時決定是否讀取檔案內容的規則。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Extensions (lowercase, no dot) whose files are read as text.
    #[serde(default = "default_text_extensions")]
    pub text_extensions: Vec<String>,
    /// Upper bound for loading any file into memory. Larger files, and files
    /// whose extension is not listed above, get a `[binary: …]` placeholder.
    #[serde(default = "default_max_inline_bytes")]
    pub max_inline_bytes: u64,
    #[serde(default = "default_true")]
    pub skip_hidden: bool,
}

fn default_text_extensions() -> Vec<String> {
    [
        "css", "csv", "html", "js", "json", "jsx", "log", "markdown", "md", "scss", "ts", "tsx",
        "txt", "xml", "yaml", "yml",
    ]
    .iter()
    .map(|ext| ext.to_string())
    .collect()
}

fn default_max_inline_bytes() -> u64 {
    DEFAULT_MAX_INLINE_BYTES
}

fn default_true() -> bool {
    true
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            text_extensions: default_text_extensions(),
            max_inline_bytes: default_max_inline_bytes(),
            skip_hidden: true,
        }
    }
}

impl ScanConfig {
    fn sanitize(&mut self) {
        self.text_extensions = self
            .text_extensions
            .iter()
            .map(|ext| normalize_extension(ext))
            .filter(|ext| !ext.is_empty())
            .collect();
        self.text_extensions.sort();
        self.text_extensions.dedup();
    }

    pub fn is_text_extension(&self, ext: &str) -> bool {
        self.text_extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Extension of `name`, ignoring leading dots and anything containing whitespace
/// (`"Chapter 1. Intro"` has no extension).
pub(crate) fn extension_of(name: &str) -> Option<&str> {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.trim_start_matches('.').is_empty()
                && !ext.is_empty()
                && !ext.chars().any(char::is_whitespace) =>
        {
            Some(ext)
        }
        _ => None,
    }
}

fn has_extension(name: &str) -> bool {
    extension_of(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.scan.max_inline_bytes, 1024 * 1024);
    }

    #[test]
    fn partial_file_is_filled_and_sanitized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"default_extension": ".TXT", "scan": {"text_extensions": ["MD", "", ".Rs"]}, "manifest_file_name": "../evil"}"#,
        )
        .unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.default_extension, "txt");
        assert_eq!(config.scan.text_extensions, vec!["md", "rs"]);
        assert!(config.scan.skip_hidden);
        assert_eq!(config.manifest_file_name, DEFAULT_MANIFEST_FILE);
        assert_eq!(config.outline, OutlinePolicy::default());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = EngineConfig::default();
        config.scan.max_inline_bytes = 10;
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn ensure_extension_only_when_missing() {
        let config = EngineConfig::default();
        assert_eq!(config.ensure_extension("notes"), "notes.md");
        assert_eq!(config.ensure_extension("notes.txt"), "notes.txt");
        assert_eq!(config.ensure_extension("Chapter 1. Intro"), "Chapter 1. Intro.md");
        assert_eq!(config.ensure_extension("archive.tar.gz"), "archive.tar.gz");
    }
}
