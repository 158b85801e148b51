use serde::{Deserialize, Serialize};

use crate::OutlineError;

/// Deepest heading level recognised by the parser (`######`).
pub const MAX_HEADING_DEPTH: u8 = 6;

const ILLEGAL_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Explicit rules that decide how headings map onto files and folders.
/// 決定標題如何對應到檔案與資料夾的明確規則。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlinePolicy {
    /// Headings deeper than this are clamped to this depth.
    #[serde(default = "default_max_depth")]
    pub max_depth: u8,
    /// Heading depths that always become folders, even without nested headings.
    #[serde(default)]
    pub folder_depths: Vec<u8>,
    #[serde(default = "default_extension")]
    pub default_extension: String,
    /// Extensions that count as "already has a text extension" when naming files.
    #[serde(default = "default_text_extensions")]
    pub text_extensions: Vec<String>,
    /// File that receives the body text of a heading turned into a folder.
    #[serde(default = "default_index_file_name")]
    pub index_file_name: String,
}

fn default_max_depth() -> u8 {
    MAX_HEADING_DEPTH
}

fn default_extension() -> String {
    "md".to_string()
}

fn default_text_extensions() -> Vec<String> {
    vec!["md".to_string(), "markdown".to_string(), "txt".to_string()]
}

fn default_index_file_name() -> String {
    "_index.md".to_string()
}

impl Default for OutlinePolicy {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            folder_depths: Vec::new(),
            default_extension: default_extension(),
            text_extensions: default_text_extensions(),
            index_file_name: default_index_file_name(),
        }
    }
}

impl OutlinePolicy {
    /// Repairs out-of-range values loaded from configuration files.
    /// 修正從設定檔載入的不合法數值。
    pub fn sanitize(&mut self) {
        self.max_depth = self.max_depth.clamp(1, MAX_HEADING_DEPTH);
        self.folder_depths
            .retain(|depth| (1..=MAX_HEADING_DEPTH).contains(depth));
        self.folder_depths.sort_unstable();
        self.folder_depths.dedup();

        self.default_extension = normalize_extension(&self.default_extension);
        if !is_valid_extension(&self.default_extension) {
            self.default_extension = default_extension();
        }

        self.text_extensions = self
            .text_extensions
            .iter()
            .map(|ext| normalize_extension(ext))
            .filter(|ext| is_valid_extension(ext))
            .collect();
        if self.text_extensions.is_empty() {
            self.text_extensions = default_text_extensions();
        }

        if !is_valid_index_name(&self.index_file_name) {
            self.index_file_name = default_index_file_name();
        }
    }

    /// Rejects policies that would produce unusable names or depths.
    pub fn validate(&self) -> Result<(), OutlineError> {
        if !(1..=MAX_HEADING_DEPTH).contains(&self.max_depth) {
            return Err(OutlineError::InvalidDepth(self.max_depth));
        }
        if let Some(depth) = self
            .folder_depths
            .iter()
            .find(|depth| !(1..=MAX_HEADING_DEPTH).contains(*depth))
        {
            return Err(OutlineError::InvalidDepth(*depth));
        }
        if !is_valid_extension(&self.default_extension) {
            return Err(OutlineError::InvalidExtension(
                self.default_extension.clone(),
            ));
        }
        if let Some(ext) = self
            .text_extensions
            .iter()
            .find(|ext| !is_valid_extension(ext))
        {
            return Err(OutlineError::InvalidExtension(ext.clone()));
        }
        if !is_valid_index_name(&self.index_file_name) {
            return Err(OutlineError::InvalidIndexName(
                self.index_file_name.clone(),
            ));
        }
        Ok(())
    }

    /// Whether a heading at `depth` must become a folder regardless of children.
    pub fn is_folder_depth(&self, depth: u8) -> bool {
        self.folder_depths.contains(&depth)
    }

    /// Sanitized file name for `title`, with the default extension appended when
    /// the title does not already end in a known text extension.
    /// 由標題產生檔名；若無已知文字副檔名則補上預設副檔名。
    pub fn file_name(&self, title: &str) -> String {
        let base = sanitize_title(title);
        if self.has_text_extension(&base) {
            base
        } else {
            format!("{base}.{}", self.default_extension)
        }
    }

    pub fn folder_name(&self, title: &str) -> String {
        sanitize_title(title)
    }

    pub fn has_text_extension(&self, name: &str) -> bool {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.text_extensions.iter().any(|known| *known == ext)
            }
            _ => false,
        }
    }

    /// Drops the default extension from a file name, giving back the heading text.
    pub fn strip_default_extension<'a>(&self, name: &'a str) -> &'a str {
        match name.rsplit_once('.') {
            Some((stem, ext))
                if !stem.is_empty() && ext.eq_ignore_ascii_case(&self.default_extension) =>
            {
                stem
            }
            _ => name,
        }
    }
}

/// Makes `raw` safe to use as a single path segment: strips characters that are
/// illegal in file names, collapses whitespace and trims dots at either end so
/// the result is never hidden.
/// 將標題轉為安全的路徑片段。
pub fn sanitize_title(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|ch| !ILLEGAL_NAME_CHARS.contains(ch) && !ch.is_control())
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(['.', ' ']);
    if trimmed.is_empty() {
        crate::UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn is_valid_extension(ext: &str) -> bool {
    !ext.is_empty()
        && ext
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}

fn is_valid_index_name(name: &str) -> bool {
    !name.trim().is_empty() && sanitize_title(name) == name && name != "." && name != ".."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_illegal_characters_and_collapses_spaces() {
        assert_eq!(sanitize_title("  Act 1:  The <Call>?  "), "Act 1 The Call");
        assert_eq!(sanitize_title("a/b\\c|d"), "abcd");
        assert_eq!(sanitize_title("Ending..."), "Ending");
        assert_eq!(sanitize_title("???"), "Untitled");
        assert_eq!(sanitize_title(".env setup"), "env setup");
        assert_eq!(sanitize_title(" ... "), "Untitled");
    }

    #[test]
    fn file_name_appends_default_extension_once() {
        let policy = OutlinePolicy::default();
        assert_eq!(policy.file_name("Intro"), "Intro.md");
        assert_eq!(policy.file_name("notes.txt"), "notes.txt");
        assert_eq!(policy.file_name("Version 1.2"), "Version 1.2.md");
        assert_eq!(policy.folder_name("Part One"), "Part One");
    }

    #[test]
    fn strip_default_extension_only_touches_default() {
        let policy = OutlinePolicy::default();
        assert_eq!(policy.strip_default_extension("Intro.md"), "Intro");
        assert_eq!(policy.strip_default_extension("notes.txt"), "notes.txt");
        assert_eq!(policy.strip_default_extension(".md"), ".md");
    }

    #[test]
    fn sanitize_repairs_loaded_policy() {
        let mut policy = OutlinePolicy {
            max_depth: 9,
            folder_depths: vec![0, 2, 2, 7, 1],
            default_extension: ".MD".into(),
            text_extensions: vec![],
            index_file_name: "a/b".into(),
        };
        policy.sanitize();
        assert_eq!(policy.max_depth, 6);
        assert_eq!(policy.folder_depths, vec![1, 2]);
        assert_eq!(policy.default_extension, "md");
        assert_eq!(policy.text_extensions.len(), 3);
        assert_eq!(policy.index_file_name, "_index.md");
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_depth() {
        let policy = OutlinePolicy {
            max_depth: 0,
            ..OutlinePolicy::default()
        };
        assert_eq!(policy.validate(), Err(OutlineError::InvalidDepth(0)));
    }
}
