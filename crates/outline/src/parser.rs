use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{OutlineError, OutlineId, OutlineItem, OutlineKind, OutlinePolicy};

/// Name used when a heading sanitizes down to nothing.
pub const UNTITLED: &str = "Untitled";

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(#{1,6})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$").expect("heading pattern must compile")
});

/// Heading collected during the line scan, before kinds and names are decided.
struct Draft<'a> {
    title: String,
    depth: u8,
    lines: Vec<&'a str>,
    children: Vec<usize>,
}

/// Turns markdown headings into a nested outline according to an [`OutlinePolicy`].
/// 依照 [`OutlinePolicy`] 將 Markdown 標題轉為巢狀大綱。
#[derive(Debug, Clone, Default)]
pub struct OutlineParser {
    policy: OutlinePolicy,
}

impl OutlineParser {
    pub fn new(policy: OutlinePolicy) -> Result<Self, OutlineError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &OutlinePolicy {
        &self.policy
    }

    /// Parses `text` into root-level outline items.
    /// 解析文字並回傳最上層的大綱項目。
    ///
    /// Lines between two headings become the body of the first one. Text before
    /// the first heading is kept as a leading item named after `fallback_name`,
    /// and input without any heading yields a single item wrapping everything.
    pub fn parse(&self, text: &str, fallback_name: &str) -> Vec<OutlineItem> {
        let mut arena: Vec<Draft<'_>> = Vec::new();
        let mut roots: Vec<usize> = Vec::new();
        let mut stack: Vec<(u8, usize)> = Vec::new();
        let mut preamble: Vec<&str> = Vec::new();
        let mut fence: Option<(char, usize)> = None;

        for line in text.lines() {
            let trimmed = line.trim_start();
            if let Some((marker, width)) = fence {
                if closes_fence(trimmed, marker, width) {
                    fence = None;
                }
                push_line(&mut arena, &stack, &mut preamble, line);
                continue;
            }
            if let Some(open) = fence_marker(trimmed) {
                fence = Some(open);
                push_line(&mut arena, &stack, &mut preamble, line);
                continue;
            }

            let Some(captures) = HEADING.captures(line) else {
                push_line(&mut arena, &stack, &mut preamble, line);
                continue;
            };
            let depth = (captures[1].len() as u8).min(self.policy.max_depth);
            let index = arena.len();
            arena.push(Draft {
                title: captures[2].trim().to_string(),
                depth,
                lines: Vec::new(),
                children: Vec::new(),
            });

            while stack.last().is_some_and(|(open, _)| *open >= depth) {
                stack.pop();
            }
            match stack.last() {
                Some((_, parent)) => arena[*parent].children.push(index),
                None => roots.push(index),
            }
            stack.push((depth, index));
        }

        if arena.is_empty() {
            tracing::debug!(fallback = fallback_name, "no headings found, wrapping input");
            return vec![self.fallback_item(fallback_name, text.trim())];
        }

        let mut items = Vec::with_capacity(roots.len() + 1);
        let preamble = preamble.join("\n");
        if !preamble.trim().is_empty() {
            items.push(self.fallback_item(fallback_name, preamble.trim()));
        }
        items.extend(roots.iter().map(|index| self.build(&arena, *index)));
        dedupe_names(&mut items);

        tracing::debug!(
            headings = arena.len(),
            roots = items.len(),
            "parsed markdown outline"
        );
        items
    }

    fn fallback_item(&self, fallback_name: &str, content: &str) -> OutlineItem {
        let title = self.policy.strip_default_extension(fallback_name.trim());
        OutlineItem {
            id: OutlineId::new(),
            title: title.to_string(),
            name: self.policy.file_name(fallback_name),
            kind: OutlineKind::File,
            content: content.to_string(),
            children: Vec::new(),
            depth: 0,
        }
    }

    // Recursion here is bounded by `MAX_HEADING_DEPTH`.
    fn build(&self, arena: &[Draft<'_>], index: usize) -> OutlineItem {
        let draft = &arena[index];
        let mut children: Vec<OutlineItem> = draft
            .children
            .iter()
            .map(|child| self.build(arena, *child))
            .collect();
        dedupe_names(&mut children);

        let kind = if !children.is_empty() || self.policy.is_folder_depth(draft.depth) {
            OutlineKind::Folder
        } else {
            OutlineKind::File
        };
        let name = match kind {
            OutlineKind::File => self.policy.file_name(&draft.title),
            OutlineKind::Folder => self.policy.folder_name(&draft.title),
        };

        OutlineItem {
            id: OutlineId::new(),
            title: draft.title.clone(),
            name,
            kind,
            content: draft.lines.join("\n").trim().to_string(),
            children,
            depth: draft.depth,
        }
    }
}

fn push_line<'a>(
    arena: &mut [Draft<'a>],
    stack: &[(u8, usize)],
    preamble: &mut Vec<&'a str>,
    line: &'a str,
) {
    match stack.last() {
        Some((_, index)) => arena[*index].lines.push(line),
        None => preamble.push(line),
    }
}

/// Marker character and width of a code fence opening `line`, if any.
fn fence_marker(line: &str) -> Option<(char, usize)> {
    let marker = line.chars().next().filter(|ch| *ch == '`' || *ch == '~')?;
    let width = line.chars().take_while(|ch| *ch == marker).count();
    (width >= 3).then_some((marker, width))
}

/// A closing fence is a bare run of the opening marker, at least as wide.
fn closes_fence(line: &str, marker: char, width: usize) -> bool {
    let line = line.trim_end();
    line.chars().count() >= width && line.chars().all(|ch| ch == marker)
}

/// Siblings must materialize to distinct paths; repeats get a ` (n)` suffix.
fn dedupe_names(items: &mut [OutlineItem]) {
    let mut taken: HashSet<String> = HashSet::new();
    for item in items.iter_mut() {
        if taken.insert(item.name.to_lowercase()) {
            continue;
        }
        let (stem, ext) = match (item.kind, item.name.rsplit_once('.')) {
            (OutlineKind::File, Some((stem, ext))) if !stem.is_empty() => {
                (stem.to_string(), format!(".{ext}"))
            }
            _ => (item.name.clone(), String::new()),
        };
        let mut counter = 2;
        loop {
            let candidate = format!("{stem} ({counter}){ext}");
            if taken.insert(candidate.to_lowercase()) {
                item.name = candidate;
                break;
            }
            counter += 1;
        }
    }
}
