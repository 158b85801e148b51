use crate::{OutlineItem, OutlinePolicy, MAX_HEADING_DEPTH};

/// Serializes an outline back into markdown headings.
/// 將大綱序列化回 Markdown 標題格式。
///
/// Tree position decides the heading level (roots are `#`), capped at six.
/// A leading depth-0 item (text that preceded the first heading) is written
/// without a heading so that re-parsing yields the same outline.
pub fn render_markdown(items: &[OutlineItem], policy: &OutlinePolicy) -> String {
    let mut out = String::new();
    let mut pending: Vec<(u8, &OutlineItem)> = items.iter().rev().map(|item| (1, item)).collect();
    let mut first = true;

    while let Some((level, item)) = pending.pop() {
        if first && item.depth == 0 && item.children.is_empty() {
            first = false;
            if !item.content.is_empty() {
                out.push_str(&item.content);
                out.push_str("\n\n");
            }
            continue;
        }
        first = false;

        let title = if item.title.trim().is_empty() {
            policy.strip_default_extension(&item.name)
        } else {
            item.title.trim()
        };
        let hashes = level.min(MAX_HEADING_DEPTH) as usize;
        out.push_str(&"#".repeat(hashes));
        out.push(' ');
        out.push_str(title);
        out.push('\n');
        if !item.content.is_empty() {
            out.push('\n');
            out.push_str(&item.content);
            out.push('\n');
        }
        out.push('\n');

        for child in item.children.iter().rev() {
            pending.push((level.saturating_add(1), child));
        }
    }

    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OutlineParser;

    #[test]
    fn renders_levels_from_tree_position() {
        let tree = vec![OutlineItem::folder("Part").with_children(vec![
            OutlineItem::file("Scene", "It was dark."),
            OutlineItem::file("Aftermath", ""),
        ])];
        let text = render_markdown(&tree, &OutlinePolicy::default());
        assert_eq!(text, "# Part\n\n## Scene\n\nIt was dark.\n\n## Aftermath\n");
    }

    #[test]
    fn preamble_round_trips_without_heading() {
        let parser = OutlineParser::default();
        let parsed = parser.parse("Foreword text\n\n# One\nbody", "Book");
        let text = render_markdown(&parsed, parser.policy());
        assert!(text.starts_with("Foreword text\n\n# One"));
        let again = parser.parse(&text, "Book");
        assert_eq!(again.len(), 2);
        assert_eq!(again[0].content, "Foreword text");
    }
}
