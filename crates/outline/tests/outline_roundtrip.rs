use scriptorium_outline::{render_markdown, OutlineItem, OutlineKind, OutlineParser};

fn shape(items: &[OutlineItem]) -> Vec<(String, OutlineKind, usize)> {
    let mut out = Vec::new();
    let mut pending: Vec<(usize, &OutlineItem)> = items.iter().rev().map(|i| (0, i)).collect();
    while let Some((level, item)) = pending.pop() {
        out.push((item.title.clone(), item.kind, level));
        for child in item.children.iter().rev() {
            pending.push((level + 1, child));
        }
    }
    out
}

#[test]
fn intro_with_two_sections_matches_documented_example() {
    let text = "# Intro\n## A\nfirst line of A\n\n## B\nonly B\n";
    let items = OutlineParser::default().parse(text, "Manuscript");

    assert_eq!(items.len(), 1);
    let intro = &items[0];
    assert_eq!(intro.title, "Intro");
    assert_eq!(intro.children.len(), 2);
    assert_eq!(intro.children[0].title, "A");
    assert_eq!(intro.children[0].content, "first line of A");
    assert_eq!(intro.children[1].title, "B");
    assert_eq!(intro.children[1].content, "only B");
}

#[test]
fn render_then_parse_preserves_titles_and_nesting() {
    let source = "\
# Book One
Opening words.

## Chapter 1
It begins.

### Scene 1
Rain.

### Scene 2
Sun.

## Chapter 2
It ends.

# Appendix
Notes and sources.
";
    let parser = OutlineParser::default();
    let first = parser.parse(source, "Book");
    let rendered = render_markdown(&first, parser.policy());
    let second = parser.parse(&rendered, "Book");

    assert_eq!(shape(&first), shape(&second));

    let scene = &second[0].children[0].children[1];
    assert_eq!(scene.title, "Scene 2");
    assert_eq!(scene.content, "Sun.");
    assert_eq!(second[0].content, "Opening words.");
    assert_eq!(second[1].content, "Notes and sources.");
}

#[test]
fn externally_supplied_items_deserialize_with_defaults() {
    let json = r#"[
        {"id": "abc", "title": "Part I", "type": "folder", "children": [
            {"title": "Prologue", "type": "file", "content": "Once."}
        ]}
    ]"#;
    let items: Vec<OutlineItem> = serde_json::from_str(json).unwrap();
    assert_eq!(items[0].id.as_str(), "abc");
    assert!(items[0].is_folder());
    let prologue = &items[0].children[0];
    assert!(!prologue.id.as_str().is_empty());
    assert_eq!(prologue.segment(&Default::default()), "Prologue.md");
    assert_eq!(items[0].count(), 2);
}
