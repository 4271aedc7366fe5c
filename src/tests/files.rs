use std::fs;

use typed_arena::Arena;

use super::*;
use crate::nodes::NodeValue;
use crate::{parse_file, Options, ParseFileError};

fn scratch_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("spandown-{}-{}", tag, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn rejects_non_markdown_suffixes() {
    let arena = Arena::new();
    let err = parse_file(
        &arena,
        std::path::Path::new("/tmp/definitely-not-markdown.txt"),
        &Options::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ParseFileError::UnsupportedExtension(..)));
}

#[test]
fn reports_missing_files() {
    let arena = Arena::new();
    let err = parse_file(
        &arena,
        std::path::Path::new("/nonexistent/nowhere.md"),
        &Options::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ParseFileError::Io { .. }));
}

#[test]
fn recursive_parse_stitches_linked_files() {
    let dir = scratch_dir("stitch");
    fs::write(dir.join("main.md"), "# Main\n\n[next](other.md)\n").unwrap();
    fs::write(dir.join("other.md"), "# Other\n\n[back](main.md)\n").unwrap();

    let arena = Arena::new();
    let options = Options::builder().recursive(true).build();
    let doc = parse_file(&arena, &dir.join("main.md"), &options).unwrap();

    let kids: Vec<_> = doc.root.children().collect();
    let anchors = kids
        .iter()
        .filter(|n| matches!(n.data.borrow().value, NodeValue::Anchor(..)))
        .count();
    let page_breaks = kids
        .iter()
        .filter(|n| matches!(n.data.borrow().value, NodeValue::PageBreak))
        .count();
    // One anchor per file, one page break between them; the cycle back to
    // main.md is not followed twice.
    assert_eq!(anchors, 2);
    assert_eq!(page_breaks, 1);

    assert!(doc
        .labeled_headings
        .keys()
        .any(|k| k.starts_with("#main/")));
    assert!(doc
        .labeled_headings
        .keys()
        .any(|k| k.starts_with("#other/")));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn non_recursive_parse_keeps_one_file() {
    let dir = scratch_dir("single");
    fs::write(dir.join("main.md"), "[next](other.md)\n").unwrap();
    fs::write(dir.join("other.md"), "ignored\n").unwrap();

    let arena = Arena::new();
    let doc = parse_file(&arena, &dir.join("main.md"), &Options::default()).unwrap();

    assert!(!doc
        .root
        .children()
        .any(|n| matches!(n.data.borrow().value, NodeValue::PageBreak)));

    fs::remove_dir_all(&dir).ok();
}
