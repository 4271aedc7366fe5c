use pretty_assertions::assert_eq;
use typed_arena::Arena;

use super::*;
use crate::nodes::NodeValue;
use crate::parser::parse_with_path;
use crate::Options;

#[test]
fn definition_with_continuation_paragraphs() {
    // S6 of the end-to-end suite.
    let arena = Arena::new();
    let doc = parse_with_path(
        &arena,
        "[^footnote]: Paragraph in footnote\n\n    Paragraph in footnote\n\n    Paragraph in footnote\n\nText\n",
        &Options::default(),
        "path/to",
        "file.md",
    );

    let body = body(&doc);
    assert_eq!(body.len(), 1);
    assert_eq!(text_of(children(body[0])[0]), "Text");

    let footnote = doc.footnotes["#^footnote/path/to/file.md"];
    assert!(matches!(
        footnote.data.borrow().value,
        NodeValue::Footnote(..)
    ));

    let paragraphs = children(footnote);
    assert_eq!(paragraphs.len(), 3);
    for p in &paragraphs {
        assert_eq!(text_of(children(p)[0]), "Paragraph in footnote");
    }
    // The head is stripped: the first paragraph starts after `[^footnote]: `.
    assert_eq!(span_of(paragraphs[0]).start.col, 13);
    assert_eq!(span_of(paragraphs[1]).start.col, 4);
}

#[test]
fn reference_resolves_against_the_store() {
    let arena = Arena::new();
    let doc = parse(&arena, "note[^1] here\n\n[^1]: the definition\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 3);
    assert_eq!(text_of(inlines[0]), "note");
    match inlines[1].data.borrow().value {
        NodeValue::FootnoteRef(ref nfr) => {
            assert_eq!(nfr.id, "#^1/");
            assert_eq!(nfr.text, "[^1]");
            assert_eq!(nfr.id_pos, sp(6, 0, 6, 0));
        }
        ref v => panic!("expected footnote ref, got {:?}", v),
    }
    assert_eq!(span_of(inlines[1]), sp(4, 0, 7, 0));
    assert_eq!(text_of(inlines[2]), " here");
}

#[test]
fn unresolved_reference_stays_literal() {
    let arena = Arena::new();
    let doc = parse(&arena, "ghost[^nope] here\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    assert_eq!(text_of(inlines[0]), "ghost[^nope] here");
}

#[test]
fn ids_fold_case() {
    let arena = Arena::new();
    let doc = parse(&arena, "x[^Note]\n\n[^NOTE]: body\n");

    let inlines = children(body(&doc)[0]);
    assert!(matches!(
        inlines[1].data.borrow().value,
        NodeValue::FootnoteRef(..)
    ));
    assert!(doc.footnotes.contains_key("#^note/"));
}

#[test]
fn under_indented_line_ends_the_definition() {
    let arena = Arena::new();
    let doc = parse(&arena, "[^n]: inside\noutside\n");

    let body = body(&doc);
    assert_eq!(body.len(), 1);
    assert_eq!(text_of(children(body[0])[0]), "outside");

    let footnote = doc.footnotes["#^n/"];
    assert_eq!(children(footnote).len(), 1);
}
