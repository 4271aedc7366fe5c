use typed_arena::Arena;

use crate::nodes::{AstNode, Document, NodeValue, Span};
use crate::parser::parse_document;
use crate::Options;

mod clones;
mod emphasis;
mod files;
mod footnotes;
mod links;
mod math;

pub(crate) fn parse<'a>(arena: &'a Arena<AstNode<'a>>, text: &str) -> Document<'a> {
    parse_document(arena, text, &Options::default())
}

/// The document's visible items, with the synthetic leading anchor
/// checked and skipped.
pub(crate) fn body<'a>(doc: &Document<'a>) -> Vec<&'a AstNode<'a>> {
    let kids: Vec<&'a AstNode<'a>> = doc.root.children().collect();
    assert!(
        matches!(kids[0].data.borrow().value, NodeValue::Anchor(..)),
        "document must lead with an anchor"
    );
    kids[1..].to_vec()
}

pub(crate) fn children<'a>(node: &'a AstNode<'a>) -> Vec<&'a AstNode<'a>> {
    node.children().collect()
}

pub(crate) fn text_of(node: &AstNode) -> String {
    match node.data.borrow().value {
        NodeValue::Text(ref t) => t.clone(),
        ref v => panic!("expected a text node, got {:?}", v),
    }
}

pub(crate) fn span_of(node: &AstNode) -> Span {
    node.data.borrow().span
}

/// `(start_col, start_line, end_col, end_line)`, as the assertions read.
pub(crate) fn sp(start_col: i64, start_line: i64, end_col: i64, end_line: i64) -> Span {
    Span::new(start_col, start_line, end_col, end_line)
}

/// Position sanity over a whole document: spans are ordered, children sit
/// inside their parent, and sibling spans never overlap or regress.
pub(crate) fn assert_sane_positions(doc: &Document) {
    for node in doc.root.descendants() {
        let span = span_of(node);
        if span.is_set() {
            assert!(span.start <= span.end, "inverted span {:?}", span);
        }

        let mut prev: Option<Span> = None;
        for child in node.children() {
            let cs = span_of(child);
            if !cs.is_set() {
                continue;
            }
            if span.is_set() {
                assert!(
                    span.start <= cs.start && cs.end <= span.end,
                    "child {:?} escapes parent {:?}",
                    cs,
                    span
                );
            }
            if let Some(p) = prev {
                assert!(
                    p.end <= cs.start,
                    "overlapping siblings: {:?} then {:?}",
                    p,
                    cs
                );
            }
            prev = Some(cs);
        }
    }
}
