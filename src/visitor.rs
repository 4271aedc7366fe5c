//! The traversal seam for downstream consumers (HTML renderers, position
//! caches, link checkers).
//!
//! The tree carries no parent back-pointers; [`walk`] maintains its own
//! parent stack and hands it to every hook.

use crate::nodes::{AstNode, Document, NodeValue};

/// A read-only traversal over a parsed document. Every hook defaults to
/// doing nothing; implement the ones your consumer cares about.
#[allow(unused_variables)]
pub trait Visitor<'a> {
    fn enter_node(&mut self, node: &'a AstNode<'a>, parents: &[&'a AstNode<'a>]) {}
    fn leave_node(&mut self, node: &'a AstNode<'a>, parents: &[&'a AstNode<'a>]) {}

    fn on_anchor(&mut self, node: &'a AstNode<'a>) {}
    fn on_page_break(&mut self, node: &'a AstNode<'a>) {}
    fn on_horizontal_line(&mut self, node: &'a AstNode<'a>) {}
    fn on_heading(&mut self, node: &'a AstNode<'a>) {}
    fn on_paragraph(&mut self, node: &'a AstNode<'a>) {}
    fn on_blockquote(&mut self, node: &'a AstNode<'a>) {}
    fn on_list(&mut self, node: &'a AstNode<'a>) {}
    fn on_list_item(&mut self, node: &'a AstNode<'a>) {}
    fn on_code(&mut self, node: &'a AstNode<'a>) {}
    fn on_math(&mut self, node: &'a AstNode<'a>) {}
    fn on_raw_html(&mut self, node: &'a AstNode<'a>) {}
    fn on_table(&mut self, node: &'a AstNode<'a>) {}
    fn on_table_row(&mut self, node: &'a AstNode<'a>) {}
    fn on_table_cell(&mut self, node: &'a AstNode<'a>) {}
    fn on_footnote(&mut self, node: &'a AstNode<'a>) {}
    fn on_footnote_ref(&mut self, node: &'a AstNode<'a>) {}
    fn on_link(&mut self, node: &'a AstNode<'a>) {}
    fn on_image(&mut self, node: &'a AstNode<'a>) {}
    fn on_text(&mut self, node: &'a AstNode<'a>) {}
    fn on_line_break(&mut self, node: &'a AstNode<'a>) {}
}

/// Drive `visitor` over the document's visible tree in source order.
/// Footnote definitions are reachable through [`Document::footnotes`] and
/// are visited after the main flow.
pub fn walk<'a, V: Visitor<'a>>(doc: &Document<'a>, visitor: &mut V) {
    let mut parents: Vec<&'a AstNode<'a>> = vec![];
    walk_node(doc.root, visitor, &mut parents);
    for footnote in doc.footnotes.values() {
        walk_node(footnote, visitor, &mut parents);
    }
}

fn walk_node<'a, V: Visitor<'a>>(
    node: &'a AstNode<'a>,
    visitor: &mut V,
    parents: &mut Vec<&'a AstNode<'a>>,
) {
    visitor.enter_node(node, parents);
    dispatch(node, visitor);

    parents.push(node);
    for child in node.children() {
        walk_node(child, visitor, parents);
    }
    parents.pop();

    visitor.leave_node(node, parents);
}


fn dispatch<'a, V: Visitor<'a>>(node: &'a AstNode<'a>, visitor: &mut V) {
    match node.data.borrow().value {
        NodeValue::Document => {}
        NodeValue::Anchor(..) => visitor.on_anchor(node),
        NodeValue::PageBreak => visitor.on_page_break(node),
        NodeValue::HorizontalLine => visitor.on_horizontal_line(node),
        NodeValue::Heading(..) => visitor.on_heading(node),
        NodeValue::Paragraph => visitor.on_paragraph(node),
        NodeValue::Blockquote(..) => visitor.on_blockquote(node),
        NodeValue::List => visitor.on_list(node),
        NodeValue::ListItem(..) => visitor.on_list_item(node),
        NodeValue::Code(..) => visitor.on_code(node),
        NodeValue::Math(..) => visitor.on_math(node),
        NodeValue::RawHtml(..) => visitor.on_raw_html(node),
        NodeValue::Table(..) => visitor.on_table(node),
        NodeValue::TableRow => visitor.on_table_row(node),
        NodeValue::TableCell => visitor.on_table_cell(node),
        NodeValue::Footnote(..) => visitor.on_footnote(node),
        NodeValue::FootnoteRef(..) => visitor.on_footnote_ref(node),
        NodeValue::Link(..) => visitor.on_link(node),
        NodeValue::Image(..) => visitor.on_image(node),
        NodeValue::Text(..) => visitor.on_text(node),
        NodeValue::LineBreak => visitor.on_line_break(node),
    }
}
