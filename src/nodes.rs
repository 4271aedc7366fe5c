//! The document tree data model.
//!
//! Every node is a [`NodeValue`] variant wrapped in an [`Ast`] header that
//! carries the node's source [`Span`] and, for inline items, the emphasis
//! state (`opts` plus open/close [`StyleDelim`]s). Positions are *virgin*:
//! zero-based line/column coordinates in the untransformed source, before
//! tab expansion and entity substitution. `-1` means "unset".

use std::cell::RefCell;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use rustc_hash::FxHashMap;
use typed_arena::Arena;

use crate::tree::Node;

/// A zero-based (line, column) coordinate in the virgin source.
///
/// Ordering is lexicographic: line first, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pos {
    pub line: i64,
    pub col: i64,
}

impl Pos {
    pub fn new(line: i64, col: i64) -> Pos {
        Pos { line, col }
    }

    /// Both coordinates present.
    pub fn is_set(&self) -> bool {
        self.line >= 0 && self.col >= 0
    }
}

impl Default for Pos {
    fn default() -> Pos {
        Pos { line: -1, col: -1 }
    }
}

/// A source region from `start` to `end`, inclusive on both ends.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    /// Construct from `(start_col, start_line, end_col, end_line)` — the
    /// column-first field order the position assertions are written in.
    pub fn new(start_col: i64, start_line: i64, end_col: i64, end_line: i64) -> Span {
        Span {
            start: Pos::new(start_line, start_col),
            end: Pos::new(end_line, end_col),
        }
    }

    pub fn is_set(&self) -> bool {
        self.start.is_set() && self.end.is_set()
    }
}

impl From<(i64, i64, i64, i64)> for Span {
    fn from(t: (i64, i64, i64, i64)) -> Span {
        Span::new(t.0, t.1, t.2, t.3)
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line, self.start.col, self.end.line, self.end.col
        )
    }
}

/// Bitmask of emphasis styles applied to an inline item.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct TextOpts(u8);

impl TextOpts {
    pub const NONE: TextOpts = TextOpts(0);
    pub const BOLD: TextOpts = TextOpts(1);
    pub const ITALIC: TextOpts = TextOpts(2);
    pub const STRIKETHROUGH: TextOpts = TextOpts(4);

    pub fn contains(self, other: TextOpts) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TextOpts) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for TextOpts {
    type Output = TextOpts;

    fn bitor(self, rhs: TextOpts) -> TextOpts {
        TextOpts(self.0 | rhs.0)
    }
}

impl BitOrAssign for TextOpts {
    fn bitor_assign(&mut self, rhs: TextOpts) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for TextOpts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "None");
        }
        let mut sep = "";
        for (mask, name) in [
            (TextOpts::BOLD, "Bold"),
            (TextOpts::ITALIC, "Italic"),
            (TextOpts::STRIKETHROUGH, "Strikethrough"),
        ] {
            if self.contains(mask) {
                write!(f, "{}{}", sep, name)?;
                sep = "|";
            }
        }
        Ok(())
    }
}

/// One side of a resolved emphasis run: the style it applies and the span of
/// the delimiter characters consumed to apply it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleDelim {
    pub opts: TextOpts,
    pub span: Span,
}

/// Alignment of one table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableAlignment {
    Left,
    Center,
    Right,
}

impl Default for TableAlignment {
    fn default() -> TableAlignment {
        TableAlignment::Left
    }
}

/// The kind of a list and its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListType {
    Ordered,
    Unordered,
}

/// Whether an ordered list item anchors a new numbering run.
///
/// `Start` iff the item's number is 1 or the item opens its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderedListPreState {
    Start,
    Continue,
}

/// The metadata of a heading.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHeading {
    /// 1 to 6 for ATX headings, 1 or 2 for setext headings.
    pub level: u8,

    /// The raw anchor label: explicit (`{#label}`) or folded from the
    /// heading text. The scoped form keys `Document::labeled_headings`.
    pub label: Option<String>,

    /// Span of an explicit `{#label}` suffix; unset when the label was
    /// synthesized.
    pub label_pos: Span,

    /// Spans of the `#` runs (ATX) or of the underline (setext).
    pub delims: Vec<Span>,
}

/// The metadata of a blockquote: one `>` span per contributing line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeBlockquote {
    pub delims: Vec<Span>,
}

/// The metadata of a list item.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeListItem {
    pub list_type: ListType,
    pub pre_state: OrderedListPreState,

    /// The number parsed from an ordered marker; 1 for bullets.
    pub start_number: i64,

    /// `[ ]` / `[x]` task list item state.
    pub task: bool,
    pub checked: bool,

    /// Span of the list marker itself.
    pub delim: Span,

    /// Span of the task "checkbox", when `task`.
    pub task_delim: Span,
}

/// The metadata and content of a code node, block-level or inline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeCode {
    /// The literal contents. Not interpreted as Markdown at all, so they
    /// live here rather than in child nodes.
    pub literal: String,

    pub inline: bool,
    pub fenced: bool,

    /// First word of a fence's info string.
    pub syntax: Option<String>,
    pub syntax_pos: Span,

    /// Fence or backtick-run spans. `end_delim` stays unset when the
    /// document ends inside the fence.
    pub start_delim: Span,
    pub end_delim: Span,
}

/// A LaTeX math span (`$…$`, `$$…$$`, or a ```` ```math ```` block).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMath {
    pub literal: String,
    pub inline: bool,
    pub start_delim: Span,
    pub end_delim: Span,
}

/// Raw HTML, either a free-standing block or an inline tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeRawHtml {
    pub literal: String,

    /// Free tags live between paragraphs; inline tags inside them.
    pub free_tag: bool,
}

/// The details of a link destination or image source.
///
/// The parsed description is the node's children; `text` keeps the raw
/// (unparsed) description slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeLink {
    pub url: String,
    pub text: String,
    pub text_pos: Span,
    pub url_pos: Span,
}

/// A footnote reference; `id` is already scoped (`#^name/path`).
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFootnoteRef {
    pub id: String,
    pub id_pos: Span,

    /// The literal `[^name]` source, kept for fallback rendering.
    pub text: String,
}

/// A footnote definition block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeFootnote {
    pub id_pos: Span,
}

/// The metadata of a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeTable {
    pub alignments: Vec<TableAlignment>,
}

/// The core node enum.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    /// The root of every document. Contains **blocks**; the first child is
    /// always a synthetic [`NodeValue::Anchor`].
    Document,

    /// A navigation anchor: names the file a document section came from.
    Anchor(String),

    /// Separates stitched-in documents when parsing recursively.
    PageBreak,

    /// A thematic break. Has no children.
    HorizontalLine,

    /// A heading. Its single child is a `Paragraph` holding the parsed
    /// heading text.
    Heading(NodeHeading),

    /// A paragraph. Contains **inlines**.
    Paragraph,

    /// A blockquote. Contains other **blocks**.
    Blockquote(NodeBlockquote),

    /// A list. Contains `ListItem`s sharing one marker kind.
    List,

    /// A list item. Contains other **blocks**.
    ListItem(NodeListItem),

    /// A code block (`inline == false`) or code span (`inline == true`).
    Code(NodeCode),

    /// A math span or math block.
    Math(NodeMath),

    /// Raw HTML.
    RawHtml(NodeRawHtml),

    /// A GFM table. Contains `TableRow`s; the first row is the header.
    Table(NodeTable),

    /// A table row. Contains `TableCell`s.
    TableRow,

    /// A table cell. Contains **inlines**.
    TableCell,

    /// A footnote definition. Contains **blocks**; reachable through the
    /// document's footnote map rather than the visible flow.
    Footnote(NodeFootnote),

    /// A reference to a footnote definition.
    FootnoteRef(NodeFootnoteRef),

    /// A link. Children are the parsed description.
    Link(NodeLink),

    /// An image. Children are the parsed description; `text` doubles as the
    /// flattened alt text.
    Image(NodeLink),

    /// Textual content.
    Text(String),

    /// A hard line break.
    LineBreak,
}

impl NodeValue {
    /// Whether this node is block-level.
    pub fn block(&self) -> bool {
        match *self {
            NodeValue::Document
            | NodeValue::Anchor(..)
            | NodeValue::PageBreak
            | NodeValue::HorizontalLine
            | NodeValue::Heading(..)
            | NodeValue::Paragraph
            | NodeValue::Blockquote(..)
            | NodeValue::List
            | NodeValue::ListItem(..)
            | NodeValue::Table(..)
            | NodeValue::TableRow
            | NodeValue::TableCell
            | NodeValue::Footnote(..) => true,
            NodeValue::Code(ref nc) => !nc.inline,
            NodeValue::Math(ref nm) => !nm.inline,
            NodeValue::RawHtml(ref nh) => nh.free_tag,
            _ => false,
        }
    }

    /// Whether this node may contain inline children.
    pub fn contains_inlines(&self) -> bool {
        matches!(*self, NodeValue::Paragraph | NodeValue::TableCell)
    }

    /// A reference to the text of a `Text` node, if this is one.
    pub fn text(&self) -> Option<&String> {
        match *self {
            NodeValue::Text(ref t) => Some(t),
            _ => None,
        }
    }

    /// A mutable reference to the text of a `Text` node, if this is one.
    pub fn text_mut(&mut self) -> Option<&mut String> {
        match *self {
            NodeValue::Text(ref mut t) => Some(t),
            _ => None,
        }
    }
}

/// A single node: the value plus the shared header fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub value: NodeValue,

    /// Virgin source region of the whole node.
    pub span: Span,

    /// Emphasis styles covering this item (inline items only).
    pub opts: TextOpts,

    /// Emphasis runs opening on this item.
    pub open_styles: Vec<StyleDelim>,

    /// Emphasis runs closing on this item.
    pub close_styles: Vec<StyleDelim>,
}

impl Ast {
    pub fn new(value: NodeValue, span: Span) -> Ast {
        debug_assert!(!span.is_set() || span.start <= span.end);
        Ast {
            value,
            span,
            opts: TextOpts::NONE,
            open_styles: vec![],
            close_styles: vec![],
        }
    }
}

/// The tree node type; allocated in an [`Arena`] bound by `'a`.
pub type AstNode<'a> = Node<'a, RefCell<Ast>>;

/// Allocate a detached node.
pub fn make_node<'a>(
    arena: &'a Arena<AstNode<'a>>,
    value: NodeValue,
    span: Span,
) -> &'a AstNode<'a> {
    arena.alloc(Node::new(RefCell::new(Ast::new(value, span))))
}

/// Whether `parent` may contain a child of the given value.
pub fn can_contain_type<'a>(parent: &'a AstNode<'a>, child: &NodeValue) -> bool {
    if let NodeValue::Document = *child {
        return false;
    }

    match parent.data.borrow().value {
        NodeValue::Document
        | NodeValue::Blockquote(..)
        | NodeValue::Footnote(..)
        | NodeValue::ListItem(..) => child.block() && !matches!(*child, NodeValue::ListItem(..)),

        NodeValue::List => matches!(*child, NodeValue::ListItem(..)),

        NodeValue::Heading(..) => matches!(*child, NodeValue::Paragraph),

        NodeValue::Table(..) => matches!(*child, NodeValue::TableRow),

        NodeValue::TableRow => matches!(*child, NodeValue::TableCell),

        NodeValue::Paragraph
        | NodeValue::TableCell
        | NodeValue::Link(..)
        | NodeValue::Image(..) => !child.block(),

        _ => false,
    }
}

/// A parsed document: the tree plus the three keyed reference stores.
///
/// Map values are the same arena references that live in the tree, so the
/// structure is a DAG at labels but never cyclic.
#[derive(Debug)]
pub struct Document<'a> {
    pub root: &'a AstNode<'a>,

    /// `#^id/path` → footnote definition.
    pub footnotes: FxHashMap<String, &'a AstNode<'a>>,

    /// Normalized reference label + `/path` → link.
    pub labeled_links: FxHashMap<String, &'a AstNode<'a>>,

    /// `#label/path` → heading.
    pub labeled_headings: FxHashMap<String, &'a AstNode<'a>>,
}

impl<'a> Document<'a> {
    pub(crate) fn empty(root: &'a AstNode<'a>) -> Document<'a> {
        Document {
            root,
            footnotes: FxHashMap::default(),
            labeled_links: FxHashMap::default(),
            labeled_headings: FxHashMap::default(),
        }
    }

    /// Deep-copy the document into `arena`.
    ///
    /// Every node is copied, and the reference maps are rebuilt through an
    /// old-pointer → new-node map gathered during the copy, so the clone's
    /// maps point into the clone's own tree.
    pub fn clone_in<'b>(&self, arena: &'b Arena<AstNode<'b>>) -> Document<'b> {
        let mut remap: FxHashMap<usize, &'b AstNode<'b>> = FxHashMap::default();
        let root = clone_subtree(self.root, arena, &mut remap);

        let mut doc = Document::empty(root);
        for (label, node) in &self.footnotes {
            let copy = remap_node(node, arena, &mut remap);
            doc.footnotes.insert(label.clone(), copy);
        }
        for (label, node) in &self.labeled_links {
            let copy = remap_node(node, arena, &mut remap);
            doc.labeled_links.insert(label.clone(), copy);
        }
        for (label, node) in &self.labeled_headings {
            let copy = remap_node(node, arena, &mut remap);
            doc.labeled_headings.insert(label.clone(), copy);
        }
        doc
    }

    /// Structural equality with `other`: same values, spans and styles
    /// throughout, and same reference-store keys.
    pub fn same_structure(&self, other: &Document) -> bool {
        fn keys_match(a: &FxHashMap<String, &AstNode>, b: &FxHashMap<String, &AstNode>) -> bool {
            a.len() == b.len() && a.keys().all(|k| b.contains_key(k))
        }
        subtree_eq(self.root, other.root)
            && keys_match(&self.footnotes, &other.footnotes)
            && keys_match(&self.labeled_links, &other.labeled_links)
            && keys_match(&self.labeled_headings, &other.labeled_headings)
    }
}

fn node_key(node: &AstNode) -> usize {
    node as *const _ as usize
}

fn clone_subtree<'a, 'b>(
    node: &'a AstNode<'a>,
    arena: &'b Arena<AstNode<'b>>,
    remap: &mut FxHashMap<usize, &'b AstNode<'b>>,
) -> &'b AstNode<'b> {
    let new = arena.alloc(Node::new(RefCell::new(node.data.borrow().clone())));
    remap.insert(node_key(node), new);
    for child in node.children() {
        new.append(clone_subtree(child, arena, remap));
    }
    new
}

// Map values that aren't reachable from the root (reference definitions are
// removed from the output flow) are copied on demand.
fn remap_node<'a, 'b>(
    node: &'a AstNode<'a>,
    arena: &'b Arena<AstNode<'b>>,
    remap: &mut FxHashMap<usize, &'b AstNode<'b>>,
) -> &'b AstNode<'b> {
    if let Some(&new) = remap.get(&node_key(node)) {
        return new;
    }
    clone_subtree(node, arena, remap)
}

/// Recursive structural equality of two subtrees.
pub fn subtree_eq<'a, 'b>(a: &'a AstNode<'a>, b: &'b AstNode<'b>) -> bool {
    if *a.data.borrow() != *b.data.borrow() {
        return false;
    }
    let mut ca = a.children();
    let mut cb = b.children();
    loop {
        match (ca.next(), cb.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) => {
                if !subtree_eq(x, y) {
                    return false;
                }
            }
            _ => return false,
        }
    }
}
