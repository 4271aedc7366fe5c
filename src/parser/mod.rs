mod autolink;
mod inlines;
mod table;

pub mod options;
pub mod plugins;

use std::mem;

use log::debug;
use rustc_hash::FxHashMap;
use typed_arena::Arena;

use crate::input::{self, InternalString, Line};
use crate::nodes::{
    make_node, AstNode, Document, ListType, NodeBlockquote, NodeCode, NodeFootnote, NodeHeading,
    NodeLink, NodeListItem, NodeMath, NodeRawHtml, NodeValue, OrderedListPreState, Pos, Span,
};
use crate::scanners::{self, SetextChar};
use crate::strings::{self, Case};

pub use self::options::Options;

pub(crate) const CODE_INDENT: usize = 4;

/// Parse a Markdown document to a position-annotated tree.
///
/// See the documentation of the crate root for an example.
pub fn parse_document<'a>(
    arena: &'a Arena<AstNode<'a>>,
    text: &str,
    options: &Options,
) -> Document<'a> {
    parse_with_path(arena, text, options, "", "")
}

/// Parse a document whose labels should be scoped to
/// `working_path`/`file_name`, so reference stores from several files can
/// be merged without clashes.
pub fn parse_with_path<'a>(
    arena: &'a Arena<AstNode<'a>>,
    text: &str,
    options: &Options,
    working_path: &str,
    file_name: &str,
) -> Document<'a> {
    let mut parser = Parser::new(arena, options, working_path, file_name);
    parser.parse(text)
}

/// The reference stores under construction: written while blocks are built,
/// read while inlines are resolved.
#[derive(Default)]
pub(crate) struct RefStore<'a> {
    pub footnotes: FxHashMap<String, &'a AstNode<'a>>,
    pub labeled_links: FxHashMap<String, &'a AstNode<'a>>,
    pub labeled_headings: FxHashMap<String, &'a AstNode<'a>>,

    /// `"/working_path/file_name"`, appended to every stored label.
    pub suffix: String,
}

/// A deferred inline parse: a container node plus the fragment lines whose
/// text becomes its children. Queued during the block phase and drained
/// once every reference definition in the document is known.
pub(crate) struct InlineJob<'a> {
    pub node: &'a AstNode<'a>,
    pub lines: Vec<Line>,
    pub ignore_line_break: bool,
}

// How a candidate lazy-continuation line relates to the paragraph it might
// extend.
enum LazyBreak {
    Continue,
    Setext(SetextChar),
    Break,
}

struct ListMarker {
    ordered: bool,

    /// The bullet character, or the `.`/`)` delimiter for ordered markers.
    bullet: char,
    start_number: i64,

    /// Char index of the marker within its (transformed) line.
    marker_start: usize,
    marker_end: usize,

    /// Char index the item's content starts at; nested material must be
    /// indented this far.
    content_indent: usize,
}

fn lists_match(a: &ListMarker, b: &ListMarker) -> bool {
    a.ordered == b.ordered && a.bullet == b.bullet
}

pub struct Parser<'a, 'o> {
    arena: &'a Arena<AstNode<'a>>,
    options: &'o Options,
    refs: RefStore<'a>,
    file_name: String,
    inline_jobs: Vec<InlineJob<'a>>,
}

impl<'a, 'o> Parser<'a, 'o> {
    fn new(
        arena: &'a Arena<AstNode<'a>>,
        options: &'o Options,
        working_path: &str,
        file_name: &str,
    ) -> Parser<'a, 'o> {
        Parser {
            arena,
            options,
            refs: RefStore {
                suffix: strings::label_suffix(working_path, file_name),
                ..RefStore::default()
            },
            file_name: file_name.to_string(),
            inline_jobs: vec![],
        }
    }

    fn parse(&mut self, text: &str) -> Document<'a> {
        let root = make_node(self.arena, NodeValue::Document, Span::new(0, 0, 0, 0));
        let anchor = make_node(
            self.arena,
            NodeValue::Anchor(self.file_name.clone()),
            Span::default(),
        );
        root.append(anchor);

        let lines = input::split_lines(text);
        debug!("parsing {} lines from {:?}", lines.len(), self.file_name);
        self.parse_blocks(root, &lines);

        if let Some(last) = lines.iter().rev().find(|l| !l.content.is_blank()) {
            let end_col = last
                .content
                .last_non_space()
                .map_or(0, |i| last.content.virgin_col_end(i));
            root.data.borrow_mut().span = Span::new(0, 0, end_col, last.number);
        }

        let jobs = mem::take(&mut self.inline_jobs);
        for job in jobs {
            inlines::process_job(self.arena, self.options, &self.refs, job);
        }

        self.split_free_html(root);

        let refs = mem::take(&mut self.refs);
        let mut doc = Document::empty(root);
        doc.footnotes = refs.footnotes;
        doc.labeled_links = refs.labeled_links;
        doc.labeled_headings = refs.labeled_headings;
        doc
    }

    /////////////////////////////
    // Block splitter (§A)     //
    /////////////////////////////

    /// Stream `lines` into block fragments appended to `parent`. Recursive:
    /// container bodies come back through here with their markers stripped.
    fn parse_blocks(&mut self, parent: &'a AstNode<'a>, lines: &[Line]) {
        let mut i = 0;
        while i < lines.len() {
            let line = &lines[i];
            if line.content.is_blank() {
                i += 1;
                continue;
            }

            let indent = line.content.indent();
            if indent >= CODE_INDENT {
                i = self.parse_indented_code(parent, lines, i);
                continue;
            }

            let rest = &line.content.chars()[indent..];

            if let Some(fence_length) = scanners::open_code_fence(rest) {
                i = self.parse_fenced_code(parent, lines, i, indent, fence_length);
                continue;
            }

            if scanners::atx_heading_start(rest).is_some() {
                self.parse_atx_heading(parent, line);
                i += 1;
                continue;
            }

            if rest[0] == '>' {
                i = self.parse_blockquote(parent, lines, i);
                continue;
            }

            if let Some(rule) =
                scanners::html_block_start(rest).or_else(|| scanners::html_block_start_7(rest))
            {
                i = self.parse_html_block(parent, lines, i, rule);
                continue;
            }

            if let Some((id, head_len)) = scanners::footnote_definition_start(rest) {
                i = self.parse_footnote(lines, i, id, head_len);
                continue;
            }

            if scanners::thematic_break(rest).is_some() {
                let hr = make_node(
                    self.arena,
                    NodeValue::HorizontalLine,
                    line_span(line, indent),
                );
                parent.append(hr);
                i += 1;
                continue;
            }

            if parse_list_marker(&line.content, indent).is_some() {
                i = self.parse_list(parent, lines, i);
                continue;
            }

            i = self.parse_paragraph_like(parent, lines, i);
        }
    }

    // Would `line`, in lazy position under an open paragraph, end it?
    fn classify_lazy(&self, line: &Line) -> LazyBreak {
        let indent = line.content.indent();
        if indent >= CODE_INDENT {
            return LazyBreak::Continue;
        }

        let rest = &line.content.chars()[indent..];
        if let Some(sc) = scanners::setext_heading_line(rest) {
            return LazyBreak::Setext(sc);
        }
        if scanners::atx_heading_start(rest).is_some()
            || scanners::open_code_fence(rest).is_some()
            || rest[0] == '>'
            || scanners::thematic_break(rest).is_some()
            || scanners::html_block_start(rest).is_some()
            || scanners::footnote_definition_start(rest).is_some()
        {
            return LazyBreak::Break;
        }

        if let Some(marker) = parse_list_marker(&line.content, indent) {
            if marker_interrupts_paragraph(&line.content, &marker) {
                return LazyBreak::Break;
            }
        }

        LazyBreak::Continue
    }

    /////////////////////////////
    // Fragment parsers (§B)   //
    /////////////////////////////

    fn parse_paragraph_like(
        &mut self,
        parent: &'a AstNode<'a>,
        lines: &[Line],
        start: usize,
    ) -> usize {
        let mut j = start + 1;
        let mut setext: Option<(SetextChar, usize)> = None;

        while j < lines.len() {
            let line = &lines[j];
            if line.content.is_blank() {
                break;
            }
            match self.classify_lazy(line) {
                LazyBreak::Continue => j += 1,
                LazyBreak::Setext(sc) => {
                    setext = Some((sc, j));
                    j += 1;
                    break;
                }
                LazyBreak::Break => break,
            }
        }

        let frag_end = match setext {
            Some((_, underline)) => underline,
            None => j,
        };
        let mut frag: Vec<Line> = lines[start..frag_end].to_vec();

        self.parse_reference_definitions(&mut frag);

        if frag.is_empty() {
            // Only reference definitions: an underline that follows has
            // nothing to promote and reads as text of its own.
            if let Some((_, underline)) = setext {
                self.emit_paragraph(parent, vec![lines[underline].clone()]);
            }
            return j;
        }

        match setext {
            Some((sc, underline)) => {
                self.emit_setext_heading(parent, frag, &lines[underline], sc);
            }
            None => {
                self.emit_fragment(parent, frag);
            }
        }

        j
    }

    // A reference-definition-free fragment: a table, a paragraph, or a
    // mix of both.
    fn emit_fragment(&mut self, parent: &'a AstNode<'a>, frag: Vec<Line>) {
        if let Some(header) = table::detect(&frag) {
            if header > 0 {
                self.emit_paragraph(parent, frag[..header].to_vec());
            }
            let consumed = table::parse(self, parent, &frag[header..]);
            let rest = frag[header + consumed..].to_vec();
            if !rest.is_empty() {
                self.emit_fragment(parent, rest);
            }
            return;
        }

        self.emit_paragraph(parent, frag);
    }

    fn emit_paragraph(&mut self, parent: &'a AstNode<'a>, frag: Vec<Line>) {
        let span = match fragment_span(&frag) {
            Some(span) => span,
            None => return,
        };

        let p = make_node(self.arena, NodeValue::Paragraph, span);
        parent.append(p);
        self.inline_jobs.push(InlineJob {
            node: p,
            lines: frag,
            ignore_line_break: false,
        });
    }

    fn emit_setext_heading(
        &mut self,
        parent: &'a AstNode<'a>,
        frag: Vec<Line>,
        underline: &Line,
        sc: SetextChar,
    ) {
        let level = match sc {
            SetextChar::Equals => 1,
            SetextChar::Hyphen => 2,
        };

        let uind = underline.content.indent();
        let uend = underline.content.last_non_space().unwrap_or(uind);
        let underline_span = Span::new(
            underline.content.virgin_col(uind),
            underline.number,
            underline.content.virgin_col_end(uend),
            underline.number,
        );

        let text_span = fragment_span(&frag).unwrap_or(underline_span);
        let label = strings::heading_anchor(&fragment_text(&frag));
        let span = Span {
            start: text_span.start,
            end: underline_span.end,
        };

        let heading = make_node(
            self.arena,
            NodeValue::Heading(NodeHeading {
                level,
                label: Some(self.scoped_heading_label(&label)),
                label_pos: Span::default(),
                delims: vec![underline_span],
            }),
            span,
        );
        parent.append(heading);
        self.register_heading(label, heading);

        let p = make_node(self.arena, NodeValue::Paragraph, text_span);
        heading.append(p);
        self.inline_jobs.push(InlineJob {
            node: p,
            lines: frag,
            ignore_line_break: false,
        });
    }

    fn parse_atx_heading(&mut self, parent: &'a AstNode<'a>, line: &Line) {
        let content = &line.content;
        let chars = content.chars();
        let indent = content.indent();

        let mut hash_end = indent;
        while hash_end < chars.len() && chars[hash_end] == '#' {
            hash_end += 1;
        }
        let level = (hash_end - indent) as u8;

        let mut delims = vec![Span::new(
            content.virgin_col(indent),
            line.number,
            content.virgin_col_end(hash_end - 1),
            line.number,
        )];

        let mut text_start = hash_end;
        while text_start < chars.len() && chars[text_start] == ' ' {
            text_start += 1;
        }

        let mut text_end = content.last_non_space().map_or(text_start, |i| i + 1);

        // Optional closing run: `##` preceded by a space (or nothing but
        // hashes after the opener).
        if text_end > text_start {
            let mut h = text_end;
            while h > text_start && chars[h - 1] == '#' {
                h -= 1;
            }
            if h < text_end && (h == text_start || chars[h - 1] == ' ') {
                delims.push(Span::new(
                    content.virgin_col(h),
                    line.number,
                    content.virgin_col_end(text_end - 1),
                    line.number,
                ));
                text_end = h;
                while text_end > text_start && chars[text_end - 1] == ' ' {
                    text_end -= 1;
                }
            }
        }

        // Optional `{#label}` suffix.
        let mut explicit_label: Option<String> = None;
        let mut label_pos = Span::default();
        if text_end > text_start && chars[text_end - 1] == '}' {
            if let Some(open) = (text_start..text_end - 1)
                .rev()
                .find(|&k| chars[k] == '{' && chars.get(k + 1) == Some(&'#'))
            {
                let label: String = chars[open + 2..text_end - 1].iter().collect();
                if !label.is_empty() && !label.contains(' ') {
                    explicit_label = Some(label);
                    label_pos = Span::new(
                        content.virgin_col(open),
                        line.number,
                        content.virgin_col_end(text_end - 1),
                        line.number,
                    );
                    text_end = open;
                    while text_end > text_start && chars[text_end - 1] == ' ' {
                        text_end -= 1;
                    }
                }
            }
        }

        let raw_text = content.text(text_start, text_end);
        let label = explicit_label
            .map(|l| l.trim_start_matches('#').to_string())
            .unwrap_or_else(|| strings::heading_anchor(&raw_text));

        let end_ix = content.last_non_space().unwrap_or(indent);
        let span = Span::new(
            content.virgin_col(indent),
            line.number,
            content.virgin_col_end(end_ix),
            line.number,
        );

        let heading = make_node(
            self.arena,
            NodeValue::Heading(NodeHeading {
                level,
                label: Some(self.scoped_heading_label(&label)),
                label_pos,
                delims,
            }),
            span,
        );
        parent.append(heading);
        self.register_heading(label, heading);

        let (p_span, p_lines) = if text_end > text_start {
            (
                Span::new(
                    content.virgin_col(text_start),
                    line.number,
                    content.virgin_col_end(text_end - 1),
                    line.number,
                ),
                vec![line.slice(text_start, text_end)],
            )
        } else {
            (Span::default(), vec![])
        };
        let p = make_node(self.arena, NodeValue::Paragraph, p_span);
        heading.append(p);
        if !p_lines.is_empty() {
            self.inline_jobs.push(InlineJob {
                node: p,
                lines: p_lines,
                ignore_line_break: false,
            });
        }
    }

    fn scoped_heading_label(&self, label: &str) -> String {
        format!("#{}{}", label, self.refs.suffix)
    }

    fn register_heading(&mut self, label: String, node: &'a AstNode<'a>) {
        let key = self.scoped_heading_label(&label);
        self.refs.labeled_headings.entry(key).or_insert(node);

        // Both the written and the lower-case variant resolve.
        let lower = label.to_lowercase();
        if lower != label {
            let key = self.scoped_heading_label(&lower);
            self.refs.labeled_headings.entry(key).or_insert(node);
        }
    }

    fn parse_fenced_code(
        &mut self,
        parent: &'a AstNode<'a>,
        lines: &[Line],
        start: usize,
        indent: usize,
        fence_length: usize,
    ) -> usize {
        let open = &lines[start];
        let fence_char = open.content.char_at(indent);
        let start_delim = Span::new(
            open.content.virgin_col(indent),
            open.number,
            open.content.virgin_col_end(indent + fence_length - 1),
            open.number,
        );

        // Info string: first word, with backslash and entity sequences read.
        let info_start = {
            let mut k = indent + fence_length;
            while k < open.content.len() && open.content.char_at(k) == ' ' {
                k += 1;
            }
            k
        };
        let mut info_end = info_start;
        while info_end < open.content.len() && open.content.char_at(info_end) != ' ' {
            info_end += 1;
        }
        let (syntax, syntax_pos) = if info_end > info_start {
            let word = open.content.text(info_start, info_end);
            (
                Some(strings::unescape(&crate::entity::unescape_html(&word))),
                Span::new(
                    open.content.virgin_col(info_start),
                    open.number,
                    open.content.virgin_col_end(info_end - 1),
                    open.number,
                ),
            )
        } else {
            (None, Span::default())
        };

        let mut j = start + 1;
        let mut end_delim = Span::default();
        let mut closed = false;
        let mut body_end = lines.len();
        while j < lines.len() {
            let l = &lines[j];
            let lind = l.content.indent();
            if lind <= 3 && !l.content.is_blank() && l.content.char_at(lind) == fence_char {
                if let Some(clen) = scanners::close_code_fence(&l.content.chars()[lind..]) {
                    if clen >= fence_length {
                        end_delim = Span::new(
                            l.content.virgin_col(lind),
                            l.number,
                            l.content.virgin_col_end(lind + clen - 1),
                            l.number,
                        );
                        closed = true;
                        body_end = j;
                        break;
                    }
                }
            }
            j += 1;
        }

        let mut literal = String::new();
        for l in &lines[start + 1..body_end] {
            if !literal.is_empty() {
                literal.push('\n');
            }
            let strip = indent.min(l.content.indent());
            literal.push_str(&l.content.text(strip, l.content.len()));
        }

        let end = if closed {
            end_delim.end
        } else {
            match lines.last() {
                Some(l) => Pos::new(
                    l.number,
                    l.content.last_non_space().map_or(0, |i| l.content.virgin_col_end(i)),
                ),
                None => start_delim.end,
            }
        };
        let span = Span {
            start: start_delim.start,
            end,
        };

        let value = if syntax.as_deref() == Some("math") {
            NodeValue::Math(NodeMath {
                literal,
                inline: false,
                start_delim,
                end_delim,
            })
        } else {
            NodeValue::Code(NodeCode {
                literal,
                inline: false,
                fenced: true,
                syntax,
                syntax_pos,
                start_delim,
                end_delim,
            })
        };

        let node = make_node(self.arena, value, span);
        parent.append(node);

        if closed {
            body_end + 1
        } else {
            lines.len()
        }
    }

    fn parse_indented_code(
        &mut self,
        parent: &'a AstNode<'a>,
        lines: &[Line],
        start: usize,
    ) -> usize {
        let mut j = start;
        let mut last_content = start;
        while j < lines.len() {
            let l = &lines[j];
            if l.content.is_blank() {
                j += 1;
                continue;
            }
            if l.content.indent() < CODE_INDENT {
                break;
            }
            last_content = j;
            j += 1;
        }

        let mut literal = String::new();
        for l in &lines[start..=last_content] {
            if !literal.is_empty() {
                literal.push('\n');
            }
            let strip = CODE_INDENT.min(l.content.len());
            literal.push_str(&l.content.text(strip, l.content.len()));
        }

        let first = &lines[start];
        let last = &lines[last_content];
        let span = Span::new(
            first.content.virgin_col(CODE_INDENT),
            first.number,
            last.content
                .last_non_space()
                .map_or(0, |i| last.content.virgin_col_end(i)),
            last.number,
        );

        let node = make_node(
            self.arena,
            NodeValue::Code(NodeCode {
                literal,
                inline: false,
                fenced: false,
                ..NodeCode::default()
            }),
            span,
        );
        parent.append(node);

        last_content + 1
    }

    fn parse_blockquote(&mut self, parent: &'a AstNode<'a>, lines: &[Line], start: usize) -> usize {
        let mut delims = vec![];
        let mut inner: Vec<Line> = vec![];
        let mut j = start;
        let mut lazy_open = false;
        let mut last_line = start;

        while j < lines.len() {
            let line = &lines[j];
            if line.content.is_blank() {
                break;
            }
            let indent = line.content.indent();

            if indent < CODE_INDENT && line.content.char_at(indent) == '>' {
                let mut strip = indent + 1;
                if line.content.get(strip) == Some(' ') {
                    strip += 1;
                }
                delims.push(Span::new(
                    line.content.virgin_col(indent),
                    line.number,
                    line.content.virgin_col_end(indent),
                    line.number,
                ));
                let stripped = line.slice(strip.min(line.content.len()), line.content.len());
                lazy_open = !stripped.content.is_blank()
                    && matches!(self.classify_lazy(&stripped), LazyBreak::Continue);
                inner.push(stripped);
                last_line = j;
                j += 1;
                continue;
            }

            if lazy_open && matches!(self.classify_lazy(line), LazyBreak::Continue) {
                inner.push(line.clone());
                last_line = j;
                j += 1;
                continue;
            }

            break;
        }

        let first = &lines[start];
        let bq_indent = first.content.indent();
        let end_line = &lines[last_line];
        let span = Span::new(
            first.content.virgin_col(bq_indent),
            first.number,
            end_line
                .content
                .last_non_space()
                .map_or(0, |i| end_line.content.virgin_col_end(i)),
            end_line.number,
        );

        let bq = make_node(
            self.arena,
            NodeValue::Blockquote(NodeBlockquote { delims }),
            span,
        );
        parent.append(bq);
        self.parse_blocks(bq, &inner);

        j
    }

    // Footnote definitions are reachable through the document's footnote
    // map only; they are not appended to the visible flow.
    fn parse_footnote(&mut self, lines: &[Line], start: usize, id: String, head_len: usize) -> usize {
        let line = &lines[start];
        let indent = line.content.indent();

        let id_pos = Span::new(
            line.content.virgin_col(indent + 2),
            line.number,
            line.content.virgin_col_end(indent + 2 + id.chars().count() - 1),
            line.number,
        );

        let mut body: Vec<Line> = vec![];
        let mut body_start = indent + head_len;
        if line.content.get(body_start) == Some(' ') {
            body_start += 1;
        }
        body.push(line.slice(body_start.min(line.content.len()), line.content.len()));

        let mut j = start + 1;
        let mut pending: Vec<Line> = vec![];
        let mut last_line = start;
        while j < lines.len() {
            let l = &lines[j];
            if l.content.is_blank() {
                pending.push(l.slice(0, 0));
                j += 1;
                continue;
            }
            if l.content.indent() < CODE_INDENT {
                break;
            }
            body.append(&mut pending);
            body.push(l.slice(CODE_INDENT, l.content.len()));
            last_line = j;
            j += 1;
        }

        let end_line = &lines[last_line];
        let span = Span::new(
            line.content.virgin_col(indent),
            line.number,
            end_line
                .content
                .last_non_space()
                .map_or(0, |i| end_line.content.virgin_col_end(i)),
            end_line.number,
        );

        let footnote = make_node(
            self.arena,
            NodeValue::Footnote(NodeFootnote { id_pos }),
            span,
        );
        self.parse_blocks(footnote, &body);

        let key = format!(
            "#^{}{}",
            caseless::default_case_fold_str(&id),
            self.refs.suffix
        );
        self.refs.footnotes.entry(key).or_insert(footnote);

        j
    }

    fn parse_html_block(
        &mut self,
        parent: &'a AstNode<'a>,
        lines: &[Line],
        start: usize,
        rule: u8,
    ) -> usize {
        let mut j = start;
        let mut last = start;
        while j < lines.len() {
            let l = &lines[j];
            match rule {
                1..=5 => {
                    last = j;
                    if scanners::html_block_end(rule, l.content.chars()) {
                        j += 1;
                        break;
                    }
                    j += 1;
                }
                _ => {
                    if l.content.is_blank() {
                        break;
                    }
                    last = j;
                    j += 1;
                }
            }
        }

        let mut literal = String::new();
        for l in &lines[start..=last] {
            if !literal.is_empty() {
                literal.push('\n');
            }
            literal.push_str(&l.content.text(0, l.content.len()));
        }

        let first = &lines[start];
        let indent = first.content.indent();
        let end_line = &lines[last];
        let span = Span::new(
            first.content.virgin_col(indent),
            first.number,
            end_line
                .content
                .last_non_space()
                .map_or(0, |i| end_line.content.virgin_col_end(i)),
            end_line.number,
        );

        let node = make_node(
            self.arena,
            NodeValue::RawHtml(NodeRawHtml {
                literal,
                free_tag: true,
            }),
            span,
        );
        parent.append(node);

        j
    }

    /////////////////////////////
    // Lists                   //
    /////////////////////////////

    fn parse_list(&mut self, parent: &'a AstNode<'a>, lines: &[Line], start: usize) -> usize {
        let mut j = start;
        let mut list: Option<&'a AstNode<'a>> = None;
        let mut list_marker: Option<ListMarker> = None;
        let mut first_in_list = true;

        while j < lines.len() {
            let line = &lines[j];
            if line.content.is_blank() {
                break;
            }
            let indent = line.content.indent();
            if indent >= CODE_INDENT {
                break;
            }
            let marker = match parse_list_marker(&line.content, indent) {
                Some(m) => m,
                None => break,
            };

            if list_marker
                .as_ref()
                .map_or(true, |m| !lists_match(m, &marker))
            {
                let l = make_node(self.arena, NodeValue::List, Span::default());
                parent.append(l);
                list = Some(l);
                first_in_list = true;
            }
            let list_node = list.unwrap();

            let (next, item_end) = self.parse_list_item(list_node, lines, j, &marker, first_in_list);

            {
                let mut ast = list_node.data.borrow_mut();
                if !ast.span.is_set() {
                    ast.span.start = Pos::new(
                        line.number,
                        line.content.virgin_col(marker.marker_start),
                    );
                }
                ast.span.end = item_end;
            }

            list_marker = Some(marker);
            first_in_list = false;
            j = next;
        }

        j
    }

    // Returns the index of the first line after the item and the item's
    // end position.
    fn parse_list_item(
        &mut self,
        list_node: &'a AstNode<'a>,
        lines: &[Line],
        start: usize,
        marker: &ListMarker,
        first_in_list: bool,
    ) -> (usize, Pos) {
        let line = &lines[start];
        let content_indent = marker.content_indent;

        let mut body: Vec<Line> = vec![line.slice(
            content_indent.min(line.content.len()),
            line.content.len(),
        )];

        let mut k = start + 1;
        let mut pending: Vec<Line> = vec![];
        let mut last_was_text = !body[0].content.is_blank();
        while k < lines.len() {
            let l = &lines[k];
            if l.content.is_blank() {
                pending.push(l.slice(0, 0));
                k += 1;
                continue;
            }
            let lind = l.content.indent();

            if lind >= content_indent {
                body.append(&mut pending);
                body.push(l.slice(content_indent, l.content.len()));
                last_was_text = true;
                k += 1;
                continue;
            }

            if !pending.is_empty() {
                // The first under-indented line after an empty line ends
                // the item; the outer loop decides whether the list goes
                // on with another marker.
                break;
            }

            if lind < CODE_INDENT {
                if let Some(m2) = parse_list_marker(&l.content, lind) {
                    // A sibling marker, or a marker that may interrupt a
                    // paragraph, ends this item. A non-interrupting marker
                    // of another list kind stays lazy paragraph text.
                    if lists_match(marker, &m2)
                        || marker_interrupts_paragraph(&l.content, &m2)
                        || !last_was_text
                    {
                        break;
                    }
                }
            }

            // Once a line has been carried over lazily it may not lazily
            // continue a second, deeper container.
            if last_was_text
                && !l.may_break_list
                && matches!(self.classify_lazy(l), LazyBreak::Continue)
            {
                let mut lazy = l.clone();
                lazy.may_break_list = true;
                body.push(lazy);
                k += 1;
                continue;
            }

            break;
        }

        // Task marker on the item's first content.
        let mut task = false;
        let mut checked = false;
        let mut task_delim = Span::default();
        if let Some((is_checked, delim_span, strip)) = detect_task_marker(&body[0]) {
            task = true;
            checked = is_checked;
            task_delim = delim_span;
            body[0] = body[0].slice(strip.min(body[0].content.len()), body[0].content.len());
        }

        let pre_state = if !marker.ordered || marker.start_number == 1 || first_in_list {
            OrderedListPreState::Start
        } else {
            OrderedListPreState::Continue
        };

        let delim = Span::new(
            line.content.virgin_col(marker.marker_start),
            line.number,
            line.content.virgin_col_end(marker.marker_end - 1),
            line.number,
        );

        let end = body
            .iter()
            .rev()
            .find(|l| !l.content.is_blank())
            .map(|l| {
                Pos::new(
                    l.number,
                    l.content
                        .last_non_space()
                        .map_or(0, |i| l.content.virgin_col_end(i)),
                )
            })
            .unwrap_or(delim.end);

        let item = make_node(
            self.arena,
            NodeValue::ListItem(NodeListItem {
                list_type: if marker.ordered {
                    ListType::Ordered
                } else {
                    ListType::Unordered
                },
                pre_state,
                start_number: marker.start_number,
                task,
                checked,
                delim,
                task_delim,
            }),
            Span {
                start: Pos::new(
                    line.number,
                    line.content.virgin_col(marker.marker_start),
                ),
                end,
            },
        );
        list_node.append(item);

        while body.last().map_or(false, |l| l.content.is_blank()) {
            body.pop();
        }
        self.parse_blocks(item, &body);

        (k, end)
    }

    /////////////////////////////
    // Reference definitions   //
    /////////////////////////////

    // Strip `[label]: url "title"` definitions off the front of a
    // paragraph fragment, registering each in the labeled-link store.
    fn parse_reference_definitions(&mut self, frag: &mut Vec<Line>) {
        loop {
            let consumed = match self.parse_one_reference_definition(frag) {
                Some(n) => n,
                None => return,
            };
            frag.drain(..consumed);
        }
    }

    fn parse_one_reference_definition(&mut self, frag: &[Line]) -> Option<usize> {
        let line = frag.first()?;
        let indent = line.content.indent();
        if indent > 3 {
            return None;
        }
        let chars = line.content.chars();
        if chars.get(indent) != Some(&'[') || chars.get(indent + 1) == Some(&'^') {
            return None;
        }

        let mut i = indent + 1;
        let label_start = i;
        while i < chars.len() && chars[i] != ']' && chars[i] != '[' {
            if chars[i] == '\\' {
                i += 1;
            }
            i += 1;
        }
        if i >= chars.len() || chars[i] != ']' || chars.get(i + 1) != Some(&':') {
            return None;
        }
        let label_raw = line.content.text(label_start, i);
        if label_raw.trim().is_empty() {
            return None;
        }
        let label_pos = Span::new(
            line.content.virgin_col(indent),
            line.number,
            line.content.virgin_col_end(i),
            line.number,
        );

        let mut consumed = 1;
        let mut di = i + 2;
        while chars.get(di) == Some(&' ') {
            di += 1;
        }

        let (dest_line, dest_start) = if di >= chars.len() {
            let second = frag.get(1)?;
            if second.content.is_blank() {
                return None;
            }
            consumed = 2;
            (second, second.content.first_non_space())
        } else {
            (line, di)
        };

        let dchars = dest_line.content.chars();
        let dest_end = if dchars[dest_start] == '<' {
            let close = (dest_start + 1..dchars.len()).find(|&k| dchars[k] == '>')?;
            close + 1
        } else {
            let mut k = dest_start;
            while k < dchars.len() && dchars[k] != ' ' {
                k += 1;
            }
            k
        };
        let dest = dest_line.content.text(dest_start, dest_end);
        let url_pos = Span::new(
            dest_line.content.virgin_col(dest_start),
            dest_line.number,
            dest_line.content.virgin_col_end(dest_end - 1),
            dest_line.number,
        );

        // Optional title: on the destination line, or alone on the next.
        let mut t = dest_end;
        while t < dchars.len() && dchars[t] == ' ' {
            t += 1;
        }
        if t < dchars.len() {
            let matched = scanners::link_title(&dchars[t..])?;
            if !dchars[t + matched..].iter().all(|&c| c == ' ') {
                return None;
            }
        } else if let Some(next) = frag.get(consumed) {
            let s = next.content.first_non_space();
            let nchars = next.content.chars();
            if s < nchars.len() {
                if let Some(matched) = scanners::link_title(&nchars[s..]) {
                    if nchars[s + matched..].iter().all(|&c| c == ' ') {
                        consumed += 1;
                    }
                }
            }
        }

        let key = format!(
            "{}{}",
            strings::normalize_label(&label_raw, Case::Fold),
            self.refs.suffix
        );
        if !self.refs.labeled_links.contains_key(&key) {
            let link = make_node(
                self.arena,
                NodeValue::Link(NodeLink {
                    url: strings::clean_url(&dest),
                    text: label_raw,
                    text_pos: label_pos,
                    url_pos,
                }),
                Span {
                    start: label_pos.start,
                    end: url_pos.end,
                },
            );
            self.refs.labeled_links.insert(key, link);
        }

        Some(consumed)
    }

    /////////////////////////////
    // Post-processing         //
    /////////////////////////////

    // Free tags must not live inside paragraphs: split any paragraph that
    // picked one up during inline parsing into siblings around it.
    fn split_free_html(&mut self, root: &'a AstNode<'a>) {
        let offenders: Vec<&'a AstNode<'a>> = root
            .descendants()
            .filter(|n| {
                matches!(n.data.borrow().value, NodeValue::Paragraph)
                    && n.children().any(|c| {
                        matches!(
                            c.data.borrow().value,
                            NodeValue::RawHtml(NodeRawHtml { free_tag: true, .. })
                        )
                    })
            })
            .collect();

        for p in offenders {
            let children: Vec<&'a AstNode<'a>> = p.children().collect();
            let mut insert_after = p;
            let mut current: Option<&'a AstNode<'a>> = None;

            for ch in children {
                ch.detach();
                let free = matches!(
                    ch.data.borrow().value,
                    NodeValue::RawHtml(NodeRawHtml { free_tag: true, .. })
                );
                if free {
                    insert_after.insert_after(ch);
                    insert_after = ch;
                    current = None;
                } else {
                    let target = match current {
                        Some(t) => t,
                        None => {
                            let np = make_node(self.arena, NodeValue::Paragraph, Span::default());
                            insert_after.insert_after(np);
                            insert_after = np;
                            current = Some(np);
                            np
                        }
                    };
                    target.append(ch);
                    let mut ast = target.data.borrow_mut();
                    let child_span = ch.data.borrow().span;
                    if !ast.span.is_set() {
                        ast.span = child_span;
                    } else {
                        ast.span.end = child_span.end;
                    }
                }
            }

            p.detach();
        }
    }
}

/////////////////////////////
// Line-level helpers      //
/////////////////////////////

fn line_span(line: &Line, from: usize) -> Span {
    let end = line.content.last_non_space().unwrap_or(from);
    Span::new(
        line.content.virgin_col(from),
        line.number,
        line.content.virgin_col_end(end),
        line.number,
    )
}

fn fragment_span(frag: &[Line]) -> Option<Span> {
    let first = frag.iter().find(|l| !l.content.is_blank())?;
    let last = frag.iter().rev().find(|l| !l.content.is_blank())?;
    let s = first.content.first_non_space();
    let e = last.content.last_non_space().unwrap();
    Some(Span::new(
        first.content.virgin_col(s),
        first.number,
        last.content.virgin_col_end(e),
        last.number,
    ))
}

fn fragment_text(frag: &[Line]) -> String {
    let mut out = String::new();
    for l in frag {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(l.content.text(0, l.content.len()).trim());
    }
    out
}

/// Recognize a list-item marker at `pos`: `*`, `-` or `+`, or up to nine
/// digits followed by `.` or `)`, each followed by a space or end of line.
fn parse_list_marker(content: &InternalString, pos: usize) -> Option<ListMarker> {
    let chars = content.chars();
    let c = *chars.get(pos)?;

    let (ordered, bullet, start_number, marker_end) = if c == '*' || c == '-' || c == '+' {
        (false, c, 1, pos + 1)
    } else if c.is_ascii_digit() {
        let mut k = pos;
        while k < chars.len() && chars[k].is_ascii_digit() {
            k += 1;
        }
        if k - pos > 9 {
            return None;
        }
        let delim = *chars.get(k)?;
        if delim != '.' && delim != ')' {
            return None;
        }
        let number: i64 = content.text(pos, k).parse().ok()?;
        (true, delim, number, k + 1)
    } else {
        return None;
    };

    match chars.get(marker_end) {
        None | Some(' ') => {}
        _ => return None,
    }

    let mut k = marker_end;
    while k < chars.len() && chars[k] == ' ' {
        k += 1;
    }
    let spaces = k - marker_end;
    let content_indent = if spaces == 0 || spaces >= 5 || k == chars.len() {
        marker_end + 1
    } else {
        k
    };

    Some(ListMarker {
        ordered,
        bullet,
        start_number,
        marker_start: pos,
        marker_end,
        content_indent,
    })
}

// A list item interrupts a paragraph only when it has content on the
// marker line, and an ordered one only when it starts at 1.
fn marker_interrupts_paragraph(content: &InternalString, marker: &ListMarker) -> bool {
    let has_content = content.chars()[marker.marker_end..]
        .iter()
        .any(|&c| c != ' ');
    has_content && (!marker.ordered || marker.start_number == 1)
}

// `[ ]`, `[x]` or `[X]` followed by a space or end of line, at the very
// start of an item's first content line.
fn detect_task_marker(line: &Line) -> Option<(bool, Span, usize)> {
    let chars = line.content.chars();
    if chars.len() < 3 || chars[0] != '[' || chars[2] != ']' {
        return None;
    }
    let checked = match chars[1] {
        ' ' => false,
        'x' | 'X' => true,
        _ => return None,
    };
    match chars.get(3) {
        None | Some(' ') => {}
        _ => return None,
    }

    let span = Span::new(
        line.content.virgin_col(0),
        line.number,
        line.content.virgin_col_end(2),
        line.number,
    );
    let strip = if chars.get(3) == Some(&' ') { 4 } else { 3 };
    Some((checked, span, strip))
}
