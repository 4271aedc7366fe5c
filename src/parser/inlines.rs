//! The inline analyzer: delimiter scanning and resolution.
//!
//! A fragment's lines are scanned once left-to-right into a delimiter
//! vector (code-span ticks, math dollars, emphasis runs with CommonMark
//! flanking flags, brackets, pointy braces), then walked to produce inline
//! items appended to the fragment's container node. Emphasis does not wrap
//! items in nodes: resolved runs set `opts` bitmasks on the covered items
//! and attach open/close [`StyleDelim`]s to the run's first and last item.

use smallvec::SmallVec;
use typed_arena::Arena;
use unicode_categories::UnicodeCategories;

use crate::ctype::ispunct;
use crate::entity;
use crate::input::Line;
use crate::nodes::{
    make_node, AstNode, NodeCode, NodeFootnoteRef, NodeLink, NodeMath, NodeRawHtml, NodeValue,
    Span, StyleDelim, TextOpts,
};
use crate::parser::plugins::TextPluginContext;
use crate::parser::{InlineJob, Options, RefStore};
use crate::scanners;
use crate::strings::{self, Case};

pub(crate) fn process_job<'a>(
    arena: &'a Arena<AstNode<'a>>,
    options: &Options,
    refs: &RefStore<'a>,
    job: InlineJob<'a>,
) {
    if job.lines.is_empty() {
        return;
    }
    let mut subject = Subject {
        arena,
        options,
        refs,
        node: job.node,
        lines: job.lines,
        ignore_line_break: job.ignore_line_break,
        delims: vec![],
        cursor: (0, 0),
        emph: vec![],
        brackets: SmallVec::new(),
    };
    subject.run();
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DelimKind {
    Star,
    Underscore,
    Tilde,
    Backtick,
    Dollar,
    Less,
    SqOpen,
    ImageOpen,
    SqClose,
    ParenOpen,
    ParenClose,
}

/// One entry of the delimiter vector (C5 output).
#[derive(Clone, Copy)]
struct Delim {
    kind: DelimKind,
    line: usize,
    pos: usize,
    len: usize,
    can_open: bool,
    can_close: bool,
}

// An emphasis-run candidate: points at the literal `Text` node holding the
// run. Entries form the delimiter stack of the process-emphasis algorithm;
// `active == false` marks removed entries.
struct EmphEntry<'a> {
    node: &'a AstNode<'a>,
    ch: char,
    len: usize,
    can_open: bool,
    can_close: bool,
    active: bool,
}

#[derive(Clone, Copy)]
struct Bracket<'a> {
    /// The `[` or `![` text node.
    node: &'a AstNode<'a>,
    image: bool,
    line: usize,

    /// Char position just after the opening bracket.
    content_pos: usize,

    /// Emphasis-stack height at push time; pairs inside the bracket
    /// resolve against this bottom.
    emph_mark: usize,

    /// Cleared on enclosing link creation: no links within links.
    active: bool,
}

struct Subject<'a, 'o, 'r> {
    arena: &'a Arena<AstNode<'a>>,
    options: &'o Options,
    refs: &'r RefStore<'a>,
    node: &'a AstNode<'a>,
    lines: Vec<Line>,
    ignore_line_break: bool,
    delims: Vec<Delim>,
    cursor: (usize, usize),
    emph: Vec<EmphEntry<'a>>,
    brackets: SmallVec<[Bracket<'a>; 8]>,
}

fn is_cmark_punct(ch: char) -> bool {
    ispunct(ch) || ch.is_punctuation() || ch.is_symbol()
}

impl<'a, 'o, 'r> Subject<'a, 'o, 'r> {
    fn run(&mut self) {
        self.scan_fragment();

        let mut k = 0;
        while k < self.delims.len() {
            let d = self.delims[k];
            if (d.line, d.pos) < self.cursor {
                k += 1;
                continue;
            }
            match d.kind {
                DelimKind::Backtick => self.handle_backticks(k),
                DelimKind::Dollar => self.handle_dollars(k),
                DelimKind::Less => self.handle_pointy_brace(&d),
                DelimKind::SqOpen => self.handle_open_bracket(&d, false),
                DelimKind::ImageOpen => self.handle_open_bracket(&d, true),
                DelimKind::SqClose => self.handle_close_bracket(&d),
                DelimKind::Star | DelimKind::Underscore | DelimKind::Tilde => {
                    self.handle_emph_delim(&d)
                }
                DelimKind::ParenOpen | DelimKind::ParenClose => {}
            }
            k += 1;
        }

        self.flush_to_end();
        self.process_emphasis(0);
        self.optimize(false);
        self.run_plugins();
        if self.options.fully_optimize_paragraphs {
            self.optimize(true);
        }
    }

    //////////////////////////////
    // Delimiter scanning (C5)  //
    //////////////////////////////

    fn scan_fragment(&mut self) {
        for li in 0..self.lines.len() {
            let chars: Vec<char> = self.lines[li].content.chars().to_vec();
            let mut i = 0;
            while i < chars.len() {
                let c = chars[i];
                match c {
                    '\\' if i + 1 < chars.len() && ispunct(chars[i + 1]) => i += 2,
                    '`' | '$' | '*' | '_' | '~' => {
                        let mut j = i + 1;
                        while j < chars.len() && chars[j] == c {
                            j += 1;
                        }
                        let kind = match c {
                            '`' => DelimKind::Backtick,
                            '$' => DelimKind::Dollar,
                            '*' => DelimKind::Star,
                            '_' => DelimKind::Underscore,
                            _ => DelimKind::Tilde,
                        };
                        let (can_open, can_close) = match kind {
                            DelimKind::Star | DelimKind::Underscore | DelimKind::Tilde => {
                                flanking(&chars, i, j, c)
                            }
                            _ => (false, false),
                        };
                        self.delims.push(Delim {
                            kind,
                            line: li,
                            pos: i,
                            len: j - i,
                            can_open,
                            can_close,
                        });
                        i = j;
                    }
                    '<' => {
                        self.push_delim(DelimKind::Less, li, i, 1);
                        i += 1;
                    }
                    '[' => {
                        self.push_delim(DelimKind::SqOpen, li, i, 1);
                        i += 1;
                    }
                    '!' if chars.get(i + 1) == Some(&'[') => {
                        self.push_delim(DelimKind::ImageOpen, li, i, 2);
                        i += 2;
                    }
                    ']' => {
                        self.push_delim(DelimKind::SqClose, li, i, 1);
                        i += 1;
                    }
                    '(' => {
                        self.push_delim(DelimKind::ParenOpen, li, i, 1);
                        i += 1;
                    }
                    ')' => {
                        self.push_delim(DelimKind::ParenClose, li, i, 1);
                        i += 1;
                    }
                    _ => i += 1,
                }
            }
        }
    }

    fn push_delim(&mut self, kind: DelimKind, line: usize, pos: usize, len: usize) {
        self.delims.push(Delim {
            kind,
            line,
            pos,
            len,
            can_open: false,
            can_close: false,
        });
    }

    //////////////////////////////
    // Text emission            //
    //////////////////////////////

    // Emit pending raw text from the cursor up to `(line, pos)` and move
    // the cursor there.
    fn flush_text_to(&mut self, line: usize, pos: usize) {
        while self.cursor.0 < line {
            let (cl, cp) = self.cursor;
            self.emit_rest_of_line(cl, cp);
            self.cursor = (cl + 1, 0);
        }
        let (cl, cp) = self.cursor;
        if pos > cp {
            self.emit_text(cl, cp, pos);
        }
        self.cursor = (line, pos);
    }

    fn flush_to_end(&mut self) {
        while self.cursor.0 + 1 < self.lines.len() {
            let (cl, cp) = self.cursor;
            self.emit_rest_of_line(cl, cp);
            self.cursor = (cl + 1, 0);
        }
        let (cl, cp) = self.cursor;
        self.emit_rest_of_line(cl, cp);
        self.cursor = (cl, self.lines[cl].content.len());
    }

    // Emit the tail of line `li` starting at `from`, handling hard breaks
    // (two trailing spaces, or an unescaped trailing backslash).
    fn emit_rest_of_line(&mut self, li: usize, from: usize) {
        let content = &self.lines[li].content;
        let len = content.len();
        let text_end = content.last_non_space().map_or(from, |i| i + 1).max(from);
        let trailing_spaces = len.saturating_sub(text_end);
        let last_line = li + 1 == self.lines.len();

        if !last_line && !self.ignore_line_break {
            if trailing_spaces >= 2 {
                let span = Span::new(
                    content.virgin_col(text_end),
                    self.lines[li].number,
                    content.virgin_col_end(len - 1),
                    self.lines[li].number,
                );
                self.emit_text(li, from, text_end);
                let lb = make_node(self.arena, NodeValue::LineBreak, span);
                self.node.append(lb);
                return;
            }

            if trailing_spaces == 0 && text_end > from {
                let mut run = 0;
                while text_end > from + run && content.char_at(text_end - 1 - run) == '\\' {
                    run += 1;
                }
                if run % 2 == 1 {
                    let span = Span::new(
                        content.virgin_col(text_end - 1),
                        self.lines[li].number,
                        content.virgin_col_end(text_end - 1),
                        self.lines[li].number,
                    );
                    self.emit_text(li, from, text_end - 1);
                    let lb = make_node(self.arena, NodeValue::LineBreak, span);
                    self.node.append(lb);
                    return;
                }
            }
        }

        self.emit_text(li, from, text_end);
    }

    // Emit `[a, b)` of line `li` as one `Text` node, decoding backslash
    // escapes and entity references. Leading indentation is dropped when
    // the segment opens the line.
    fn emit_text(&mut self, li: usize, a: usize, b: usize) {
        let content = &self.lines[li].content;
        let b = b.min(content.len());
        let mut a = a;
        if a == 0 {
            a = content.first_non_space().min(b);
        }
        if a >= b {
            return;
        }

        let chars = content.chars();
        let mut s = String::new();
        let mut i = a;
        while i < b {
            let c = chars[i];
            if c == '\\' && i + 1 < b && ispunct(chars[i + 1]) {
                s.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '&' {
                if let Some((rep, consumed)) = entity::unescape(&chars[i + 1..b]) {
                    s.push_str(&rep);
                    i += 1 + consumed;
                    continue;
                }
            }
            s.push(c);
            i += 1;
        }
        if s.is_empty() {
            return;
        }

        let span = Span::new(
            content.virgin_col(a),
            self.lines[li].number,
            content.virgin_col_end(b - 1),
            self.lines[li].number,
        );
        let node = make_node(self.arena, NodeValue::Text(s), span);
        self.node.append(node);
    }

    fn span_of(&self, li: usize, a: usize, b_inclusive: usize) -> Span {
        let content = &self.lines[li].content;
        Span::new(
            content.virgin_col(a),
            self.lines[li].number,
            content.virgin_col_end(b_inclusive),
            self.lines[li].number,
        )
    }

    // Raw (undecoded) text of the region between two positions; line
    // endings become single spaces.
    fn collect_span_text(&self, l1: usize, p1: usize, l2: usize, p2: usize) -> String {
        if l1 == l2 {
            return self.lines[l1].content.text(p1, p2);
        }
        let mut out = self.lines[l1]
            .content
            .text(p1, self.lines[l1].content.len());
        for li in l1 + 1..=l2 {
            out.push(' ');
            let end = if li == l2 {
                p2
            } else {
                self.lines[li].content.len()
            };
            out.push_str(&self.lines[li].content.text(0, end));
        }
        out
    }

    //////////////////////////////
    // Code spans and math      //
    //////////////////////////////

    fn handle_backticks(&mut self, k: usize) {
        let d = self.delims[k];
        let closer = match self.delims[k + 1..]
            .iter()
            .find(|c| c.kind == DelimKind::Backtick && c.len == d.len)
        {
            Some(c) => *c,
            // No closer of the exact length: the opener demotes to text.
            None => return,
        };

        self.flush_text_to(d.line, d.pos);

        let literal = normalize_code_span(self.collect_span_text(
            d.line,
            d.pos + d.len,
            closer.line,
            closer.pos,
        ));
        let start_delim = self.span_of(d.line, d.pos, d.pos + d.len - 1);
        let end_delim = self.span_of(closer.line, closer.pos, closer.pos + closer.len - 1);

        let code = make_node(
            self.arena,
            NodeValue::Code(NodeCode {
                literal,
                inline: true,
                fenced: false,
                syntax: None,
                syntax_pos: Span::default(),
                start_delim,
                end_delim,
            }),
            Span {
                start: start_delim.start,
                end: end_delim.end,
            },
        );
        self.node.append(code);
        self.cursor = (closer.line, closer.pos + closer.len);
    }

    fn handle_dollars(&mut self, k: usize) {
        let d = self.delims[k];
        if d.len > 2 {
            return;
        }
        let closer = match self.delims[k + 1..]
            .iter()
            .find(|c| c.kind == DelimKind::Dollar && c.len == d.len)
        {
            Some(c) => *c,
            None => return,
        };

        self.flush_text_to(d.line, d.pos);

        let mut literal =
            self.collect_span_text(d.line, d.pos + d.len, closer.line, closer.pos);
        // LaTeX-in-tick convention: `$`code`$` drops one backtick per end.
        if literal.len() >= 2 && literal.starts_with('`') && literal.ends_with('`') {
            literal.pop();
            literal.remove(0);
        }

        let start_delim = self.span_of(d.line, d.pos, d.pos + d.len - 1);
        let end_delim = self.span_of(closer.line, closer.pos, closer.pos + closer.len - 1);

        let math = make_node(
            self.arena,
            NodeValue::Math(NodeMath {
                literal,
                inline: true,
                start_delim,
                end_delim,
            }),
            Span {
                start: start_delim.start,
                end: end_delim.end,
            },
        );
        self.node.append(math);
        self.cursor = (closer.line, closer.pos + closer.len);
    }

    //////////////////////////////
    // Autolinks and raw HTML   //
    //////////////////////////////

    fn handle_pointy_brace(&mut self, d: &Delim) {
        let content = &self.lines[d.line].content;
        let rest = &content.chars()[d.pos + 1..];

        if let Some(len) = scanners::autolink_uri(rest) {
            let raw = content.text(d.pos + 1, d.pos + len);
            let url = entity::unescape_html(&raw);
            self.make_autolink(d, len, url, raw);
            return;
        }

        if let Some(len) = scanners::autolink_email(rest) {
            let raw = content.text(d.pos + 1, d.pos + len);
            let url = format!("mailto:{}", entity::unescape_html(&raw));
            self.make_autolink(d, len, url, raw);
            return;
        }

        if let Some(len) = scanners::html_tag(rest) {
            self.flush_text_to(d.line, d.pos);
            let content = &self.lines[d.line].content;
            let literal = content.text(d.pos, d.pos + 1 + len);

            // A tag alone on its paragraph line is a free tag; the
            // post-pass lifts it out of the paragraph.
            let alone = d.pos == content.first_non_space()
                && content.last_non_space() == Some(d.pos + len)
                && self.brackets.is_empty();
            let in_paragraph = matches!(self.node.data.borrow().value, NodeValue::Paragraph)
                && self.node.parent().map_or(true, |p| {
                    !matches!(p.data.borrow().value, NodeValue::Heading(..))
                });

            let html = make_node(
                self.arena,
                NodeValue::RawHtml(NodeRawHtml {
                    literal,
                    free_tag: alone && in_paragraph,
                }),
                self.span_of(d.line, d.pos, d.pos + len),
            );
            self.node.append(html);
            self.cursor = (d.line, d.pos + 1 + len);
        }
    }

    // `len` counts from just after `<` through the closing `>`.
    fn make_autolink(&mut self, d: &Delim, len: usize, url: String, raw: String) {
        self.flush_text_to(d.line, d.pos);
        let inner = self.span_of(d.line, d.pos + 1, d.pos + len - 1);
        let link = make_node(
            self.arena,
            NodeValue::Link(NodeLink {
                url,
                text: raw,
                text_pos: inner,
                url_pos: inner,
            }),
            self.span_of(d.line, d.pos, d.pos + len),
        );
        self.node.append(link);
        self.cursor = (d.line, d.pos + 1 + len);
    }

    //////////////////////////////
    // Links, images, footnotes //
    //////////////////////////////

    fn handle_open_bracket(&mut self, d: &Delim, image: bool) {
        self.flush_text_to(d.line, d.pos);

        let marker = if image { "![" } else { "[" };
        let node = make_node(
            self.arena,
            NodeValue::Text(marker.to_string()),
            self.span_of(d.line, d.pos, d.pos + d.len - 1),
        );
        self.node.append(node);
        self.brackets.push(Bracket {
            node,
            image,
            line: d.line,
            content_pos: d.pos + d.len,
            emph_mark: self.emph.len(),
            active: true,
        });
        self.cursor = (d.line, d.pos + d.len);
    }

    fn handle_close_bracket(&mut self, d: &Delim) {
        self.flush_text_to(d.line, d.pos);
        self.cursor = (d.line, d.pos + 1);

        let bracket = match self.brackets.last() {
            Some(b) => *b,
            None => {
                self.emit_literal_close_bracket(d);
                return;
            }
        };

        if !bracket.active {
            self.brackets.pop();
            self.emit_literal_close_bracket(d);
            return;
        }

        let raw = self.collect_span_text(bracket.line, bracket.content_pos, d.line, d.pos);

        if !bracket.image && raw.starts_with('^') {
            self.close_footnote_ref(d, &bracket, &raw);
            return;
        }

        let after = d.pos + 1;

        // Inline form `(url "title")`.
        let mut target: Option<(String, Span, usize)> = None;
        if self.char_at(d.line, after) == Some('(') {
            target = self.scan_inline_link(d.line, after);
        }

        // Reference forms: full `[label]`, collapsed `[]`, shortcut.
        if target.is_none() {
            let (label, consumed_to) = if self.char_at(d.line, after) == Some('[') {
                let line_len = self.lines[d.line].content.len();
                match (after + 1..line_len).find(|&k| self.char_at(d.line, k) == Some(']')) {
                    Some(close) => {
                        let label = self.lines[d.line].content.text(after + 1, close);
                        if label.trim().is_empty() {
                            (raw.clone(), Some(close + 1))
                        } else {
                            (label, Some(close + 1))
                        }
                    }
                    None => (raw.clone(), None),
                }
            } else {
                (raw.clone(), None)
            };

            let key = format!(
                "{}{}",
                strings::normalize_label(&label, Case::Fold),
                self.refs.suffix
            );
            if let Some(def) = self.refs.labeled_links.get(&key) {
                let (url, url_pos) = match def.data.borrow().value {
                    NodeValue::Link(ref nl) => (nl.url.clone(), nl.url_pos),
                    _ => unreachable!("labeled links store only links"),
                };
                target = Some((url, url_pos, consumed_to.unwrap_or(after)));
            }
        }

        let (url, url_pos, end) = match target {
            Some(t) => t,
            None => {
                // Unresolved: everything stays literal text.
                self.brackets.pop();
                self.emit_literal_close_bracket(d);
                return;
            }
        };

        let text_pos = if d.line == bracket.line && d.pos > bracket.content_pos {
            self.span_of(bracket.line, bracket.content_pos, d.pos - 1)
        } else if d.line != bracket.line {
            Span {
                start: self
                    .span_of(bracket.line, bracket.content_pos, bracket.content_pos)
                    .start,
                end: self.span_of(d.line, d.pos.saturating_sub(1), d.pos.saturating_sub(1)).end,
            }
        } else {
            Span::default()
        };

        let link_span = Span {
            start: bracket.node.data.borrow().span.start,
            end: self.span_of(d.line, end.saturating_sub(1), end.saturating_sub(1)).end,
        };

        let value = if bracket.image {
            NodeValue::Image(NodeLink {
                url,
                text: raw,
                text_pos,
                url_pos,
            })
        } else {
            NodeValue::Link(NodeLink {
                url,
                text: raw,
                text_pos,
                url_pos,
            })
        };
        let link = make_node(self.arena, value, link_span);

        // Pair emphasis inside the description before it moves.
        self.process_emphasis(bracket.emph_mark);

        let mut description = vec![];
        let mut it = bracket.node.next_sibling();
        while let Some(n) = it {
            it = n.next_sibling();
            description.push(n);
        }
        bracket.node.detach();
        for n in description {
            link.append(n);
        }
        self.node.append(link);

        self.brackets.pop();
        self.cursor = (d.line, end);

        if !bracket.image {
            for b in self.brackets.iter_mut() {
                if !b.image {
                    b.active = false;
                }
            }
        }
    }

    fn emit_literal_close_bracket(&mut self, d: &Delim) {
        let node = make_node(
            self.arena,
            NodeValue::Text("]".to_string()),
            self.span_of(d.line, d.pos, d.pos),
        );
        self.node.append(node);
    }

    fn close_footnote_ref(&mut self, d: &Delim, bracket: &Bracket<'a>, raw: &str) {
        let key = format!(
            "#^{}{}",
            caseless::default_case_fold_str(raw[1..].trim()),
            self.refs.suffix
        );
        if !self.refs.footnotes.contains_key(&key) {
            self.brackets.pop();
            self.emit_literal_close_bracket(d);
            return;
        }

        // Drop the literal nodes the bracket produced.
        let mut it = Some(bracket.node);
        while let Some(n) = it {
            it = n.next_sibling();
            n.detach();
        }
        self.emph.truncate(bracket.emph_mark);

        let id_pos = if d.line == bracket.line && d.pos > bracket.content_pos + 1 {
            self.span_of(bracket.line, bracket.content_pos + 1, d.pos - 1)
        } else {
            Span::default()
        };
        let span = Span {
            start: bracket.node.data.borrow().span.start,
            end: self.span_of(d.line, d.pos, d.pos).end,
        };

        let fr = make_node(
            self.arena,
            NodeValue::FootnoteRef(NodeFootnoteRef {
                id: key,
                id_pos,
                text: format!("[{}]", raw),
            }),
            span,
        );
        self.node.append(fr);
        self.brackets.pop();
    }

    fn char_at(&self, li: usize, pos: usize) -> Option<char> {
        self.lines[li].content.get(pos)
    }

    // `(url "title")` starting at the `(`; answers the cleaned url, its
    // span, and the position just after the closing paren.
    fn scan_inline_link(&self, line: usize, open: usize) -> Option<(String, Span, usize)> {
        let content = &self.lines[line].content;
        let chars = content.chars();

        let mut i = open + 1;
        while chars.get(i) == Some(&' ') {
            i += 1;
        }

        let (url_start, url_end) = if chars.get(i) == Some(&'<') {
            let close = (i + 1..chars.len()).find(|&k| chars[k] == '>')?;
            (i, close + 1)
        } else {
            let mut depth = 0;
            let mut k = i;
            while k < chars.len() {
                let c = chars[k];
                if c == '\\' && k + 1 < chars.len() {
                    k += 2;
                    continue;
                }
                if c == ' ' {
                    break;
                }
                if c == '(' {
                    depth += 1;
                }
                if c == ')' {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                k += 1;
            }
            (i, k)
        };

        let mut j = url_end;
        while chars.get(j) == Some(&' ') {
            j += 1;
        }
        if j < chars.len() && chars[j] != ')' {
            let matched = scanners::link_title(&chars[j..])?;
            j += matched;
            while chars.get(j) == Some(&' ') {
                j += 1;
            }
        }
        if chars.get(j) != Some(&')') {
            return None;
        }

        let url = strings::clean_url(&content.text(url_start, url_end));
        let url_pos = if url_end > url_start {
            self.span_of(line, url_start, url_end - 1)
        } else {
            Span::default()
        };
        Some((url, url_pos, j + 1))
    }

    //////////////////////////////
    // Emphasis (C6)            //
    //////////////////////////////

    fn handle_emph_delim(&mut self, d: &Delim) {
        self.flush_text_to(d.line, d.pos);

        let content = &self.lines[d.line].content;
        let run = content.text(d.pos, d.pos + d.len);
        let ch = content.char_at(d.pos);
        let node = make_node(
            self.arena,
            NodeValue::Text(run),
            self.span_of(d.line, d.pos, d.pos + d.len - 1),
        );
        self.node.append(node);
        self.emph.push(EmphEntry {
            node,
            ch,
            len: d.len,
            can_open: d.can_open,
            can_close: d.can_close,
            active: true,
        });
        self.cursor = (d.line, d.pos + d.len);
    }

    // The CommonMark process-emphasis algorithm over the candidate stack
    // from `stack_bottom` up, including the rule-of-3 exception and the
    // exact-length constraint for `~` runs.
    fn process_emphasis(&mut self, stack_bottom: usize) {
        let mut openers_bottom = [stack_bottom; 8];

        let mut ci = stack_bottom;
        while ci < self.emph.len() {
            if !self.emph[ci].active || !self.emph[ci].can_close {
                ci += 1;
                continue;
            }
            let (c_ch, c_len, c_can_open) = {
                let c = &self.emph[ci];
                (c.ch, c.len, c.can_open)
            };
            let ix = emph_bucket(c_ch, c_can_open, c_len);

            let mut opener = None;
            let mut mod_three_rule_invoked = false;
            let mut oi = ci;
            while oi > openers_bottom[ix] {
                oi -= 1;
                let o = &self.emph[oi];
                if !o.active || !o.can_open || o.ch != c_ch {
                    continue;
                }
                if c_ch == '~' && (o.len != c_len || c_len > 2) {
                    continue;
                }
                let odd_match = (c_can_open || o.can_close)
                    && (o.len + c_len) % 3 == 0
                    && !(o.len % 3 == 0 && c_len % 3 == 0);
                if !odd_match {
                    opener = Some(oi);
                    break;
                }
                mod_three_rule_invoked = true;
            }

            match opener {
                Some(oi) => {
                    if self.pair_emphasis(oi, ci) {
                        ci += 1;
                    }
                }
                None => {
                    if !mod_three_rule_invoked {
                        openers_bottom[ix] = ci;
                    }
                    if !self.emph[ci].can_open {
                        self.emph[ci].active = false;
                    }
                    ci += 1;
                }
            }
        }

        self.emph.truncate(stack_bottom);
    }

    // Consume delimiters between `oi` and `ci`: set `opts` on every item
    // between the runs and attach the style's open/close delims to the
    // first and last of them. True when the closer is fully used up.
    fn pair_emphasis(&mut self, oi: usize, ci: usize) -> bool {
        let ch = self.emph[oi].ch;
        let o_len = self.emph[oi].len;
        let c_len = self.emph[ci].len;
        let use_delims = if ch == '~' {
            o_len
        } else if o_len >= 2 && c_len >= 2 {
            2
        } else {
            1
        };
        let style = if ch == '~' {
            TextOpts::STRIKETHROUGH
        } else if use_delims == 2 {
            TextOpts::BOLD
        } else {
            TextOpts::ITALIC
        };

        let opener_node = self.emph[oi].node;
        let closer_node = self.emph[ci].node;
        let o_span = opener_node.data.borrow().span;
        let c_span = closer_node.data.borrow().span;
        let open_delim = StyleDelim {
            opts: style,
            span: Span::new(
                o_span.end.col - use_delims as i64 + 1,
                o_span.end.line,
                o_span.end.col,
                o_span.end.line,
            ),
        };
        let close_delim = StyleDelim {
            opts: style,
            span: Span::new(
                c_span.start.col,
                c_span.start.line,
                c_span.start.col + use_delims as i64 - 1,
                c_span.start.line,
            ),
        };

        let mut first = None;
        let mut last = None;
        let mut it = opener_node.next_sibling();
        while let Some(n) = it {
            if n.same_node(closer_node) {
                break;
            }
            n.data.borrow_mut().opts |= style;
            if first.is_none() {
                first = Some(n);
            }
            last = Some(n);
            it = n.next_sibling();
        }
        if let Some(f) = first {
            f.data.borrow_mut().open_styles.push(open_delim);
        }
        if let Some(l) = last {
            l.data.borrow_mut().close_styles.push(close_delim);
        }

        for e in &mut self.emph[oi + 1..ci] {
            e.active = false;
        }

        self.emph[oi].len -= use_delims;
        if self.emph[oi].len == 0 {
            opener_node.detach();
            self.emph[oi].active = false;
        } else {
            let mut ast = opener_node.data.borrow_mut();
            let keep = self.emph[oi].len;
            ast.value.text_mut().unwrap().truncate(keep);
            ast.span.end.col -= use_delims as i64;
        }

        self.emph[ci].len -= use_delims;
        if self.emph[ci].len == 0 {
            closer_node.detach();
            self.emph[ci].active = false;
            true
        } else {
            let mut ast = closer_node.data.borrow_mut();
            ast.value.text_mut().unwrap().drain(..use_delims);
            ast.span.start.col += use_delims as i64;
            false
        }
    }

    //////////////////////////////
    // Optimization and plugins //
    //////////////////////////////

    // Merge adjacent same-line `Text` runs with identical opts. Semi mode
    // keeps every styled boundary intact so text plugins see coherent
    // runs; full mode also merges into runs that close styles.
    fn optimize(&mut self, full: bool) {
        let mut ch = self.node.first_child();
        while let Some(n) = ch {
            let next = match n.next_sibling() {
                Some(nx) => nx,
                None => break,
            };

            let mergeable = {
                let a = n.data.borrow();
                let b = next.data.borrow();
                matches!(a.value, NodeValue::Text(..))
                    && matches!(b.value, NodeValue::Text(..))
                    && a.opts == b.opts
                    && a.span.end.line == b.span.start.line
                    && a.close_styles.is_empty()
                    && b.open_styles.is_empty()
                    && (full || b.close_styles.is_empty())
            };

            if mergeable {
                {
                    let mut a = n.data.borrow_mut();
                    let b = next.data.borrow();
                    let tail = b.value.text().unwrap().clone();
                    a.value.text_mut().unwrap().push_str(&tail);
                    a.span.end = b.span.end;
                    a.close_styles = b.close_styles.clone();
                }
                next.detach();
                // Try to extend the merged run further.
            } else {
                ch = Some(next);
            }
        }
    }

    fn run_plugins(&mut self) {
        if !matches!(self.node.data.borrow().value, NodeValue::Paragraph) {
            return;
        }

        let mut plugins = self.options.text_plugins.clone();
        plugins.sort_by_key(|p| p.id);

        for plugin in &plugins {
            let cx = TextPluginContext {
                arena: self.arena,
                user_data: &plugin.user_data,
            };
            (plugin.func)(&cx, self.node);

            if plugin.process_in_links {
                let links: Vec<&'a AstNode<'a>> = self
                    .node
                    .descendants()
                    .filter(|n| {
                        matches!(
                            n.data.borrow().value,
                            NodeValue::Link(..) | NodeValue::Image(..)
                        )
                    })
                    .collect();
                for link in links {
                    (plugin.func)(&cx, link);
                }
            }
        }
    }
}

fn emph_bucket(ch: char, can_open: bool, len: usize) -> usize {
    match ch {
        '~' => 0,
        '_' => 1,
        '*' => 2 + (if can_open { 3 } else { 0 }) + len % 3,
        _ => unreachable!("not an emphasis delimiter"),
    }
}

fn flanking(chars: &[char], start: usize, end: usize, c: char) -> (bool, bool) {
    let before = if start == 0 { '\n' } else { chars[start - 1] };
    let after = if end >= chars.len() { '\n' } else { chars[end] };

    let before_ws = before.is_whitespace();
    let after_ws = after.is_whitespace();
    let before_punct = is_cmark_punct(before);
    let after_punct = is_cmark_punct(after);

    let left = !after_ws && (!after_punct || before_ws || before_punct);
    let right = !before_ws && (!before_punct || after_ws || after_punct);

    if c == '_' {
        // Intra-word underscores neither open nor close.
        (
            left && (!right || before_punct),
            right && (!left || after_punct),
        )
    } else {
        (left, right)
    }
}

// One leading and one trailing space strip, when both ends are spaces and
// anything inside isn't.
fn normalize_code_span(s: String) -> String {
    if s.len() >= 2
        && s.starts_with(' ')
        && s.ends_with(' ')
        && s.chars().any(|c| c != ' ')
    {
        s[1..s.len() - 1].to_string()
    } else {
        s
    }
}
