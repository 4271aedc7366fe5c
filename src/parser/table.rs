//! GFM tables.
//!
//! Tables are recognized inside paragraph fragments: a header row with at
//! least one unescaped pipe, followed by an alignment row with the same
//! column count. Rows continue until one comes up short or starts with
//! code indentation.

use crate::input::Line;
use crate::nodes::{make_node, AstNode, NodeTable, NodeValue, Pos, Span, TableAlignment};
use crate::parser::{InlineJob, Parser, CODE_INDENT};

/// Index of the first header row in `frag` whose following line is a
/// matching alignment row.
pub(super) fn detect(frag: &[Line]) -> Option<usize> {
    for k in 0..frag.len().saturating_sub(1) {
        let cells = match split_row(&frag[k]) {
            Some(cells) => cells,
            None => continue,
        };
        if let Some(aligns) = alignment_row(&frag[k + 1]) {
            if aligns.len() == cells.len() {
                return Some(k);
            }
        }
    }
    None
}

/// Parse a table beginning at `lines[0]` (the header; `lines[1]` is the
/// alignment row). Returns the number of lines consumed.
pub(super) fn parse<'a, 'o>(
    parser: &mut Parser<'a, 'o>,
    parent: &'a AstNode<'a>,
    lines: &[Line],
) -> usize {
    let header_cells = split_row(&lines[0]).unwrap();
    let alignments = alignment_row(&lines[1]).unwrap();
    let columns = header_cells.len();

    let table = make_node(
        parser.arena,
        NodeValue::Table(NodeTable { alignments }),
        row_span(&lines[0]),
    );
    parent.append(table);

    emit_row(parser, table, &lines[0], &header_cells);

    let mut consumed = 2;
    while consumed < lines.len() {
        let line = &lines[consumed];
        if line.content.indent() >= CODE_INDENT {
            break;
        }
        let mut cells = match split_row(line) {
            Some(cells) => cells,
            None => break,
        };
        if cells.len() < columns {
            break;
        }
        cells.truncate(columns);
        emit_row(parser, table, line, &cells);
        consumed += 1;
    }

    let last = &lines[consumed - 1];
    table.data.borrow_mut().span.end = Pos::new(
        last.number,
        last.content
            .last_non_space()
            .map_or(0, |i| last.content.virgin_col_end(i)),
    );

    consumed
}

fn row_span(line: &Line) -> Span {
    let s = line.content.first_non_space();
    let e = line.content.last_non_space().unwrap_or(s);
    Span::new(
        line.content.virgin_col(s),
        line.number,
        line.content.virgin_col_end(e),
        line.number,
    )
}

fn emit_row<'a, 'o>(
    parser: &mut Parser<'a, 'o>,
    table: &'a AstNode<'a>,
    line: &Line,
    cells: &[(usize, usize)],
) {
    let row = make_node(parser.arena, NodeValue::TableRow, row_span(line));
    table.append(row);

    for &(start, end) in cells {
        // Trim the cell to its content for both the span and the inline
        // parse.
        let chars = line.content.chars();
        let mut a = start;
        while a < end && chars[a] == ' ' {
            a += 1;
        }
        let mut b = end;
        while b > a && chars[b - 1] == ' ' {
            b -= 1;
        }

        let span = if a < b {
            Span::new(
                line.content.virgin_col(a),
                line.number,
                line.content.virgin_col_end(b - 1),
                line.number,
            )
        } else {
            Span::default()
        };
        let cell = make_node(parser.arena, NodeValue::TableCell, span);
        row.append(cell);

        if a < b {
            parser.inline_jobs.push(InlineJob {
                node: cell,
                lines: vec![line.slice(a, b)],
                ignore_line_break: true,
            });
        }
    }
}

// Split a row at its unescaped pipes. `None` when the line carries no
// pipe at all (such a line never belongs to a table).
fn split_row(line: &Line) -> Option<Vec<(usize, usize)>> {
    let chars = line.content.chars();
    let indent = line.content.indent();
    if indent >= CODE_INDENT || indent == chars.len() {
        return None;
    }

    let end = line.content.last_non_space().unwrap() + 1;
    let mut cells = vec![];
    let mut saw_pipe = false;

    let mut start = indent;
    if chars[indent] == '|' {
        saw_pipe = true;
        start = indent + 1;
    }

    let mut i = start;
    while i < end {
        match chars[i] {
            '\\' => i += 2,
            '|' => {
                saw_pipe = true;
                cells.push((start, i));
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }

    // A trailing pipe closes the last cell rather than opening an empty
    // one.
    if start < end {
        cells.push((start, end));
    }

    if !saw_pipe || cells.is_empty() {
        None
    } else {
        Some(cells)
    }
}

// `---`, `:---`, `---:` or `:---:` per cell; left is the default.
fn alignment_row(line: &Line) -> Option<Vec<TableAlignment>> {
    let cells = split_row(line)?;
    let chars = line.content.chars();
    let mut aligns = vec![];

    for &(start, end) in &cells {
        let mut a = start;
        while a < end && chars[a] == ' ' {
            a += 1;
        }
        let mut b = end;
        while b > a && chars[b - 1] == ' ' {
            b -= 1;
        }
        if a >= b {
            return None;
        }

        let left_colon = chars[a] == ':';
        let right_colon = chars[b - 1] == ':';
        let from = if left_colon { a + 1 } else { a };
        let to = if right_colon { b - 1 } else { b };
        if from >= to || !chars[from..to].iter().all(|&c| c == '-') {
            return None;
        }

        aligns.push(if left_colon && right_colon {
            TableAlignment::Center
        } else if right_colon {
            TableAlignment::Right
        } else {
            TableAlignment::Left
        });
    }

    Some(aligns)
}
