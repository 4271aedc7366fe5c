//! The input layer: line splitting and the transformed-line string type.
//!
//! Every line is stored *transformed* (tabs expanded to 4-column stops, NUL
//! replaced with U+FFFD) together with a per-character map back to *virgin*
//! columns, so any index into the transformed text can be reported as a
//! position in the original source.

pub(crate) const TAB_STOP: usize = 4;

#[derive(Debug, Clone, Copy)]
struct VirginRange {
    begin: i64,
    end: i64,
}

/// A line of transformed text indexable by character, with virgin-column
/// lookups. Immutable after construction; sub-parsers work on slices.
#[derive(Debug, Clone)]
pub(crate) struct InternalString {
    chars: Vec<char>,
    virgin: Vec<VirginRange>,
}

impl InternalString {
    pub fn from_raw(raw: &str) -> InternalString {
        let mut chars = Vec::with_capacity(raw.len());
        let mut virgin = Vec::with_capacity(raw.len());
        let mut vcol: i64 = 0;

        for ch in raw.chars() {
            match ch {
                '\t' => {
                    let fill = TAB_STOP - chars.len() % TAB_STOP;
                    for _ in 0..fill {
                        chars.push(' ');
                        virgin.push(VirginRange {
                            begin: vcol,
                            end: vcol,
                        });
                    }
                }
                '\0' => {
                    chars.push('\u{FFFD}');
                    virgin.push(VirginRange {
                        begin: vcol,
                        end: vcol,
                    });
                }
                _ => {
                    chars.push(ch);
                    virgin.push(VirginRange {
                        begin: vcol,
                        end: vcol,
                    });
                }
            }
            vcol += 1;
        }

        InternalString { chars, virgin }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn char_at(&self, i: usize) -> char {
        self.chars[i]
    }

    pub fn get(&self, i: usize) -> Option<char> {
        self.chars.get(i).copied()
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// The transformed text of `[start, end)`.
    pub fn text(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    /// Virgin column the character at `i` begins at.
    pub fn virgin_col(&self, i: usize) -> i64 {
        if self.virgin.is_empty() {
            return 0;
        }
        if i >= self.virgin.len() {
            return self.virgin[self.virgin.len() - 1].end + 1;
        }
        self.virgin[i].begin
    }

    /// Virgin column the character at `i` ends at. Differs from
    /// [`InternalString::virgin_col`] inside multi-column replacements.
    pub fn virgin_col_end(&self, i: usize) -> i64 {
        if self.virgin.is_empty() {
            return 0;
        }
        if i >= self.virgin.len() {
            return self.virgin[self.virgin.len() - 1].end + 1;
        }
        self.virgin[i].end
    }

    /// A sub-line covering `[start, end)` that keeps the virgin mapping.
    pub fn slice(&self, start: usize, end: usize) -> InternalString {
        InternalString {
            chars: self.chars[start..end].to_vec(),
            virgin: self.virgin[start..end].to_vec(),
        }
    }

    /// Index of the first character that is not a space, or `len()`.
    pub fn first_non_space(&self) -> usize {
        self.chars.iter().take_while(|&&c| c == ' ').count()
    }

    /// Leading-space count; transformed text has no tabs left.
    pub fn indent(&self) -> usize {
        self.first_non_space()
    }

    pub fn is_blank(&self) -> bool {
        self.chars.iter().all(|&c| c == ' ')
    }

    /// Index of the last character that is not a space; `None` when blank.
    pub fn last_non_space(&self) -> Option<usize> {
        self.chars.iter().rposition(|&c| c != ' ')
    }
}

/// One line of the buffer: transformed content plus original-line metadata.
#[derive(Debug, Clone)]
pub(crate) struct Line {
    pub content: InternalString,

    /// Zero-based line number in the virgin source.
    pub number: i64,

    /// Set on lazy-continuation lines handed to a nested parse when the
    /// line could also have terminated an enclosing list.
    pub may_break_list: bool,
}

impl Line {
    /// A derived line holding `[start, end)` of this line's content.
    pub fn slice(&self, start: usize, end: usize) -> Line {
        Line {
            content: self.content.slice(start, end),
            number: self.number,
            may_break_list: self.may_break_list,
        }
    }
}

/// Split `text` into transformed lines. `\n`, `\r\n` and `\r` all end a
/// line; a leading UTF-8 BOM is dropped.
pub(crate) fn split_lines(text: &str) -> Vec<Line> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut lines = vec![];
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;

    while i <= bytes.len() {
        let at_end = i == bytes.len();
        if at_end || bytes[i] == b'\n' || bytes[i] == b'\r' {
            if !(at_end && start == i && !lines.is_empty()) && !(at_end && text.is_empty()) {
                lines.push(Line {
                    content: InternalString::from_raw(&text[start..i]),
                    number: lines.len() as i64,
                    may_break_list: false,
                });
            }
            if at_end {
                break;
            }
            if bytes[i] == b'\r' && i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                i += 1;
            }
            i += 1;
            start = i;
        } else {
            i += 1;
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_expansion_maps_back() {
        let s = InternalString::from_raw("\tfoo");
        assert!(!s.is_empty());
        assert_eq!(s.text(0, s.len()), "    foo");
        assert_eq!(s.virgin_col(0), 0);
        assert_eq!(s.virgin_col(3), 0);
        assert_eq!(s.virgin_col(4), 1);
        assert_eq!(s.virgin_col(6), 3);
    }

    #[test]
    fn mid_line_tab_stops() {
        let s = InternalString::from_raw("ab\tc");
        assert_eq!(s.text(0, s.len()), "ab  c");
        assert_eq!(s.virgin_col(2), 2);
        assert_eq!(s.virgin_col(3), 2);
        assert_eq!(s.virgin_col(4), 3);
    }

    #[test]
    fn line_endings() {
        let lines = split_lines("a\nb\r\nc\rd");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2].content.text(0, 1), "c");
        assert_eq!(lines[3].number, 3);

        assert!(split_lines("").is_empty());
        assert_eq!(split_lines("a\n").len(), 1);
        assert_eq!(split_lines("a\n\n").len(), 2);
    }
}
