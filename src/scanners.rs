//! Line and span matchers for block openers and inline constructs.
//!
//! Each function inspects the head of a character slice and answers with
//! the matched length (or a small token), mirroring the cheap first-byte
//! rejection the hot paths rely on.

use crate::ctype::{isalnum, isalpha, isdigit, isspace};

pub enum SetextChar {
    Equals,
    Hyphen,
}

/// `#{1,6}` followed by a space or end of line. Returns the consumed
/// length, including one following space when present.
pub fn atx_heading_start(line: &[char]) -> Option<usize> {
    if line.first() != Some(&'#') {
        return None;
    }

    let mut i = 0;
    while i < line.len() && line[i] == '#' {
        i += 1;
    }
    if i > 6 {
        return None;
    }
    match line.get(i) {
        None => Some(i),
        Some(' ') => Some(i + 1),
        _ => None,
    }
}

/// An opening code fence: at least three `` ` `` or `~`. Backtick fences
/// must not carry further backticks on the opening line. Returns the fence
/// length.
pub fn open_code_fence(line: &[char]) -> Option<usize> {
    let c = *line.first()?;
    if c != '`' && c != '~' {
        return None;
    }

    let mut i = 0;
    while i < line.len() && line[i] == c {
        i += 1;
    }
    if i < 3 {
        return None;
    }
    if c == '`' && line[i..].contains(&'`') {
        return None;
    }
    Some(i)
}

/// A closing code fence: a run of the fence character with nothing but
/// spaces after it. Returns the fence length.
pub fn close_code_fence(line: &[char]) -> Option<usize> {
    let c = *line.first()?;
    if c != '`' && c != '~' {
        return None;
    }

    let mut i = 0;
    while i < line.len() && line[i] == c {
        i += 1;
    }
    if i < 3 || !line[i..].iter().all(|&x| x == ' ') {
        return None;
    }
    Some(i)
}

/// A setext underline: a run of `=` or `-`, optionally space-padded on the
/// right.
pub fn setext_heading_line(line: &[char]) -> Option<SetextChar> {
    let c = *line.first()?;
    if c != '=' && c != '-' {
        return None;
    }

    let mut i = 0;
    while i < line.len() && line[i] == c {
        i += 1;
    }
    while i < line.len() && line[i] == ' ' {
        i += 1;
    }
    if i != line.len() {
        return None;
    }
    Some(if c == '=' {
        SetextChar::Equals
    } else {
        SetextChar::Hyphen
    })
}

/// A thematic break: three or more of one of `*`, `-`, `_`, possibly
/// space-separated, and nothing else. Returns the marker count.
pub fn thematic_break(line: &[char]) -> Option<usize> {
    let c = *line.first()?;
    if c != '*' && c != '-' && c != '_' {
        return None;
    }

    let mut count = 0;
    for &x in line {
        if x == c {
            count += 1;
        } else if x != ' ' {
            return None;
        }
    }
    if count < 3 {
        return None;
    }
    Some(count)
}

/// A footnote definition head `[^id]:`. The id must be non-empty, carry no
/// whitespace, and not begin with `^`. Returns the id and the consumed
/// length including the colon.
pub fn footnote_definition_start(line: &[char]) -> Option<(String, usize)> {
    if line.len() < 5 || line[0] != '[' || line[1] != '^' {
        return None;
    }

    let mut i = 2;
    while i < line.len() && line[i] != ']' {
        if line[i] == ' ' || (i == 2 && line[i] == '^') {
            return None;
        }
        i += 1;
    }
    if i == 2 || i + 1 >= line.len() || line[i + 1] != ':' {
        return None;
    }

    Some((line[2..i].iter().collect(), i + 2))
}

// Tag names that open an HTML block under rule 6.
const BLOCK_TAGS: [&str; 62] = [
    "address", "article", "aside", "base", "basefont", "blockquote", "body", "caption", "center",
    "col", "colgroup", "dd", "details", "dialog", "dir", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "frame", "frameset", "h1", "h2", "h3", "h4", "h5",
    "h6", "head", "header", "hr", "html", "iframe", "legend", "li", "link", "main", "menu",
    "menuitem", "nav", "noframes", "ol", "optgroup", "option", "p", "param", "section", "source",
    "summary", "table", "tbody", "td", "tfoot", "th", "thead", "title", "tr", "track", "ul",
];

fn lower_tag_at(line: &[char], mut i: usize) -> (String, usize) {
    let mut tag = String::new();
    while i < line.len() && (isalnum(line[i]) || line[i] == '-') {
        tag.extend(line[i].to_lowercase());
        i += 1;
    }
    (tag, i)
}

/// HTML block opener, CommonMark rules 1 through 6. `line` starts at the
/// `<`.
pub fn html_block_start(line: &[char]) -> Option<u8> {
    if line.first() != Some(&'<') {
        return None;
    }

    if line.len() >= 2 && line[1] == '!' {
        if line[2..].starts_with(&['-', '-']) {
            return Some(2);
        }
        if starts_with_ignore_case(&line[2..], "[CDATA[") {
            return Some(5);
        }
        if line.get(2).map_or(false, |&c| isalpha(c)) {
            return Some(4);
        }
        return None;
    }

    if line.get(1) == Some(&'?') {
        return Some(3);
    }

    let close = line.get(1) == Some(&'/');
    let (tag, after) = lower_tag_at(line, if close { 2 } else { 1 });
    if tag.is_empty() {
        return None;
    }

    let ends_ok = match line.get(after) {
        None | Some(&' ') | Some(&'>') => true,
        Some(&'/') => line.get(after + 1) == Some(&'>'),
        _ => false,
    };
    if !ends_ok {
        return None;
    }

    if !close && ["script", "pre", "style", "textarea"].contains(&tag.as_str()) {
        return Some(1);
    }
    if BLOCK_TAGS.contains(&tag.as_str()) {
        return Some(6);
    }
    None
}

/// HTML block opener rule 7: a single complete open or close tag with only
/// spaces after it on the line.
pub fn html_block_start_7(line: &[char]) -> Option<u8> {
    if line.first() != Some(&'<') {
        return None;
    }
    let matched = html_tag(&line[1..])?;
    let rest = &line[1 + matched..];
    if !rest.iter().all(|&c| c == ' ') {
        return None;
    }
    // Rule 7 never applies to the rule-1 raw-content tags.
    let close = line.get(1) == Some(&'/');
    let (tag, _) = lower_tag_at(line, if close { 2 } else { 1 });
    if ["script", "pre", "style", "textarea"].contains(&tag.as_str()) {
        return None;
    }
    Some(7)
}

/// Whether `line` satisfies the end condition of HTML block `rule`
/// (rules 1 through 5; rules 6 and 7 end on a blank line instead).
pub fn html_block_end(rule: u8, line: &[char]) -> bool {
    match rule {
        1 => {
            contains_ignore_case(line, "</script>")
                || contains_ignore_case(line, "</pre>")
                || contains_ignore_case(line, "</style>")
                || contains_ignore_case(line, "</textarea>")
        }
        2 => contains_seq(line, &['-', '-', '>']),
        3 => contains_seq(line, &['?', '>']),
        4 => line.contains(&'>'),
        5 => contains_seq(line, &[']', ']', '>']),
        _ => false,
    }
}

fn starts_with_ignore_case(line: &[char], pat: &str) -> bool {
    let mut i = 0;
    for p in pat.chars() {
        match line.get(i) {
            Some(&c) if c.eq_ignore_ascii_case(&p) => i += 1,
            _ => return false,
        }
    }
    true
}

fn contains_ignore_case(line: &[char], pat: &str) -> bool {
    if line.len() < pat.chars().count() {
        return false;
    }
    (0..=line.len() - pat.chars().count()).any(|i| starts_with_ignore_case(&line[i..], pat))
}

fn contains_seq(line: &[char], pat: &[char]) -> bool {
    if line.len() < pat.len() {
        return false;
    }
    (0..=line.len() - pat.len()).any(|i| line[i..].starts_with(pat))
}

/// A URI autolink body: `scheme:stuff>`. `s` starts just after the `<`;
/// the returned length includes the closing `>`.
pub fn autolink_uri(s: &[char]) -> Option<usize> {
    let mut i = 0;
    if !s.get(0).map_or(false, |&c| isalpha(c)) {
        return None;
    }
    i += 1;
    while i < s.len() && (isalnum(s[i]) || s[i] == '+' || s[i] == '.' || s[i] == '-') {
        i += 1;
    }
    if !(2..=32).contains(&i) || s.get(i) != Some(&':') {
        return None;
    }
    i += 1;

    while i < s.len() {
        let c = s[i];
        if c == '>' {
            return Some(i + 1);
        }
        if c == '<' || c <= ' ' || isspace(c) {
            return None;
        }
        i += 1;
    }
    None
}

/// An email autolink body ending with `>`; `s` starts just after the `<`.
pub fn autolink_email(s: &[char]) -> Option<usize> {
    const LOCAL_EXTRA: &str = ".!#$%&'*+/=?^_`{|}~-";

    let mut i = 0;
    while i < s.len() && (isalnum(s[i]) || LOCAL_EXTRA.contains(s[i])) {
        i += 1;
    }
    if i == 0 || s.get(i) != Some(&'@') {
        return None;
    }
    i += 1;

    loop {
        let label_start = i;
        if !s.get(i).map_or(false, |&c| isalnum(c)) {
            return None;
        }
        i += 1;
        let mut last_alnum = i;
        while i < s.len() && (isalnum(s[i]) || s[i] == '-') {
            if isalnum(s[i]) {
                last_alnum = i + 1;
            }
            i += 1;
        }
        i = last_alnum;
        if i - label_start > 63 {
            return None;
        }
        match s.get(i) {
            Some(&'.') => i += 1,
            Some(&'>') => return Some(i + 1),
            _ => return None,
        }
    }
}

/// A complete inline HTML construct; `s` starts just after the `<`. The
/// returned length includes the final `>`. Recognizes open and close tags,
/// comments, processing instructions, declarations and CDATA.
pub fn html_tag(s: &[char]) -> Option<usize> {
    match s.first()? {
        '!' => {
            if s[1..].starts_with(&['-', '-']) {
                return html_comment(s);
            }
            if starts_with_ignore_case(&s[1..], "[CDATA[") {
                let mut i = 8;
                while i + 2 < s.len() {
                    if s[i] == ']' && s[i + 1] == ']' && s[i + 2] == '>' {
                        return Some(i + 3);
                    }
                    i += 1;
                }
                return None;
            }
            if !s.get(1).map_or(false, |&c| isalpha(c)) {
                return None;
            }
            let mut i = 2;
            while i < s.len() {
                if s[i] == '>' {
                    return Some(i + 1);
                }
                i += 1;
            }
            None
        }
        '?' => {
            let mut i = 1;
            while i + 1 < s.len() {
                if s[i] == '?' && s[i + 1] == '>' {
                    return Some(i + 2);
                }
                i += 1;
            }
            None
        }
        '/' => {
            let mut i = 1;
            if !s.get(i).map_or(false, |&c| isalpha(c)) {
                return None;
            }
            while i < s.len() && (isalnum(s[i]) || s[i] == '-') {
                i += 1;
            }
            while i < s.len() && s[i] == ' ' {
                i += 1;
            }
            if s.get(i) == Some(&'>') {
                Some(i + 1)
            } else {
                None
            }
        }
        &c if isalpha(c) => open_tag(s),
        _ => None,
    }
}

// <!-- … --> with the CommonMark text restrictions: the text may not start
// with ">" or "->", may not contain "--", and may not end with "-".
fn html_comment(s: &[char]) -> Option<usize> {
    let mut i = 3;
    if s.get(i) == Some(&'>') {
        return None;
    }
    if s.get(i) == Some(&'-') && s.get(i + 1) == Some(&'>') {
        return None;
    }
    while i + 2 < s.len() + 1 {
        if s.get(i) == Some(&'-') && s.get(i + 1) == Some(&'-') {
            return if s.get(i + 2) == Some(&'>') {
                Some(i + 3)
            } else {
                None
            };
        }
        i += 1;
    }
    None
}

fn open_tag(s: &[char]) -> Option<usize> {
    let mut i = 1;
    while i < s.len() && (isalnum(s[i]) || s[i] == '-') {
        i += 1;
    }

    loop {
        let ws_start = i;
        while i < s.len() && s[i] == ' ' {
            i += 1;
        }
        match s.get(i) {
            Some(&'>') => return Some(i + 1),
            Some(&'/') => {
                return if s.get(i + 1) == Some(&'>') {
                    Some(i + 2)
                } else {
                    None
                };
            }
            Some(&c) if (isalpha(c) || c == '_' || c == ':') && i > ws_start => {
                i = attribute(s, i)?;
            }
            _ => return None,
        }
    }
}

// name (= value)?
fn attribute(s: &[char], mut i: usize) -> Option<usize> {
    while i < s.len() && (isalnum(s[i]) || "_.:-".contains(s[i])) {
        i += 1;
    }

    let mut j = i;
    while j < s.len() && s[j] == ' ' {
        j += 1;
    }
    if s.get(j) != Some(&'=') {
        return Some(i);
    }
    j += 1;
    while j < s.len() && s[j] == ' ' {
        j += 1;
    }

    let q = *s.get(j)?;
    if q == '"' || q == '\'' {
        j += 1;
        while j < s.len() && s[j] != q {
            j += 1;
        }
        if j == s.len() {
            None
        } else {
            Some(j + 1)
        }
    } else {
        let start = j;
        while j < s.len() && !" \"'=<>`".contains(s[j]) {
            j += 1;
        }
        if j == start {
            None
        } else {
            Some(j)
        }
    }
}

/// A quoted link title starting at `s[0]`. Returns the length including
/// both quotes.
pub fn link_title(s: &[char]) -> Option<usize> {
    let open = *s.first()?;
    let close = match open {
        '"' => '"',
        '\'' => '\'',
        '(' => ')',
        _ => return None,
    };

    let mut i = 1;
    while i < s.len() {
        let c = s[i];
        if c == '\\' && i + 1 < s.len() {
            i += 2;
            continue;
        }
        if c == close {
            return Some(i + 1);
        }
        if open == '(' && c == '(' {
            return None;
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cv(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn atx() {
        assert_eq!(atx_heading_start(&cv("## x")), Some(3));
        assert_eq!(atx_heading_start(&cv("######")), Some(6));
        assert_eq!(atx_heading_start(&cv("#######")), None);
        assert_eq!(atx_heading_start(&cv("#x")), None);
    }

    #[test]
    fn fences() {
        assert_eq!(open_code_fence(&cv("```rust")), Some(3));
        assert_eq!(open_code_fence(&cv("```a`b")), None);
        assert_eq!(open_code_fence(&cv("~~~~ any ` here")), Some(4));
        assert_eq!(close_code_fence(&cv("```  ")), Some(3));
        assert_eq!(close_code_fence(&cv("``` x")), None);
    }

    #[test]
    fn breaks_and_underlines() {
        assert_eq!(thematic_break(&cv("* * *")), Some(3));
        assert_eq!(thematic_break(&cv("---")), Some(3));
        assert_eq!(thematic_break(&cv("--")), None);
        assert_eq!(thematic_break(&cv("-*-")), None);
        assert!(matches!(
            setext_heading_line(&cv("====  ")),
            Some(SetextChar::Equals)
        ));
        assert!(matches!(
            setext_heading_line(&cv("-")),
            Some(SetextChar::Hyphen)
        ));
        assert!(setext_heading_line(&cv("- -")).is_none());
    }

    #[test]
    fn footnotes() {
        assert_eq!(
            footnote_definition_start(&cv("[^note]: x")),
            Some(("note".to_string(), 8))
        );
        assert_eq!(footnote_definition_start(&cv("[^]: x")), None);
        assert_eq!(footnote_definition_start(&cv("[^a b]: x")), None);
    }

    #[test]
    fn html_blocks() {
        assert_eq!(html_block_start(&cv("<pre>")), Some(1));
        assert_eq!(html_block_start(&cv("<!-- hi")), Some(2));
        assert_eq!(html_block_start(&cv("<?php")), Some(3));
        assert_eq!(html_block_start(&cv("<!DOCTYPE html>")), Some(4));
        assert_eq!(html_block_start(&cv("<![CDATA[")), Some(5));
        assert_eq!(html_block_start(&cv("<div class=x>")), Some(6));
        assert_eq!(html_block_start(&cv("</div>")), Some(6));
        assert_eq!(html_block_start(&cv("<custom-tag>")), None);
        assert_eq!(html_block_start_7(&cv("<custom-tag>")), Some(7));
        assert_eq!(html_block_start_7(&cv("<custom-tag> x")), None);
        assert!(html_block_end(1, &cv("x</SCRIPT> y")));
        assert!(html_block_end(2, &cv("--> done")));
    }

    #[test]
    fn autolinks() {
        assert_eq!(autolink_uri(&cv("http://a.b>")), Some(11));
        assert_eq!(autolink_uri(&cv("http://a b>")), None);
        assert_eq!(autolink_uri(&cv("noscheme>")), None);
        assert_eq!(autolink_email(&cv("a@b.c>")), Some(6));
        assert_eq!(autolink_email(&cv("a@b>")), Some(4));
        assert_eq!(autolink_email(&cv("@b.c>")), None);
    }

    #[test]
    fn tags() {
        assert_eq!(html_tag(&cv("a>")), Some(2));
        assert_eq!(html_tag(&cv("a href=\"x\">")), Some(11));
        assert_eq!(html_tag(&cv("a/>")), Some(3));
        assert_eq!(html_tag(&cv("/a>")), Some(3));
        assert_eq!(html_tag(&cv("!-- c -->")), Some(9));
        assert_eq!(html_tag(&cv("?pi?>")), Some(5));
        assert_eq!(html_tag(&cv("= nope")), None);
    }

    #[test]
    fn titles() {
        assert_eq!(link_title(&cv("\"t\"")), Some(3));
        assert_eq!(link_title(&cv("'t'")), Some(3));
        assert_eq!(link_title(&cv("(t)")), Some(3));
        assert_eq!(link_title(&cv("\"t")), None);
    }
}
