//! The built-in GFM autolink text plugin (id 1): bare `www.`, scheme and
//! e-mail runs inside finished text runs become `Link` nodes.

use unicode_categories::UnicodeCategories;

use crate::character_set::character_set;
use crate::ctype::{isalnum, isalpha};
use crate::nodes::{make_node, AstNode, NodeLink, NodeValue, Span};
use crate::parser::plugins::TextPluginContext;

/// Entry point registered as plugin id 1.
pub(crate) fn gfm_autolink_plugin<'a, 'u>(cx: &TextPluginContext<'a, 'u>, node: &'a AstNode<'a>) {
    let texts: Vec<&'a AstNode<'a>> = node
        .children()
        .filter(|n| matches!(n.data.borrow().value, NodeValue::Text(..)))
        .collect();
    for text in texts {
        process_text(cx, text);
    }
}

fn process_text<'a, 'u>(cx: &TextPluginContext<'a, 'u>, node: &'a AstNode<'a>) {
    let (chars, span) = {
        let ast = node.data.borrow();
        let text = match ast.value.text() {
            Some(t) => t,
            None => return,
        };
        (text.chars().collect::<Vec<char>>(), ast.span)
    };

    // Columns are recovered by offsetting into the node's span; a run
    // whose decoded text no longer lines up with its source is skipped.
    if span.end.col - span.start.col + 1 != chars.len() as i64 {
        return;
    }

    let m = match find_autolink(&chars) {
        Some(m) => m,
        None => return,
    };

    let line = span.start.line;
    let link_span = Span::new(
        span.start.col + m.start as i64,
        line,
        span.start.col + m.end as i64 - 1,
        line,
    );
    let matched: String = chars[m.start..m.end].iter().collect();

    let link = make_node(
        cx.arena,
        NodeValue::Link(NodeLink {
            url: m.url,
            text: matched,
            text_pos: link_span,
            url_pos: link_span,
        }),
        link_span,
    );
    node.insert_after(link);

    let after: String = chars[m.end..].iter().collect();
    if m.start == 0 {
        node.detach();
    } else {
        let mut ast = node.data.borrow_mut();
        let head: String = chars[..m.start].iter().collect();
        *ast.value.text_mut().unwrap() = head;
        ast.span.end.col = span.start.col + m.start as i64 - 1;
    }

    if !after.is_empty() {
        let after_span = Span::new(
            span.start.col + m.end as i64,
            line,
            span.end.col,
            line,
        );
        let rest = make_node(cx.arena, NodeValue::Text(after), after_span);
        link.insert_after(rest);
        process_text(cx, rest);
    }
}

struct AutolinkMatch {
    start: usize,
    end: usize,
    url: String,
}

fn find_autolink(chars: &[char]) -> Option<AutolinkMatch> {
    for i in 0..chars.len() {
        let m = match chars[i] {
            'w' => www_match(chars, i),
            ':' => url_match(chars, i),
            '@' => email_match(chars, i),
            _ => None,
        };
        if m.is_some() {
            return m;
        }
    }
    None
}

fn www_match(chars: &[char], i: usize) -> Option<AutolinkMatch> {
    const WWW_DELIMS: [bool; 256] = character_set!(b"*_~([");

    if i > 0 {
        let prev = chars[i - 1];
        if !prev.is_whitespace() && !((prev as u32) < 256 && WWW_DELIMS[prev as usize]) {
            return None;
        }
    }

    if !starts_with(chars, i, "www.") {
        return None;
    }

    let mut link_end = check_domain(&chars[i..], false)?;

    while i + link_end < chars.len() && !chars[i + link_end].is_whitespace() {
        link_end += 1;
    }

    link_end = autolink_delim(&chars[i..], link_end);
    if link_end == 0 {
        return None;
    }

    let mut url = "http://".to_string();
    url.extend(&chars[i..i + link_end]);
    Some(AutolinkMatch {
        start: i,
        end: i + link_end,
        url,
    })
}

fn url_match(chars: &[char], i: usize) -> Option<AutolinkMatch> {
    const SCHEMES: [&str; 3] = ["http", "https", "ftp"];

    if chars.len() - i < 4 || chars.get(i + 1) != Some(&'/') || chars.get(i + 2) != Some(&'/') {
        return None;
    }

    let mut rewind = 0;
    while rewind < i && isalpha(chars[i - rewind - 1]) {
        rewind += 1;
    }

    let scheme: String = chars[i - rewind..i].iter().collect();
    if !SCHEMES.contains(&scheme.as_str()) {
        return None;
    }

    let mut link_end = check_domain(&chars[i + 3..], true)? + 3;

    while i + link_end < chars.len() && !chars[i + link_end].is_whitespace() {
        link_end += 1;
    }

    link_end = autolink_delim(&chars[i..], link_end);
    if link_end == 0 {
        return None;
    }

    let url: String = chars[i - rewind..i + link_end].iter().collect();
    Some(AutolinkMatch {
        start: i - rewind,
        end: i + link_end,
        url,
    })
}

fn email_match(chars: &[char], i: usize) -> Option<AutolinkMatch> {
    const EMAIL_OK: [bool; 256] = character_set!(b".+-_");

    let size = chars.len();

    let mut rewind = 0;
    while rewind < i {
        let c = chars[i - rewind - 1];
        if isalnum(c) || ((c as u32) < 256 && EMAIL_OK[c as usize]) {
            rewind += 1;
            continue;
        }
        break;
    }
    if rewind == 0 {
        return None;
    }

    let mut link_end = 1;
    let mut np = 0;
    while i + link_end < size {
        let c = chars[i + link_end];
        if isalnum(c) {
            // fine
        } else if c == '@' {
            return None;
        } else if c == '.' && i + link_end + 1 < size && isalnum(chars[i + link_end + 1]) {
            np += 1;
        } else if c != '-' && c != '_' {
            break;
        }
        link_end += 1;
    }

    if link_end < 2
        || np == 0
        || (!isalpha(chars[i + link_end - 1]) && chars[i + link_end - 1] != '.')
    {
        return None;
    }

    let link_end = autolink_delim(&chars[i..], link_end);
    if link_end == 0 {
        return None;
    }

    let mut url = "mailto:".to_string();
    url.extend(&chars[i - rewind..i + link_end]);
    Some(AutolinkMatch {
        start: i - rewind,
        end: i + link_end,
        url,
    })
}

fn starts_with(chars: &[char], at: usize, pat: &str) -> bool {
    let mut k = at;
    for p in pat.chars() {
        if chars.get(k) != Some(&p) {
            return false;
        }
        k += 1;
    }
    true
}

// Valid-domain check: labels of hostname characters separated by dots,
// underscores tolerated everywhere but the last two labels.
fn check_domain(chars: &[char], allow_short: bool) -> Option<usize> {
    let mut np = 0;
    let mut uscore1 = 0;
    let mut uscore2 = 0;

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            uscore2 += 1;
        } else if c == '.' {
            uscore1 = uscore2;
            uscore2 = 0;
            np += 1;
        } else if !is_valid_hostchar(c) && c != '-' {
            if uscore1 == 0 && uscore2 == 0 && (allow_short || np > 0) {
                return Some(i);
            }
            return None;
        }
    }

    if uscore1 > 0 || uscore2 > 0 {
        None
    } else if allow_short || np > 0 {
        Some(chars.len())
    } else {
        None
    }
}

fn is_valid_hostchar(ch: char) -> bool {
    !(ch.is_whitespace() || ch.is_punctuation() || ch.is_symbol())
}

// Back trailing punctuation, unbalanced closing parens and entity-shaped
// tails out of the match.
fn autolink_delim(chars: &[char], mut link_end: usize) -> usize {
    const LINK_END_ASSORTMENT: [bool; 256] = character_set!(b"?!.,:*_~'\"");

    for (i, &c) in chars.iter().enumerate().take(link_end) {
        if c == '<' {
            link_end = i;
            break;
        }
    }

    while link_end > 0 {
        let cclose = chars[link_end - 1];

        if (cclose as u32) < 256 && LINK_END_ASSORTMENT[cclose as usize] {
            link_end -= 1;
        } else if cclose == ';' {
            let mut new_end = link_end - 2;
            while new_end > 0 && isalpha(chars[new_end]) {
                new_end -= 1;
            }
            if new_end < link_end - 2 && chars[new_end] == '&' {
                link_end = new_end;
            } else {
                link_end -= 1;
            }
        } else if cclose == ')' {
            let mut opening = 0;
            let mut closing = 0;
            for &c in chars.iter().take(link_end) {
                if c == '(' {
                    opening += 1;
                } else if c == ')' {
                    closing += 1;
                }
            }
            if closing <= opening {
                break;
            }
            link_end -= 1;
        } else {
            break;
        }
    }

    link_end
}
