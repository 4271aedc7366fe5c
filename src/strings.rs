use crate::ctype::ispunct;
use crate::entity;

/// How [`normalize_label`] treats letter case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Preserve,
    Fold,
}

/// Normalize a reference label: trim, collapse internal whitespace runs to
/// one space, and optionally apply Unicode case folding.
pub fn normalize_label(s: &str, case: Case) -> String {
    let mut v = String::with_capacity(s.len());
    let mut last_was_whitespace = false;
    for c in s.trim().chars() {
        if c.is_whitespace() {
            if !last_was_whitespace {
                last_was_whitespace = true;
                v.push(' ');
            }
        } else {
            last_was_whitespace = false;
            v.push(c);
        }
    }
    match case {
        Case::Preserve => v,
        Case::Fold => caseless::default_case_fold_str(&v),
    }
}

/// Fold heading text into an anchor label: lower-cased, alphanumerics kept,
/// whitespace turned into hyphens, everything else dropped.
pub fn heading_anchor(s: &str) -> String {
    let mut v = String::with_capacity(s.len());
    let mut last_was_hyphen = true;
    for c in s.trim().chars() {
        if c.is_alphanumeric() {
            for l in c.to_lowercase() {
                v.push(l);
            }
            last_was_hyphen = false;
        } else if (c.is_whitespace() || c == '-') && !last_was_hyphen {
            v.push('-');
            last_was_hyphen = true;
        }
    }
    while v.ends_with('-') {
        v.pop();
    }
    v
}

/// Remove backslashes that escape ASCII punctuation.
pub fn unescape(s: &str) -> String {
    let mut v = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek().map_or(false, |&n| ispunct(n)) {
            v.push(chars.next().unwrap());
        } else {
            v.push(c);
        }
    }
    v
}

/// Clean a link destination: trim, strip one layer of `<…>`, decode
/// entities, drop escaping backslashes.
pub fn clean_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }

    let inner = if url.starts_with('<') && url.ends_with('>') && url.len() >= 2 {
        &url[1..url.len() - 1]
    } else {
        url
    };

    unescape(&entity::unescape_html(inner))
}

/// Scoped-label suffix: `"/working_path/file_name"`, or `"/file_name"` when
/// the working path is empty.
pub fn label_suffix(working_path: &str, file_name: &str) -> String {
    if working_path.is_empty() {
        format!("/{}", file_name)
    } else {
        format!("/{}/{}", working_path, file_name)
    }
}

/// Whether `url` names a Markdown file with one of the allowed suffixes.
pub fn has_markdown_suffix(url: &str, allowed: &[String]) -> bool {
    match url.rsplit('.').next() {
        Some(ext) if ext.len() < url.len() => {
            allowed.iter().any(|a| a.eq_ignore_ascii_case(ext))
        }
        _ => false,
    }
}
