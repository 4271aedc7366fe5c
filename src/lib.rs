//! A CommonMark-compatible, GFM-extended Markdown parser that produces a
//! tree of typed document nodes annotated with exact source positions:
//! every delimiter, opener, closer and span knows the zero-based virgin
//! line and column it came from, which is what editor tooling needs.
//!
//! ```
//! use spandown::{parse_document, Arena, NodeValue, Options};
//!
//! let arena = Arena::new();
//! let doc = parse_document(&arena, "Hello, **world**!\n", &Options::default());
//!
//! let paragraph = doc.root.last_child().unwrap();
//! assert!(matches!(paragraph.data.borrow().value, NodeValue::Paragraph));
//! ```
//!
//! Parsing is total: every byte sequence is a valid document, so the
//! in-memory entry points cannot fail. [`parse_file`] adds I/O and the
//! recursive multi-file orchestration on top and returns a `Result`.

mod character_set;
mod ctype;
mod entity;
mod input;
mod scanners;
mod strings;

pub mod nodes;
pub mod parser;
pub mod tree;
pub mod visitor;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

pub use typed_arena::Arena;

pub use crate::nodes::{
    make_node, AstNode, Document, ListType, NodeValue, OrderedListPreState, Pos, Span, StyleDelim,
    TableAlignment, TextOpts,
};
pub use crate::parser::plugins::{TextPlugin, TextPluginContext, GFM_AUTOLINK_PLUGIN_ID};
pub use crate::parser::{parse_document, parse_with_path, Options};

/// Failures of the file-reading orchestrator.
#[derive(Debug, Error)]
pub enum ParseFileError {
    #[error("unable to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0:?} does not carry a Markdown suffix")]
    UnsupportedExtension(PathBuf),
}

/// Read and parse one Markdown file.
///
/// With [`Options::recursive`] set, link targets carrying an allowed
/// Markdown suffix are read and parsed too, each exactly once, and the
/// documents are stitched into one tree separated by
/// [`NodeValue::PageBreak`] and [`NodeValue::Anchor`] markers.
pub fn parse_file<'a>(
    arena: &'a Arena<AstNode<'a>>,
    path: &Path,
    options: &Options,
) -> Result<Document<'a>, ParseFileError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if !options
        .allowed_extensions
        .iter()
        .any(|a| a.eq_ignore_ascii_case(ext))
    {
        return Err(ParseFileError::UnsupportedExtension(path.to_path_buf()));
    }

    let text = fs::read_to_string(path).map_err(|source| ParseFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (working_path, file_name) = split_path(path);
    let mut doc = parse_with_path(arena, &text, options, &working_path, &file_name);

    if options.recursive {
        let mut visited = HashSet::new();
        if let Ok(canonical) = path.canonicalize() {
            visited.insert(canonical);
        }
        stitch_linked_files(arena, &mut doc, path, options, &mut visited);
    }

    Ok(doc)
}

fn split_path(path: &Path) -> (String, String) {
    let working_path = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    (working_path, file_name)
}

// Walk the parsed document for links to Markdown files, parse each target
// once, and append its items behind a page break. Newly discovered links
// keep the walk going until the closure is complete.
fn stitch_linked_files<'a>(
    arena: &'a Arena<AstNode<'a>>,
    doc: &mut Document<'a>,
    base: &Path,
    options: &Options,
    visited: &mut HashSet<PathBuf>,
) {
    let dir = base.parent().unwrap_or_else(|| Path::new(""));

    let mut targets: Vec<PathBuf> = vec![];
    {
        let mut consider = |url: &str| {
            if url.starts_with('#') || url.contains("://") {
                return;
            }
            if strings::has_markdown_suffix(url, &options.allowed_extensions) {
                targets.push(dir.join(url));
            }
        };
        for node in doc.root.descendants() {
            if let NodeValue::Link(ref nl) = node.data.borrow().value {
                consider(&nl.url);
            }
        }
        let urls: Vec<String> = doc
            .labeled_links
            .values()
            .filter_map(|n| match n.data.borrow().value {
                NodeValue::Link(ref nl) => Some(nl.url.clone()),
                _ => None,
            })
            .collect();
        for url in &urls {
            consider(url);
        }
    }

    for target in targets {
        let canonical = match target.canonicalize() {
            Ok(c) => c,
            Err(_) => continue,
        };
        if !visited.insert(canonical) {
            continue;
        }

        let text = match fs::read_to_string(&target) {
            Ok(text) => text,
            Err(err) => {
                warn!("skipping linked file {:?}: {}", target, err);
                continue;
            }
        };
        debug!("stitching linked file {:?}", target);

        let (working_path, file_name) = split_path(&target);
        let mut sub = parse_with_path(arena, &text, options, &working_path, &file_name);
        stitch_linked_files(arena, &mut sub, &target, options, visited);

        let page_break = make_node(arena, NodeValue::PageBreak, Span::default());
        doc.root.append(page_break);
        let items: Vec<&'a AstNode<'a>> = sub.root.children().collect();
        for item in items {
            doc.root.append(item);
        }

        for (label, node) in sub.footnotes {
            doc.footnotes.entry(label).or_insert(node);
        }
        for (label, node) in sub.labeled_links {
            doc.labeled_links.entry(label).or_insert(node);
        }
        for (label, node) in sub.labeled_headings {
            doc.labeled_headings.entry(label).or_insert(node);
        }
    }
}

#[cfg(test)]
mod tests;
