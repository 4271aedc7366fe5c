//! Configuration accepted by the top-level parse calls.

use bon::Builder;

use crate::parser::plugins::{self, TextPlugin};

/// Umbrella options struct.
///
/// ```rust
/// # use spandown::Options;
/// let options = Options::builder().fully_optimize_paragraphs(false).build();
/// assert!(!options.recursive);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct Options {
    /// Walk link targets and parse linked Markdown files, stitching them
    /// into one document. Only honored by the file orchestrator
    /// ([`parse_file`](crate::parse_file)); the core parser always handles
    /// exactly one input.
    #[builder(default = false)]
    pub recursive: bool,

    /// File suffixes considered Markdown when recursing.
    #[builder(default = default_extensions())]
    pub allowed_extensions: Vec<String>,

    /// Select full (rather than semi) paragraph optimization: adjacent
    /// compatible `Text` runs are merged across line boundaries too.
    #[builder(default = true)]
    pub fully_optimize_paragraphs: bool,

    /// Text plugins run over finished paragraphs, ordered by id. Id 1 is
    /// the built-in GFM autolink plugin.
    #[builder(default = plugins::default_plugins())]
    pub text_plugins: Vec<TextPlugin>,
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string(), "markdown".to_string()]
}

impl Default for Options {
    fn default() -> Options {
        Options::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = Options::default();
        assert!(!options.recursive);
        assert!(options.fully_optimize_paragraphs);
        assert_eq!(options.allowed_extensions, ["md", "markdown"]);
        assert_eq!(options.text_plugins.len(), 1);
        assert_eq!(options.text_plugins[0].id, plugins::GFM_AUTOLINK_PLUGIN_ID);
    }
}
