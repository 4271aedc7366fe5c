//! The text-plugin hook: a post-inline pass over finished paragraphs.
//!
//! Plugins receive a paragraph whose inline items are fully resolved and
//! semi-optimized, and may splice additional inline nodes in (the built-in
//! GFM autolink pass is plugin id 1).

use std::fmt;

use typed_arena::Arena;

use crate::nodes::AstNode;
use crate::parser::autolink;

/// Reserved id of the built-in GFM autolink plugin.
pub const GFM_AUTOLINK_PLUGIN_ID: i32 = 1;

/// Everything a plugin gets besides the paragraph itself.
pub struct TextPluginContext<'a, 'u> {
    pub arena: &'a Arena<AstNode<'a>>,
    pub user_data: &'u [String],
}

/// A plugin entry point. The paragraph's `Text` children are the raw runs
/// the plugin may rescan and split.
pub type TextPluginFn = for<'a, 'u> fn(&TextPluginContext<'a, 'u>, &'a AstNode<'a>);

/// A registered text plugin.
#[derive(Clone)]
pub struct TextPlugin {
    /// Plugins run in ascending id order; id 1 is reserved.
    pub id: i32,

    pub func: TextPluginFn,

    /// Whether the plugin also runs over link descriptions.
    pub process_in_links: bool,

    /// Opaque strings handed back through [`TextPluginContext`].
    pub user_data: Vec<String>,
}

impl fmt::Debug for TextPlugin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TextPlugin")
            .field("id", &self.id)
            .field("process_in_links", &self.process_in_links)
            .field("user_data", &self.user_data)
            .finish()
    }
}

pub(crate) fn default_plugins() -> Vec<TextPlugin> {
    vec![TextPlugin {
        id: GFM_AUTOLINK_PLUGIN_ID,
        func: autolink::gfm_autolink_plugin,
        process_in_links: false,
        user_data: vec![],
    }]
}
