//! Rendering backend interface.
//!
//! The reconciler never touches a concrete tree. It drives a [`Backend`]:
//! a minimal node API that a DOM binding, a terminal UI or the in-memory
//! [`MemoryBackend`](super::MemoryBackend) implements.
//!
//! Invariants the reconciler relies on:
//! - A node has at most one parent; appending or inserting a node that is
//!   already attached moves it.
//! - A fragment node is a transparent grouping node. It stays in the tree
//!   and its children render in its place.
//! - Operations on a node that was removed are ignored.

use std::fmt;

use crate::reactive::{Handler, Value};

/// Opaque handle to a backend node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The node API the renderer drives.
pub trait Backend: 'static {
    fn create_element(&self, tag: &str) -> NodeId;

    fn create_text(&self, text: &str) -> NodeId;

    /// An empty marker node, used for deactivated components, teleport
    /// anchors and failed renders.
    fn create_placeholder(&self) -> NodeId;

    fn create_fragment(&self) -> NodeId;

    fn set_attribute(&self, node: NodeId, key: &str, value: &Value);

    fn remove_attribute(&self, node: NodeId, key: &str);

    fn add_listener(&self, node: NodeId, event: &str, handler: Handler);

    fn remove_listener(&self, node: NodeId, event: &str, handler: &Handler);

    fn append_child(&self, parent: NodeId, child: NodeId);

    /// Insert `child` before `before`. Appends if `before` is not a child of
    /// `parent`.
    fn insert_before(&self, parent: NodeId, child: NodeId, before: NodeId);

    fn replace_child(&self, parent: NodeId, new: NodeId, old: NodeId);

    /// Detach `node` and discard its subtree.
    fn remove_node(&self, node: NodeId);

    fn set_text(&self, node: NodeId, text: &str);

    fn parent_node(&self, node: NodeId) -> Option<NodeId>;
}

/// The event an attribute key binds, if it is an event-handler key.
///
/// Event keys are `on` followed by an upper-case letter: `onClick` binds
/// `click`, `onKeyDown` binds `keydown`.
pub fn event_name(key: &str) -> Option<String> {
    let rest = key.strip_prefix("on")?;
    if rest.starts_with(|c: char| c.is_ascii_uppercase()) {
        Some(rest.to_ascii_lowercase())
    } else {
        None
    }
}

/// The attribute key that binds `event`: `click` becomes `onClick`.
pub fn event_key(event: &str) -> String {
    let mut chars = event.chars();
    match chars.next() {
        Some(first) => format!("on{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "on".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_keys() {
        assert_eq!(event_name("onClick").as_deref(), Some("click"));
        assert_eq!(event_name("onKeyDown").as_deref(), Some("keydown"));
        assert_eq!(event_name("online"), None);
        assert_eq!(event_name("class"), None);
        assert_eq!(event_name("on"), None);

        assert_eq!(event_key("click"), "onClick");
        assert_eq!(event_name(&event_key("input")).as_deref(), Some("input"));
    }
}
