//! Virtual nodes: the description a component's `build` returns.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::backend::{event_key, NodeId};
use super::component::{Component, ComponentType};
use super::renderer::Renderer;
use crate::reactive::{Depend, Handler, Observable, Observers, Prop, SourceId, Value, VALUE_PROP};

#[derive(Clone)]
pub enum VNodeKind {
    Element(Rc<str>),
    Component(ComponentType),
    /// Groups its children without an element of its own.
    Fragment,
    Text(Rc<str>),
}

impl fmt::Debug for VNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNodeKind::Element(tag) => write!(f, "Element({tag})"),
            VNodeKind::Component(ty) => write!(f, "Component({})", ty.name()),
            VNodeKind::Fragment => f.write_str("Fragment"),
            VNodeKind::Text(text) => write!(f, "Text({text:?})"),
        }
    }
}

/// A node description.
///
/// Children are positional: `None` entries hold a slot open so that
/// conditionally rendered children do not shift their siblings.
///
/// Once mounted, a `VNode` also records the backend node (or component
/// instance) it produced. Cloning yields a fresh, unmounted description.
pub struct VNode {
    pub kind: VNodeKind,
    pub key: Option<Rc<str>>,
    pub props: IndexMap<String, Value>,
    pub children: Vec<Option<VNode>>,
    pub node_ref: Option<NodeRef>,
    pub(crate) el: Option<NodeId>,
    pub(crate) instance: Option<Renderer>,
}

/// An element node.
pub fn h(tag: &str) -> VNode {
    VNode::new(VNodeKind::Element(tag.into()))
}

/// A text node.
pub fn text(content: impl Into<Rc<str>>) -> VNode {
    VNode::new(VNodeKind::Text(content.into()))
}

/// A fragment grouping `children`.
pub fn fragment<I>(children: I) -> VNode
where
    I: IntoIterator,
    I::Item: Into<Option<VNode>>,
{
    VNode::new(VNodeKind::Fragment).children(children)
}

impl VNode {
    fn new(kind: VNodeKind) -> Self {
        Self {
            kind,
            key: None,
            props: IndexMap::new(),
            children: Vec::new(),
            node_ref: None,
            el: None,
            instance: None,
        }
    }

    /// A component node. Props and children set on it are passed to the
    /// instance.
    pub fn component<C: Component>() -> Self {
        Self::new(VNodeKind::Component(ComponentType::of::<C>()))
    }

    pub fn key(mut self, key: impl Into<Rc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Bind an event handler: `.on("click", f)` sets the `onClick` prop.
    pub fn on<F>(self, event: &str, handler: F) -> Self
    where
        F: Fn(&Value) + 'static,
    {
        self.prop(event_key(event), Handler::new(handler))
    }

    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        self.children.push(Some(child.into()));
        self
    }

    /// A child slot that may be empty.
    pub fn optional_child(mut self, child: Option<VNode>) -> Self {
        self.children.push(child);
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Option<VNode>>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    pub fn is_component(&self) -> bool {
        matches!(self.kind, VNodeKind::Component(_))
    }

    /// Whether `other` can be patched into this node instead of replacing
    /// it: same kind, same tag or component type, same key.
    pub fn same_type(&self, other: &VNode) -> bool {
        let kind = match (&self.kind, &other.kind) {
            (VNodeKind::Element(a), VNodeKind::Element(b)) => a == b,
            (VNodeKind::Component(a), VNodeKind::Component(b)) => a == b,
            (VNodeKind::Fragment, VNodeKind::Fragment) | (VNodeKind::Text(_), VNodeKind::Text(_)) => true,
            _ => false,
        };
        kind && self.key == other.key
    }

    /// The backend node currently standing for this vnode, if mounted.
    pub fn node(&self) -> Option<NodeId> {
        match &self.instance {
            Some(instance) => instance.root_node(),
            None => self.el,
        }
    }

    /// The component instance created for this vnode, if any.
    pub fn instance(&self) -> Option<&Renderer> {
        self.instance.as_ref()
    }
}

impl Clone for VNode {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            key: self.key.clone(),
            props: self.props.clone(),
            children: self.children.clone(),
            node_ref: self.node_ref.clone(),
            el: None,
            instance: None,
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VNode");
        s.field("kind", &self.kind);
        if let Some(key) = &self.key {
            s.field("key", key);
        }
        if !self.props.is_empty() {
            s.field("props", &self.props);
        }
        if !self.children.is_empty() {
            s.field("children", &self.children);
        }
        s.finish()
    }
}

impl From<&str> for VNode {
    fn from(content: &str) -> Self {
        text(content)
    }
}

impl From<String> for VNode {
    fn from(content: String) -> Self {
        text(content)
    }
}

/// A reactive handle to the backend node a vnode produced.
///
/// Reading it inside a tracked context subscribes to it; it is set when the
/// node is created and cleared when it is removed.
#[derive(Clone)]
pub struct NodeRef(Rc<NodeRefInner>);

struct NodeRefInner {
    id: SourceId,
    node: Cell<Option<NodeId>>,
}

impl Drop for NodeRefInner {
    fn drop(&mut self) {
        Observers::forget(self.id);
    }
}

impl NodeRef {
    pub fn new() -> Self {
        Self(Rc::new(NodeRefInner {
            id: SourceId::new(),
            node: Cell::new(None),
        }))
    }

    pub fn get(&self) -> Option<NodeId> {
        Depend::track(self.0.id, VALUE_PROP);
        self.0.node.get()
    }

    pub fn get_untracked(&self) -> Option<NodeId> {
        self.0.node.get()
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn set(&self, node: Option<NodeId>) {
        if self.0.node.replace(node) != node {
            Observers::trigger(self.0.id, &[Prop::name(VALUE_PROP)]);
        }
    }
}

impl Observable for NodeRef {
    fn source_id(&self) -> SourceId {
        self.0.id
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.0.node.get()).finish()
    }
}
