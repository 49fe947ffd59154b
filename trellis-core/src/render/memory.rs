//! In-memory backend.
//!
//! Keeps a node arena and a log of every operation the reconciler issued,
//! which is what the tests and benches assert against.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::backend::{Backend, NodeId};
use crate::reactive::{Handler, Value};

/// One backend operation, as recorded by [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    CreateElement { node: NodeId, tag: String },
    CreateText { node: NodeId, text: String },
    CreatePlaceholder { node: NodeId },
    CreateFragment { node: NodeId },
    SetAttribute { node: NodeId, key: String, value: String },
    RemoveAttribute { node: NodeId, key: String },
    AddListener { node: NodeId, event: String },
    RemoveListener { node: NodeId, event: String },
    AppendChild { parent: NodeId, child: NodeId },
    InsertBefore { parent: NodeId, child: NodeId, before: NodeId },
    ReplaceChild { parent: NodeId, new: NodeId, old: NodeId },
    RemoveNode { node: NodeId },
    SetText { node: NodeId, text: String },
}

impl Op {
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            Op::CreateElement { .. } | Op::CreateText { .. } | Op::CreatePlaceholder { .. } | Op::CreateFragment { .. }
        )
    }
}

#[derive(Debug)]
enum Kind {
    Root,
    Element(Rc<str>),
    Text(String),
    Fragment,
    Placeholder,
}

#[derive(Debug)]
struct Node {
    kind: Kind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: IndexMap<String, String>,
    listeners: SmallVec<[(Rc<str>, Handler); 2]>,
}

impl Node {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
            listeners: SmallVec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Arena {
    next: u64,
    nodes: HashMap<NodeId, Node>,
    ops: Vec<Op>,
}

impl Arena {
    fn alloc(&mut self, kind: Kind) -> NodeId {
        self.next += 1;
        let id = NodeId::from_raw(self.next);
        self.nodes.insert(id, Node::new(kind));
        id
    }

    fn detach(&mut self, node: NodeId) {
        let parent = self.nodes.get_mut(&node).and_then(|n| n.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != node);
        }
    }

    fn discard(&mut self, node: NodeId) {
        if let Some(removed) = self.nodes.remove(&node) {
            for child in removed.children {
                self.discard(child);
            }
        }
    }

    fn has(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }
}

/// A [`Backend`] over an in-memory node arena.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    arena: RefCell<Arena>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A root container node. Not recorded in the op log.
    pub fn create_root(&self) -> NodeId {
        self.arena.borrow_mut().alloc(Kind::Root)
    }

    pub fn ops(&self) -> Vec<Op> {
        self.arena.borrow().ops.clone()
    }

    pub fn take_ops(&self) -> Vec<Op> {
        std::mem::take(&mut self.arena.borrow_mut().ops)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.arena.borrow().has(node)
    }

    pub fn node_count(&self) -> usize {
        self.arena.borrow().nodes.len()
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.arena
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        match &self.arena.borrow().nodes.get(&node)?.kind {
            Kind::Element(tag) => Some(tag.to_string()),
            _ => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<String> {
        match &self.arena.borrow().nodes.get(&node)?.kind {
            Kind::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn attribute(&self, node: NodeId, key: &str) -> Option<String> {
        self.arena.borrow().nodes.get(&node)?.attributes.get(key).cloned()
    }

    pub fn listener_count(&self, node: NodeId, event: &str) -> usize {
        self.arena
            .borrow()
            .nodes
            .get(&node)
            .map_or(0, |n| n.listeners.iter().filter(|(e, _)| &**e == event).count())
    }

    /// Invoke every handler bound to `event` on `node`. Returns how many ran.
    pub fn dispatch(&self, node: NodeId, event: &str, payload: &Value) -> usize {
        let handlers: Vec<Handler> = self
            .arena
            .borrow()
            .nodes
            .get(&node)
            .map(|n| {
                n.listeners
                    .iter()
                    .filter(|(e, _)| &**e == event)
                    .map(|(_, h)| h.clone())
                    .collect()
            })
            .unwrap_or_default();
        for handler in &handlers {
            handler.call(payload);
        }
        handlers.len()
    }

    /// Serialize the subtree under `node` as markup. Root and fragment nodes
    /// contribute only their children.
    pub fn to_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(&self.arena.borrow(), node, &mut out);
        out
    }

    fn write_html(&self, arena: &Arena, node: NodeId, out: &mut String) {
        let Some(n) = arena.nodes.get(&node) else {
            return;
        };
        match &n.kind {
            Kind::Root | Kind::Fragment => {
                for child in &n.children {
                    self.write_html(arena, *child, out);
                }
            }
            Kind::Text(text) => out.push_str(&escape(text)),
            Kind::Placeholder => out.push_str("<!---->"),
            Kind::Element(tag) => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in &n.attributes {
                    let _ = write!(out, " {}=\"{}\"", key, escape(value));
                }
                out.push('>');
                for child in &n.children {
                    self.write_html(arena, *child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn record(&self, op: Op) {
        self.arena.borrow_mut().ops.push(op);
    }

    fn create(&self, kind: Kind) -> NodeId {
        let mut arena = self.arena.borrow_mut();
        let op_kind = match &kind {
            Kind::Element(tag) => Some(tag.to_string()),
            _ => None,
        };
        let text = match &kind {
            Kind::Text(text) => Some(text.clone()),
            _ => None,
        };
        let is_fragment = matches!(kind, Kind::Fragment);
        let node = arena.alloc(kind);
        let op = match (op_kind, text) {
            (Some(tag), _) => Op::CreateElement { node, tag },
            (_, Some(text)) => Op::CreateText { node, text },
            _ if is_fragment => Op::CreateFragment { node },
            _ => Op::CreatePlaceholder { node },
        };
        arena.ops.push(op);
        node
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

impl Backend for MemoryBackend {
    fn create_element(&self, tag: &str) -> NodeId {
        self.create(Kind::Element(tag.into()))
    }

    fn create_text(&self, text: &str) -> NodeId {
        self.create(Kind::Text(text.to_owned()))
    }

    fn create_placeholder(&self) -> NodeId {
        self.create(Kind::Placeholder)
    }

    fn create_fragment(&self) -> NodeId {
        self.create(Kind::Fragment)
    }

    fn set_attribute(&self, node: NodeId, key: &str, value: &Value) {
        let value = value.to_string();
        let mut arena = self.arena.borrow_mut();
        let Some(n) = arena.nodes.get_mut(&node) else {
            return;
        };
        n.attributes.insert(key.to_owned(), value.clone());
        arena.ops.push(Op::SetAttribute {
            node,
            key: key.to_owned(),
            value,
        });
    }

    fn remove_attribute(&self, node: NodeId, key: &str) {
        let mut arena = self.arena.borrow_mut();
        let Some(n) = arena.nodes.get_mut(&node) else {
            return;
        };
        n.attributes.shift_remove(key);
        arena.ops.push(Op::RemoveAttribute {
            node,
            key: key.to_owned(),
        });
    }

    fn add_listener(&self, node: NodeId, event: &str, handler: Handler) {
        let mut arena = self.arena.borrow_mut();
        let Some(n) = arena.nodes.get_mut(&node) else {
            return;
        };
        n.listeners.push((event.into(), handler));
        arena.ops.push(Op::AddListener {
            node,
            event: event.to_owned(),
        });
    }

    fn remove_listener(&self, node: NodeId, event: &str, handler: &Handler) {
        let mut arena = self.arena.borrow_mut();
        let Some(n) = arena.nodes.get_mut(&node) else {
            return;
        };
        let before = n.listeners.len();
        n.listeners.retain(|(e, h)| !(&**e == event && h.ptr_eq(handler)));
        if n.listeners.len() != before {
            arena.ops.push(Op::RemoveListener {
                node,
                event: event.to_owned(),
            });
        }
    }

    fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut arena = self.arena.borrow_mut();
        if !arena.has(parent) || !arena.has(child) {
            return;
        }
        arena.detach(child);
        if let Some(p) = arena.nodes.get_mut(&parent) {
            p.children.push(child);
        }
        if let Some(c) = arena.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
        arena.ops.push(Op::AppendChild { parent, child });
    }

    fn insert_before(&self, parent: NodeId, child: NodeId, before: NodeId) {
        let mut arena = self.arena.borrow_mut();
        if !arena.has(parent) || !arena.has(child) {
            return;
        }
        arena.detach(child);
        if let Some(p) = arena.nodes.get_mut(&parent) {
            match p.children.iter().position(|c| *c == before) {
                Some(index) => p.children.insert(index, child),
                None => p.children.push(child),
            }
        }
        if let Some(c) = arena.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
        arena.ops.push(Op::InsertBefore { parent, child, before });
    }

    fn replace_child(&self, parent: NodeId, new: NodeId, old: NodeId) {
        let mut arena = self.arena.borrow_mut();
        if new == old || !arena.has(parent) || !arena.has(new) {
            return;
        }
        let index = arena.nodes.get(&parent).and_then(|p| p.children.iter().position(|c| *c == old));
        let Some(index) = index else {
            return;
        };
        arena.detach(new);
        if let Some(p) = arena.nodes.get_mut(&parent) {
            // detaching `new` may have shifted `old`
            let index = p.children.iter().position(|c| *c == old).unwrap_or(index);
            p.children[index] = new;
        }
        if let Some(n) = arena.nodes.get_mut(&new) {
            n.parent = Some(parent);
        }
        if let Some(o) = arena.nodes.get_mut(&old) {
            o.parent = None;
        }
        arena.ops.push(Op::ReplaceChild { parent, new, old });
    }

    fn remove_node(&self, node: NodeId) {
        let mut arena = self.arena.borrow_mut();
        if !arena.has(node) {
            return;
        }
        arena.detach(node);
        arena.discard(node);
        arena.ops.push(Op::RemoveNode { node });
    }

    fn set_text(&self, node: NodeId, text: &str) {
        let mut arena = self.arena.borrow_mut();
        let Some(n) = arena.nodes.get_mut(&node) else {
            return;
        };
        if let Kind::Text(current) = &mut n.kind {
            *current = text.to_owned();
            arena.ops.push(Op::SetText {
                node,
                text: text.to_owned(),
            });
        }
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.arena.borrow().nodes.get(&node)?.parent
    }
}
