//! Tree creation and patching.
//!
//! Children are matched by position. Two nodes at the same index are
//! patched in place when [`VNode::same_type`] holds and replaced otherwise;
//! there is no keyed reordering.

use std::rc::Rc;

use indexmap::IndexMap;

use super::backend::{event_name, Backend, NodeId};
use super::renderer::{LifecycleState, Renderer};
use super::vnode::{VNode, VNodeKind};
use crate::config::AppOptions;
use crate::error::{report_error, Error, Result};
use crate::reactive::Value;

/// Applies vnode trees to a [`Backend`].
///
/// Component render failures do not abort a pass: the failed component is
/// left as a placeholder and the error is returned by
/// [`finish`](Self::finish).
pub struct Reconciler {
    backend: Rc<dyn Backend>,
    options: AppOptions,
    errors: Vec<Error>,
}

impl Reconciler {
    pub fn new(backend: Rc<dyn Backend>, options: AppOptions) -> Self {
        Self {
            backend,
            options,
            errors: Vec::new(),
        }
    }

    pub fn backend(&self) -> &Rc<dyn Backend> {
        &self.backend
    }

    /// Create the nodes for `vnode` and its subtree. Component children are
    /// rendered but not mounted. Returns the node to attach.
    pub fn create(&mut self, vnode: &mut VNode) -> NodeId {
        let node = match vnode.kind.clone() {
            VNodeKind::Text(content) => {
                let node = self.backend.create_text(&content);
                vnode.el = Some(node);
                node
            }
            VNodeKind::Element(tag) => {
                let node = self.backend.create_element(&tag);
                for (key, value) in &vnode.props {
                    self.set_prop(node, key, None, value);
                }
                self.create_children(node, &mut vnode.children);
                vnode.el = Some(node);
                node
            }
            VNodeKind::Fragment => {
                let node = self.backend.create_fragment();
                self.create_children(node, &mut vnode.children);
                vnode.el = Some(node);
                node
            }
            VNodeKind::Component(ty) => {
                let instance = Renderer::new(
                    ty,
                    vnode.props.clone(),
                    vnode.children.clone(),
                    self.backend.clone(),
                    self.options,
                );
                match instance.render(self) {
                    Ok(node) => {
                        vnode.instance = Some(instance);
                        node
                    }
                    Err(error) => {
                        tracing::debug!(%error, "component left as placeholder");
                        self.errors.push(error);
                        let node = self.backend.create_placeholder();
                        vnode.el = Some(node);
                        node
                    }
                }
            }
        };
        if let Some(node_ref) = &vnode.node_ref {
            node_ref.set(Some(node));
        }
        node
    }

    fn create_children(&mut self, parent: NodeId, children: &mut [Option<VNode>]) {
        for child in children.iter_mut().flatten() {
            let node = self.create(child);
            self.backend.append_child(parent, node);
        }
    }

    /// Patch the mounted `old` tree to match `new` and return `new`, now
    /// carrying the nodes and instances it took over.
    pub fn patch(&mut self, old: VNode, mut new: VNode) -> VNode {
        let stale_component = old.is_component()
            && old
                .instance
                .as_ref()
                .map_or(true, |i| i.state() == LifecycleState::Unloaded);
        if stale_component || !old.same_type(&new) {
            return self.replace(old, new);
        }

        let VNode {
            kind: old_kind,
            props: old_props,
            children: old_children,
            node_ref: old_ref,
            el,
            instance,
            ..
        } = old;

        match (&old_kind, new.kind.clone()) {
            (VNodeKind::Text(previous), VNodeKind::Text(content)) => {
                new.el = el;
                if let (Some(node), true) = (el, *previous != content) {
                    self.backend.set_text(node, &content);
                }
            }
            (VNodeKind::Component(_), VNodeKind::Component(_)) => {
                if let Some(instance) = instance {
                    instance.receive(&new.props, &new.children);
                    new.instance = Some(instance);
                }
            }
            (_, kind) => {
                new.el = el;
                if let Some(node) = el {
                    if matches!(kind, VNodeKind::Element(_)) {
                        self.patch_props(node, &old_props, &new.props);
                    }
                    let children = std::mem::take(&mut new.children);
                    new.children = self.patch_children(node, old_children, children);
                }
            }
        }

        if let Some(old_ref) = &old_ref {
            if !new.node_ref.as_ref().is_some_and(|r| r.ptr_eq(old_ref)) {
                old_ref.set(None);
            }
        }
        if let Some(node_ref) = &new.node_ref {
            node_ref.set(new.node());
        }
        new
    }

    /// Remove `vnode`'s nodes and unmount every instance under it.
    pub fn remove(&mut self, vnode: VNode) {
        if let Some(node_ref) = &vnode.node_ref {
            node_ref.set(None);
        }
        match &vnode.instance {
            Some(instance) => instance.unmount_with(true),
            None => {
                for child in vnode.children.iter().flatten() {
                    release(child);
                }
                if let Some(node) = vnode.el {
                    self.backend.remove_node(node);
                }
            }
        }
    }

    /// The first error of the pass. Later ones are reported.
    pub fn finish(self) -> Result<()> {
        let mut errors = self.errors.into_iter();
        let first = errors.next();
        for error in errors {
            report_error(&error);
        }
        match first {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn replace(&mut self, old: VNode, mut new: VNode) -> VNode {
        let node = self.create(&mut new);
        let attached = old
            .node()
            .and_then(|old_node| self.backend.parent_node(old_node).map(|parent| (parent, old_node)));
        match attached {
            Some((parent, old_node)) if old.instance.is_some() => {
                // the instance removes its own nodes, possibly later
                self.backend.insert_before(parent, node, old_node);
                self.remove(old);
            }
            Some((parent, old_node)) => {
                self.backend.replace_child(parent, node, old_node);
                self.remove(old);
            }
            None => {
                tracing::debug!("replaced node was not attached");
                self.remove(old);
            }
        }
        new
    }

    fn patch_props(&mut self, node: NodeId, old: &IndexMap<String, Value>, new: &IndexMap<String, Value>) {
        for (key, value) in old {
            if !new.contains_key(key) {
                self.remove_prop(node, key, value);
            }
        }
        for (key, value) in new {
            match old.get(key) {
                Some(previous) if previous.same_value(value) => {}
                previous => self.set_prop(node, key, previous, value),
            }
        }
    }

    fn patch_children(
        &mut self,
        parent: NodeId,
        mut old: Vec<Option<VNode>>,
        new: Vec<Option<VNode>>,
    ) -> Vec<Option<VNode>> {
        let new_len = new.len();
        let len = old.len().max(new_len);
        old.resize_with(len, || None);

        let mut out = Vec::with_capacity(new_len);
        let mut incoming = new.into_iter();
        for index in 0..len {
            let previous = old[index].take();
            let next = incoming.next().flatten();
            let slot = match (previous, next) {
                (None, None) => None,
                (Some(previous), None) => {
                    self.remove(previous);
                    None
                }
                (None, Some(mut next)) => {
                    let node = self.create(&mut next);
                    let before = old[index + 1..].iter().flatten().find_map(VNode::node);
                    match before {
                        Some(before) => self.backend.insert_before(parent, node, before),
                        None => self.backend.append_child(parent, node),
                    }
                    Some(next)
                }
                (Some(previous), Some(next)) => Some(self.patch(previous, next)),
            };
            if index < new_len {
                out.push(slot);
            }
        }
        out
    }

    fn set_prop(&mut self, node: NodeId, key: &str, old: Option<&Value>, value: &Value) {
        match event_name(key) {
            Some(event) => {
                if self.options.ssr {
                    return;
                }
                if let Some(Value::Func(previous)) = old {
                    self.backend.remove_listener(node, &event, previous);
                }
                if let Value::Func(handler) = value {
                    self.backend.add_listener(node, &event, handler.clone());
                }
            }
            None if value.is_null() => {
                if old.is_some_and(|o| !o.is_null()) {
                    self.backend.remove_attribute(node, key);
                }
            }
            None => self.backend.set_attribute(node, key, value),
        }
    }

    fn remove_prop(&mut self, node: NodeId, key: &str, old: &Value) {
        match event_name(key) {
            Some(event) => {
                if let (false, Value::Func(previous)) = (self.options.ssr, old) {
                    self.backend.remove_listener(node, &event, previous);
                }
            }
            // a null value was never written
            None if old.is_null() => {}
            None => self.backend.remove_attribute(node, key),
        }
    }
}

/// Unmount the instances under `vnode` and clear its node refs, leaving
/// node removal to whoever removes the subtree root.
pub(crate) fn release(vnode: &VNode) {
    if let Some(node_ref) = &vnode.node_ref {
        node_ref.set(None);
    }
    if let Some(instance) = &vnode.instance {
        instance.unmount_with(false);
        return;
    }
    for child in vnode.children.iter().flatten() {
        release(child);
    }
}

/// The nearest component instances under `vnode`.
pub(crate) fn collect_instances(vnode: &VNode, out: &mut Vec<Renderer>) {
    if let Some(instance) = &vnode.instance {
        out.push(instance.clone());
        return;
    }
    for child in vnode.children.iter().flatten() {
        collect_instances(child, out);
    }
}
