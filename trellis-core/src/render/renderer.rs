//! Component instances.
//!
//! A [`Renderer`] owns one component instance and drives it through its
//! lifecycle:
//!
//! ```text
//! NotRendered -> NotMounted -> Activated <-> Deactivated
//!                                  |              |
//!                                  +-> Uninstalling -> Unloaded
//! ```
//!
//! The first build records the instance's dependencies. A change to any of
//! them schedules a batched re-render; further changes before the next
//! flush coalesce into that one update.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::Serialize;

use super::backend::{Backend, NodeId};
use super::component::{Component, ComponentType, Context};
use super::reconcile::{self, Reconciler};
use super::vnode::VNode;
use crate::config::AppOptions;
use crate::error::{panic_message, report_error, Error, Result};
use crate::reactive::{Dependencies, Depend, Listener, Observers, Value};
use crate::scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LifecycleState {
    NotRendered,
    NotMounted,
    Activated,
    Deactivated,
    Uninstalling,
    Unloaded,
}

#[derive(Debug, Clone, Copy)]
struct Teleport {
    target: NodeId,
    anchor: NodeId,
}

struct Instance {
    ty: ComponentType,
    ctx: Context,
    component: Box<dyn Component>,
    backend: Rc<dyn Backend>,
    options: AppOptions,
    state: Cell<LifecycleState>,
    tree: RefCell<Option<VNode>>,
    /// Root node of the last committed tree. Survives a patch that unwound.
    committed: Cell<Option<NodeId>>,
    teleport: Cell<Option<Teleport>>,
    /// Stands in for the content while deactivated.
    placeholder: Cell<Option<NodeId>>,
    effect: RefCell<Option<Listener>>,
    deps: RefCell<Dependencies>,
    update_pending: Cell<bool>,
}

/// A component instance.
#[derive(Clone)]
pub struct Renderer(Rc<Instance>);

impl Renderer {
    /// Create an instance and run its `setup`.
    pub(crate) fn new(
        ty: ComponentType,
        props: IndexMap<String, Value>,
        children: Vec<Option<VNode>>,
        backend: Rc<dyn Backend>,
        options: AppOptions,
    ) -> Self {
        let ctx = Context::new(ty.name(), props, children);
        let component = ctx.scope().run(|| Depend::untracked(|| ty.create(&ctx)));
        Self(Rc::new(Instance {
            ty,
            ctx,
            component,
            backend,
            options,
            state: Cell::new(LifecycleState::NotRendered),
            tree: RefCell::new(None),
            committed: Cell::new(None),
            teleport: Cell::new(None),
            placeholder: Cell::new(None),
            effect: RefCell::new(None),
            deps: RefCell::new(Dependencies::new()),
            update_pending: Cell::new(false),
        }))
    }

    pub fn name(&self) -> &'static str {
        self.0.ty.name()
    }

    pub fn state(&self) -> LifecycleState {
        self.0.state.get()
    }

    pub fn context(&self) -> &Context {
        &self.0.ctx
    }

    pub fn is_teleported(&self) -> bool {
        self.0.teleport.get().is_some()
    }

    /// The node standing for this instance in its parent: the teleport
    /// anchor, the deactivation placeholder or the content's root node.
    pub fn root_node(&self) -> Option<NodeId> {
        if let Some(teleport) = self.0.teleport.get() {
            return Some(teleport.anchor);
        }
        self.0.placeholder.get().or_else(|| self.content_node())
    }

    /// The root node of the rendered content.
    pub fn content_node(&self) -> Option<NodeId> {
        self.0.tree.borrow().as_ref().and_then(VNode::node)
    }

    /// Number of (source, property) pairs the instance depends on.
    pub fn dependency_count(&self) -> usize {
        self.0.deps.borrow().len()
    }

    pub fn ptr_eq(&self, other: &Renderer) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Build the tree and create its nodes. Returns the node the parent
    /// should attach; nothing is mounted yet.
    pub(crate) fn render(&self, reconciler: &mut Reconciler) -> Result<NodeId> {
        let inner = &self.0;
        if inner.state.get() != LifecycleState::NotRendered {
            return Err(self.lifecycle_error("render"));
        }

        let target = self
            .hook(|c, ctx| c.before_mount(ctx))
            .filter(|_| !inner.options.ssr);
        let mut tree = match self.build() {
            Ok(tree) => tree,
            Err(error) => {
                self.discard();
                return Err(error);
            }
        };
        let node = reconciler.create(&mut tree);
        *inner.tree.borrow_mut() = Some(tree);
        inner.committed.set(Some(node));
        inner.state.set(LifecycleState::NotMounted);
        tracing::trace!(component = self.name(), %node, "rendered");

        match target {
            Some(target) => {
                let anchor = inner.backend.create_placeholder();
                inner.teleport.set(Some(Teleport { target, anchor }));
                Ok(anchor)
            }
            None => Ok(node),
        }
    }

    /// Mount descendants, attach teleported content, then run `mounted`
    /// and `activated`.
    pub(crate) fn mount(&self) {
        let inner = &self.0;
        if inner.state.get() != LifecycleState::NotMounted {
            return;
        }
        self.mount_children();
        if let Some(teleport) = inner.teleport.get() {
            if let Some(node) = self.content_node() {
                inner.backend.append_child(teleport.target, node);
            }
        }
        inner.state.set(LifecycleState::Activated);
        self.hook(|c, ctx| c.mounted(ctx));
        self.hook(|c, ctx| c.activated(ctx));
    }

    /// Rebuild and patch the tree.
    ///
    /// Calls made before the scheduled reset in the next microtask flush are
    /// coalesced into the first. Only an activated instance updates.
    pub fn update(&self) -> Result<()> {
        let inner = &self.0;
        match inner.state.get() {
            LifecycleState::Activated => {}
            LifecycleState::Uninstalling | LifecycleState::Unloaded => {
                tracing::warn!(error = %self.lifecycle_error("update"), "update ignored");
                return Ok(());
            }
            state => {
                tracing::debug!(component = self.name(), ?state, "update skipped");
                return Ok(());
            }
        }
        if inner.update_pending.replace(true) {
            return Ok(());
        }
        let weak: Weak<Instance> = Rc::downgrade(&self.0);
        scheduler::queue_microtask(move || {
            if let Some(inner) = weak.upgrade() {
                inner.update_pending.set(false);
            }
        });

        self.hook(|c, ctx| c.before_update(ctx));
        let mut next = self.build()?;
        let previous = inner.tree.borrow_mut().take();
        let mut reconciler = Reconciler::new(inner.backend.clone(), inner.options);
        let tree = match previous {
            Some(previous) => reconciler.patch(previous, next),
            None => {
                let node = reconciler.create(&mut next);
                self.reattach(node);
                next
            }
        };
        inner.committed.set(tree.node());
        *inner.tree.borrow_mut() = Some(tree);
        self.mount_children();
        let outcome = reconciler.finish();
        self.hook(|c, ctx| c.updated(ctx));
        tracing::trace!(component = self.name(), "updated");
        outcome
    }

    /// Unmount the instance and remove its nodes.
    ///
    /// Unmounting twice logs a warning and does nothing.
    pub fn unmount(&self) {
        self.unmount_with(true);
    }

    /// `detach` is false when an ancestor's node removal takes this
    /// instance's nodes with it. Teleported content is removed either way.
    pub(crate) fn unmount_with(&self, detach: bool) {
        let inner = &self.0;
        match inner.state.get() {
            LifecycleState::Uninstalling | LifecycleState::Unloaded => {
                tracing::warn!(error = %self.lifecycle_error("unmount"), "unmount ignored");
                return;
            }
            LifecycleState::NotRendered => {
                self.discard();
                return;
            }
            _ => {}
        }
        inner.state.set(LifecycleState::Uninstalling);

        let pending = if detach {
            self.hook(|c, ctx| c.before_remove(ctx))
        } else {
            None
        };
        self.hook(|c, ctx| c.before_unmount(ctx));

        let teleport = inner.teleport.get();
        let placeholder = inner.placeholder.take();
        let mut removals = Vec::new();
        if let (true, Some(teleport)) = (detach, teleport) {
            removals.push(teleport.anchor);
        }
        removals.extend(placeholder);
        if detach || teleport.is_some() || placeholder.is_some() {
            removals.extend(self.content_node().or(inner.committed.get()));
        }
        inner.committed.set(None);

        let tree = inner.tree.borrow_mut().take();
        if let Some(tree) = &tree {
            reconcile::release(tree);
        }
        inner.ctx.scope().destroy();
        inner.effect.borrow_mut().take();

        let backend = inner.backend.clone();
        let remove = move || {
            for node in removals {
                backend.remove_node(node);
            }
        };
        match pending {
            Some(signal) if !signal.is_resolved() => signal.then(remove),
            _ => remove(),
        }
        drop(tree);

        inner.state.set(LifecycleState::Unloaded);
        self.hook(|c, ctx| c.unmounted(ctx));
        tracing::trace!(component = self.name(), "unmounted");
    }

    /// Pause the instance's effects and swap its content for a
    /// placeholder. Descendants are paused too.
    pub fn deactivate(&self) {
        self.deactivate_with(true);
    }

    fn deactivate_with(&self, swap: bool) {
        let inner = &self.0;
        if inner.state.get() != LifecycleState::Activated {
            tracing::debug!(component = self.name(), state = ?inner.state.get(), "deactivate skipped");
            return;
        }
        inner.ctx.scope().pause();
        if swap {
            let attached = self
                .content_node()
                .and_then(|node| inner.backend.parent_node(node).map(|parent| (parent, node)));
            if let Some((parent, node)) = attached {
                let placeholder = inner.backend.create_placeholder();
                inner.backend.replace_child(parent, placeholder, node);
                inner.placeholder.set(Some(placeholder));
            }
        }
        for child in self.child_instances() {
            child.deactivate_with(false);
        }
        inner.state.set(LifecycleState::Deactivated);
        self.hook(|c, ctx| c.deactivated(ctx));
    }

    /// Undo [`deactivate`](Self::deactivate). Changes missed while paused
    /// produce exactly one update.
    pub fn activate(&self) {
        let inner = &self.0;
        if inner.state.get() != LifecycleState::Deactivated {
            tracing::debug!(component = self.name(), state = ?inner.state.get(), "activate skipped");
            return;
        }
        if let Some(placeholder) = inner.placeholder.take() {
            let parent = inner.backend.parent_node(placeholder);
            if let (Some(parent), Some(node)) = (parent, self.content_node()) {
                inner.backend.replace_child(parent, node, placeholder);
            }
            inner.backend.remove_node(placeholder);
        }
        inner.ctx.scope().unpause();
        for child in self.child_instances() {
            // a child deactivated on its own keeps its placeholder
            if child.0.placeholder.get().is_none() {
                child.activate();
            }
        }
        inner.state.set(LifecycleState::Activated);
        self.hook(|c, ctx| c.activated(ctx));

        let missed = inner.effect.borrow().as_ref().is_some_and(Listener::take_missed);
        if missed {
            if let Err(error) = self.update() {
                report_error(&error);
            }
        }
    }

    pub(crate) fn receive(&self, props: &IndexMap<String, Value>, children: &[Option<VNode>]) {
        Depend::untracked(|| self.0.ctx.receive(props, children));
    }

    fn build(&self) -> Result<VNode> {
        let inner = &self.0;
        let (result, deps) = inner.ctx.scope().run(|| {
            Depend::collect(|| {
                panic::catch_unwind(AssertUnwindSafe(|| inner.component.build(&inner.ctx)))
                    .unwrap_or_else(|payload| Err(panic_message(payload.as_ref()).into()))
            })
        });
        self.track(&deps);

        match result {
            Ok(tree) => Ok(tree),
            Err(source) => {
                let error = Error::Build {
                    component: self.name(),
                    source,
                };
                tracing::debug!(%error, "build failed");
                match self.hook(|c, ctx| c.on_error(ctx, &error)) {
                    Some(fallback) => Ok(fallback),
                    None => Err(error),
                }
            }
        }
    }

    /// Put freshly created content where the last committed root was. Only
    /// needed when an earlier patch unwound and took the tree with it.
    fn reattach(&self, node: NodeId) {
        let inner = &self.0;
        let Some(stale) = inner.committed.get() else {
            return;
        };
        match inner.backend.parent_node(stale) {
            Some(parent) => {
                inner.backend.replace_child(parent, node, stale);
                inner.backend.remove_node(stale);
            }
            None => tracing::warn!(component = self.name(), %stale, "lost tree had no attached root"),
        }
    }

    /// Bind the pairs not yet bound. Dependencies only grow.
    fn track(&self, deps: &Dependencies) {
        let added = deps.difference(&self.0.deps.borrow());
        if added.is_empty() {
            return;
        }
        self.0.deps.borrow_mut().merge(&added);
        Observers::bind_dependencies(&added, &self.effect(), true);
    }

    /// The re-render listener, created with the first dependency.
    fn effect(&self) -> Listener {
        if let Some(listener) = self.0.effect.borrow().as_ref() {
            return listener.clone();
        }
        let weak: Weak<Instance> = Rc::downgrade(&self.0);
        let listener = Listener::detached(
            move |_| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if let Err(error) = Renderer(inner).update() {
                    report_error(&error);
                }
            },
            0,
        );
        self.0.ctx.scope().add(Rc::new(listener.clone()));
        *self.0.effect.borrow_mut() = Some(listener.clone());
        listener
    }

    fn hook<R>(&self, f: impl FnOnce(&dyn Component, &Context) -> R) -> R {
        let inner = &self.0;
        inner
            .ctx
            .scope()
            .run(|| Depend::untracked(|| f(inner.component.as_ref(), &inner.ctx)))
    }

    fn mount_children(&self) {
        for child in self.child_instances() {
            child.mount();
        }
    }

    fn child_instances(&self) -> Vec<Renderer> {
        let mut out = Vec::new();
        if let Some(tree) = self.0.tree.borrow().as_ref() {
            reconcile::collect_instances(tree, &mut out);
        }
        out
    }

    /// Drop an instance that never rendered.
    fn discard(&self) {
        self.0.ctx.scope().destroy();
        self.0.effect.borrow_mut().take();
        self.0.state.set(LifecycleState::Unloaded);
    }

    fn lifecycle_error(&self, operation: &'static str) -> Error {
        Error::Lifecycle {
            component: self.name(),
            state: self.state(),
            operation,
        }
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("component", &self.name())
            .field("state", &self.state())
            .field("teleported", &self.is_teleported())
            .finish()
    }
}
