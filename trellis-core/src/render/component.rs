//! Component definitions.

use std::any::TypeId;
use std::cell::RefCell;
use std::fmt;

use indexmap::IndexMap;

use super::backend::NodeId;
use super::vnode::VNode;
use crate::error::{BoxError, Error};
use crate::reactive::{Obj, Reactive, Ref, Scope, Value};
use crate::scheduler::Deferred;

/// A component: state created once by `setup`, and a `build` function that
/// describes its output from that state.
///
/// `build` runs inside a tracked context. Every reactive read it performs
/// becomes a dependency of the instance, and a change to any of them
/// re-renders it. Hooks run untracked.
pub trait Component: 'static {
    fn setup(ctx: &Context) -> Self
    where
        Self: Sized;

    fn build(&self, ctx: &Context) -> Result<VNode, BoxError>;

    /// Return a node to render into instead of in place. The instance then
    /// leaves a placeholder where it would have been.
    fn before_mount(&self, _ctx: &Context) -> Option<NodeId> {
        None
    }

    fn mounted(&self, _ctx: &Context) {}

    fn before_update(&self, _ctx: &Context) {}

    fn updated(&self, _ctx: &Context) {}

    fn activated(&self, _ctx: &Context) {}

    fn deactivated(&self, _ctx: &Context) {}

    /// Return a pending signal to keep the instance's nodes attached until
    /// it resolves.
    fn before_remove(&self, _ctx: &Context) -> Option<Deferred> {
        None
    }

    fn before_unmount(&self, _ctx: &Context) {}

    fn unmounted(&self, _ctx: &Context) {}

    /// Called when `build` fails. Returning a node renders it in place of
    /// the failed output; returning `None` propagates the error.
    fn on_error(&self, _ctx: &Context, _error: &Error) -> Option<VNode> {
        None
    }
}

type Create = fn(&Context) -> Box<dyn Component>;

/// Runtime identity of a component type.
#[derive(Clone, Copy)]
pub struct ComponentType {
    type_id: TypeId,
    name: &'static str,
    create: Create,
}

impl ComponentType {
    pub fn of<C: Component>() -> Self {
        let full = std::any::type_name::<C>();
        Self {
            type_id: TypeId::of::<C>(),
            name: full.rsplit("::").next().unwrap_or(full),
            create: |ctx| Box::new(C::setup(ctx)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn create(&self, ctx: &Context) -> Box<dyn Component> {
        (self.create)(ctx)
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentType {}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComponentType").field(&self.name).finish()
    }
}

/// What a component instance sees: its props, the children passed to it and
/// the scope owning its effects.
pub struct Context {
    name: &'static str,
    props: Reactive,
    scope: Scope,
    slot: RefCell<Vec<Option<VNode>>>,
    slot_version: Ref,
}

impl Context {
    pub(crate) fn new(name: &'static str, props: IndexMap<String, Value>, children: Vec<Option<VNode>>) -> Self {
        Self {
            name,
            props: Reactive::for_obj(Obj::record(props), false),
            scope: Scope::detached(),
            slot: RefCell::new(children),
            slot_version: Ref::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The instance's props. Shallow: a prop holding a wrapper is returned
    /// as that wrapper.
    pub fn props(&self) -> &Reactive {
        &self.props
    }

    /// Read one prop, tracked.
    pub fn prop(&self, key: &str) -> Value {
        self.props.get(key)
    }

    /// Owns every listener created during setup, build and hooks.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The children the parent passed, as fresh descriptions. Tracked: a
    /// parent re-render that passes children re-renders this instance.
    pub fn children(&self) -> Vec<Option<VNode>> {
        self.slot_version.get();
        self.slot.borrow().clone()
    }

    pub(crate) fn receive(&self, props: &IndexMap<String, Value>, children: &[Option<VNode>]) {
        let stale: Vec<String> = self
            .props
            .raw()
            .with_data(|data| match data {
                crate::reactive::Data::Record(fields) => {
                    fields.keys().filter(|k| !props.contains_key(*k)).cloned().collect()
                }
                _ => Vec::new(),
            });
        for key in stale {
            self.props.delete(&key);
        }
        for (key, value) in props {
            self.props.set(key, value.clone());
        }

        let had_children = !self.slot.borrow().is_empty();
        if had_children || !children.is_empty() {
            *self.slot.borrow_mut() = children.to_vec();
            self.slot_version.update(|v| Value::Int(v.as_i64().unwrap_or(0) + 1));
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::reactive::{Depend, Observable, Prop};
    use crate::render::h;

    struct Label;

    impl Component for Label {
        fn setup(_ctx: &Context) -> Self {
            Label
        }

        fn build(&self, ctx: &Context) -> Result<VNode, BoxError> {
            Ok(h("span").child(ctx.prop("text").to_string()))
        }
    }

    struct Other;

    impl Component for Other {
        fn setup(_ctx: &Context) -> Self {
            Other
        }

        fn build(&self, _ctx: &Context) -> Result<VNode, BoxError> {
            Ok(h("i"))
        }
    }

    #[test]
    fn component_type_identity() {
        assert_eq!(ComponentType::of::<Label>(), ComponentType::of::<Label>());
        assert_ne!(ComponentType::of::<Label>(), ComponentType::of::<Other>());
        assert_eq!(ComponentType::of::<Label>().name(), "Label");
    }

    #[test]
    fn receive_updates_props_in_place() {
        let mut props = IndexMap::new();
        props.insert("a".to_owned(), Value::from(1));
        props.insert("b".to_owned(), Value::from(2));
        let ctx = Context::new("Label", props, Vec::new());

        let (_, deps) = Depend::collect(|| ctx.prop("a"));
        assert!(deps.contains(ctx.props().source_id(), &Prop::name("a")));

        let mut next = IndexMap::new();
        next.insert("a".to_owned(), Value::from(1));
        next.insert("c".to_owned(), Value::from(3));
        ctx.receive(&next, &[]);

        assert_eq!(ctx.props().keys(), vec!["a".to_owned(), "c".to_owned()]);
        assert_eq!(ctx.prop("c"), Value::from(3));
    }

    #[test]
    fn shallow_props_keep_wrappers() {
        let state = Reactive::record([("n", Value::from(1))]);
        let mut props = IndexMap::new();
        props.insert("state".to_owned(), Value::from(&state));
        let ctx = Context::new("Label", props, Vec::new());

        let passed = ctx.prop("state");
        assert!(passed.as_reactive().is_some_and(|r| r.ptr_eq(&state)));
    }

    #[test]
    fn children_are_tracked() {
        let ctx = Rc::new(Context::new("Label", IndexMap::new(), vec![Some(h("b"))]));
        let (children, deps) = Depend::collect(|| ctx.children());
        assert_eq!(children.len(), 1);
        assert!(!deps.is_empty());

        ctx.receive(&IndexMap::new(), &[Some(h("i")), None]);
        assert_eq!(ctx.children().len(), 2);
    }
}
