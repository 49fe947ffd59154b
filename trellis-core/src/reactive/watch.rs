//! The watch family
//!
//! These functions turn user callbacks into [`Listener`]s bound in the
//! registry:
//!
//! - [`watch`] observes a wrapper, a cell, a getter or several sources.
//! - [`watch_value`] hands the callback deep-cloned old and new snapshots.
//! - [`watch_props`] and [`watch_prop`] observe selected properties.
//! - [`watch_effect`] re-runs a function whenever anything it read changes.
//!   Components re-render through it.
//!
//! Listeners returned here join the current [`Scope`](super::Scope).
//! Closures the registry stores hold sources weakly, so watching a source
//! does not keep it alive.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::WatchOptions;
use crate::error::{Error, Result};

use super::cell::{Ref, WeakRef};
use super::context::{Depend, Dependencies};
use super::listener::{Change, Listener};
use super::registry::Observers;
use super::scope::{Scope, WeakScope};
use super::value::{Obj, Observable, Prop, SourceId, Value, WeakObj};
use super::wrapper::{Reactive, WeakReactive};

/// What [`watch`] observes.
#[derive(Clone)]
pub enum WatchSource {
    /// Every property of a wrapper.
    Reactive(Reactive),
    /// A reference cell.
    Ref(Ref),
    /// Whatever the getter resolves to. A getter returning an object watches
    /// that object; a getter returning a primitive must read exactly one
    /// tracked property.
    Getter(Rc<dyn Fn() -> Value>),
    /// Several wrappers, cells or objects. Changes carry the index of the
    /// source that changed.
    Many(Vec<Value>),
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        WatchSource::Getter(Rc::new(f))
    }
}

impl From<Reactive> for WatchSource {
    fn from(r: Reactive) -> Self {
        WatchSource::Reactive(r)
    }
}

impl From<&Reactive> for WatchSource {
    fn from(r: &Reactive) -> Self {
        WatchSource::Reactive(r.clone())
    }
}

impl From<Ref> for WatchSource {
    fn from(cell: Ref) -> Self {
        WatchSource::Ref(cell)
    }
}

impl From<&Ref> for WatchSource {
    fn from(cell: &Ref) -> Self {
        WatchSource::Ref(cell.clone())
    }
}

impl From<Vec<Value>> for WatchSource {
    fn from(values: Vec<Value>) -> Self {
        WatchSource::Many(values)
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Reactive(r) => f.debug_tuple("Reactive").field(r).finish(),
            WatchSource::Ref(cell) => f.debug_tuple("Ref").field(cell).finish(),
            WatchSource::Getter(_) => f.write_str("Getter"),
            WatchSource::Many(values) => f.debug_tuple("Many").field(values).finish(),
        }
    }
}

/// Resolve a watch source to the (source, property) bindings it needs.
enum Target {
    One(SourceId, Prop),
    Across(Vec<SourceId>),
}

fn resolve(source: &WatchSource) -> Result<Target> {
    match source {
        WatchSource::Reactive(r) => Ok(Target::One(r.source_id(), Prop::All)),
        WatchSource::Ref(cell) => Ok(Target::One(cell.source_id(), Prop::All)),
        WatchSource::Getter(getter) => {
            let (value, deps) = Depend::collect(|| getter());
            match &value {
                Value::Reactive(_) | Value::Object(_) | Value::Ref(_) => {
                    let id = Observers::observed_target(&value).ok_or(Error::EmptyDependencies)?;
                    Ok(Target::One(id, Prop::All))
                }
                _ => single_dependency(&deps).map(|(id, prop)| Target::One(id, prop)),
            }
        }
        WatchSource::Many(values) => {
            if values.is_empty() {
                return Err(Error::EmptyDependencies);
            }
            values
                .iter()
                .map(|value| {
                    Observers::observed_target(value).ok_or(Error::NotReactive { kind: value.kind() })
                })
                .collect::<Result<Vec<_>>>()
                .map(Target::Across)
        }
    }
}

fn single_dependency(deps: &Dependencies) -> Result<(SourceId, Prop)> {
    match deps.single() {
        Some((source, prop)) => Ok((source, prop.clone())),
        None if deps.is_empty() => Err(Error::EmptyDependencies),
        None => Err(Error::AmbiguousGetter { count: deps.len() }),
    }
}

/// Observe `source`.
///
/// Configuration mistakes (no dependency, a primitive in a source list, a
/// getter reading several properties for a primitive result) fail here.
pub fn watch<F>(source: impl Into<WatchSource>, callback: F, options: WatchOptions) -> Result<Listener>
where
    F: Fn(&Change<'_>) + 'static,
{
    match resolve(&source.into())? {
        Target::One(id, prop) => Ok(Observers::register(&id, prop, callback, options)),
        Target::Across(ids) => Observers::register_across(&ids, callback, options),
    }
}

/// Weak handle used to re-read a watched source for snapshots.
enum Snapshot {
    Reactive(WeakReactive),
    Ref(WeakRef),
    Obj(WeakObj),
    Getter(Rc<dyn Fn() -> Value>),
    Many(Vec<Snapshot>),
    Null,
}

impl Snapshot {
    fn of(source: &WatchSource) -> Snapshot {
        match source {
            WatchSource::Reactive(r) => Snapshot::Reactive(r.downgrade()),
            WatchSource::Ref(cell) => Snapshot::Ref(cell.downgrade()),
            WatchSource::Getter(getter) => Snapshot::Getter(getter.clone()),
            WatchSource::Many(values) => Snapshot::Many(values.iter().map(Snapshot::of_value).collect()),
        }
    }

    fn of_value(value: &Value) -> Snapshot {
        match value {
            Value::Reactive(r) => Snapshot::Reactive(r.downgrade()),
            Value::Ref(cell) => Snapshot::Ref(cell.downgrade()),
            Value::Object(obj) => Snapshot::Obj(obj.downgrade()),
            _ => Snapshot::Null,
        }
    }

    /// A deep copy of the current value, read without tracking.
    fn take(&self) -> Value {
        match self {
            Snapshot::Reactive(weak) => weak
                .upgrade()
                .map_or(Value::Null, |r| Value::Object(r.raw()).deep_clone()),
            Snapshot::Ref(weak) => weak
                .upgrade()
                .map_or(Value::Null, |cell| cell.get_untracked().deep_clone()),
            Snapshot::Obj(weak) => weak
                .upgrade()
                .map_or(Value::Null, |obj| Value::Object(obj).deep_clone()),
            Snapshot::Getter(getter) => Depend::untracked(|| getter()).deep_clone(),
            Snapshot::Many(parts) => Value::Object(Obj::list(parts.iter().map(Snapshot::take))),
            Snapshot::Null => Value::Null,
        }
    }
}

/// Observe `source`, handing the callback deep-cloned `(old, new)` snapshots.
///
/// Every change deep-clones the whole source; prefer [`watch`] where the
/// changed property names are enough.
pub fn watch_value<F>(
    source: impl Into<WatchSource>,
    callback: F,
    options: WatchOptions,
) -> Result<Listener>
where
    F: Fn(&Value, &Value) + 'static,
{
    let source = source.into();
    let snapshot = Snapshot::of(&source);
    let last = RefCell::new(snapshot.take());
    watch(
        source,
        move |_| {
            let new = snapshot.take();
            let old = last.replace(new.clone());
            callback(&old, &new);
        },
        options,
    )
}

/// Observe a subset of the properties of `target`.
pub fn watch_props<F, I, P>(
    target: &impl Observable,
    props: I,
    callback: F,
    options: WatchOptions,
) -> Result<Listener>
where
    F: Fn(&Change<'_>) + 'static,
    I: IntoIterator<Item = P>,
    P: Into<Prop>,
{
    Observers::register_many(target, props, callback, options)
}

/// Observe a single property of `target`.
pub fn watch_prop<F>(target: &impl Observable, prop: &str, callback: F, options: WatchOptions) -> Listener
where
    F: Fn(&Change<'_>) + 'static,
{
    Observers::register(target, prop, callback, options)
}

/// Run `f` now and again whenever anything it read changes.
///
/// Properties `f` reads for the first time on a re-run become dependencies
/// too. Re-runs happen inside the scope current at creation, so anything
/// they create is owned by it. Returns `None`, creating no listener, if the
/// first run read nothing.
pub fn watch_effect<F>(f: F, options: WatchOptions) -> Option<Listener>
where
    F: Fn() + 'static,
{
    let f = Rc::new(f);
    let ((), deps) = Depend::collect(|| f());
    if deps.is_empty() {
        tracing::debug!("effect read no tracked state; not watching");
        return None;
    }

    let known = Rc::new(RefCell::new(deps.clone()));
    let batch = options.batch;
    let owner = owning_scope();
    let listener = Listener::cyclic(
        |me| {
            move |_: &Change<'_>| {
                let ((), deps) = owner.run(|| Depend::collect(|| f()));
                let added = deps.difference(&known.borrow());
                if added.is_empty() {
                    return;
                }
                known.borrow_mut().merge(&added);
                if let Some(me) = me.upgrade() {
                    Observers::bind_dependencies(&added, &me, batch);
                }
            }
        },
        options.limit,
    );
    Observers::bind_dependencies(&deps, &listener, batch);
    Some(listener)
}

/// Run `f` once to find its dependencies, then call `callback` whenever
/// one of them changes.
pub fn watch_effect_then<F, C>(f: F, callback: C, options: WatchOptions) -> Option<Listener>
where
    F: FnOnce(),
    C: Fn(&Change<'_>) + 'static,
{
    let ((), deps) = Depend::collect(f);
    if deps.is_empty() {
        return None;
    }
    let owner = owning_scope();
    let listener = Listener::new(
        move |change: &Change<'_>| owner.run(|| callback(change)),
        options.limit,
    );
    Observers::bind_dependencies(&deps, &listener, options.batch);
    Some(listener)
}

/// The current scope, or a dead handle when there is none.
fn owning_scope() -> WeakScope {
    Scope::current().map_or_else(|| Scope::detached().downgrade(), |scope| scope.downgrade())
}
