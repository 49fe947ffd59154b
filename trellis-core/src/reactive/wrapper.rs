//! Reactive Wrapper
//!
//! [`Reactive`] is the explicit interception layer over a plain [`Obj`]:
//! every read goes through a method that reports the dependency to the
//! collector, and every effective write reports the change to the registry.
//!
//! # Tracking keys
//!
//! - Records track each field under its own key. Reads that depend on the
//!   whole key set (`len`, `keys`, `values`, `entries`) track the wildcard.
//! - Lists, maps and sets track everything under one logical `size` key:
//!   any mutation triggers `size`, any read tracks it.
//!
//! # Deep mode
//!
//! A deep wrapper wraps nested objects lazily, the first time they are
//! read, and stores the wrapper back into the slot. A synchronous link then
//! re-triggers the parent's key whenever the nested object changes.
//!
//! # Identity
//!
//! An object has at most one live wrapper: wrapping an object that already
//! has one returns it, and wrapping a wrapper returns the wrapper itself.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::{Error, Result};

use super::context::Depend;
use super::listener::Listener;
use super::registry::Observers;
use super::value::{Data, Obj, Observable, Prop, SourceId, Value};

/// Key under which collection reads and writes are tracked.
pub const SIZE_PROP: &str = "size";

/// A tracked wrapper around an object.
#[derive(Clone)]
pub struct Reactive(Rc<ReactiveInner>);

/// Non-owning handle to a [`Reactive`].
#[derive(Clone)]
pub struct WeakReactive(Weak<ReactiveInner>);

pub(crate) struct ReactiveInner {
    raw: Obj,
    deep: bool,
    /// Upward links from wrapped children, keyed by child and parent key.
    links: RefCell<IndexMap<(SourceId, Prop), Listener>>,
}

impl Drop for ReactiveInner {
    fn drop(&mut self) {
        let links = std::mem::take(self.links.get_mut());
        for (_, link) in links {
            link.destroy();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Record,
    List,
    Map,
    Set,
}

/// Where a nested value lives inside its parent.
#[derive(Clone, Copy)]
enum Slot<'a> {
    Key(&'a str),
    Index(usize),
}

fn size() -> Prop {
    Prop::name(SIZE_PROP)
}

/// Wrap an object deeply.
///
/// Fails with [`Error::NotReactive`] for values without an object identity.
pub fn reactive(value: impl Into<Value>) -> Result<Reactive> {
    wrap(value.into(), true)
}

/// Wrap an object without wrapping the objects nested inside it.
pub fn shallow_reactive(value: impl Into<Value>) -> Result<Reactive> {
    wrap(value.into(), false)
}

fn wrap(value: Value, deep: bool) -> Result<Reactive> {
    match value {
        Value::Reactive(r) => Ok(r),
        Value::Object(obj) => Ok(Reactive::for_obj(obj, deep)),
        other => Err(Error::NotReactive { kind: other.kind() }),
    }
}

/// The unwrapped form of `value`: wrappers become their raw object.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Reactive(r) => Value::Object(r.raw()),
        other => other.clone(),
    }
}

pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Reactive(_))
}

impl Reactive {
    /// The wrapper of `obj`, created on first use.
    ///
    /// The first wrap decides whether the wrapper is deep.
    pub(crate) fn for_obj(obj: Obj, deep: bool) -> Reactive {
        if let Some(inner) = obj.0.wrapper.borrow().upgrade() {
            return Reactive(inner);
        }
        let inner = Rc::new(ReactiveInner {
            raw: obj.clone(),
            deep,
            links: RefCell::new(IndexMap::new()),
        });
        *obj.0.wrapper.borrow_mut() = Rc::downgrade(&inner);
        Reactive(inner)
    }

    pub fn record<K, I>(fields: I) -> Reactive
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::for_obj(Obj::record(fields), true)
    }

    pub fn list<I>(items: I) -> Reactive
    where
        I: IntoIterator<Item = Value>,
    {
        Self::for_obj(Obj::list(items), true)
    }

    pub fn map<K, I>(entries: I) -> Reactive
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::for_obj(Obj::map(entries), true)
    }

    pub fn set_of<K, I>(members: I) -> Reactive
    where
        K: Into<String>,
        I: IntoIterator<Item = K>,
    {
        Self::for_obj(Obj::set(members), true)
    }

    /// Build a deep wrapper from a JSON object or array.
    pub fn from_json(json: &serde_json::Value) -> Result<Reactive> {
        reactive(Value::from_json(json))
    }

    /// The wrapped object.
    pub fn raw(&self) -> Obj {
        self.0.raw.clone()
    }

    pub fn is_deep(&self) -> bool {
        self.0.deep
    }

    pub fn kind(&self) -> &'static str {
        self.0.raw.kind()
    }

    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakReactive {
        WeakReactive(Rc::downgrade(&self.0))
    }

    /// Export the current contents as JSON without tracking.
    pub fn to_json(&self) -> serde_json::Value {
        Value::Object(self.raw()).to_json()
    }

    // ---- reads ----

    /// Read a record field or map entry.
    ///
    /// Record fields holding a [`Ref`](super::Ref) yield the cell's value.
    pub fn get(&self, key: &str) -> Value {
        match self.shape() {
            Shape::Record => {
                Depend::track(self.source_id(), key);
                let current = self.0.raw.with_data(|data| match data {
                    Data::Record(fields) => fields.get(key).cloned(),
                    _ => None,
                });
                match current {
                    None => Value::Null,
                    Some(Value::Ref(cell)) => cell.get(),
                    Some(value) => self.nested(Slot::Key(key), value, Prop::name(key)),
                }
            }
            Shape::Map => {
                self.track_size();
                let current = self.0.raw.with_data(|data| match data {
                    Data::Map(entries) => entries.get(key).cloned(),
                    _ => None,
                });
                current.map_or(Value::Null, |value| self.nested(Slot::Key(key), value, size()))
            }
            _ => {
                self.misuse("get");
                Value::Null
            }
        }
    }

    /// Whether a record field, map key or set member exists.
    pub fn has(&self, key: &str) -> bool {
        match self.shape() {
            Shape::Record => {
                Depend::track(self.source_id(), key);
                self.0.raw.with_data(|data| match data {
                    Data::Record(fields) => fields.contains_key(key),
                    _ => false,
                })
            }
            Shape::Map | Shape::Set => {
                self.track_size();
                self.0.raw.with_data(|data| match data {
                    Data::Map(entries) => entries.contains_key(key),
                    Data::Set(members) => members.contains(key),
                    _ => false,
                })
            }
            Shape::List => {
                self.misuse("has");
                false
            }
        }
    }

    /// Read a list item.
    pub fn at(&self, index: usize) -> Value {
        if self.shape() != Shape::List {
            self.misuse("at");
            return Value::Null;
        }
        self.track_size();
        let current = self.0.raw.with_data(|data| match data {
            Data::List(items) => items.get(index).cloned(),
            _ => None,
        });
        current.map_or(Value::Null, |value| self.nested(Slot::Index(index), value, size()))
    }

    pub fn len(&self) -> usize {
        self.track_shape();
        self.0.raw.with_data(Data::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record field names, map keys or set members, in order.
    pub fn keys(&self) -> Vec<String> {
        self.track_shape();
        self.0.raw.with_data(|data| match data {
            Data::Record(fields) | Data::Map(fields) => fields.keys().cloned().collect(),
            Data::Set(members) => members.iter().cloned().collect(),
            Data::List(_) => Vec::new(),
        })
    }

    /// Every value, in order. Set members are returned as strings.
    pub fn values(&self) -> Vec<Value> {
        match self.shape() {
            Shape::Record | Shape::Map => self.entries().into_iter().map(|(_, v)| v).collect(),
            Shape::List => {
                self.track_size();
                let count = self.0.raw.with_data(Data::len);
                (0..count).map(|index| self.at(index)).collect()
            }
            Shape::Set => self.keys().into_iter().map(Value::from).collect(),
        }
    }

    /// Alias of [`values`](Self::values) for lists.
    pub fn to_vec(&self) -> Vec<Value> {
        self.values()
    }

    /// Record fields or map entries, in order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        let shape = self.shape();
        if !matches!(shape, Shape::Record | Shape::Map) {
            self.misuse("entries");
            return Vec::new();
        }
        self.track_shape();
        let current: Vec<(String, Value)> = self.0.raw.with_data(|data| match data {
            Data::Record(fields) | Data::Map(fields) => {
                fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            _ => Vec::new(),
        });
        current
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::Ref(cell) if shape == Shape::Record => cell.get(),
                    value => {
                        let prop = if shape == Shape::Record {
                            Prop::name(&key)
                        } else {
                            size()
                        };
                        self.nested(Slot::Key(&key), value, prop)
                    }
                };
                (key, value)
            })
            .collect()
    }

    // ---- writes ----

    /// Write a record field or map entry.
    ///
    /// Returns whether anything changed. Writing the current value is a
    /// no-op; writing a record field that holds a reference cell writes
    /// through the cell.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = self.incoming(value.into());
        match self.shape() {
            Shape::Record => self.set_field(key, value),
            Shape::Map => self.set_entry(key, value),
            _ => {
                self.misuse("set");
                false
            }
        }
    }

    fn set_field(&self, key: &str, value: Value) -> bool {
        let current = self.0.raw.with_data(|data| match data {
            Data::Record(fields) => fields.get(key).cloned(),
            _ => None,
        });

        if let Some(Value::Ref(cell)) = &current {
            if !matches!(value, Value::Ref(_)) {
                let changed = cell.set(value);
                if changed {
                    Observers::trigger(self.source_id(), &[Prop::name(key)]);
                }
                return changed;
            }
        }
        if current.as_ref().is_some_and(|c| c.same_value(&value)) {
            return false;
        }

        let old = self.0.raw.with_data_mut(|data| match data {
            Data::Record(fields) => fields.insert(key.to_owned(), value),
            _ => None,
        });
        let prop = Prop::name(key);
        if let Some(old) = &old {
            self.release(old, &prop);
        }
        drop(old);
        Observers::trigger(self.source_id(), &[prop]);
        true
    }

    fn set_entry(&self, key: &str, value: Value) -> bool {
        let unchanged = self.0.raw.with_data(|data| match data {
            Data::Map(entries) => entries.get(key).is_some_and(|c| c.same_value(&value)),
            _ => true,
        });
        if unchanged {
            return false;
        }
        let old = self.0.raw.with_data_mut(|data| match data {
            Data::Map(entries) => entries.insert(key.to_owned(), value),
            _ => None,
        });
        if let Some(old) = &old {
            self.release(old, &size());
        }
        drop(old);
        self.trigger_size();
        true
    }

    /// Remove a record field, map entry or set member.
    ///
    /// Triggers only if it existed.
    pub fn delete(&self, key: &str) -> bool {
        let shape = self.shape();
        let removed = self.0.raw.with_data_mut(|data| match data {
            Data::Record(fields) | Data::Map(fields) => fields.shift_remove(key).map(Some),
            Data::Set(members) => members.shift_remove(key).then_some(None),
            Data::List(_) => None,
        });
        match (shape, removed) {
            (Shape::List, _) => {
                self.misuse("delete");
                false
            }
            (_, None) => false,
            (Shape::Record, Some(old)) => {
                let prop = Prop::name(key);
                if let Some(old) = &old {
                    self.release(old, &prop);
                }
                drop(old);
                Observers::trigger(self.source_id(), &[prop]);
                true
            }
            (_, Some(old)) => {
                if let Some(old) = &old {
                    self.release(old, &size());
                }
                drop(old);
                self.trigger_size();
                true
            }
        }
    }

    /// Add a set member. Triggers only if it was absent.
    pub fn add(&self, member: &str) -> bool {
        if self.shape() != Shape::Set {
            self.misuse("add");
            return false;
        }
        let added = self.0.raw.with_data_mut(|data| match data {
            Data::Set(members) => members.insert(member.to_owned()),
            _ => false,
        });
        if added {
            self.trigger_size();
        }
        added
    }

    /// Remove everything. Triggers only if something was removed.
    pub fn clear(&self) -> bool {
        let shape = self.shape();
        let removed: Vec<(String, Value)> = self.0.raw.with_data_mut(|data| match data {
            Data::Record(fields) | Data::Map(fields) => fields.drain(..).collect(),
            Data::List(items) => items
                .drain(..)
                .map(|item| (String::new(), item))
                .collect(),
            Data::Set(members) => members
                .drain(..)
                .map(|member| (member, Value::Null))
                .collect(),
        });
        if removed.is_empty() {
            return false;
        }

        if shape == Shape::Record {
            let props: Vec<Prop> = removed.iter().map(|(key, _)| Prop::name(key)).collect();
            for ((_, old), prop) in removed.iter().zip(&props) {
                self.release(old, prop);
            }
            drop(removed);
            Observers::trigger(self.source_id(), &props);
        } else {
            let prop = size();
            for (_, old) in &removed {
                self.release(old, &prop);
            }
            drop(removed);
            self.trigger_size();
        }
        true
    }

    /// Append a list item.
    pub fn push(&self, value: impl Into<Value>) {
        let value = self.incoming(value.into());
        if self.shape() != Shape::List {
            self.misuse("push");
            return;
        }
        self.0.raw.with_data_mut(|data| {
            if let Data::List(items) = data {
                items.push(value);
            }
        });
        self.trigger_size();
    }

    /// Remove and return the last list item.
    pub fn pop(&self) -> Option<Value> {
        if self.shape() != Shape::List {
            self.misuse("pop");
            return None;
        }
        let old = self.0.raw.with_data_mut(|data| match data {
            Data::List(items) => items.pop(),
            _ => None,
        })?;
        self.release(&old, &size());
        self.trigger_size();
        Some(to_raw(&old))
    }

    /// Insert a list item at `index`, clamped to the list length.
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let value = self.incoming(value.into());
        if self.shape() != Shape::List {
            self.misuse("insert");
            return;
        }
        self.0.raw.with_data_mut(|data| {
            if let Data::List(items) = data {
                let index = index.min(items.len());
                items.insert(index, value);
            }
        });
        self.trigger_size();
    }

    /// Remove and return the list item at `index`.
    pub fn remove_at(&self, index: usize) -> Option<Value> {
        if self.shape() != Shape::List {
            self.misuse("remove_at");
            return None;
        }
        let old = self.0.raw.with_data_mut(|data| match data {
            Data::List(items) if index < items.len() => Some(items.remove(index)),
            _ => None,
        })?;
        self.release(&old, &size());
        self.trigger_size();
        Some(to_raw(&old))
    }

    /// Replace the list item at `index`. Out-of-range writes are ignored.
    pub fn set_at(&self, index: usize, value: impl Into<Value>) -> bool {
        let value = self.incoming(value.into());
        if self.shape() != Shape::List {
            self.misuse("set_at");
            return false;
        }
        let old = self.0.raw.with_data_mut(|data| match data {
            Data::List(items) => match items.get_mut(index) {
                Some(slot) if !slot.same_value(&value) => Some(std::mem::replace(slot, value)),
                _ => None,
            },
            _ => None,
        });
        let Some(old) = old else {
            return false;
        };
        self.release(&old, &size());
        drop(old);
        self.trigger_size();
        true
    }

    // ---- internals ----

    fn shape(&self) -> Shape {
        self.0.raw.with_data(|data| match data {
            Data::Record(_) => Shape::Record,
            Data::List(_) => Shape::List,
            Data::Map(_) => Shape::Map,
            Data::Set(_) => Shape::Set,
        })
    }

    /// Deep wrappers store raw objects; shallow ones store values as given.
    fn incoming(&self, value: Value) -> Value {
        if self.0.deep {
            to_raw(&value)
        } else {
            value
        }
    }

    fn track_size(&self) {
        Depend::track(self.source_id(), SIZE_PROP);
    }

    /// Track whatever a whole-object read depends on.
    fn track_shape(&self) {
        if self.shape() == Shape::Record {
            Depend::track_prop(self.source_id(), Prop::All);
        } else {
            self.track_size();
        }
    }

    fn trigger_size(&self) {
        Observers::trigger(self.source_id(), &[size()]);
    }

    fn misuse(&self, operation: &'static str) {
        tracing::warn!(operation, kind = self.kind(), "operation not supported by this reactive kind");
    }

    /// Deep mode: wrap a nested object, memoize the wrapper in its slot and
    /// link it to `prop`.
    fn nested(&self, slot: Slot<'_>, value: Value, prop: Prop) -> Value {
        if !self.0.deep {
            return value;
        }
        match value {
            Value::Object(obj) => {
                let child = Reactive::for_obj(obj, true);
                self.memoize(slot, &child);
                self.link(&child, prop);
                Value::Reactive(child)
            }
            Value::Reactive(child) => {
                self.link(&child, prop);
                Value::Reactive(child)
            }
            other => other,
        }
    }

    fn memoize(&self, slot: Slot<'_>, child: &Reactive) {
        let wrapped = Value::Reactive(child.clone());
        self.0.raw.with_data_mut(|data| {
            let target = match (data, slot) {
                (Data::Record(fields) | Data::Map(fields), Slot::Key(key)) => fields.get_mut(key),
                (Data::List(items), Slot::Index(index)) => items.get_mut(index),
                _ => None,
            };
            if let Some(target) = target {
                if target.same_value(&wrapped) {
                    *target = wrapped;
                }
            }
        });
    }

    fn link(&self, child: &Reactive, prop: Prop) {
        let key = (child.0.raw.id(), prop.clone());
        if self.0.links.borrow().contains_key(&key) {
            return;
        }

        let parent = self.source_id();
        // Cuts propagation cycles between objects that contain each other.
        let propagating = Cell::new(false);
        let listener = Listener::detached(
            move |_| {
                if propagating.replace(true) {
                    return;
                }
                Observers::trigger(parent, std::slice::from_ref(&prop));
                propagating.set(false);
            },
            0,
        );
        Observers::bind(child.source_id(), Prop::All, &listener, 0, false);
        self.0.links.borrow_mut().insert(key, listener);
    }

    /// Drop the upward link of a value leaving a slot.
    fn release(&self, old: &Value, prop: &Prop) {
        let Value::Reactive(child) = old else {
            return;
        };
        let link = self
            .0
            .links
            .borrow_mut()
            .shift_remove(&(child.0.raw.id(), prop.clone()));
        if let Some(link) = link {
            link.destroy();
        }
    }
}

impl WeakReactive {
    pub fn upgrade(&self) -> Option<Reactive> {
        self.0.upgrade().map(Reactive)
    }
}

impl Observable for Reactive {
    fn source_id(&self) -> SourceId {
        self.0.raw.observed_id()
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.0.deep { "deep" } else { "shallow" };
        write!(f, "Reactive({mode}, {:?})", self.0.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchOptions;
    use crate::reactive::Ref;
    use crate::scheduler::flush_microtasks;

    fn log_changes(r: &Reactive, batch: bool) -> (Listener, Rc<RefCell<Vec<Vec<String>>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let listener = Observers::register(
            r,
            Prop::All,
            move |change| {
                sink.borrow_mut()
                    .push(change.props.iter().map(ToString::to_string).collect());
            },
            WatchOptions {
                batch,
                ..WatchOptions::default()
            },
        );
        (listener, log)
    }

    #[test]
    fn record_reads_track_keys() {
        let state = Reactive::record([("x", Value::from(1)), ("y", Value::from(2))]);
        let (sum, deps) = Depend::collect(|| {
            let x = state.get("x").as_i64().unwrap_or(0);
            let y = state.get("y").as_i64().unwrap_or(0);
            x + y + state.get("x").as_i64().unwrap_or(0)
        });

        assert_eq!(sum, 4);
        assert_eq!(deps.len(), 2);
        assert!(deps.contains(state.source_id(), &Prop::name("x")));
        assert!(deps.contains(state.source_id(), &Prop::name("y")));
    }

    #[test]
    fn writing_the_same_value_is_a_no_op() {
        let state = Reactive::record([("x", Value::from(1))]);
        let (_listener, log) = log_changes(&state, true);

        assert!(!state.set("x", 1));
        assert!(!Observers::is_flush_scheduled());

        assert!(state.set("x", 2));
        flush_microtasks();
        assert_eq!(*log.borrow(), vec![vec!["x".to_owned()]]);
    }

    #[test]
    fn wrapping_is_idempotent() {
        let obj = Obj::record([("a", Value::from(1))]);
        let first = reactive(obj.clone()).unwrap();
        let second = reactive(obj.clone()).unwrap();
        let third = reactive(&first).unwrap();

        assert!(first.ptr_eq(&second));
        assert!(first.ptr_eq(&third));
        assert!(to_raw(&Value::from(&first)).same_value(&Value::from(obj)));
        assert!(matches!(reactive(3), Err(Error::NotReactive { kind: "int" })));
    }

    #[test]
    fn ref_slots_are_unwrapped_and_written_through() {
        let cell = Ref::new(1);
        let state = Reactive::record([("count", Value::from(&cell))]);

        assert_eq!(state.get("count"), Value::from(1));

        assert!(state.set("count", 5));
        assert_eq!(cell.get_untracked(), Value::from(5));
        assert!(!state.set("count", 5));

        // The slot still holds the cell.
        let stored = state.raw().with_data(|data| match data {
            Data::Record(fields) => fields.get("count").cloned(),
            _ => None,
        });
        assert!(matches!(stored, Some(Value::Ref(_))));
    }

    #[test]
    fn deep_wrapper_propagates_nested_changes() {
        let state = Reactive::from_json(&serde_json::json!({ "user": { "name": "ada" } })).unwrap();
        let user = state.get("user");
        let user = user.as_reactive().cloned().unwrap();

        // Memoized: the same wrapper comes back.
        assert!(state.get("user").as_reactive().is_some_and(|u| u.ptr_eq(&user)));

        let (_listener, log) = log_changes(&state, false);
        user.set("name", "grace");
        assert_eq!(*log.borrow(), vec![vec!["user".to_owned()]]);
    }

    #[test]
    fn replaced_child_no_longer_propagates() {
        let state = Reactive::from_json(&serde_json::json!({ "child": { "n": 1 } })).unwrap();
        let child = state.get("child").as_reactive().cloned().unwrap();
        state.set("child", Value::Null);

        let (_listener, log) = log_changes(&state, false);
        child.set("n", 2);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn shallow_wrapper_returns_raw_children() {
        let inner = Obj::record([("n", Value::from(1))]);
        let state = shallow_reactive(Obj::record([("inner", Value::from(inner))])).unwrap();
        assert!(matches!(state.get("inner"), Value::Object(_)));
    }

    #[test]
    fn delete_triggers_only_existing_keys() {
        let state = Reactive::record([("a", Value::from(1))]);
        let (_listener, log) = log_changes(&state, false);

        assert!(!state.delete("missing"));
        assert!(state.delete("a"));
        assert_eq!(*log.borrow(), vec![vec!["a".to_owned()]]);
    }

    #[test]
    fn collections_track_and_trigger_size() {
        let tags = Reactive::set_of(["a"]);
        let ((), deps) = Depend::collect(|| {
            tags.has("a");
            tags.len();
        });
        assert_eq!(deps.len(), 1);
        assert!(deps.contains(tags.source_id(), &Prop::name(SIZE_PROP)));

        let (_listener, log) = log_changes(&tags, false);
        assert!(!tags.add("a"));
        assert!(tags.add("b"));
        assert!(tags.delete("a"));
        assert_eq!(log.borrow().len(), 2);
        assert!(log.borrow().iter().all(|props| props == &vec![SIZE_PROP.to_owned()]));
    }

    #[test]
    fn list_operations() {
        let items = Reactive::list([Value::from(1), Value::from(2)]);
        items.push(3);
        items.insert(0, 0);
        assert_eq!(items.len(), 4);
        assert_eq!(items.at(0), Value::from(0));

        assert!(!items.set_at(1, 1));
        assert!(items.set_at(1, 10));
        assert!(!items.set_at(99, 1));

        assert_eq!(items.remove_at(1), Some(Value::from(10)));
        assert_eq!(items.pop(), Some(Value::from(3)));
        assert_eq!(items.to_vec(), vec![Value::from(0), Value::from(2)]);
        assert!(items.clear());
        assert!(!items.clear());
    }

    #[test]
    fn map_entries_and_wrong_kind_calls() {
        let scores = Reactive::map([("ada", Value::from(3))]);
        assert!(scores.set("grace", 5));
        assert!(!scores.set("grace", 5));
        assert_eq!(scores.keys(), vec!["ada".to_owned(), "grace".to_owned()]);
        assert_eq!(scores.get("ada"), Value::from(3));

        // Unsupported operations are ignored.
        assert!(!scores.add("x"));
        assert_eq!(scores.at(0), Value::Null);
        scores.push(1);
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn record_clear_triggers_every_key() {
        let state = Reactive::record([("a", Value::from(1)), ("b", Value::from(2))]);
        let (_listener, log) = log_changes(&state, true);
        assert!(state.clear());
        flush_microtasks();
        assert_eq!(*log.borrow(), vec![vec!["a".to_owned(), "b".to_owned()]]);
    }
}
