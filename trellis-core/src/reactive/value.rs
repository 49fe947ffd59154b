//! Value Model
//!
//! Reactive state is dynamic: a wrapper can hold records, lists, maps and
//! sets whose entries are primitives, nested objects, reference cells or
//! event handlers. [`Value`] is that dynamic value, and [`Obj`] is the plain
//! (unwrapped) object that a [`Reactive`] wrapper intercepts.
//!
//! # Identity
//!
//! Every object and reference cell carries a [`SourceId`]. The dependency
//! registry keys its tables by that id, so the registry never keeps a source
//! alive; when the last handle to an object is dropped, its registry entries
//! are removed.
//!
//! Primitives compare by value. Objects, wrappers, cells and handlers compare
//! by identity, with a wrapper and its raw object counting as the same
//! object.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::cell::Ref;
use super::registry::Observers;
use super::wrapper::{Reactive, ReactiveInner};

/// Identity of a tracked source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A property key as seen by the dependency registry.
///
/// `All` is the wildcard: a listener bound to it is notified whenever any
/// property of its source changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Prop {
    All,
    Name(Rc<str>),
}

impl Prop {
    pub fn name(name: &str) -> Self {
        Prop::Name(Rc::from(name))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Prop::All => None,
            Prop::Name(name) => Some(name),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Prop::All)
    }
}

impl From<&str> for Prop {
    fn from(name: &str) -> Self {
        Prop::name(name)
    }
}

impl From<String> for Prop {
    fn from(name: String) -> Self {
        Prop::Name(Rc::from(name))
    }
}

impl fmt::Display for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::All => f.write_str("*"),
            Prop::Name(name) => f.write_str(name),
        }
    }
}

/// Anything the registry can observe.
pub trait Observable {
    /// The id used for registry bookkeeping, after following redirects.
    fn source_id(&self) -> SourceId;
}

impl Observable for SourceId {
    fn source_id(&self) -> SourceId {
        *self
    }
}

/// An event handler or other callable stored in a value.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&Value)>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn call(&self, arg: &Value) {
        (self.0)(arg)
    }

    pub fn ptr_eq(&self, other: &Handler) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.0) as *const (),
            Rc::as_ptr(&other.0) as *const (),
        )
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// The contents of an object.
#[derive(Debug, Clone)]
pub enum Data {
    /// String-keyed fields, tracked per key.
    Record(IndexMap<String, Value>),
    /// An ordered list, tracked as a collection.
    List(Vec<Value>),
    /// A string-keyed map, tracked as a collection.
    Map(IndexMap<String, Value>),
    /// A set of strings, tracked as a collection.
    Set(IndexSet<String>),
}

impl Data {
    pub fn kind(&self) -> &'static str {
        match self {
            Data::Record(_) => "record",
            Data::List(_) => "list",
            Data::Map(_) => "map",
            Data::Set(_) => "set",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Data::Record(fields) | Data::Map(fields) => fields.len(),
            Data::List(items) => items.len(),
            Data::Set(members) => members.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether reads and writes are tracked under the single `size` key.
    pub fn is_collection(&self) -> bool {
        !matches!(self, Data::Record(_))
    }
}

/// A plain, untracked object.
///
/// Reads and writes through an `Obj` are invisible to the reactive engine;
/// wrap it with [`reactive`](super::reactive) to observe it.
#[derive(Clone)]
pub struct Obj(pub(crate) Rc<ObjInner>);

pub(crate) struct ObjInner {
    pub(crate) id: SourceId,
    pub(crate) data: RefCell<Data>,
    pub(crate) wrapper: RefCell<Weak<ReactiveInner>>,
    redirect: Cell<Option<SourceId>>,
}

/// Non-owning handle to an [`Obj`].
#[derive(Clone)]
pub struct WeakObj(Weak<ObjInner>);

impl WeakObj {
    pub fn upgrade(&self) -> Option<Obj> {
        self.0.upgrade().map(Obj)
    }
}

impl Drop for ObjInner {
    fn drop(&mut self) {
        Observers::forget(self.id);
    }
}

impl Obj {
    pub fn new(data: Data) -> Self {
        Self(Rc::new(ObjInner {
            id: SourceId::new(),
            data: RefCell::new(data),
            wrapper: RefCell::new(Weak::new()),
            redirect: Cell::new(None),
        }))
    }

    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::new(Data::Record(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::new(Data::List(items.into_iter().collect()))
    }

    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::new(Data::Map(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn set<K, I>(members: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = K>,
    {
        Self::new(Data::Set(members.into_iter().map(Into::into).collect()))
    }

    /// The object's own id, ignoring any redirect.
    pub fn id(&self) -> SourceId {
        self.0.id
    }

    /// The id used for observation: the redirect target if one was declared.
    pub fn observed_id(&self) -> SourceId {
        self.0.redirect.get().unwrap_or(self.0.id)
    }

    /// Declare that observers of this object should observe `target` instead.
    ///
    /// Lets a derived or composite object delegate its identity to the store
    /// that backs it. Redirects resolve eagerly to the innermost target.
    pub fn observe_through(&self, target: &impl Observable) {
        self.0.redirect.set(Some(target.source_id()));
    }

    pub fn kind(&self) -> &'static str {
        self.0.data.borrow().kind()
    }

    /// Read the contents without tracking.
    pub fn with_data<R>(&self, f: impl FnOnce(&Data) -> R) -> R {
        f(&self.0.data.borrow())
    }

    /// Mutate the contents without triggering anything.
    pub(crate) fn with_data_mut<R>(&self, f: impl FnOnce(&mut Data) -> R) -> R {
        f(&mut self.0.data.borrow_mut())
    }

    pub fn ptr_eq(&self, other: &Obj) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakObj {
        WeakObj(Rc::downgrade(&self.0))
    }

    /// Copy this object and everything it contains into fresh raw objects.
    pub fn deep_clone(&self) -> Obj {
        let data = self.with_data(|data| match data {
            Data::Record(fields) => Data::Record(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone()))
                    .collect(),
            ),
            Data::Map(entries) => Data::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone()))
                    .collect(),
            ),
            Data::List(items) => Data::List(items.iter().map(Value::deep_clone).collect()),
            Data::Set(members) => Data::Set(members.clone()),
        });
        Obj::new(data)
    }
}

impl Observable for Obj {
    fn source_id(&self) -> SourceId {
        self.observed_id()
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Obj({}, ", self.0.id)?;
        match self.0.data.try_borrow() {
            Ok(data) => write!(f, "{:?})", *data),
            Err(_) => f.write_str("<borrowed>)"),
        }
    }
}

impl Serialize for Obj {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.with_data(|data| match data {
            Data::Record(fields) | Data::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Data::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Data::Set(members) => {
                let mut seq = serializer.serialize_seq(Some(members.len()))?;
                for member in members {
                    seq.serialize_element(member)?;
                }
                seq.end()
            }
        })
    }
}

/// A dynamic value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// A raw object; reads and writes are not tracked.
    Object(Obj),
    /// A tracked wrapper around an object.
    Reactive(Reactive),
    /// A tracked single-value cell.
    Ref(Ref),
    Func(Handler),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Reactive(_) => "reactive",
            Value::Ref(_) => "ref",
            Value::Func(_) => "function",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Objects, wrappers and cells: values with an identity.
    pub fn is_object_like(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Reactive(_) | Value::Ref(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_ref_cell(&self) -> Option<&Ref> {
        match self {
            Value::Ref(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            Value::Func(handler) => Some(handler),
            _ => None,
        }
    }

    /// The raw object behind a raw or wrapped object value.
    pub fn as_obj(&self) -> Option<Obj> {
        match self {
            Value::Object(obj) => Some(obj.clone()),
            Value::Reactive(r) => Some(r.raw()),
            _ => None,
        }
    }

    /// Equality used to decide whether a write changes anything.
    ///
    /// Primitives compare by value (NaN equals NaN); everything else by
    /// identity.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            (a, b) => match (a.as_obj(), b.as_obj()) {
                (Some(a), Some(b)) => a.ptr_eq(&b),
                _ => false,
            },
        }
    }

    /// Copy the value, replacing every object and cell with a fresh raw
    /// snapshot of its current contents. Reads are not tracked.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Object(obj) => Value::Object(obj.deep_clone()),
            Value::Reactive(r) => Value::Object(r.raw().deep_clone()),
            Value::Ref(cell) => cell.get_untracked().deep_clone(),
            other => other.clone(),
        }
    }

    /// Export the value as JSON. Handlers export as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Build a value from JSON. Objects become records, arrays lists.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::Object(Obj::list(items.iter().map(Value::from_json)))
            }
            serde_json::Value::Object(fields) => Value::Object(Obj::record(
                fields.iter().map(|(k, v)| (k.clone(), Value::from_json(v))),
            )),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(obj) => fmt::Debug::fmt(obj, f),
            Value::Reactive(r) => fmt::Debug::fmt(r, f),
            Value::Ref(cell) => fmt::Debug::fmt(cell, f),
            Value::Func(handler) => fmt::Debug::fmt(handler, f),
        }
    }
}

/// Text form used for attribute values.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Ref(cell) => write!(f, "{}", cell.get_untracked()),
            Value::Object(_) | Value::Reactive(_) => f.write_str("[object]"),
            Value::Func(_) => f.write_str("[function]"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Func(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Object(obj) => obj.serialize(serializer),
            Value::Reactive(r) => r.raw().serialize(serializer),
            Value::Ref(cell) => cell.get_untracked().serialize(serializer),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Obj> for Value {
    fn from(obj: Obj) -> Self {
        Value::Object(obj)
    }
}

impl From<Reactive> for Value {
    fn from(r: Reactive) -> Self {
        Value::Reactive(r)
    }
}

impl From<&Reactive> for Value {
    fn from(r: &Reactive) -> Self {
        Value::Reactive(r.clone())
    }
}

impl From<Ref> for Value {
    fn from(cell: Ref) -> Self {
        Value::Ref(cell)
    }
}

impl From<&Ref> for Value {
    fn from(cell: &Ref) -> Self {
        Value::Ref(cell.clone())
    }
}

impl From<Handler> for Value {
    fn from(handler: Handler) -> Self {
        Value::Func(handler)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
