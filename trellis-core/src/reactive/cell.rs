//! Reference Cells
//!
//! A [`Ref`] is a tracked single-value cell: reading `get` records a
//! dependency on its `value` property, and a `set` that changes the value
//! triggers it.
//!
//! A `Ref` stored in a reactive record is transparent: reading the slot
//! yields the cell's value, and writing the slot writes through the cell.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::Depend;
use super::registry::Observers;
use super::value::{Observable, Prop, SourceId, Value};

/// Name of the property a cell reports reads and writes under.
pub const VALUE_PROP: &str = "value";

/// A tracked single-value cell.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// watch(&count, |_| println!("changed"), WatchOptions::default())?;
///
/// count.set(5);        // queues the notification
/// flush_microtasks();  // prints "changed"
/// ```
#[derive(Clone)]
pub struct Ref(Rc<RefInner>);

/// Non-owning handle to a [`Ref`].
#[derive(Clone)]
pub struct WeakRef(Weak<RefInner>);

struct RefInner {
    id: SourceId,
    value: RefCell<Value>,
}

impl Drop for RefInner {
    fn drop(&mut self) {
        Observers::forget(self.id);
    }
}

impl Ref {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(Rc::new(RefInner {
            id: SourceId::new(),
            value: RefCell::new(value.into()),
        }))
    }

    pub fn id(&self) -> SourceId {
        self.0.id
    }

    /// Read the value and record the dependency.
    pub fn get(&self) -> Value {
        Depend::track(self.0.id, VALUE_PROP);
        self.get_untracked()
    }

    pub fn get_untracked(&self) -> Value {
        self.0.value.borrow().clone()
    }

    /// Store `value`. Triggers only if it differs from the current value.
    ///
    /// Returns whether the value changed.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        let old = {
            let mut slot = self.0.value.borrow_mut();
            if slot.same_value(&value) {
                return false;
            }
            std::mem::replace(&mut *slot, value)
        };
        // Drop the old value outside the borrow; it may release a source.
        drop(old);
        Observers::trigger(self.0.id, &[Prop::name(VALUE_PROP)]);
        true
    }

    /// Replace the value with `f(current)`.
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) -> bool {
        let next = f(&self.get_untracked());
        self.set(next)
    }

    pub fn ptr_eq(&self, other: &Ref) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakRef {
        WeakRef(Rc::downgrade(&self.0))
    }
}

impl WeakRef {
    pub fn upgrade(&self) -> Option<Ref> {
        self.0.upgrade().map(Ref)
    }
}

impl Observable for Ref {
    fn source_id(&self) -> SourceId {
        self.0.id
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.value.try_borrow() {
            Ok(value) => write!(f, "Ref({}, {:?})", self.0.id, *value),
            Err(_) => write!(f, "Ref({}, <borrowed>)", self.0.id),
        }
    }
}
