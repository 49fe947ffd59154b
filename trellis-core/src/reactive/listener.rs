//! Listener types for the reactive system.
//!
//! A Listener is the unit the dependency registry notifies. It wraps a
//! callback and adds the lifecycle the rest of the runtime relies on:
//!
//! - an optional trigger limit, after which the listener disposes itself
//! - pausing, which suspends delivery without losing any registration
//! - disposal hooks, used by the registry to drop its bindings
//!
//! Listeners created with [`Listener::new`] join the current
//! [`Scope`](super::Scope), so destroying or pausing the scope reaches them.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{panic_message, report_error, Error};

use super::scope::{self, Disposable};
use super::value::{Prop, SourceId};

/// Unique identifier for a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A notification delivered to a listener.
#[derive(Debug, Clone, Copy)]
pub struct Change<'a> {
    /// The source whose properties changed.
    pub source: SourceId,
    /// Position of `source` among the sources the listener was registered
    /// against; always 0 for single-source registrations.
    pub index: usize,
    /// The changed properties the listener is bound to, in first-touched order.
    pub props: &'a [Prop],
}

impl Change<'_> {
    /// Whether the named property is among the changed ones.
    pub fn contains(&self, prop: &str) -> bool {
        self.props.iter().any(|p| p.as_str() == Some(prop))
    }
}

type Callback = Rc<dyn Fn(&Change<'_>)>;

/// A disposable, optionally limited, pausable notification target.
///
/// Cloning a `Listener` yields another handle to the same listener.
#[derive(Clone)]
pub struct Listener(Rc<ListenerInner>);

/// Non-owning handle to a [`Listener`].
#[derive(Clone)]
pub struct WeakListener(Weak<ListenerInner>);

struct ListenerInner {
    id: ListenerId,
    /// Taken on disposal so captured state is released promptly.
    callback: RefCell<Option<Callback>>,
    /// Maximum number of deliveries; 0 means unlimited.
    limit: u32,
    count: Cell<u32>,
    paused: Cell<bool>,
    /// Set when a delivery arrived while paused.
    missed: Cell<bool>,
    disposed: Cell<bool>,
    on_disposed: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl ListenerInner {
    fn new(id: ListenerId, callback: Callback, limit: u32) -> Self {
        Self {
            id,
            callback: RefCell::new(Some(callback)),
            limit,
            count: Cell::new(0),
            paused: Cell::new(false),
            missed: Cell::new(false),
            disposed: Cell::new(false),
            on_disposed: RefCell::new(Vec::new()),
        }
    }
}

impl Listener {
    /// Create a listener owned by the current scope, if there is one.
    pub fn new<F>(callback: F, limit: u32) -> Self
    where
        F: Fn(&Change<'_>) + 'static,
    {
        let listener = Self::detached(callback, limit);
        scope::adopt(Rc::new(listener.clone()));
        listener
    }

    /// Create a listener that does not join the current scope.
    pub fn detached<F>(callback: F, limit: u32) -> Self
    where
        F: Fn(&Change<'_>) + 'static,
    {
        Self(Rc::new(ListenerInner::new(
            ListenerId::new(),
            Rc::new(callback),
            limit,
        )))
    }

    /// Create a scope-owned listener whose callback holds a weak handle to
    /// the listener itself.
    pub fn cyclic<M, F>(make: M, limit: u32) -> Self
    where
        M: FnOnce(WeakListener) -> F,
        F: Fn(&Change<'_>) + 'static,
    {
        let inner = Rc::new_cyclic(|weak: &Weak<ListenerInner>| {
            let callback = make(WeakListener(weak.clone()));
            ListenerInner::new(ListenerId::new(), Rc::new(callback), limit)
        });
        let listener = Self(inner);
        scope::adopt(Rc::new(listener.clone()));
        listener
    }

    /// Get the listener's unique ID.
    pub fn id(&self) -> ListenerId {
        self.0.id
    }

    /// Deliver a change.
    ///
    /// Returns whether the listener is still active afterwards. A panic in
    /// the callback is reported and does not propagate.
    pub fn trigger(&self, change: &Change<'_>) -> bool {
        let inner = &self.0;
        if inner.disposed.get() {
            return false;
        }
        if inner.paused.get() {
            inner.missed.set(true);
            return true;
        }

        // Clone the callback out: it may dispose this listener while running.
        let callback = inner.callback.borrow().clone();
        let Some(callback) = callback else {
            return false;
        };

        inner.count.set(inner.count.get() + 1);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(change)));
        if let Err(payload) = outcome {
            report_error(&Error::ListenerPanicked {
                id: inner.id,
                message: panic_message(payload.as_ref()),
            });
        }

        if inner.limit > 0 && inner.count.get() >= inner.limit {
            tracing::trace!(listener = %inner.id, limit = inner.limit, "trigger limit reached");
            self.destroy();
        }
        !inner.disposed.get()
    }

    /// Suspend delivery. Registrations are kept.
    pub fn pause(&self) {
        self.0.paused.set(true);
    }

    /// Resume delivery.
    pub fn unpause(&self) {
        self.0.paused.set(false);
    }

    pub fn is_paused(&self) -> bool {
        self.0.paused.get()
    }

    /// Whether a delivery was dropped while paused; clears the flag.
    pub fn take_missed(&self) -> bool {
        self.0.missed.replace(false)
    }

    /// Number of times the callback has been invoked.
    pub fn trigger_count(&self) -> u32 {
        self.0.count.get()
    }

    pub fn limit(&self) -> u32 {
        self.0.limit
    }

    /// Register cleanup to run on disposal.
    ///
    /// If the listener is already disposed the hook runs immediately.
    pub fn on_disposed<F>(&self, hook: F)
    where
        F: FnOnce() + 'static,
    {
        if self.0.disposed.get() {
            hook();
        } else {
            self.0.on_disposed.borrow_mut().push(Box::new(hook));
        }
    }

    /// Dispose the listener. Idempotent.
    pub fn destroy(&self) {
        let inner = &self.0;
        if inner.disposed.replace(true) {
            return;
        }
        let callback = inner.callback.borrow_mut().take();
        let hooks = std::mem::take(&mut *inner.on_disposed.borrow_mut());
        for hook in hooks {
            hook();
        }
        drop(callback);
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    pub fn downgrade(&self) -> WeakListener {
        WeakListener(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Listener) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl WeakListener {
    pub fn upgrade(&self) -> Option<Listener> {
        self.0.upgrade().map(Listener)
    }
}

impl Disposable for Listener {
    fn destroy(&self) {
        Listener::destroy(self);
    }

    fn is_destroyed(&self) -> bool {
        self.is_disposed()
    }

    fn pause(&self) {
        Listener::pause(self);
    }

    fn unpause(&self) {
        Listener::unpause(self);
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.0.id)
            .field("count", &self.0.count.get())
            .field("limit", &self.0.limit)
            .field("paused", &self.0.paused.get())
            .field("disposed", &self.0.disposed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(props: &[Prop]) -> Change<'_> {
        Change {
            source: SourceId::new(),
            index: 0,
            props,
        }
    }

    fn counting(limit: u32) -> (Listener, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let listener = Listener::detached(move |_| calls_clone.set(calls_clone.get() + 1), limit);
        (listener, calls)
    }

    #[test]
    fn listener_ids_are_unique() {
        let id1 = ListenerId::new();
        let id2 = ListenerId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn trigger_calls_callback() {
        let (listener, calls) = counting(0);
        assert!(listener.trigger(&change(&[])));
        assert!(listener.trigger(&change(&[])));
        assert_eq!(calls.get(), 2);
        assert_eq!(listener.trigger_count(), 2);
    }

    #[test]
    fn limited_listener_disposes_itself() {
        let (listener, calls) = counting(2);

        assert!(listener.trigger(&change(&[])));
        assert!(!listener.trigger(&change(&[])));
        assert!(listener.is_disposed());

        assert!(!listener.trigger(&change(&[])));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn paused_listener_records_missed_delivery() {
        let (listener, calls) = counting(0);
        listener.pause();

        assert!(listener.trigger(&change(&[])));
        assert_eq!(calls.get(), 0);
        assert_eq!(listener.trigger_count(), 0);

        listener.unpause();
        assert!(listener.take_missed());
        assert!(!listener.take_missed());

        listener.trigger(&change(&[]));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn on_disposed_fires_once_and_immediately_when_late() {
        let (listener, _) = counting(0);
        let fired = Rc::new(Cell::new(0));

        let early = fired.clone();
        listener.on_disposed(move || early.set(early.get() + 1));
        listener.destroy();
        listener.destroy();
        assert_eq!(fired.get(), 1);

        let late = fired.clone();
        listener.on_disposed(move || late.set(late.get() + 1));
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn panicking_callback_is_contained() {
        let listener = Listener::detached(|_| panic!("listener failure"), 0);
        assert!(listener.trigger(&change(&[])));
        assert_eq!(listener.trigger_count(), 1);
        assert!(!listener.is_disposed());
    }

    #[test]
    fn listener_can_dispose_itself_while_running() {
        let listener = Listener::cyclic(
            |me| {
                move |_: &Change<'_>| {
                    if let Some(me) = me.upgrade() {
                        me.destroy();
                    }
                }
            },
            0,
        );
        assert!(!listener.trigger(&change(&[])));
        assert!(listener.is_disposed());
    }

    #[test]
    fn change_reports_contained_props() {
        let props = [Prop::name("a"), Prop::All];
        let c = change(&props);
        assert!(c.contains("a"));
        assert!(!c.contains("b"));
    }
}
