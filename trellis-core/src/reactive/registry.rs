//! Dependency Registry
//!
//! The registry is the central table connecting tracked sources to the
//! listeners that observe them. Wrappers report writes here; the watch
//! family and the renderer bind listeners here.
//!
//! # How It Works
//!
//! 1. A binding is `source → property → listener`. Bindings live in one of
//!    two tables: *immediate* listeners are invoked at write time, *batched*
//!    listeners are invoked from a microtask.
//!
//! 2. When a source changes, [`Observers::trigger`]:
//!    a. invokes the immediate listeners, one invocation per property
//!    b. merges the properties into the pending queue
//!    c. schedules a single flush if none is scheduled yet
//!
//! 3. The flush ([`Observers::handle_trigger_queue`]) swaps the queue out,
//!    clears the scheduled flag and delivers to each batched listener once
//!    per source, with every changed property it is bound to.
//!
//! # Reentrancy
//!
//! No user code runs while the tables are borrowed: listeners are collected
//! under the borrow and invoked after it ends. Dropping a binding can still
//! release the last handle to a source, whose teardown wants to mutate the
//! tables again; such mutations are deferred and applied as soon as the
//! outer mutation finishes.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use crate::config::WatchOptions;
use crate::error::{Error, Result};
use crate::scheduler;

use super::context::Dependencies;
use super::listener::{Change, Listener, ListenerId};
use super::value::{Observable, Prop, SourceId, Value};

type Bindings = IndexMap<ListenerId, Binding>;
type PropTable = IndexMap<Prop, Bindings>;
type TableOp = Box<dyn FnOnce(&mut Tables)>;

#[derive(Clone)]
struct Binding {
    listener: Listener,
    index: usize,
}

#[derive(Default)]
struct Tables {
    batched: HashMap<SourceId, PropTable>,
    immediate: HashMap<SourceId, PropTable>,
    /// Changes waiting for the next flush, in first-touched order.
    pending: IndexMap<SourceId, IndexSet<Prop>>,
    flush_scheduled: bool,
}

impl Tables {
    fn table(&self, batch: bool) -> &HashMap<SourceId, PropTable> {
        if batch {
            &self.batched
        } else {
            &self.immediate
        }
    }

    fn table_mut(&mut self, batch: bool) -> &mut HashMap<SourceId, PropTable> {
        if batch {
            &mut self.batched
        } else {
            &mut self.immediate
        }
    }

    fn insert(&mut self, batch: bool, source: SourceId, prop: Prop, id: ListenerId, binding: Binding) {
        self.table_mut(batch)
            .entry(source)
            .or_default()
            .entry(prop)
            .or_default()
            .insert(id, binding);
    }

    /// Remove one binding, pruning the maps it leaves empty.
    fn remove(&mut self, batch: bool, source: SourceId, prop: &Prop, id: ListenerId) {
        let table = self.table_mut(batch);
        let Some(props) = table.get_mut(&source) else {
            return;
        };
        if let Some(bindings) = props.get_mut(prop) {
            bindings.shift_remove(&id);
            if bindings.is_empty() {
                props.shift_remove(prop);
            }
        }
        if props.is_empty() {
            table.remove(&source);
        }
    }
}

/// One pending invocation, collected under the table borrow.
struct Delivery {
    listener: Listener,
    index: usize,
    props: SmallVec<[Prop; 4]>,
}

thread_local! {
    static TABLES: RefCell<Tables> = RefCell::new(Tables::default());
    static DEFERRED: RefCell<VecDeque<TableOp>> = RefCell::new(VecDeque::new());
}

/// Apply `op` now, or hand it back if the tables are busy.
fn try_apply(op: TableOp) -> Option<TableOp> {
    TABLES
        .try_with(move |tables| match tables.try_borrow_mut() {
            Ok(mut tables) => {
                op(&mut tables);
                None
            }
            Err(_) => Some(op),
        })
        .unwrap_or(None)
}

fn mutate(op: impl FnOnce(&mut Tables) + 'static) {
    if let Some(op) = try_apply(Box::new(op)) {
        tracing::trace!("registry busy, deferring mutation");
        let _ = DEFERRED.try_with(|deferred| deferred.borrow_mut().push_back(op));
        return;
    }
    drain_deferred();
}

fn drain_deferred() {
    while let Some(op) = DEFERRED
        .try_with(|deferred| deferred.borrow_mut().pop_front())
        .ok()
        .flatten()
    {
        if let Some(op) = try_apply(op) {
            let _ = DEFERRED.try_with(|deferred| deferred.borrow_mut().push_front(op));
            break;
        }
    }
}

fn read<R>(f: impl FnOnce(&Tables) -> R) -> Option<R> {
    TABLES
        .try_with(|tables| tables.try_borrow().ok().map(|tables| f(&tables)))
        .ok()
        .flatten()
}

/// Immediate deliveries: one per (property, binding), then the wildcard
/// bindings once with every property unless the wildcard itself changed.
fn select_immediate(table: &PropTable, changed: &[Prop]) -> Vec<Delivery> {
    let mut out = Vec::new();
    for prop in changed {
        for binding in table.get(prop).into_iter().flat_map(IndexMap::values) {
            out.push(Delivery {
                listener: binding.listener.clone(),
                index: binding.index,
                props: SmallVec::from_elem(prop.clone(), 1),
            });
        }
    }
    if !changed.contains(&Prop::All) {
        for binding in table.get(&Prop::All).into_iter().flat_map(IndexMap::values) {
            out.push(Delivery {
                listener: binding.listener.clone(),
                index: binding.index,
                props: changed.iter().cloned().collect(),
            });
        }
    }
    out
}

/// Batched deliveries: each listener once, with the changed properties it
/// is bound to.
fn select_batched(table: &PropTable, changed: &IndexSet<Prop>) -> Vec<Delivery> {
    let mut picked: IndexMap<ListenerId, Delivery> = IndexMap::new();
    for prop in changed {
        for (id, binding) in table.get(prop).into_iter().flat_map(IndexMap::iter) {
            picked
                .entry(*id)
                .or_insert_with(|| Delivery {
                    listener: binding.listener.clone(),
                    index: binding.index,
                    props: SmallVec::new(),
                })
                .props
                .push(prop.clone());
        }
    }
    if !changed.contains(&Prop::All) {
        for (id, binding) in table.get(&Prop::All).into_iter().flat_map(IndexMap::iter) {
            let delivery = picked.entry(*id).or_insert_with(|| Delivery {
                listener: binding.listener.clone(),
                index: binding.index,
                props: SmallVec::new(),
            });
            delivery.props = changed.iter().cloned().collect();
        }
    }
    picked.into_values().collect()
}

fn deliver(source: SourceId, deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        delivery.listener.trigger(&Change {
            source,
            index: delivery.index,
            props: &delivery.props,
        });
    }
}

/// The dependency registry.
///
/// A unit struct over thread-local tables: every thread is an independent
/// runtime with its own registry.
pub struct Observers;

impl Observers {
    /// Report that `props` of `source` changed.
    pub fn trigger(source: SourceId, props: &[Prop]) {
        if props.is_empty() {
            return;
        }
        tracing::trace!(source = %source, props = props.len(), "trigger");

        let immediate = read(|tables| {
            tables
                .immediate
                .get(&source)
                .map(|table| select_immediate(table, props))
                .unwrap_or_default()
        })
        .unwrap_or_default();
        deliver(source, immediate);

        let props = props.to_vec();
        mutate(move |tables| {
            if !tables.batched.contains_key(&source) {
                return;
            }
            tables.pending.entry(source).or_default().extend(props);
            if !tables.flush_scheduled {
                tables.flush_scheduled = true;
                scheduler::queue_microtask(Observers::handle_trigger_queue);
            }
        });
    }

    /// Report a change to a single named property.
    pub fn trigger_prop(source: SourceId, prop: &str) {
        Self::trigger(source, &[Prop::name(prop)]);
    }

    /// Deliver every queued change to the batched listeners.
    ///
    /// Scheduled automatically by [`trigger`](Self::trigger); runs once per
    /// scheduled microtask.
    pub fn handle_trigger_queue() {
        let queue = TABLES
            .try_with(|tables| {
                tables.try_borrow_mut().ok().map(|mut tables| {
                    tables.flush_scheduled = false;
                    std::mem::take(&mut tables.pending)
                })
            })
            .ok()
            .flatten()
            .unwrap_or_default();

        if queue.is_empty() {
            return;
        }
        tracing::trace!(sources = queue.len(), "flushing trigger queue");

        for (source, changed) in queue {
            let deliveries = read(|tables| {
                tables
                    .batched
                    .get(&source)
                    .map(|table| select_batched(table, &changed))
                    .unwrap_or_default()
            })
            .unwrap_or_default();
            deliver(source, deliveries);
        }
    }

    /// Bind `listener` to one property of `source`.
    ///
    /// The binding is removed when the listener is disposed.
    pub fn bind(source: SourceId, prop: Prop, listener: &Listener, index: usize, batch: bool) {
        if listener.is_disposed() {
            return;
        }
        let id = listener.id();
        let binding = Binding {
            listener: listener.clone(),
            index,
        };
        let bound = prop.clone();
        mutate(move |tables| tables.insert(batch, source, bound, id, binding));
        listener.on_disposed(move || Observers::unbind(source, prop, id, batch));
    }

    /// Bind `listener` to every pair in `deps`.
    pub fn bind_dependencies(deps: &Dependencies, listener: &Listener, batch: bool) {
        for (source, prop) in deps.iter() {
            Self::bind(source, prop.clone(), listener, 0, batch);
        }
    }

    fn unbind(source: SourceId, prop: Prop, id: ListenerId, batch: bool) {
        mutate(move |tables| tables.remove(batch, source, &prop, id));
    }

    /// Drop every binding and pending change for `source`.
    ///
    /// Called when the last handle to a source is dropped.
    pub fn forget(source: SourceId) {
        mutate(move |tables| {
            tables.batched.remove(&source);
            tables.immediate.remove(&source);
            tables.pending.shift_remove(&source);
        });
    }

    /// Register a callback against one property of `target`.
    pub fn register<F>(
        target: &impl Observable,
        prop: impl Into<Prop>,
        callback: F,
        options: WatchOptions,
    ) -> Listener
    where
        F: Fn(&Change<'_>) + 'static,
    {
        let listener = Listener::new(callback, options.limit);
        Self::bind(target.source_id(), prop.into(), &listener, 0, options.batch);
        listener
    }

    /// Register a callback against several properties of `target`.
    ///
    /// Batched, the callback runs once per flush with every changed property;
    /// unbatched, it runs once per property change.
    pub fn register_many<F, I, P>(
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
        let props: IndexSet<Prop> = props.into_iter().map(Into::into).collect();
        if props.is_empty() {
            return Err(Error::EmptyDependencies);
        }
        let source = target.source_id();
        let listener = Listener::new(callback, options.limit);
        for prop in props {
            Self::bind(source, prop, &listener, 0, options.batch);
        }
        Ok(listener)
    }

    /// Register one callback against every property of several sources.
    ///
    /// [`Change::index`] is the position in `sources` of the source that
    /// changed.
    pub fn register_across<F>(
        sources: &[SourceId],
        callback: F,
        options: WatchOptions,
    ) -> Result<Listener>
    where
        F: Fn(&Change<'_>) + 'static,
    {
        if sources.is_empty() {
            return Err(Error::EmptyDependencies);
        }
        let listener = Listener::new(callback, options.limit);
        for (index, source) in sources.iter().enumerate() {
            Self::bind(*source, Prop::All, &listener, index, options.batch);
        }
        Ok(listener)
    }

    /// The id under which changes to `value` are reported, following any
    /// redirect. `None` for values without identity.
    pub fn observed_target(value: &Value) -> Option<SourceId> {
        match value {
            Value::Object(obj) => Some(obj.source_id()),
            Value::Reactive(r) => Some(r.source_id()),
            Value::Ref(cell) => Some(cell.source_id()),
            _ => None,
        }
    }

    /// Number of distinct listeners bound to `source`, in both tables.
    pub fn listener_count(source: SourceId) -> usize {
        read(|tables| {
            let mut ids = IndexSet::new();
            for batch in [true, false] {
                if let Some(props) = tables.table(batch).get(&source) {
                    ids.extend(props.values().flat_map(|bindings| bindings.keys().copied()));
                }
            }
            ids.len()
        })
        .unwrap_or(0)
    }

    /// Whether `source` has any entry in either table.
    pub fn is_observed(source: SourceId) -> bool {
        read(|tables| tables.batched.contains_key(&source) || tables.immediate.contains_key(&source))
            .unwrap_or(false)
    }

    /// Whether a flush is waiting in the microtask queue.
    pub fn is_flush_scheduled() -> bool {
        read(|tables| tables.flush_scheduled).unwrap_or(false)
    }
}
