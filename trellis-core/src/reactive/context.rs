//! Dependency Collection
//!
//! The collector records which tracked sources a computation reads, so the
//! caller can bind a listener to exactly that read-set afterwards.
//!
//! # Implementation
//!
//! We use a thread-local stack of collection records. [`Depend::collect`]
//! pushes a fresh record, runs the function, and pops the record again;
//! every tracked read in between lands in the innermost record only. A
//! `None` entry on the stack marks an untracked region.
//!
//! The pop happens in a guard's `Drop`, so the stack stays balanced even if
//! the collected function panics.

use std::cell::RefCell;

use indexmap::{IndexMap, IndexSet};

use super::value::{Prop, SourceId};

thread_local! {
    static COLLECT_STACK: RefCell<Vec<Option<Dependencies>>> = RefCell::new(Vec::new());
}

/// The (source, property) pairs read during one collection.
///
/// Sources and properties keep first-read order; repeated reads collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    entries: IndexMap<SourceId, IndexSet<Prop>>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one read. Returns whether it was new.
    pub fn insert(&mut self, source: SourceId, prop: Prop) -> bool {
        self.entries.entry(source).or_default().insert(prop)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct (source, property) pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(IndexSet::len).sum()
    }

    /// Number of distinct sources.
    pub fn source_count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, source: SourceId, prop: &Prop) -> bool {
        self.entries
            .get(&source)
            .is_some_and(|props| props.contains(prop))
    }

    pub fn props(&self, source: SourceId) -> Option<&IndexSet<Prop>> {
        self.entries.get(&source)
    }

    /// Iterate over every (source, property) pair in first-read order.
    pub fn iter(&self) -> impl Iterator<Item = (SourceId, &Prop)> + '_ {
        self.entries
            .iter()
            .flat_map(|(source, props)| props.iter().map(move |prop| (*source, prop)))
    }

    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.entries.keys().copied()
    }

    /// The only pair, if exactly one was read.
    pub fn single(&self) -> Option<(SourceId, &Prop)> {
        if self.len() == 1 {
            self.iter().next()
        } else {
            None
        }
    }

    /// Pairs present in `self` but not in `other`.
    pub fn difference(&self, other: &Dependencies) -> Dependencies {
        let mut out = Dependencies::new();
        for (source, prop) in self.iter() {
            if !other.contains(source, prop) {
                out.insert(source, prop.clone());
            }
        }
        out
    }

    /// Add every pair of `other` to `self`.
    pub fn merge(&mut self, other: &Dependencies) {
        for (source, prop) in other.iter() {
            self.insert(source, prop.clone());
        }
    }
}

/// Entry point for dependency collection.
pub struct Depend;

/// Pops the record pushed by [`Depend::collect`] or [`Depend::untracked`].
struct CollectGuard {
    depth: usize,
}

impl CollectGuard {
    fn push(entry: Option<Dependencies>) -> Self {
        let depth = COLLECT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(entry);
            stack.len()
        });
        Self { depth }
    }

    /// Pop the record and hand back what it collected.
    fn finish(self) -> Dependencies {
        let entry = Self::pop(self.depth);
        std::mem::forget(self);
        entry.unwrap_or_default()
    }

    fn pop(depth: usize) -> Option<Dependencies> {
        COLLECT_STACK
            .try_with(|stack| {
                let mut stack = stack.borrow_mut();
                debug_assert_eq!(
                    stack.len(),
                    depth,
                    "collection stack mismatch: expected depth {depth}, got {}",
                    stack.len()
                );
                stack.pop().flatten()
            })
            .ok()
            .flatten()
    }
}

impl Drop for CollectGuard {
    fn drop(&mut self) {
        Self::pop(self.depth);
    }
}

impl Depend {
    /// Run `f` and return its result with every tracked read it performed.
    ///
    /// Nested collections are independent: a read is attributed to the
    /// innermost active collection only.
    pub fn collect<R>(f: impl FnOnce() -> R) -> (R, Dependencies) {
        let guard = CollectGuard::push(Some(Dependencies::new()));
        let result = f();
        (result, guard.finish())
    }

    /// Run `f` with tracking suspended.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _guard = CollectGuard::push(None);
        f()
    }

    /// Record a read of a named property.
    pub fn track(source: SourceId, prop: &str) {
        Self::track_prop(source, Prop::name(prop));
    }

    /// Record a read. No-op outside a collection.
    pub fn track_prop(source: SourceId, prop: Prop) {
        let _ = COLLECT_STACK.try_with(|stack| {
            if let Some(Some(deps)) = stack.borrow_mut().last_mut() {
                deps.insert(source, prop);
            }
        });
    }

    /// Whether a read right now would be recorded.
    pub fn is_collecting() -> bool {
        COLLECT_STACK
            .try_with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
            .unwrap_or(false)
    }
}
