//! Reactive Primitives
//!
//! This module implements the dependency-tracking and notification engine:
//! tracked wrappers, dependency collection, the listener registry and the
//! watch family built on top of them.
//!
//! # Concepts
//!
//! ## Wrappers and cells
//!
//! A [`Reactive`] wraps an object (record, list, map or set) and a [`Ref`]
//! wraps a single value. Reads through them are reported to the collector,
//! effective writes to the registry. Plain [`Obj`] access is untracked.
//!
//! ## Collection
//!
//! [`Depend::collect`] runs a function and returns every (source, property)
//! pair it read. This is how effects and component renders learn what they
//! depend on.
//!
//! ## Listeners and the registry
//!
//! A [`Listener`] is the notification target. [`Observers`] binds listeners
//! to sources and delivers changes, either synchronously or batched into one
//! delivery per microtask flush.
//!
//! ## Scopes
//!
//! A [`Scope`] owns the listeners created while it runs, so they can be
//! paused or destroyed together.
//!
//! # Threading
//!
//! All state is thread-local. The engine is single-threaded and cooperative;
//! the host drives it by calling
//! [`flush_microtasks`](crate::scheduler::flush_microtasks).

mod cell;
mod context;
mod listener;
mod registry;
mod scope;
mod value;
mod watch;
mod wrapper;

pub use cell::{Ref, WeakRef, VALUE_PROP};
pub use context::{Depend, Dependencies};
pub use listener::{Change, Listener, ListenerId, WeakListener};
pub use registry::Observers;
pub use scope::{effect_scope, Disposable, Scope, WeakScope};
pub use value::{Data, Handler, Obj, Observable, Prop, SourceId, Value, WeakObj};
pub use watch::{watch, watch_effect, watch_effect_then, watch_prop, watch_props, watch_value, WatchSource};
pub use wrapper::{is_reactive, reactive, shallow_reactive, to_raw, Reactive, WeakReactive, SIZE_PROP};
