//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI framework.
//! It implements:
//!
//! - Reactive wrappers and reference cells with dependency tracking
//! - A listener registry with synchronous and batched delivery
//! - Watchers, effects and scopes
//! - Component instances, virtual nodes and tree reconciliation
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Tracked state, dependency collection and notification
//! - `render`: Components, virtual nodes and the backend interface
//! - `scheduler`: The microtask queue that batched work runs on
//! - `config`: Application and watch options
//! - `error`: Error types and the runtime's error channel
//!
//! The runtime is single-threaded. Batched notifications and component
//! updates are queued as microtasks; the host runs them by calling
//! [`flush_microtasks`] once per turn of its event loop.
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use trellis_core::reactive::{reactive, watch, Obj, Value};
//! use trellis_core::{flush_microtasks, WatchOptions};
//!
//! let state = reactive(Obj::record([("count", Value::from(0))])).unwrap();
//!
//! let seen = Rc::new(Cell::new(0));
//! let seen_in_watch = seen.clone();
//! let _listener = watch(
//!     state.clone(),
//!     move |_| seen_in_watch.set(seen_in_watch.get() + 1),
//!     WatchOptions::default(),
//! )
//! .unwrap();
//!
//! state.set("count", 1);
//! state.set("count", 2);
//! flush_microtasks();
//!
//! // batched: two writes, one delivery
//! assert_eq!(seen.get(), 1);
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod render;
pub mod scheduler;

pub use config::{AppOptions, WatchOptions};
pub use error::{Error, Result};
pub use render::{create_app, App};
pub use scheduler::{flush_microtasks, next_tick, queue_microtask};

/// Crate version, as published.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
