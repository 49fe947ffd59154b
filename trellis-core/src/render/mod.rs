//! Rendering
//!
//! Components describe their output as [`VNode`] trees. A [`Renderer`] owns
//! one component instance, records what its `build` reads and re-renders it
//! when any of that changes. The [`Reconciler`] turns trees into calls on a
//! [`Backend`].
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use trellis_core::error::BoxError;
//! use trellis_core::reactive::{Ref, Value};
//! use trellis_core::render::{h, Component, Context, MemoryBackend, VNode};
//! use trellis_core::{create_app, flush_microtasks, AppOptions};
//!
//! struct Counter {
//!     count: Ref,
//! }
//!
//! impl Component for Counter {
//!     fn setup(_ctx: &Context) -> Self {
//!         Counter { count: Ref::new(0) }
//!     }
//!
//!     fn build(&self, _ctx: &Context) -> Result<VNode, BoxError> {
//!         let count = self.count.clone();
//!         Ok(h("button")
//!             .on("click", move |_| {
//!                 count.update(|v| (v.as_i64().unwrap_or(0) + 1).into());
//!             })
//!             .child(self.count.get().to_string()))
//!     }
//! }
//!
//! let backend = Rc::new(MemoryBackend::new());
//! let root = backend.create_root();
//! let app = create_app(backend.clone(), root, AppOptions::default());
//! app.mount::<Counter>().unwrap();
//!
//! let button = backend.children(root)[0];
//! backend.dispatch(button, "click", &Value::Null);
//! flush_microtasks();
//! assert_eq!(backend.to_html(root), "<button>1</button>");
//! ```

mod app;
mod backend;
mod component;
mod memory;
mod reconcile;
mod renderer;
mod vnode;

pub use app::{create_app, App};
pub use backend::{event_key, event_name, Backend, NodeId};
pub use component::{Component, ComponentType, Context};
pub use memory::{MemoryBackend, Op};
pub use reconcile::Reconciler;
pub use renderer::{LifecycleState, Renderer};
pub use vnode::{fragment, h, text, NodeRef, VNode, VNodeKind};
