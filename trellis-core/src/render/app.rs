//! Application entry point.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::backend::{Backend, NodeId};
use super::component::{Component, ComponentType};
use super::reconcile::Reconciler;
use super::renderer::Renderer;
use crate::config::AppOptions;
use crate::error::Result;
use crate::reactive::Value;

/// Bind a backend and a container node into an application.
pub fn create_app(backend: Rc<dyn Backend>, container: NodeId, options: AppOptions) -> App {
    App {
        backend,
        container,
        options,
        root: RefCell::new(None),
    }
}

/// An application rendering one root component into a container.
pub struct App {
    backend: Rc<dyn Backend>,
    container: NodeId,
    options: AppOptions,
    root: RefCell<Option<Renderer>>,
}

impl App {
    /// Render `C` as the root component with `props`, replacing any
    /// previous root.
    pub fn render<C, K, I>(&self, props: I) -> Result<Renderer>
    where
        C: Component,
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        self.unmount();

        let props: IndexMap<String, Value> = props.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let renderer = Renderer::new(
            ComponentType::of::<C>(),
            props,
            Vec::new(),
            self.backend.clone(),
            self.options,
        );
        let mut reconciler = Reconciler::new(self.backend.clone(), self.options);
        let node = renderer.render(&mut reconciler)?;
        self.backend.append_child(self.container, node);
        renderer.mount();
        *self.root.borrow_mut() = Some(renderer.clone());
        tracing::debug!(component = renderer.name(), container = %self.container, "app rendered");

        reconciler.finish()?;
        Ok(renderer)
    }

    /// Render `C` as the root component without props.
    pub fn mount<C: Component>(&self) -> Result<Renderer> {
        self.render::<C, String, _>(Vec::new())
    }

    /// Re-render the root now instead of waiting for a change.
    pub fn update(&self) -> Result<()> {
        match self.root() {
            Some(root) => root.update(),
            None => Ok(()),
        }
    }

    /// Unmount the root component, if any.
    pub fn unmount(&self) {
        let root = self.root.borrow_mut().take();
        if let Some(root) = root {
            root.unmount();
        }
    }

    pub fn root(&self) -> Option<Renderer> {
        self.root.borrow().clone()
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn options(&self) -> AppOptions {
        self.options
    }

    pub fn backend(&self) -> &Rc<dyn Backend> {
        &self.backend
    }
}
