//! Ownership Scopes
//!
//! A Scope owns disposable resources (listeners, nested scopes) and cascades
//! `destroy`, `pause` and `unpause` to them. Components run their `build`
//! inside their own scope, so unmounting a component disposes every listener
//! it created, and deactivating it freezes them.
//!
//! # Current scope
//!
//! Scopes form a thread-local stack. [`Scope::run`] pushes a scope for the
//! duration of a call; anything created meanwhile with an adopting
//! constructor ([`Listener::new`](super::Listener::new), [`Scope::new`])
//! joins the innermost scope. The pop happens in a guard's `Drop`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// A resource that can be owned by a [`Scope`].
pub trait Disposable {
    /// Release the resource. Must be idempotent.
    fn destroy(&self);

    fn is_destroyed(&self) -> bool;

    /// Suspend reactivity without releasing anything.
    fn pause(&self) {}

    fn unpause(&self) {}
}

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Scope>> = RefCell::new(Vec::new());
}

/// Member count above which destroyed members are pruned on insertion.
const PRUNE_THRESHOLD: usize = 32;

/// Hierarchical owner of disposables.
#[derive(Clone, Default)]
pub struct Scope(Rc<ScopeInner>);

/// Non-owning handle to a [`Scope`].
#[derive(Clone)]
pub struct WeakScope(Weak<ScopeInner>);

struct ScopeInner {
    /// `None` once destroyed.
    members: RefCell<Option<Vec<Rc<dyn Disposable>>>>,
    paused: Cell<bool>,
}

impl Default for ScopeInner {
    fn default() -> Self {
        Self {
            members: RefCell::new(Some(Vec::new())),
            paused: Cell::new(false),
        }
    }
}

struct ScopeGuard {
    depth: usize,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let _ = SCOPE_STACK.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(stack.len(), self.depth, "scope stack mismatch");
            stack.pop();
        });
    }
}

impl Scope {
    /// Create a scope owned by the current scope, if there is one.
    pub fn new() -> Self {
        let scope = Self::detached();
        adopt(Rc::new(scope.clone()));
        scope
    }

    /// Create a root scope that no other scope owns.
    pub fn detached() -> Self {
        Self::default()
    }

    /// The innermost scope being run, if any.
    pub fn current() -> Option<Scope> {
        SCOPE_STACK
            .try_with(|stack| stack.borrow().last().cloned())
            .ok()
            .flatten()
    }

    /// Run `f` with this scope as the current scope.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        // during thread teardown the stack is gone and `f` runs unowned
        let _guard = SCOPE_STACK
            .try_with(|stack| {
                let mut stack = stack.borrow_mut();
                stack.push(self.clone());
                stack.len()
            })
            .ok()
            .map(|depth| ScopeGuard { depth });
        f()
    }

    /// Take ownership of `member`.
    ///
    /// A destroyed scope accepts nothing: the member is destroyed right away
    /// and `false` is returned. A member added to a paused scope is paused.
    pub fn add(&self, member: Rc<dyn Disposable>) -> bool {
        let accepted = {
            let mut members = self.0.members.borrow_mut();
            match members.as_mut() {
                Some(members) => {
                    if members.len() >= PRUNE_THRESHOLD && members.len().is_power_of_two() {
                        members.retain(|m| !m.is_destroyed());
                    }
                    members.push(member.clone());
                    true
                }
                None => false,
            }
        };

        if !accepted {
            tracing::debug!("member added to a destroyed scope; destroying it");
            member.destroy();
        } else if self.0.paused.get() {
            member.pause();
        }
        accepted
    }

    /// Destroy every member once and release them. Idempotent.
    pub fn destroy(&self) {
        let members = self.0.members.borrow_mut().take();
        let Some(members) = members else {
            return;
        };
        tracing::trace!(members = members.len(), "destroying scope");
        for member in members {
            member.destroy();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.members.borrow().is_none()
    }

    /// Pause every live member.
    pub fn pause(&self) {
        if self.0.paused.replace(true) {
            return;
        }
        for member in self.snapshot() {
            if !member.is_destroyed() {
                member.pause();
            }
        }
    }

    /// Resume every live member.
    pub fn unpause(&self) {
        if !self.0.paused.replace(false) {
            return;
        }
        for member in self.snapshot() {
            if !member.is_destroyed() {
                member.unpause();
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        self.0.paused.get()
    }

    /// Number of members not yet destroyed.
    pub fn live_members(&self) -> usize {
        self.0
            .members
            .borrow()
            .as_ref()
            .map_or(0, |members| members.iter().filter(|m| !m.is_destroyed()).count())
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakScope {
        WeakScope(Rc::downgrade(&self.0))
    }

    // Members may add to this scope while being paused.
    fn snapshot(&self) -> Vec<Rc<dyn Disposable>> {
        self.0.members.borrow().clone().unwrap_or_default()
    }
}

impl Disposable for Scope {
    fn destroy(&self) {
        Scope::destroy(self);
    }

    fn is_destroyed(&self) -> bool {
        Scope::is_destroyed(self)
    }

    fn pause(&self) {
        Scope::pause(self);
    }

    fn unpause(&self) {
        Scope::unpause(self);
    }
}

impl WeakScope {
    pub fn upgrade(&self) -> Option<Scope> {
        self.0.upgrade().map(Scope)
    }

    /// Run `f` inside the scope if it is still alive, otherwise unowned.
    pub(crate) fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        match self.upgrade() {
            Some(scope) => scope.run(f),
            None => f(),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("destroyed", &self.is_destroyed())
            .field("paused", &self.is_paused())
            .finish()
    }
}

/// Create a scope owned by the current one and run `f` inside it.
pub fn effect_scope<R>(f: impl FnOnce() -> R) -> (Scope, R) {
    let scope = Scope::new();
    let result = scope.run(f);
    (scope, result)
}

/// Hand `member` to the current scope, if there is one.
pub(crate) fn adopt(member: Rc<dyn Disposable>) {
    if let Some(scope) = Scope::current() {
        scope.add(member);
    }
}
