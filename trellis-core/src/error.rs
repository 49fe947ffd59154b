//! Error types and the runtime's error reporting channel.
//!
//! Configuration mistakes (bad `watch` arguments) and build failures are
//! returned as [`Error`] values. Failures that happen while the runtime is
//! dispatching notifications have no caller to return to, so they are sent to
//! [`report_error`] instead: the error is logged through `tracing` and handed
//! to the handler installed with [`set_error_handler`], if any.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::reactive::ListenerId;
use crate::render::LifecycleState;

/// Error type returned by component `build` functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the reactive engine and the renderer.
#[derive(Error, Debug)]
pub enum Error {
    /// A plain value was passed where a tracked source is required.
    #[error("{kind} values cannot be observed; wrap an object or use a reference cell")]
    NotReactive { kind: &'static str },

    /// A watch or registration call resolved to no dependency at all.
    #[error("watch requires at least one tracked dependency")]
    EmptyDependencies,

    /// A getter returned a primitive after reading more than one property,
    /// so there is no single value to watch.
    #[error("getter read {count} tracked properties; a getter returning a primitive must read exactly one")]
    AmbiguousGetter { count: usize },

    /// A component's build function failed and no error hook replaced it.
    #[error("component `{component}` failed to build")]
    Build {
        component: &'static str,
        #[source]
        source: BoxError,
    },

    /// A listener callback panicked while being notified.
    #[error("listener {id} panicked: {message}")]
    ListenerPanicked { id: ListenerId, message: String },

    /// A lifecycle operation was requested in a state that does not allow it.
    #[error("cannot {operation} component `{component}` while {state:?}")]
    Lifecycle {
        component: &'static str,
        state: LifecycleState,
        operation: &'static str,
    },
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type ErrorHandler = Rc<dyn Fn(&Error)>;

thread_local! {
    static ERROR_HANDLER: RefCell<Option<ErrorHandler>> = RefCell::new(None);
}

/// Install the handler that receives errors reported by the runtime on this
/// thread. Replaces any previous handler.
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&Error) + 'static,
{
    ERROR_HANDLER.with(|slot| *slot.borrow_mut() = Some(Rc::new(handler)));
}

/// Remove the handler installed with [`set_error_handler`].
pub fn clear_error_handler() {
    let _ = ERROR_HANDLER.try_with(|slot| slot.borrow_mut().take());
}

/// Report an error that has no caller to propagate to.
pub fn report_error(error: &Error) {
    tracing::error!(error = %error, "runtime error");

    // Clone the handler out so it may replace itself while running.
    let handler = ERROR_HANDLER
        .try_with(|slot| slot.borrow().clone())
        .ok()
        .flatten();
    if let Some(handler) = handler {
        handler(error);
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn reported_errors_reach_the_handler() {
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();
        set_error_handler(move |error| {
            assert!(matches!(error, Error::EmptyDependencies));
            seen_clone.set(seen_clone.get() + 1);
        });

        report_error(&Error::EmptyDependencies);
        report_error(&Error::EmptyDependencies);
        assert_eq!(seen.get(), 2);

        clear_error_handler();
        report_error(&Error::EmptyDependencies);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn build_error_exposes_source() {
        use std::error::Error as _;

        let error = Error::Build {
            component: "Counter",
            source: "boom".into(),
        };
        assert_eq!(error.to_string(), "component `Counter` failed to build");
        assert_eq!(error.source().map(|s| s.to_string()).as_deref(), Some("boom"));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
