//! Isolation scopes grouping wrappers and controllers.
//!
//! A [`Scope`] is a named boundary with one shared cancel-all trigger.
//! Wrappers placed in a scope (via
//! [`RequestFxBuilder::in_scope`](crate::RequestFxBuilder::in_scope)) and
//! controllers created from it all cancel when the scope does — the "log
//! out cancels all outstanding requests" pattern. Scopes share no state
//! with each other, so constructing a fresh scope (plus fresh wrappers) is
//! how a test obtains an isolated instance of the whole subsystem.

use crate::controller::Controller;
use crate::event::Event;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::trace;

struct ScopeInner {
    name: String,
    cancel: Event<()>,
    effects: Mutex<Vec<String>>,
}

/// A named isolation boundary with a shared cancel-all trigger.
///
/// Cloning is cheap and shares the scope.
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Creates an empty scope.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name: name.into(),
                cancel: Event::new(),
                effects: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The scope's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The scope's shared cancel trigger.
    ///
    /// Firing it is equivalent to [`cancel_all`](Self::cancel_all); it can
    /// also be passed to [`Controller::with_cancel`] or
    /// [`RequestFxBuilder::cancel`](crate::RequestFxBuilder::cancel)
    /// directly.
    pub fn cancel_event(&self) -> Event<()> {
        self.inner.cancel.clone()
    }

    /// Cancels every controller and wrapper bound to this scope.
    pub fn cancel_all(&self) {
        trace!(scope = %self.inner.name, "cancelling all");
        self.inner.cancel.fire(&());
    }

    /// Creates a controller bound to this scope's cancel-all trigger.
    pub fn controller(&self) -> Controller {
        Controller::with_cancel(&self.inner.cancel)
    }

    /// Names of the wrappers registered in this scope, in creation order.
    pub fn effect_names(&self) -> Vec<String> {
        self.inner.effects.lock().unwrap().clone()
    }

    pub(crate) fn register_effect(&self, name: &str) {
        self.inner.effects.lock().unwrap().push(name.to_owned());
    }
}

impl Clone for Scope {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.inner.name)
            .field("effects", &self.effect_names())
            .finish()
    }
}
