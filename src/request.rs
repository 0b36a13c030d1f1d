//! Cancellable request effects with automatic supersession.
//!
//! A [`RequestFx`] wraps an asynchronous handler. Each invocation hands the
//! handler a fresh [`Signal`]; by default, starting a new invocation cancels
//! the signal of any still-pending previous one ("last call wins"). Per-call
//! [`CallMode`]s opt an invocation out of supersession or group it under an
//! explicitly shared [`Controller`].
//!
//! The wrapper is executor-agnostic: [`call`](RequestFx::call) returns a
//! future that the host executor runs. The supersession step itself happens
//! eagerly at call time, so invocations issued in the same synchronous burst
//! supersede each other in call order regardless of when (or whether) their
//! futures are polled.

use crate::controller::{Controller, Signal};
use crate::event::Event;
use crate::scope::Scope;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tracing::trace;

type BoxHandler<P, T, E> = Arc<dyn Fn(P, Signal) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Per-call dispatch mode, resolved once at invocation time.
#[derive(Clone, Debug)]
pub enum CallMode {
    /// Default: cancel the wrapper's still-pending previous default-mode
    /// call, then run under the wrapper's shared internal controller.
    Supersede,
    /// Run under a throwaway controller: this call never cancels other
    /// calls and is never cancelled by supersession on any other path.
    Independent,
    /// Run under the supplied controller, superseding any still-pending
    /// call sharing it. Calls grouped this way form their own supersession
    /// domain, unaffected by (and not affecting) the wrapper's default one.
    WithController(Controller),
}

impl Default for CallMode {
    fn default() -> Self {
        CallMode::Supersede
    }
}

/// Payload of the [`done`](RequestFx::done) notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Done<P, T> {
    /// The parameters the call was invoked with.
    pub params: P,
    /// The handler's successful result.
    pub result: T,
}

/// Payload of the [`fail`](RequestFx::fail) notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fail<P, E> {
    /// The parameters the call was invoked with.
    pub params: P,
    /// The handler's error.
    pub error: E,
}

struct Pending {
    count: AtomicUsize,
    event: Event<bool>,
}

// Restores the in-flight count even if a call future is dropped unpolled.
struct InFlightGuard {
    pending: Arc<Pending>,
}

impl InFlightGuard {
    fn enter(pending: Arc<Pending>) -> Self {
        if pending.count.fetch_add(1, Ordering::SeqCst) == 0 {
            pending.event.fire(&true);
        }
        Self { pending }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.pending.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.pending.event.fire(&false);
        }
    }
}

/// A wrapped asynchronous operation with supersession semantics.
///
/// Created with [`RequestFx::new`] or [`RequestFxBuilder`]. Cloning is cheap
/// and shares the wrapper's identity: its internal controller, notification
/// streams, and in-flight count.
pub struct RequestFx<P, T, E> {
    name: Arc<str>,
    handler: BoxHandler<P, T, E>,
    controller: Controller,
    done: Event<Done<P, T>>,
    fail: Event<Fail<P, E>>,
    pending: Arc<Pending>,
}

impl<P, T, E> RequestFx<P, T, E>
where
    P: Clone + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Wraps `handler` with default configuration.
    ///
    /// The handler receives the call parameters and the [`Signal`] resolved
    /// for this invocation. Use [`RequestFxBuilder`] to also set a name, an
    /// external cancel trigger, or a scope.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(P, Signal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        RequestFxBuilder::new().handler(handler)
    }

    /// Invokes the wrapped operation in [`CallMode::Supersede`] mode.
    pub fn call(&self, params: P) -> impl Future<Output = Result<T, E>> + Send + 'static {
        self.call_with(params, CallMode::default())
    }

    /// Invokes the wrapped operation with an explicit [`CallMode`].
    ///
    /// The mode is resolved and the supersession step (if any) performed
    /// synchronously, before this method returns; calls issued in the same
    /// synchronous burst therefore supersede each other in call order. The
    /// returned future yields to the host scheduler once and then runs the
    /// handler body, surfacing its outcome and publishing it on the
    /// [`done`](Self::done) or [`fail`](Self::fail) stream.
    ///
    /// The future must be polled (awaited or spawned) for the handler to
    /// run; dropping it unpolled still counts as a supersession step but
    /// produces no notification.
    pub fn call_with(
        &self,
        params: P,
        mode: CallMode,
    ) -> impl Future<Output = Result<T, E>> + Send + 'static {
        let signal = match mode {
            CallMode::Supersede => {
                trace!(name = %self.name, "superseding previous call");
                self.controller.cancel();
                self.controller.signal()
            }
            CallMode::Independent => {
                trace!(name = %self.name, "independent call");
                Controller::new().signal()
            }
            CallMode::WithController(controller) => {
                trace!(name = %self.name, "call with explicit controller");
                controller.cancel();
                controller.signal()
            }
        };
        let guard = InFlightGuard::enter(Arc::clone(&self.pending));
        let name = Arc::clone(&self.name);
        let handler = Arc::clone(&self.handler);
        let done = self.done.clone();
        let fail = self.fail.clone();
        async move {
            // Let every call of the same synchronous burst take its
            // supersession step before any handler body runs.
            yield_now().await;
            let outcome = handler(params.clone(), signal).await;
            drop(guard);
            match outcome {
                Ok(result) => {
                    trace!(name = %name, "call done");
                    let payload = Done { params, result };
                    done.fire(&payload);
                    Ok(payload.result)
                }
                Err(error) => {
                    trace!(name = %name, "call failed");
                    let payload = Fail { params, error };
                    fail.fire(&payload);
                    Err(payload.error)
                }
            }
        }
    }
}

impl<P, T, E> RequestFx<P, T, E> {
    /// The wrapper's human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Notification stream fired after each successful call.
    pub fn done(&self) -> &Event<Done<P, T>> {
        &self.done
    }

    /// Notification stream fired after each failed call.
    pub fn fail(&self) -> &Event<Fail<P, E>> {
        &self.fail
    }

    /// Fires `true` when the in-flight count leaves zero and `false` when it
    /// returns to zero.
    pub fn pending(&self) -> &Event<bool> {
        &self.pending.event
    }

    /// Whether any call is currently in flight.
    pub fn is_pending(&self) -> bool {
        self.in_flight() > 0
    }

    /// Number of calls currently in flight (dispatched but not settled).
    pub fn in_flight(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }
}

impl<P, T, E> Clone for RequestFx<P, T, E> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            handler: Arc::clone(&self.handler),
            controller: self.controller.clone(),
            done: self.done.clone(),
            fail: self.fail.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<P, T, E> fmt::Debug for RequestFx<P, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestFx")
            .field("name", &self.name)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Builder for [`RequestFx`] configuration: name, external cancel trigger,
/// and scope.
#[derive(Debug, Default)]
pub struct RequestFxBuilder {
    name: Option<String>,
    cancel: Option<Event<()>>,
    scope: Option<Scope>,
}

impl RequestFxBuilder {
    /// Starts a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wrapper's human-readable name, used in trace output and
    /// scope registries.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Wires an external cancel trigger into the wrapper's internal
    /// controller: each fire cancels the pending default-mode call.
    pub fn cancel(mut self, event: &Event<()>) -> Self {
        self.cancel = Some(event.clone());
        self
    }

    /// Places the wrapper under `scope`: the scope's cancel-all trigger is
    /// wired into the internal controller and the wrapper's name is
    /// registered with the scope.
    pub fn in_scope(mut self, scope: &Scope) -> Self {
        self.scope = Some(scope.clone());
        self
    }

    /// Finishes the builder, wrapping `handler`.
    pub fn handler<P, T, E, F, Fut>(self, handler: F) -> RequestFx<P, T, E>
    where
        P: Clone + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        F: Fn(P, Signal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let name: Arc<str> = self.name.as_deref().unwrap_or("request_fx").into();
        let controller = Controller::new();
        if let Some(event) = &self.cancel {
            controller.bind_cancel(event);
        }
        if let Some(scope) = &self.scope {
            controller.bind_cancel(&scope.cancel_event());
            scope.register_effect(&name);
        }
        RequestFx {
            name,
            handler: Arc::new(move |params, signal| handler(params, signal).boxed()),
            controller,
            done: Event::new(),
            fail: Event::new(),
            pending: Arc::new(Pending {
                count: AtomicUsize::new(0),
                event: Event::new(),
            }),
        }
    }
}

fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
