//! Cancellation controllers, signals, and the cancellation error marker.
//!
//! A [`Controller`] owns a single mutable "current context" slot. Each
//! context represents one attempt: it starts live, and once cancelled it is
//! permanently cancelled and immediately replaced as current by a fresh live
//! context, so the controller is always ready for the next attempt. A
//! [`Signal`] is a read-only handle to one context — queryable via
//! [`is_cancelled`](Signal::is_cancelled), observable via
//! [`on_cancel`](Signal::on_cancel) callbacks or the awaitable
//! [`cancelled`](Signal::cancelled) future.
//!
//! Cancellation is cooperative, not preemptive: cancelling a context only
//! notifies whoever is holding its signal. Work that wants to stop on
//! cancellation checks the signal or races itself against it with
//! [`Signal::run_until_cancelled`].

use crate::event::{Event, Subscription};
use futures::future::{select, Either};
use futures::pin_mut;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context as TaskContext, Poll, Waker};
use tracing::trace;

struct Listeners {
    callbacks: Vec<(u64, Box<dyn FnOnce() + Send>)>,
    wakers: Vec<(u64, Waker)>,
    next_id: u64,
}

/// One attempt generation: a live/cancelled flag plus the listeners to
/// notify on the live -> cancelled transition.
struct CancelContext {
    cancelled: AtomicBool,
    listeners: Mutex<Listeners>,
}

impl CancelContext {
    fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            listeners: Mutex::new(Listeners {
                callbacks: Vec::new(),
                wakers: Vec::new(),
                next_id: 0,
            }),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Marks the context cancelled and notifies listeners. Returns false if
    /// it was already cancelled; listeners fire at most once per context.
    fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        let (callbacks, wakers) = {
            let mut listeners = self.listeners.lock().unwrap();
            (
                mem::take(&mut listeners.callbacks),
                mem::take(&mut listeners.wakers),
            )
        };
        // No lock is held here: callbacks may re-enter the controller.
        for (_, callback) in callbacks {
            callback();
        }
        for (_, waker) in wakers {
            waker.wake();
        }
        true
    }
}

/// A read-only handle to one cancellation context.
///
/// Signals are snapshots: a signal handed to an invocation keeps referring
/// to that invocation's context even after the owning [`Controller`] has
/// rotated in a fresh context for a later attempt.
pub struct Signal {
    ctx: Arc<CancelContext>,
}

impl Signal {
    /// Whether this context has been cancelled. Once true, always true.
    pub fn is_cancelled(&self) -> bool {
        self.ctx.is_cancelled()
    }

    /// Registers a one-shot callback to run when this context is cancelled.
    ///
    /// The callback runs synchronously inside the cancelling call, exactly
    /// once, in registration order relative to other callbacks on the same
    /// context. If the context is already cancelled the callback runs
    /// immediately — an invocation superseded before its body started still
    /// observes the cancellation this way. The returned [`Subscription`]
    /// allows early unsubscription.
    pub fn on_cancel<F>(&self, f: F) -> Subscription
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut listeners = self.ctx.listeners.lock().unwrap();
            // Checked under the listeners lock: `cancel` sets the flag
            // before draining, so either we register in time to be drained
            // or we see the flag and run immediately. Never both.
            if !self.ctx.is_cancelled() {
                let id = listeners.next_id;
                listeners.next_id += 1;
                listeners.callbacks.push((id, Box::new(f)));
                let weak = Arc::downgrade(&self.ctx);
                return Subscription::new(move || {
                    if let Some(ctx) = weak.upgrade() {
                        let mut listeners = ctx.listeners.lock().unwrap();
                        listeners.callbacks.retain(|(i, _)| *i != id);
                    }
                });
            }
        }
        f();
        Subscription::inert()
    }

    /// A future that resolves once this context is cancelled.
    ///
    /// Resolves immediately if the context is already cancelled; never
    /// resolves for a context that is never cancelled.
    pub fn cancelled(&self) -> Cancelled<'_> {
        Cancelled {
            signal: self,
            key: None,
        }
    }

    /// Races `fut` against cancellation of this context.
    ///
    /// Returns `Ok` with the future's output if it completes first, or
    /// `Err(CancelError)` if the context is cancelled first (or was already
    /// cancelled). This is the usual way a handler stops work when its
    /// attempt is superseded.
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Result<F::Output, CancelError>
    where
        F: Future,
    {
        let cancelled = self.cancelled();
        pin_mut!(cancelled);
        pin_mut!(fut);
        match select(cancelled, fut).await {
            Either::Left(((), _)) => Err(CancelError),
            Either::Right((value, _)) => Ok(value),
        }
    }
}

impl Clone for Signal {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Future returned by [`Signal::cancelled`].
#[must_use = "futures do nothing unless polled/`await`-ed"]
#[derive(Debug)]
pub struct Cancelled<'a> {
    signal: &'a Signal,
    key: Option<u64>,
}

impl Future for Cancelled<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<()> {
        if self.signal.is_cancelled() {
            return Poll::Ready(());
        }
        let ctx = Arc::clone(&self.signal.ctx);
        let mut listeners = ctx.listeners.lock().unwrap();
        // Re-check under the lock so a concurrent cancel cannot slip between
        // the flag read and the waker registration.
        if ctx.is_cancelled() {
            return Poll::Ready(());
        }
        match self.key {
            Some(key) => {
                if let Some(entry) = listeners.wakers.iter_mut().find(|(i, _)| *i == key) {
                    entry.1 = cx.waker().clone();
                } else {
                    listeners.wakers.push((key, cx.waker().clone()));
                }
            }
            None => {
                let id = listeners.next_id;
                listeners.next_id += 1;
                listeners.wakers.push((id, cx.waker().clone()));
                drop(listeners);
                self.key = Some(id);
            }
        }
        Poll::Pending
    }
}

impl Drop for Cancelled<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key {
            if let Ok(mut listeners) = self.signal.ctx.listeners.lock() {
                listeners.wakers.retain(|(i, _)| *i != key);
            }
        }
    }
}

struct ControllerInner {
    current: Mutex<Arc<CancelContext>>,
}

/// Owner of a single "current cancellation context" slot.
///
/// Cloning a `Controller` is cheap and shares the slot: all clones see the
/// same current context, and a `cancel` through any clone is visible to all.
pub struct Controller {
    inner: Arc<ControllerInner>,
}

impl Controller {
    /// Creates a controller holding a fresh, live context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                current: Mutex::new(Arc::new(CancelContext::new())),
            }),
        }
    }

    /// Creates a controller wired to an external cancel trigger.
    ///
    /// Every fire of `event` invokes [`cancel`](Self::cancel) on the
    /// returned controller. Several controllers may share one trigger (for
    /// example "log out" cancelling all outstanding requests).
    pub fn with_cancel(event: &Event<()>) -> Self {
        let controller = Self::new();
        controller.bind_cancel(event);
        controller
    }

    /// Returns the signal of the current context. No side effects.
    pub fn signal(&self) -> Signal {
        Signal {
            ctx: Arc::clone(&*self.inner.current.lock().unwrap()),
        }
    }

    /// Cancels the current context and installs a fresh live one.
    ///
    /// If the current context is live its `on_cancel` callbacks run
    /// synchronously, in registration order, exactly once, *before* the slot
    /// is swapped — a callback calling [`signal`](Self::signal) observes the
    /// cancelled context. The slot rotation itself is unconditional, so the
    /// controller is immediately reusable. Re-entrant `cancel` from inside a
    /// callback is safe: the context sees at most one terminal notification
    /// and is rotated exactly once.
    pub fn cancel(&self) {
        let ctx = Arc::clone(&*self.inner.current.lock().unwrap());
        if ctx.cancel() {
            trace!("cancelled current context");
        }
        let mut current = self.inner.current.lock().unwrap();
        if Arc::ptr_eq(&*current, &ctx) {
            *current = Arc::new(CancelContext::new());
        }
    }

    /// Registers a one-shot callback on the *current* context.
    ///
    /// Equivalent to `self.signal().on_cancel(f)`. Callbacks are one-shot
    /// relative to a context generation: observing a later attempt requires
    /// registering again on that attempt's signal.
    pub fn on_cancel<F>(&self, f: F) -> Subscription
    where
        F: FnOnce() + Send + 'static,
    {
        self.signal().on_cancel(f)
    }

    /// Wires an external cancel trigger into this controller.
    ///
    /// The watcher holds only a weak reference, so the trigger does not keep
    /// the controller alive; fires after the last controller handle is
    /// dropped are no-ops.
    pub fn bind_cancel(&self, event: &Event<()>) {
        let weak: Weak<ControllerInner> = Arc::downgrade(&self.inner);
        let _ = event.watch(move |&()| {
            if let Some(inner) = weak.upgrade() {
                Controller { inner }.cancel();
            }
        });
    }
}

impl Clone for Controller {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("cancelled", &self.signal().is_cancelled())
            .finish()
    }
}

/// The stable "operation cancelled" marker.
///
/// The core never fails a call on its own when its signal is cancelled —
/// cancellation only informs the handler. Handlers that stop work on
/// cancellation (typically via [`Signal::run_until_cancelled`]) surface this
/// error, and callers can match on it to tell supersession apart from domain
/// failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CancelError;

impl fmt::Display for CancelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation cancelled")
    }
}

impl Error for CancelError {}
