#![deny(warnings, missing_debug_implementations, missing_docs)]

//! Supersede is a small, executor-agnostic concurrency primitive: a
//! *cancellable request effect*. A [`RequestFx`] wraps an asynchronous
//! handler so that each invocation receives a fresh, revocable cancellation
//! [`Signal`], and starting a new invocation automatically *supersedes*
//! (cancels the signal of) any still-pending previous one. Individual calls
//! can opt out of supersession or be grouped under an explicitly shared
//! [`Controller`].
//!
//! The classic use case is "last request wins": an autocomplete box fires a
//! lookup on every keystroke, and only the latest lookup should be allowed
//! to deliver. Rather than tracking generation counters by hand, wrap the
//! lookup once and call it freely:
//!
//! ```
//! use futures::executor::LocalPool;
//! use futures::task::LocalSpawnExt;
//! use supersede::{RequestFx, Signal};
//!
//! let fx = RequestFx::new(|query: String, signal: Signal| async move {
//!     // Stop as soon as this attempt is superseded by a newer call.
//!     signal.run_until_cancelled(async move {
//!         // ... the actual lookup ...
//!         format!("results for {}", query)
//!     }).await
//! });
//!
//! let mut pool = LocalPool::new();
//! let spawner = pool.spawner();
//! for query in &["r", "ru", "rust"] {
//!     let call = fx.call(query.to_string());
//!     spawner.spawn_local(async move { let _ = call.await; }).unwrap();
//! }
//! pool.run_until_stalled();
//! // Only the "rust" lookup ran to completion; the first two observed
//! // cancellation and bailed out with `CancelError`.
//! assert_eq!(fx.in_flight(), 0);
//! ```
//!
//! ## Cancellation is cooperative
//!
//! Superseding a call never aborts its handler. Cancellation only *informs*:
//! the superseded attempt's [`Signal`] becomes cancelled, its
//! [`on_cancel`](Signal::on_cancel) callbacks run, and its
//! [`cancelled`](Signal::cancelled) future resolves. A handler that ignores
//! its signal simply runs to completion and delivers its result — which is
//! sometimes exactly what you want (fire the request, but know it was
//! outdated). A handler that should stop typically races its work against
//! the signal with [`Signal::run_until_cancelled`] and surfaces
//! [`CancelError`].
//!
//! ## Call modes
//!
//! Every call carries a [`CallMode`], resolved once at invocation time:
//!
//! * [`CallMode::Supersede`] (the default, used by [`RequestFx::call`]):
//!   cancel the previous default-mode call, run under the wrapper's shared
//!   internal controller.
//! * [`CallMode::Independent`]: run under a throwaway controller; the call
//!   neither cancels nor is cancelled by any other call.
//! * [`CallMode::WithController`]: run under a caller-supplied
//!   [`Controller`]. Calls sharing one controller supersede each other
//!   exactly like default-mode calls do, forming a supersession domain of
//!   their own; the wrapper's default domain is unaffected.
//!
//! Calls issued in the same synchronous burst take their supersession steps
//! in call order, before any handler body runs.
//!
//! ## Controllers and external triggers
//!
//! A [`Controller`] owns one "current context" at a time. Cancelling it
//! (with [`Controller::cancel`]) permanently cancels that context, notifies its
//! subscribers exactly once, and rotates in a fresh live context, so the
//! controller is immediately reusable. A controller (or a whole wrapper) can
//! also be driven from an external [`Event`] trigger, and a [`Scope`] groups
//! wrappers under one shared cancel-all trigger:
//!
//! ```
//! use supersede::{Controller, Event};
//!
//! let log_out = Event::new();
//! let requests = Controller::with_cancel(&log_out);
//!
//! let signal = requests.signal();
//! log_out.fire(&());
//! assert!(signal.is_cancelled());
//! // The controller already holds a fresh context for the next attempt.
//! assert!(!requests.signal().is_cancelled());
//! ```
//!
//! ## Scheduling model
//!
//! The crate assumes single-threaded cooperative scheduling and brings no
//! executor of its own: a call future runs on whatever executor the host
//! provides (the tests use [`futures::executor::LocalPool`]). All types are
//! nevertheless `Send + Sync` and safe under parallel executors; only the
//! burst-ordering guarantee is inherently a property of issuing calls from
//! one thread.
//!
//! [`futures::executor::LocalPool`]: https://docs.rs/futures/0.3/futures/executor/struct.LocalPool.html

pub mod controller;
pub mod event;
pub mod request;
pub mod scope;

pub use controller::{CancelError, Cancelled, Controller, Signal};
pub use event::{Event, Subscription};
pub use request::{CallMode, Done, Fail, RequestFx, RequestFxBuilder};
pub use scope::Scope;
