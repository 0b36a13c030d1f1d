//! A minimal fire-and-subscribe event primitive.
//!
//! [`Event`] is the notification channel used throughout this crate: a
//! [`RequestFx`](crate::RequestFx) publishes its `done`/`fail`/`pending`
//! streams through events, a [`Controller`](crate::Controller) can be driven
//! by an external cancel event, and a [`Scope`](crate::Scope) broadcasts its
//! cancel-all trigger over one. Events carry no state: firing an event
//! invokes the currently registered watchers and nothing else.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex};

type WatcherFn<T> = Box<dyn FnMut(&T) + Send>;

struct Watchers<T> {
    entries: Vec<(u64, WatcherFn<T>)>,
    // Watchers unsubscribed while a fire has the entries checked out. They
    // are skipped during that fire and dropped when the entries are merged
    // back.
    removed: Vec<u64>,
    next_id: u64,
}

/// A fire-and-subscribe broadcast signal.
///
/// Cloning an `Event` is cheap and yields a handle to the same watcher set;
/// firing through any clone notifies all watchers.
pub struct Event<T> {
    watchers: Arc<Mutex<Watchers<T>>>,
}

impl<T> Event<T> {
    /// Creates an event with no watchers.
    pub fn new() -> Self {
        Self {
            watchers: Arc::new(Mutex::new(Watchers {
                entries: Vec::new(),
                removed: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Fires the event, invoking every watcher in registration order.
    ///
    /// Watchers registered while the fire is in progress are not invoked for
    /// this fire; watchers unsubscribed while it is in progress are skipped
    /// if they have not run yet. No lock is held while a watcher runs, so
    /// watchers may freely subscribe to or fire other events.
    pub fn fire(&self, payload: &T) {
        let mut running = {
            let mut watchers = self.watchers.lock().unwrap();
            mem::take(&mut watchers.entries)
        };
        for (id, f) in running.iter_mut() {
            let skip = self.watchers.lock().unwrap().removed.contains(id);
            if !skip {
                f(payload);
            }
        }
        let mut watchers = self.watchers.lock().unwrap();
        // Entries pushed during the fire sit in `entries` now; keep overall
        // registration order by appending them after the original set.
        let added = mem::take(&mut watchers.entries);
        running.extend(added);
        let removed = mem::take(&mut watchers.removed);
        running.retain(|(id, _)| !removed.contains(id));
        watchers.entries = running;
    }

    /// Registers a watcher invoked on every subsequent [`fire`](Self::fire).
    ///
    /// The returned [`Subscription`] detaches the watcher. Dropping the
    /// subscription without calling [`Subscription::unsubscribe`] leaves the
    /// watcher registered for the lifetime of the event.
    pub fn watch<F>(&self, f: F) -> Subscription
    where
        F: FnMut(&T) + Send + 'static,
        T: 'static,
    {
        let id = {
            let mut watchers = self.watchers.lock().unwrap();
            let id = watchers.next_id;
            watchers.next_id += 1;
            watchers.entries.push((id, Box::new(f)));
            id
        };
        let weak = Arc::downgrade(&self.watchers);
        Subscription::new(move || {
            if let Some(watchers) = weak.upgrade() {
                let mut watchers = watchers.lock().unwrap();
                if let Some(pos) = watchers.entries.iter().position(|(i, _)| *i == id) {
                    let _ = watchers.entries.remove(pos);
                } else {
                    // A fire has the entries checked out; leave a tombstone.
                    watchers.removed.push(id);
                }
            }
        })
    }

    /// Number of currently registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().unwrap().entries.len()
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            watchers: Arc::clone(&self.watchers),
        }
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("watchers", &self.watcher_count())
            .finish()
    }
}

/// A handle detaching a watcher or cancellation callback.
///
/// Subscriptions are deliberately inert on drop: discarding one keeps the
/// underlying registration alive. Call [`unsubscribe`](Self::unsubscribe) to
/// detach early.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new<F: FnOnce() + Send + 'static>(detach: F) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription with nothing left to detach.
    pub(crate) fn inert() -> Self {
        Self { detach: None }
    }

    /// Detaches the underlying registration.
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}
