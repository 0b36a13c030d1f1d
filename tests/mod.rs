#![deny(warnings)]

mod controller;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// Shared log of values observed by watchers, for asserting notification
/// order.
pub(crate) type History<T> = Arc<Mutex<Vec<T>>>;

pub(crate) fn history<T>() -> History<T> {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn snapshot<T: Clone>(history: &History<T>) -> Vec<T> {
    history.lock().unwrap().clone()
}

/// A deterministic single-threaded cooperative executor for one test.
pub(crate) fn pool() -> (LocalPool, LocalSpawner) {
    let pool = LocalPool::new();
    let spawner = pool.spawner();
    (pool, spawner)
}

/// Spawns a call future, discarding its result (the tests observe outcomes
/// through the `done`/`fail` streams instead).
pub(crate) fn spawn<F>(spawner: &LocalSpawner, fut: F)
where
    F: Future + 'static,
{
    spawner
        .spawn_local(async move {
            let _ = fut.await;
        })
        .unwrap();
}

pub(crate) async fn yield_now() {
    struct YieldNow {
        yielded: bool,
    }

    impl Future for YieldNow {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.yielded {
                return Poll::Ready(());
            }
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }

    YieldNow { yielded: false }.await
}

/// Suspends `n` times; a stand-in for a timer under cooperative scheduling.
pub(crate) async fn ticks(n: usize) {
    for _ in 0..n {
        yield_now().await;
    }
}
