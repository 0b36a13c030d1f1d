use crate::{history, pool, snapshot, spawn};
use futures::future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use supersede::{CancelError, Controller, Event};
use test_log::test;

#[test]
fn cancel_marks_the_current_context_and_rotates() {
    let controller = Controller::new();
    let signal = controller.signal();
    assert!(!signal.is_cancelled());

    controller.cancel();

    // The old context is permanently cancelled; the slot already holds a
    // fresh live one.
    assert!(signal.is_cancelled());
    assert!(!controller.signal().is_cancelled());
}

#[test]
fn on_cancel_fires_once_in_registration_order() {
    let controller = Controller::new();
    let calls = history();

    let first = Arc::clone(&calls);
    controller.on_cancel(move || first.lock().unwrap().push("first"));
    let second = Arc::clone(&calls);
    controller.on_cancel(move || second.lock().unwrap().push("second"));

    controller.cancel();
    controller.cancel();
    controller.cancel();

    assert_eq!(snapshot(&calls), vec!["first", "second"]);
}

#[test]
fn on_cancel_does_not_observe_later_generations() {
    let controller = Controller::new();
    let calls = history();

    let sink = Arc::clone(&calls);
    controller.on_cancel(move || sink.lock().unwrap().push("old generation"));
    controller.cancel();

    // Registered after the rotation, so it belongs to the fresh context.
    let sink = Arc::clone(&calls);
    controller.on_cancel(move || sink.lock().unwrap().push("new generation"));
    controller.cancel();

    assert_eq!(snapshot(&calls), vec!["old generation", "new generation"]);
}

#[test]
fn unsubscribed_callback_never_fires() {
    let controller = Controller::new();
    let fired = Arc::new(AtomicUsize::new(0));

    let count = Arc::clone(&fired);
    let sub = controller.on_cancel(move || {
        count.fetch_add(1, Ordering::SeqCst);
    });
    sub.unsubscribe();
    controller.cancel();

    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn on_cancel_runs_immediately_for_a_cancelled_signal() {
    let controller = Controller::new();
    let signal = controller.signal();
    controller.cancel();

    let fired = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&fired);
    signal.on_cancel(move || {
        count.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn external_trigger_cancels_the_controller() {
    let log_out = Event::new();
    let controller = Controller::with_cancel(&log_out);
    let signal = controller.signal();

    log_out.fire(&());

    assert!(signal.is_cancelled());
    assert!(!controller.signal().is_cancelled());
}

#[test]
fn one_trigger_drives_many_controllers() {
    let log_out = Event::new();
    let first = Controller::with_cancel(&log_out);
    let second = Controller::with_cancel(&log_out);
    let signals = (first.signal(), second.signal());

    log_out.fire(&());

    assert!(signals.0.is_cancelled());
    assert!(signals.1.is_cancelled());
}

#[test]
fn dropped_controller_detaches_from_its_trigger() {
    let log_out = Event::new();
    let controller = Controller::with_cancel(&log_out);
    drop(controller);

    // Must not panic or resurrect the controller.
    log_out.fire(&());
}

#[test]
fn reentrant_cancel_notifies_each_context_once() {
    let controller = Controller::new();
    let calls = history();

    let inner = controller.clone();
    let sink = Arc::clone(&calls);
    controller.on_cancel(move || {
        sink.lock().unwrap().push("outer");
        // Cancels the same (already cancelled, not yet rotated) context:
        // no second notification for it.
        inner.cancel();
    });

    controller.cancel();

    assert_eq!(snapshot(&calls), vec!["outer"]);
    assert!(!controller.signal().is_cancelled());
}

#[test]
fn cancelled_future_resolves_on_cancel() {
    let controller = Controller::new();
    let signal = controller.signal();
    let resolved = Arc::new(AtomicUsize::new(0));

    let (mut pool, spawner) = pool();
    let count = Arc::clone(&resolved);
    spawn(&spawner, async move {
        signal.cancelled().await;
        count.fetch_add(1, Ordering::SeqCst);
    });

    pool.run_until_stalled();
    assert_eq!(resolved.load(Ordering::SeqCst), 0);

    controller.cancel();
    pool.run_until_stalled();
    assert_eq!(resolved.load(Ordering::SeqCst), 1);
}

#[test]
fn run_until_cancelled_returns_the_value_when_work_wins() {
    let controller = Controller::new();
    let signal = controller.signal();

    let result = futures::executor::block_on(signal.run_until_cancelled(async { 42 }));

    assert_eq!(result, Ok(42));
}

#[test]
fn run_until_cancelled_fails_when_cancellation_wins() {
    let controller = Controller::new();
    let signal = controller.signal();
    let outcome = history();

    let (mut pool, spawner) = pool();
    let sink = Arc::clone(&outcome);
    spawn(&spawner, async move {
        let result = signal.run_until_cancelled(future::pending::<()>()).await;
        sink.lock().unwrap().push(result);
    });

    pool.run_until_stalled();
    controller.cancel();
    pool.run_until_stalled();

    assert_eq!(snapshot(&outcome), vec![Err::<(), _>(CancelError)]);
}
