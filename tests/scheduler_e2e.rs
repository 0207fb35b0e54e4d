//! Event-loop e2e: timer ordering, intervals, microtasks, fibers, and
//! loop lifecycle through the facade.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fibra::{Async, Scheduler};

#[test]
fn timers_execute_in_deadline_order() {
    let _guard = common::guard();

    let order = Arc::new(Mutex::new(Vec::new()));
    for (label, ms) in [(200u64, 20u64), (100, 10), (300, 30)] {
        let order = Arc::clone(&order);
        Async::set_timeout(move || order.lock().unwrap().push(label), ms);
    }
    Async::wait();
    assert_eq!(*order.lock().unwrap(), vec![100, 200, 300]);
}

#[test]
fn microtasks_run_before_later_scheduled_microtasks() {
    let _guard = common::guard();

    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..4 {
        let order = Arc::clone(&order);
        Async::schedule(move || order.lock().unwrap().push(i));
    }
    Async::wait();
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn interval_timer_repeats_until_cleared() {
    let _guard = common::guard();

    let fired = Arc::new(AtomicUsize::new(0));
    let id_cell = Arc::new(Mutex::new(None));
    let fired2 = Arc::clone(&fired);
    let id_cell2 = Arc::clone(&id_cell);
    let id = Async::set_interval(
        move || {
            if fired2.fetch_add(1, Ordering::SeqCst) + 1 >= 4 {
                if let Some(id) = *id_cell2.lock().unwrap() {
                    Async::clear_timer(id);
                }
            }
        },
        2,
    );
    *id_cell.lock().unwrap() = Some(id);
    Async::wait();
    assert_eq!(fired.load(Ordering::SeqCst), 4);
}

#[test]
fn fiber_result_settles_its_promise() {
    let _guard = common::guard();

    let promise = Async::run(|_| Ok(5), None);
    assert_eq!(promise.wait().unwrap(), 5);
}

#[test]
fn fiber_drives_a_nested_delay() {
    let _guard = common::guard();

    let promise = Async::run(
        |cx| {
            let nested = Async::delay(5, 21);
            let value = cx.wait(&nested)?;
            Ok(value * 2)
        },
        None,
    );
    assert_eq!(promise.wait().unwrap(), 42);
}

#[test]
fn fiber_can_spawn_and_wait_another_fiber() {
    let _guard = common::guard();

    let promise = Async::run(
        |cx| {
            let inner = Async::run(|_| Ok("inner done"), None);
            cx.wait(&inner)
        },
        None,
    );
    assert_eq!(promise.wait().unwrap(), "inner done");
}

#[test]
fn fiber_panic_becomes_a_rejection() {
    let _guard = common::guard();

    let promise: fibra::Promise<i32> = Async::run(|_| panic!("fiber exploded"), None);
    let reason = promise.wait().unwrap_err();
    assert!(reason.message().contains("fiber exploded"));
}

#[test]
fn yield_outside_a_fiber_is_a_noop() {
    assert!(!fibra::in_fiber());
    assert!(Async::yield_now().is_ok());
}

#[test]
fn started_loop_idles_until_stopped() {
    let _guard = common::guard();

    Async::start_event_loop();
    let stopped = Arc::new(AtomicUsize::new(0));
    let stopped2 = Arc::clone(&stopped);
    Async::set_timeout(
        move || {
            stopped2.fetch_add(1, Ordering::SeqCst);
            Async::stop_event_loop();
        },
        10,
    );
    Async::wait();
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn shutdown_flushes_pending_microtasks() {
    let _guard = common::guard();

    let ran = Arc::new(AtomicUsize::new(0));
    let ran2 = Arc::clone(&ran);
    Async::schedule(move || {
        ran2.fetch_add(1, Ordering::SeqCst);
    });
    Async::start_event_loop();
    Async::shutdown();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn current_time_is_monotonic_milliseconds() {
    let _guard = common::guard();

    let t1 = Async::current_time();
    std::thread::sleep(std::time::Duration::from_millis(3));
    let t2 = Async::current_time();
    assert!(t2 - t1 >= 2.0);
}

#[test]
fn driver_thread_wait_detects_unsettleable_promises() {
    let _guard = common::guard();

    let stuck: fibra::Promise<i32> = fibra::Promise::pending();
    let err = stuck.wait().unwrap_err();
    assert_eq!(err.kind(), fibra::ErrorKind::WrongState);
}

#[test]
fn scheduler_reset_leaves_a_reusable_loop() {
    let _guard = common::guard();
    let scheduler = Scheduler::global();

    Async::set_timeout(|| {}, 1_000);
    let spinning: fibra::Promise<i32> = Async::run(
        |cx| loop {
            cx.yield_now()?;
        },
        None,
    );
    assert!(scheduler.has_pending_work());

    scheduler.reset();
    assert!(!scheduler.has_pending_work());
    assert!(spinning.wait().is_err());

    // and the loop still works afterwards
    let after = Async::run(|_| Ok(1), None);
    assert_eq!(after.wait().unwrap(), 1);
}
