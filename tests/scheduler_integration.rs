//! Scheduler integration tests: ordering, cancellation, blocking work,
//! mailbox bounds and deadline timers, driven through the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use spritecore::components::shape::ShapeKind;
use spritecore::events::fault::ScriptError;
use spritecore::events::input::{Event, KeyCode};
use spritecore::game::Engine;
use spritecore::resources::engineconfig::EngineConfig;
use spritecore::resources::host::HeadlessHost;
use spritecore::resources::mailbox::Mailbox;
use spritecore::resources::scheduler::Signal;

const EPSILON: f64 = 1e-6;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn engine() -> Engine<HeadlessHost> {
    Engine::new(EngineConfig::new(), HeadlessHost::new())
}

// ==================== CANCELLATION TESTS ====================

#[test]
fn test_owner_destroyed_before_first_step_runs_no_user_code() {
    let mut engine = engine();
    let ran = Arc::new(AtomicBool::new(false));
    let cat = engine.services().shapes.create(ShapeKind::Sprite, "cat");
    let r = ran.clone();
    let id = engine.services().spawn(Some(&cat), "doomed", move |_| {
        r.store(true, Ordering::SeqCst);
        Ok(())
    });
    engine.services().shapes.remove(&cat);
    engine.step(0.016);
    assert!(!ran.load(Ordering::SeqCst));
    assert!(!engine.services().scheduler.is_alive(id));
}

#[test]
fn test_owner_destroyed_mid_wait_unwinds_with_cleanup() {
    let mut engine = engine();
    let cat = engine.services().shapes.create(ShapeKind::Sprite, "cat");
    let log = Arc::new(Mutex::new(Vec::new()));
    let l = log.clone();
    engine.services().spawn(Some(&cat), "walker", move |ctx| {
        let cleanup_log = l.clone();
        ctx.on_cleanup(move || cleanup_log.lock().push("cleanup"));
        l.lock().push("before");
        let outcome = ctx.wait_seconds(10.0);
        assert!(matches!(outcome, Err(ScriptError::Cancelled)));
        outcome?;
        l.lock().push("after");
        Ok(())
    });
    engine.step(0.016);
    engine.services().shapes.remove(&cat);
    engine.step(0.016);
    assert_eq!(*log.lock(), vec!["before", "cleanup"]);
    assert_eq!(engine.services().scheduler.live_count(), 0);
}

#[test]
fn test_abort_all_on_reset_stops_every_thread() {
    let mut engine = engine();
    let steps = Arc::new(AtomicUsize::new(0));
    for name in ["a", "b", "c"] {
        let steps = steps.clone();
        engine.services().spawn(None, name, move |ctx| {
            loop {
                steps.fetch_add(1, Ordering::SeqCst);
                ctx.wait_next_frame()?;
            }
        });
    }
    engine.step(0.016);
    engine.step(0.016);
    assert_eq!(steps.load(Ordering::SeqCst), 6);
    engine.on_engine_reset();
    assert_eq!(engine.services().scheduler.live_count(), 0);
    engine.step(0.016);
    assert_eq!(steps.load(Ordering::SeqCst), 6);
}

// ==================== SIGNAL TESTS ====================

#[test]
fn test_signal_raised_by_sink_wakes_waiter() {
    let mut engine = engine();
    let gate = Arc::new(Signal::new());
    let woke = Arc::new(AtomicBool::new(false));

    let (g, w) = (gate.clone(), woke.clone());
    engine.services().spawn(None, "waiter", move |ctx| {
        ctx.wait_until(&g)?;
        w.store(true, Ordering::SeqCst);
        Ok(())
    });
    let g = gate.clone();
    engine
        .services()
        .sinks
        .on_key_down(Some(KeyCode(32)), move |_, _| g.raise());

    engine.step(0.016);
    engine.step(0.016);
    assert!(!woke.load(Ordering::SeqCst));
    engine.on_key(KeyCode(32), true);
    engine.step(0.016);
    assert!(woke.load(Ordering::SeqCst));
}

// ==================== BLOCKING WORK TESTS ====================

#[test]
fn test_run_blocking_leaves_other_threads_running() {
    let mut engine = engine();
    let ticks = Arc::new(AtomicUsize::new(0));
    let result = Arc::new(Mutex::new(None));

    let r = result.clone();
    engine.services().spawn(None, "loader", move |ctx| {
        let value = ctx.run_blocking(|| {
            std::thread::sleep(Duration::from_millis(30));
            7 * 6
        })?;
        *r.lock() = Some(value);
        Ok(())
    });
    let t = ticks.clone();
    engine.services().spawn(None, "counter", move |ctx| {
        loop {
            t.fetch_add(1, Ordering::SeqCst);
            ctx.wait_next_frame()?;
        }
    });

    let mut frames = 0;
    while result.lock().is_none() && frames < 500 {
        engine.step(0.016);
        std::thread::sleep(Duration::from_millis(1));
        frames += 1;
    }
    assert_eq!(*result.lock(), Some(42));
    assert!(ticks.load(Ordering::SeqCst) >= 2);
}

// ==================== MAILBOX TESTS ====================

#[test]
fn test_mailbox_delivers_exactly_capacity() {
    let mailbox = Mailbox::new(4);
    let accepted = (0..10)
        .filter(|i| {
            mailbox.post(Event::KeyDown {
                key: KeyCode(*i),
                at: 0.0,
            })
        })
        .count();
    assert_eq!(accepted, 4);
    assert_eq!(mailbox.dropped(), 6);
    let delivered: Vec<_> = std::iter::from_fn(|| mailbox.next()).collect();
    assert_eq!(delivered.len(), 4);
    assert_eq!(
        delivered[0],
        Event::KeyDown {
            key: KeyCode(0),
            at: 0.0
        }
    );
}

#[test]
fn test_engine_mailbox_overflow_drops_newest() {
    let mut config = EngineConfig::new();
    config.mailbox_capacity = 3;
    let mut engine = Engine::new(config, HeadlessHost::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    engine
        .services()
        .sinks
        .on_key_down(None, move |_, key| s.lock().push(key.0));
    for code in 0..5 {
        engine.on_key(KeyCode(code), true);
    }
    engine.step(0.016);
    assert_eq!(*seen.lock(), vec![0, 1, 2]);
    assert_eq!(engine.services().mailbox.dropped(), 2);
}

// ==================== TIMER TESTS ====================

#[test]
fn test_deadlines_fire_once_in_order() {
    let mut engine = engine();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let f = fired.clone();
    engine
        .services()
        .sinks
        .on_timer(move |_, deadline| f.lock().push(deadline));
    for deadline in [0.5, 0.2, 0.8] {
        engine.services().timers.register(deadline);
    }
    for _ in 0..10 {
        engine.step(0.1);
    }
    engine.step(0.1);
    let fired = fired.lock().clone();
    assert_eq!(fired.len(), 3);
    assert!(approx_eq(fired[0], 0.2));
    assert!(approx_eq(fired[1], 0.5));
    assert!(approx_eq(fired[2], 0.8));
}
