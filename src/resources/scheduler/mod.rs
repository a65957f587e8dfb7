//! Cooperative script scheduler.
//!
//! Scripts are ordinary Rust closures taking a [`ScriptCtx`]. Each runs on
//! a dedicated OS thread parked on a channel, and the scheduler hands
//! control to at most one of them at a time:
//!
//! - [`Scheduler::tick`] steps every ready thread exactly once, in the
//!   order the threads last yielded (newly spawned threads join the back)
//! - threads spawned during a tick first run on the following tick
//! - [`Scheduler::abort`] only marks a thread; it is unwound the next time
//!   the driving thread reaches it, or immediately by [`Scheduler::reap`]
//! - a thread whose owning shape is gone is cancelled instead of resumed,
//!   even if it never reached its first suspension point
//!
//! While a script runs, the driving thread keeps serving the main-thread
//! dispatcher so the script can reach the host synchronously.

mod signal;
mod thread;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use crossbeam_channel::select;
use log::{debug, error, trace};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

pub use signal::Signal;
pub use thread::ScriptCtx;

use thread::{ThreadExit, ThreadLink, WaitRequest, Wake, Yield};

use crate::components::shape::Shape;
use crate::events::fault::{ScriptFault, ScriptResult};
use crate::resources::dispatcher::MainThreadDispatcher;
use crate::resources::frameclock::FrameClock;
use crate::resources::host::HostBoundary;
use crate::resources::services::Services;

/// Slack applied when comparing clock readings against deadlines.
pub const TIME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(pub u64);

impl ScriptId {
    /// Attributed to callbacks that run on the host-owning thread.
    pub const HOST: ScriptId = ScriptId(0);
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script#{}", self.0)
    }
}

/// What a parked thread is waiting for, resolved against the clock.
#[derive(Debug, Clone)]
enum Suspension {
    Start,
    NextFrame,
    Until { deadline: f64 },
    Signal(Signal),
}

struct ThreadEntry {
    name: String,
    owner: Option<Weak<Shape>>,
    suspension: Suspension,
    since: f64,
    link: ThreadLink,
}

impl ThreadEntry {
    fn must_cancel(&self) -> bool {
        if self.link.abort.load(Ordering::Acquire) {
            return true;
        }
        match &self.owner {
            None => false,
            Some(weak) => weak.upgrade().is_none_or(|shape| shape.is_destroyed()),
        }
    }

    /// `Some(waited)` when the thread may run at `now`.
    fn ready(&self, clock: &FrameClock) -> Option<f64> {
        let now = clock.elapsed;
        match &self.suspension {
            Suspension::Start => Some(0.0),
            Suspension::NextFrame => Some(clock.delta),
            Suspension::Until { deadline } => {
                (now + TIME_EPSILON >= *deadline).then(|| now - self.since)
            }
            Suspension::Signal(signal) => signal.is_raised().then(|| now - self.since),
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    next_id: u64,
    threads: FxHashMap<ScriptId, ThreadEntry>,
    queue: VecDeque<ScriptId>,
    faults: Vec<ScriptFault>,
    now: f64,
}

/// Shared handle to the scheduler; clones refer to the same thread table.
#[derive(Clone, Default)]
pub struct Scheduler {
    state: Arc<Mutex<SchedulerState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a thread running `f`. It first runs on the next tick.
    ///
    /// `owner` is held weakly; once the shape is dropped or destroyed the
    /// thread is cancelled at its next scheduling point.
    pub fn spawn_with<F>(
        &self,
        services: Services,
        owner: Option<&Arc<Shape>>,
        name: impl Into<String>,
        f: F,
    ) -> ScriptId
    where
        F: FnOnce(&ScriptCtx) -> ScriptResult + Send + 'static,
    {
        let name = name.into();
        let owner = owner.map(Arc::downgrade);
        let mut st = self.state.lock();
        st.next_id += 1;
        let id = ScriptId(st.next_id);

        match thread::launch(id, name.clone(), owner.clone(), services, f) {
            Ok(link) => {
                let since = st.now;
                st.threads.insert(
                    id,
                    ThreadEntry {
                        name: name.clone(),
                        owner,
                        suspension: Suspension::Start,
                        since,
                        link,
                    },
                );
                st.queue.push_back(id);
                debug!("spawned {} '{}'", id, name);
            }
            Err(e) => {
                error!("cannot start OS thread for {} '{}': {}", id, name, e);
                st.faults.push(ScriptFault {
                    thread: id,
                    name,
                    message: format!("thread spawn failed: {e}"),
                    backtrace: None,
                    during_setup: true,
                });
            }
        }
        id
    }

    /// Step every thread that is ready at the clock's current reading.
    ///
    /// Must be called from the thread that owns `host`. Returns how many
    /// threads were stepped.
    pub fn tick(
        &self,
        clock: &FrameClock,
        host: &mut dyn HostBoundary,
        dispatcher: &MainThreadDispatcher,
    ) -> usize {
        let order: Vec<ScriptId> = {
            let mut st = self.state.lock();
            st.now = clock.elapsed;
            st.queue.iter().copied().collect()
        };

        let mut stepped = 0;
        for id in order {
            let wake = {
                let st = self.state.lock();
                let Some(entry) = st.threads.get(&id) else {
                    continue;
                };
                if entry.must_cancel() {
                    Wake::Cancel
                } else {
                    match entry.ready(clock) {
                        Some(waited) => Wake::Run { waited },
                        None => continue,
                    }
                }
            };
            self.step(id, wake, host, dispatcher);
            stepped += 1;
        }
        if stepped > 0 {
            trace!("scheduler stepped {} thread(s)", stepped);
        }
        stepped
    }

    /// Hand control to one thread and wait until it yields or exits.
    fn step(
        &self,
        id: ScriptId,
        wake: Wake,
        host: &mut dyn HostBoundary,
        dispatcher: &MainThreadDispatcher,
    ) {
        let (wake_tx, yield_rx) = {
            let st = self.state.lock();
            let Some(entry) = st.threads.get(&id) else {
                return;
            };
            (entry.link.wake_tx.clone(), entry.link.yield_rx.clone())
        };

        let reply = if wake_tx.send(wake).is_ok() {
            let jobs = dispatcher.jobs();
            loop {
                select! {
                    recv(yield_rx) -> msg => break msg.ok(),
                    recv(jobs) -> job => {
                        if let Ok(job) = job {
                            job(&mut *host);
                        }
                    }
                }
            }
        } else {
            None
        };

        let mut st = self.state.lock();
        match reply {
            Some(Yield::Suspend(request)) => {
                let now = st.now;
                if let Some(entry) = st.threads.get_mut(&id) {
                    entry.since = now;
                    entry.suspension = match request {
                        WaitRequest::Start => Suspension::Start,
                        WaitRequest::NextFrame => Suspension::NextFrame,
                        WaitRequest::Seconds(s) => Suspension::Until { deadline: now + s },
                        WaitRequest::Signal(signal) => Suspension::Signal(signal),
                    };
                }
                st.queue.retain(|queued| *queued != id);
                st.queue.push_back(id);
            }
            Some(Yield::Exit(exit)) => {
                let entry = Self::forget(&mut st, id);
                if let ThreadExit::Faulted(fault) = exit {
                    st.faults.push(fault);
                }
                drop(st);
                if let Some(entry) = entry {
                    if entry.link.handle.join().is_err() {
                        error!("{} '{}' panicked outside its script body", id, entry.name);
                    }
                }
            }
            None => {
                let name = Self::forget(&mut st, id).map(|e| e.name).unwrap_or_default();
                error!("{} '{}' vanished without reporting an exit", id, name);
                st.faults.push(ScriptFault {
                    thread: id,
                    name,
                    message: "script thread disconnected".to_string(),
                    backtrace: None,
                    during_setup: false,
                });
            }
        }
    }

    fn forget(st: &mut SchedulerState, id: ScriptId) -> Option<ThreadEntry> {
        st.queue.retain(|queued| *queued != id);
        st.threads.remove(&id)
    }

    /// Mark a thread for termination. Safe to call from any thread,
    /// including the thread being aborted.
    pub fn abort(&self, id: ScriptId) -> bool {
        let st = self.state.lock();
        match st.threads.get(&id) {
            Some(entry) => {
                entry.link.abort.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Mark every thread for termination.
    pub fn abort_all(&self) {
        let st = self.state.lock();
        for entry in st.threads.values() {
            entry.link.abort.store(true, Ordering::Release);
        }
    }

    /// Unwind every thread that must stop (aborted or orphaned) right now,
    /// without waiting for the next tick. Returns how many were unwound.
    pub fn reap(&self, host: &mut dyn HostBoundary, dispatcher: &MainThreadDispatcher) -> usize {
        let doomed: Vec<ScriptId> = {
            let st = self.state.lock();
            st.queue
                .iter()
                .copied()
                .filter(|id| st.threads.get(id).is_some_and(ThreadEntry::must_cancel))
                .collect()
        };
        for id in &doomed {
            self.step(*id, Wake::Cancel, host, dispatcher);
        }
        if !doomed.is_empty() {
            debug!("reaped {} script thread(s)", doomed.len());
        }
        doomed.len()
    }

    /// Abort and unwind every thread.
    pub fn shutdown(&self, host: &mut dyn HostBoundary, dispatcher: &MainThreadDispatcher) {
        // A script may spawn from a cleanup handler; keep going until empty.
        loop {
            self.abort_all();
            if self.reap(host, dispatcher) == 0 {
                break;
            }
        }
    }

    /// Faults reported since the last call.
    pub fn take_faults(&self) -> Vec<ScriptFault> {
        std::mem::take(&mut self.state.lock().faults)
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().threads.len()
    }

    pub fn is_alive(&self, id: ScriptId) -> bool {
        self.state.lock().threads.contains_key(&id)
    }

    pub fn thread_name(&self, id: ScriptId) -> Option<String> {
        self.state.lock().threads.get(&id).map(|e| e.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::fault::ScriptError;
    use crate::resources::host::HeadlessHost;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const EPSILON: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON
    }

    struct Rig {
        services: Services,
        host: HeadlessHost,
        clock: FrameClock,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                services: Services::new(16),
                host: HeadlessHost::new(),
                clock: FrameClock::default(),
            }
        }

        fn tick(&mut self, dt: f64) -> usize {
            self.clock.advance(dt);
            let scheduler = self.services.scheduler.clone();
            scheduler.tick(&self.clock, &mut self.host, &self.services.dispatcher)
        }

        fn shutdown(&mut self) {
            let scheduler = self.services.scheduler.clone();
            scheduler.shutdown(&mut self.host, &self.services.dispatcher);
        }
    }

    // ==================== ORDERING TESTS ====================

    #[test]
    fn test_threads_step_in_spawn_order_one_step_per_tick() {
        let mut rig = Rig::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let log = log.clone();
            rig.services.spawn(None, name, move |ctx| {
                for step in 0..2 {
                    log.lock().push(format!("{}{}", ctx.name(), step));
                    ctx.wait_next_frame()?;
                }
                Ok(())
            });
        }
        rig.tick(0.1);
        assert_eq!(*log.lock(), vec!["a0", "b0", "c0"]);
        rig.tick(0.1);
        assert_eq!(log.lock().len(), 6);
        rig.tick(0.1);
        assert_eq!(rig.services.scheduler.live_count(), 0);
    }

    #[test]
    fn test_spawn_during_tick_runs_next_tick() {
        let mut rig = Rig::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let child_hits = hits.clone();
        rig.services.spawn(None, "parent", move |ctx| {
            ctx.spawn(None, "child", move |_| {
                child_hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });
        assert_eq!(rig.tick(0.1), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        rig.tick(0.1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    // ==================== WAIT TESTS ====================

    #[test]
    fn test_wait_seconds_resumes_after_deadline() {
        let mut rig = Rig::new();
        let waited = Arc::new(Mutex::new(None));
        let out = waited.clone();
        rig.services.spawn(None, "sleeper", move |ctx| {
            *out.lock() = Some(ctx.wait_seconds(0.3)?);
            Ok(())
        });
        rig.tick(0.1); // runs, suspends at 0.1
        rig.tick(0.1);
        rig.tick(0.1);
        assert!(waited.lock().is_none());
        rig.tick(0.1); // elapsed 0.4
        let w = waited.lock().unwrap();
        assert!(approx_eq(w, 0.3), "waited {}", w);
    }

    #[test]
    fn test_wait_until_signal() {
        let mut rig = Rig::new();
        let signal = Signal::new();
        let woke = Arc::new(AtomicUsize::new(0));
        let (s, w) = (signal.clone(), woke.clone());
        rig.services.spawn(None, "listener", move |ctx| {
            ctx.wait_until(&s)?;
            w.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        rig.tick(0.1);
        rig.tick(0.1);
        assert_eq!(woke.load(Ordering::SeqCst), 0);
        signal.raise();
        rig.tick(0.1);
        assert_eq!(woke.load(Ordering::SeqCst), 1);
    }

    // ==================== CANCELLATION TESTS ====================

    #[test]
    fn test_abort_runs_cleanup_and_no_more_user_code() {
        let mut rig = Rig::new();
        let steps = Arc::new(AtomicUsize::new(0));
        let cleaned = Arc::new(AtomicUsize::new(0));
        let (s, c) = (steps.clone(), cleaned.clone());
        let id = rig.services.spawn(None, "looper", move |ctx| {
            ctx.on_cleanup(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
            loop {
                s.fetch_add(1, Ordering::SeqCst);
                ctx.wait_next_frame()?;
            }
        });
        rig.tick(0.1);
        rig.tick(0.1);
        assert!(rig.services.scheduler.abort(id));
        rig.tick(0.1);
        assert_eq!(steps.load(Ordering::SeqCst), 2);
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert!(!rig.services.scheduler.is_alive(id));
        assert!(rig.services.scheduler.take_faults().is_empty());
    }

    #[test]
    fn test_swallowed_cancel_is_forced_out() {
        let mut rig = Rig::new();
        let resumed = Arc::new(AtomicUsize::new(0));
        let r = resumed.clone();
        let id = rig.services.spawn(None, "stubborn", move |ctx| {
            loop {
                if ctx.wait_next_frame().is_err() {
                    r.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        rig.tick(0.1);
        rig.services.scheduler.abort(id);
        assert_eq!(rig.services.scheduler.reap(&mut rig.host, &rig.services.dispatcher), 1);
        assert_eq!(resumed.load(Ordering::SeqCst), 1);
        assert!(!rig.services.scheduler.is_alive(id));
        assert!(rig.services.scheduler.take_faults().is_empty());
    }

    #[test]
    fn test_self_abort_terminates() {
        let mut rig = Rig::new();
        let id = rig.services.spawn(None, "quitter", |ctx| {
            ctx.wait_next_frame()?;
            ctx.abort_self()?;
            Err(ScriptError::fault("unreachable"))
        });
        rig.tick(0.1);
        rig.tick(0.1);
        assert!(!rig.services.scheduler.is_alive(id));
        assert!(rig.services.scheduler.take_faults().is_empty());
    }

    #[test]
    fn test_dropped_owner_cancels_before_first_step() {
        let mut rig = Rig::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        let owner = Arc::new(Shape::new(
            crate::components::shape::ShapeId(1),
            crate::components::shape::ShapeKind::Sprite,
            "ghost",
        ));
        let id = rig.services.spawn(Some(&owner), "bound", move |_| {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        drop(owner);
        rig.tick(0.1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(!rig.services.scheduler.is_alive(id));
    }

    // ==================== FAULT TESTS ====================

    #[test]
    fn test_fault_is_isolated_and_reported() {
        let mut rig = Rig::new();
        let survivor = Arc::new(AtomicUsize::new(0));
        let s = survivor.clone();
        rig.services.spawn(None, "bad", |ctx| {
            ctx.wait_next_frame()?;
            panic!("kaboom");
        });
        rig.services.spawn(None, "good", move |ctx| {
            loop {
                s.fetch_add(1, Ordering::SeqCst);
                ctx.wait_next_frame()?;
            }
        });
        rig.tick(0.1);
        rig.tick(0.1);
        rig.tick(0.1);
        let faults = rig.services.scheduler.take_faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].name, "bad");
        assert!(faults[0].message.contains("kaboom"));
        assert!(!faults[0].during_setup);
        assert_eq!(survivor.load(Ordering::SeqCst), 3);
        rig.shutdown();
        assert_eq!(rig.services.scheduler.live_count(), 0);
    }

    #[test]
    fn test_fault_before_first_suspension_is_setup() {
        let mut rig = Rig::new();
        rig.services.spawn(None, "init", |_| {
            Err(ScriptError::ShapeNotFound("missing".into()))
        });
        rig.tick(0.1);
        let faults = rig.services.scheduler.take_faults();
        assert_eq!(faults.len(), 1);
        assert!(faults[0].during_setup);
    }

    // ==================== HOST ACCESS TESTS ====================

    #[test]
    fn test_script_reaches_host_mid_step() {
        let mut rig = Rig::new();
        rig.host.gravity = glam::Vec2::new(0.0, -10.0);
        let seen = Arc::new(Mutex::new(None));
        let out = seen.clone();
        rig.services.spawn(None, "asker", move |ctx| {
            *out.lock() = Some(ctx.host(|host| host.gravity())?);
            Ok(())
        });
        rig.tick(0.1);
        assert_eq!(*seen.lock(), Some(glam::Vec2::new(0.0, -10.0)));
    }

    #[test]
    fn test_run_blocking_polls_until_done() {
        let mut rig = Rig::new();
        let result = Arc::new(Mutex::new(None));
        let out = result.clone();
        let id = rig.services.spawn(None, "loader", move |ctx| {
            let value = ctx.run_blocking(|| {
                std::thread::sleep(std::time::Duration::from_millis(5));
                21 * 2
            })?;
            *out.lock() = Some(value);
            Ok(())
        });
        for _ in 0..1000 {
            rig.tick(0.016);
            if !rig.services.scheduler.is_alive(id) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(*result.lock(), Some(42));
    }
}
