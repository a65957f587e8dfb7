//! The script side of a scheduled thread.
//!
//! Every script runs on its own OS thread, but only while the scheduler has
//! handed it the baton: the driving thread sends a [`Wake`], the script runs
//! user code up to its next suspension point, answers with a [`Yield`] and
//! blocks again. Exactly one script executes at a time and never between
//! another script's suspension points.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, warn};

use super::{ScriptId, Signal};
use crate::components::shape::Shape;
use crate::events::fault::{ScriptError, ScriptFault, ScriptResult, panic_message};
use crate::resources::host::HostBoundary;
use crate::resources::services::Services;

/// Scheduler → script.
#[derive(Debug)]
pub(crate) enum Wake {
    /// Continue; carries the seconds spent suspended.
    Run { waited: f64 },
    /// Unwind at the current suspension point.
    Cancel,
}

/// What a suspended script waits for.
#[derive(Debug, Clone)]
pub(crate) enum WaitRequest {
    /// Not started yet; ready on the first tick after spawning.
    Start,
    NextFrame,
    Seconds(f64),
    Signal(Signal),
}

#[derive(Debug)]
pub(crate) enum ThreadExit {
    Finished,
    Cancelled,
    Faulted(ScriptFault),
}

/// Script → scheduler.
#[derive(Debug)]
pub(crate) enum Yield {
    Suspend(WaitRequest),
    Exit(ThreadExit),
}

/// Unwind payload used to force a thread out after cancellation was ignored.
pub(crate) struct ForcedUnwind;

type Cleanup = Box<dyn FnOnce()>;

/// Handle a script function uses to suspend, spawn and reach shared state.
///
/// Lives on the script's own thread for its whole life.
pub struct ScriptCtx {
    id: ScriptId,
    name: String,
    owner: Option<Weak<Shape>>,
    services: Services,
    wake_rx: Receiver<Wake>,
    yield_tx: Sender<Yield>,
    abort: Arc<AtomicBool>,
    cancelled: Cell<bool>,
    suspended_once: Cell<bool>,
    cleanups: RefCell<Vec<Cleanup>>,
}

impl ScriptCtx {
    pub fn id(&self) -> ScriptId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// The owning shape while it is still alive.
    pub fn owner(&self) -> Option<Arc<Shape>> {
        self.owner
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|shape| !shape.is_destroyed())
    }

    /// The owning shape, or `Cancelled` once it is gone.
    pub fn shape(&self) -> ScriptResult<Arc<Shape>> {
        match &self.owner {
            None => Err(ScriptError::ShapeNotFound(format!("owner of {}", self.name))),
            Some(_) => self.owner().ok_or(ScriptError::Cancelled),
        }
    }

    /// Whether this thread has been told, or is about to be told, to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
            || self.abort.load(Ordering::Acquire)
            || (self.owner.is_some() && self.owner().is_none())
    }

    // ==================== SUSPENSION ====================

    /// Suspend for `seconds` of scaled clock time. Returns the time waited.
    pub fn wait_seconds(&self, seconds: f64) -> ScriptResult<f64> {
        self.suspend(WaitRequest::Seconds(seconds.max(0.0)))
    }

    /// Suspend until the next tick. Returns that tick's delta.
    pub fn wait_next_frame(&self) -> ScriptResult<f64> {
        self.suspend(WaitRequest::NextFrame)
    }

    /// Suspend until `signal` is raised.
    pub fn wait_until(&self, signal: &Signal) -> ScriptResult<f64> {
        self.suspend(WaitRequest::Signal(signal.clone()))
    }

    fn suspend(&self, request: WaitRequest) -> ScriptResult<f64> {
        if self.cancelled.get() {
            // Cancellation was observed and swallowed; no more user code runs.
            panic::resume_unwind(Box::new(ForcedUnwind));
        }
        self.suspended_once.set(true);
        if self.yield_tx.send(Yield::Suspend(request)).is_err() {
            self.cancelled.set(true);
            return Err(ScriptError::Cancelled);
        }
        match self.wake_rx.recv() {
            Ok(Wake::Run { waited }) => Ok(waited),
            Ok(Wake::Cancel) | Err(_) => {
                self.cancelled.set(true);
                Err(ScriptError::Cancelled)
            }
        }
    }

    // ==================== SPAWNING ====================

    /// Start another script thread. It first runs on the next tick.
    pub fn spawn<F>(&self, owner: Option<&Arc<Shape>>, name: impl Into<String>, f: F) -> ScriptId
    where
        F: FnOnce(&ScriptCtx) -> ScriptResult + Send + 'static,
    {
        self.services.spawn(owner, name, f)
    }

    /// Run genuinely blocking work on an independent native thread.
    ///
    /// The calling script keeps yielding a frame at a time until the work
    /// has completed, so the scheduler is never blocked. If this script is
    /// cancelled meanwhile, the work runs to completion detached and its
    /// result is discarded.
    pub fn run_blocking<R, F>(&self, work: F) -> ScriptResult<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let done = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded(1);
        let flag = done.clone();
        thread::Builder::new()
            .name(format!("{}-blocking", self.name))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(work));
                let _ = tx.send(result);
                flag.store(true, Ordering::Release);
            })
            .map_err(|e| ScriptError::fault(format!("cannot start blocking worker: {e}")))?;

        while !done.load(Ordering::Acquire) {
            self.wait_next_frame()?;
        }
        match rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(ScriptError::fault(format!(
                "blocking work panicked: {}",
                panic_message(payload.as_ref())
            ))),
            Err(_) => Err(ScriptError::fault("blocking worker exited without a result")),
        }
    }

    /// Run `f` on the host-owning thread and wait for the result.
    pub fn host<R, F>(&self, f: F) -> ScriptResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn HostBoundary) -> R + Send + 'static,
    {
        Ok(self.services.dispatcher.invoke(f)?)
    }

    // ==================== TERMINATION ====================

    /// Register a handler run when this thread ends, whatever the reason.
    /// Handlers run last-registered first.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) {
        self.cleanups.borrow_mut().push(Box::new(f));
    }

    /// Abort this thread. Always returns `Err(Cancelled)`; propagate it.
    pub fn abort_self(&self) -> ScriptResult {
        self.abort.store(true, Ordering::Release);
        self.cancelled.set(true);
        Err(ScriptError::Cancelled)
    }

    fn run_cleanups(&self) {
        loop {
            let Some(cleanup) = self.cleanups.borrow_mut().pop() else {
                break;
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
                warn!(
                    "cleanup handler of script {} '{}' panicked: {}",
                    self.id,
                    self.name,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

/// Channels and flags the scheduler keeps for one thread.
pub(crate) struct ThreadLink {
    pub wake_tx: Sender<Wake>,
    pub yield_rx: Receiver<Yield>,
    pub abort: Arc<AtomicBool>,
    pub handle: thread::JoinHandle<()>,
}

/// Start the OS thread behind a script. It parks until the first [`Wake`].
pub(crate) fn launch<F>(
    id: ScriptId,
    name: String,
    owner: Option<Weak<Shape>>,
    services: Services,
    f: F,
) -> std::io::Result<ThreadLink>
where
    F: FnOnce(&ScriptCtx) -> ScriptResult + Send + 'static,
{
    let (wake_tx, wake_rx) = bounded(1);
    let (yield_tx, yield_rx) = bounded(1);
    let abort = Arc::new(AtomicBool::new(false));
    let thread_abort = abort.clone();
    let thread_name = format!("script-{}-{}", id.0, name);

    let handle = thread::Builder::new().name(thread_name).spawn(move || {
        let ctx = ScriptCtx {
            id,
            name,
            owner,
            services,
            wake_rx,
            yield_tx,
            abort: thread_abort,
            cancelled: Cell::new(false),
            suspended_once: Cell::new(false),
            cleanups: RefCell::new(Vec::new()),
        };
        let exit = run_body(&ctx, f);
        ctx.run_cleanups();
        let _ = ctx.yield_tx.send(Yield::Exit(exit));
    })?;

    Ok(ThreadLink {
        wake_tx,
        yield_rx,
        abort,
        handle,
    })
}

fn run_body<F>(ctx: &ScriptCtx, f: F) -> ThreadExit
where
    F: FnOnce(&ScriptCtx) -> ScriptResult,
{
    match ctx.wake_rx.recv() {
        Ok(Wake::Run { .. }) => {}
        Ok(Wake::Cancel) | Err(_) => {
            debug!("script {} '{}' cancelled before it started", ctx.id, ctx.name);
            return ThreadExit::Cancelled;
        }
    }

    let exit = match panic::catch_unwind(AssertUnwindSafe(|| f(ctx))) {
        Ok(Ok(())) => ThreadExit::Finished,
        Ok(Err(err)) if err.is_cancelled() => ThreadExit::Cancelled,
        Ok(Err(err)) => ThreadExit::Faulted(ScriptFault::from_error(ctx.id, &ctx.name, err)),
        Err(payload) if payload.is::<ForcedUnwind>() => ThreadExit::Cancelled,
        Err(payload) => {
            ThreadExit::Faulted(ScriptFault::from_panic(ctx.id, &ctx.name, payload.as_ref()))
        }
    };

    match exit {
        ThreadExit::Faulted(mut fault) => {
            fault.during_setup = !ctx.suspended_once.get();
            debug!("script {} '{}' faulted: {}", ctx.id, ctx.name, fault.message);
            ThreadExit::Faulted(fault)
        }
        other => {
            debug!("script {} '{}' ended: {:?}", ctx.id, ctx.name, other);
            other
        }
    }
}
