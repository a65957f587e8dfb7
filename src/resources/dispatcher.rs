//! Main-thread dispatcher.
//!
//! Marshals work onto the single thread that owns the host boundary. Any
//! thread may [`post`](MainThreadDispatcher::post) a job (fire and forget)
//! or [`invoke`](MainThreadDispatcher::invoke) one and block until the
//! owning thread has run it. The owning thread runs queued jobs when it
//! [`pump`](MainThreadDispatcher::pump)s at the start of each tick, and
//! also while it waits for a script thread to yield, so a script that
//! needs the host mid-step never deadlocks the scheduler.
//!
//! Same pattern as a command bridge to a dedicated device thread, inverted:
//! the device (host) lives on the main thread and the workers call in.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use log::trace;
use parking_lot::Mutex;
use thiserror::Error;

use crate::resources::host::HostBoundary;

pub type HostJob = Box<dyn FnOnce(&mut dyn HostBoundary) + Send>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A blocking marshal from the owning thread would wait on itself.
    #[error("blocking dispatch requested from the host-owning thread")]
    OwnerThread,
    /// The owning side went away before the job ran.
    #[error("main-thread dispatcher disconnected")]
    Disconnected,
}

#[derive(Clone)]
pub struct MainThreadDispatcher {
    tx: Sender<HostJob>,
    rx: Receiver<HostJob>,
    owner: Arc<Mutex<ThreadId>>,
}

impl Default for MainThreadDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MainThreadDispatcher {
    /// Create a dispatcher owned by the calling thread.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            owner: Arc::new(Mutex::new(thread::current().id())),
        }
    }

    /// Make the calling thread the owner (the engine moved threads).
    pub fn bind_to_current_thread(&self) {
        *self.owner.lock() = thread::current().id();
    }

    pub fn is_owner_thread(&self) -> bool {
        *self.owner.lock() == thread::current().id()
    }

    /// Queue a job without waiting for it.
    pub fn post<F>(&self, job: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&mut dyn HostBoundary) + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| DispatchError::Disconnected)
    }

    /// Run `job` on the owning thread and wait for its result.
    pub fn invoke<R, F>(&self, job: F) -> Result<R, DispatchError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn HostBoundary) -> R + Send + 'static,
    {
        if self.is_owner_thread() {
            return Err(DispatchError::OwnerThread);
        }
        let (reply_tx, reply_rx) = bounded(1);
        self.post(move |host| {
            let _ = reply_tx.send(job(host));
        })?;
        reply_rx.recv().map_err(|_| DispatchError::Disconnected)
    }

    /// Run every queued job. Call from the owning thread only.
    pub fn pump(&self, host: &mut dyn HostBoundary) -> usize {
        let mut ran = 0;
        for job in self.rx.try_iter() {
            job(host);
            ran += 1;
        }
        if ran > 0 {
            trace!("dispatcher ran {} marshaled job(s)", ran);
        }
        ran
    }

    pub(crate) fn jobs(&self) -> &Receiver<HostJob> {
        &self.rx
    }
}
