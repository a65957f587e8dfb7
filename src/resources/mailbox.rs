//! Fixed-capacity event mailbox.
//!
//! Producers (input sampling, host input callbacks, timers, scripts) post
//! from any thread and never block: when the mailbox is full the newest
//! event is dropped and a warning logged. The dispatch system is the single
//! consumer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::warn;

use crate::events::input::Event;

#[derive(Clone)]
pub struct Mailbox {
    tx: Sender<Event>,
    rx: Receiver<Event>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl Mailbox {
    /// `capacity` is raised to 1; a zero-capacity channel would block producers.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue `event`. Returns false if it was dropped.
    pub fn post(&self, event: Event) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Mailbox full (capacity {}), dropping {} event ({} dropped so far)",
                    self.capacity,
                    event.tag(),
                    total
                );
                false
            }
            Err(TrySendError::Disconnected(event)) => {
                warn!("Mailbox closed, dropping {} event", event.tag());
                false
            }
        }
    }

    /// Next event, if any. Only the dispatch system should call this.
    pub fn next(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Discard everything queued. Returns how many events were discarded.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }
}
