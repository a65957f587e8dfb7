//! The process-scoped context handed to scripts and sinks.
//!
//! [`Services`] bundles the shared, thread-safe parts of the engine. It is
//! cheap to clone; every clone refers to the same underlying state. The
//! engine owns the host boundary and the frame clock separately, since
//! those belong to the host-owning thread alone.

use std::sync::Arc;

use crate::components::shape::Shape;
use crate::events::fault::ScriptResult;
use crate::events::input::Event;
use crate::events::notice::Notice;
use crate::resources::dispatcher::MainThreadDispatcher;
use crate::resources::engineconfig::LayerSortMode;
use crate::resources::mailbox::Mailbox;
use crate::resources::notices::NoticeBuffer;
use crate::resources::scheduler::{ScriptCtx, ScriptId, Scheduler};
use crate::resources::shapemanager::ShapeManager;
use crate::resources::sinks::EventSinks;
use crate::resources::timers::DeadlineTimers;

#[derive(Clone)]
pub struct Services {
    pub shapes: Arc<ShapeManager>,
    pub scheduler: Scheduler,
    pub mailbox: Mailbox,
    pub dispatcher: MainThreadDispatcher,
    pub notices: Arc<NoticeBuffer>,
    pub sinks: Arc<EventSinks>,
    pub timers: Arc<DeadlineTimers>,
}

impl Services {
    /// Fresh services owned by the calling thread.
    pub fn new(mailbox_capacity: usize) -> Self {
        Self::with_sort_mode(mailbox_capacity, LayerSortMode::Manual)
    }

    pub fn with_sort_mode(mailbox_capacity: usize, sort_mode: LayerSortMode) -> Self {
        Self {
            shapes: Arc::new(ShapeManager::new(sort_mode)),
            scheduler: Scheduler::new(),
            mailbox: Mailbox::new(mailbox_capacity),
            dispatcher: MainThreadDispatcher::new(),
            notices: Arc::new(NoticeBuffer::new()),
            sinks: Arc::new(EventSinks::new()),
            timers: Arc::new(DeadlineTimers::new()),
        }
    }

    /// Spawn a script thread with access to these services.
    pub fn spawn<F>(&self, owner: Option<&Arc<Shape>>, name: impl Into<String>, f: F) -> ScriptId
    where
        F: FnOnce(&ScriptCtx) -> ScriptResult + Send + 'static,
    {
        self.scheduler.spawn_with(self.clone(), owner, name, f)
    }

    pub fn post(&self, event: Event) -> bool {
        self.mailbox.post(event)
    }

    pub fn notify(&self, notice: Notice) {
        self.notices.push(notice);
    }
}
