use parking_lot::Mutex;

use crate::events::notice::Notice;

/// Lock-guarded notice buffer.
///
/// Appended to from script threads and host callbacks; drained once per
/// tick by the logic system. The lock is held only for the push or the
/// swap, never while a notice is handled.
#[derive(Debug, Default)]
pub struct NoticeBuffer {
    pending: Mutex<Vec<Notice>>,
}

impl NoticeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, notice: Notice) {
        self.pending.lock().push(notice);
    }

    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
