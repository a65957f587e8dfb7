use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A level-triggered flag script threads can wait on.
///
/// Clones share the same flag. A thread suspended with
/// [`ScriptCtx::wait_until`](super::ScriptCtx::wait_until) becomes ready on
/// the first tick that finds the signal raised.
#[derive(Debug, Clone, Default)]
pub struct Signal {
    raised: Arc<AtomicBool>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.raised.store(false, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let a = Signal::new();
        let b = a.clone();
        assert!(!b.is_raised());
        a.raise();
        assert!(b.is_raised());
        b.reset();
        assert!(!a.is_raised());
    }
}
