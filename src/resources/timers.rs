//! Deadline timers.
//!
//! A sorted set of absolute deadlines (scaled clock seconds) with a
//! monotonic cursor. [`DeadlineTimers::due`] returns every deadline that has
//! elapsed and moves the cursor past it, so each deadline fires at most once
//! and, for deadlines registered ahead of time, in nondecreasing order.
//!
//! A deadline registered behind the cursor (already in the past) is placed
//! at the cursor and fires on the next poll.

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::resources::scheduler::TIME_EPSILON;

/// Fired entries are compacted away once this many accumulate.
const COMPACT_AFTER: usize = 64;

#[derive(Debug, Default)]
struct TimerState {
    deadlines: Vec<f64>,
    cursor: usize,
}

#[derive(Debug, Default)]
pub struct DeadlineTimers {
    state: Mutex<TimerState>,
}

impl DeadlineTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an absolute deadline. NaN is ignored.
    pub fn register(&self, deadline: f64) {
        if deadline.is_nan() {
            return;
        }
        let mut st = self.state.lock();
        let cursor = st.cursor;
        let offset = st.deadlines[cursor..].partition_point(|d| *d <= deadline);
        st.deadlines.insert(cursor + offset, deadline);
    }

    /// Deadlines that have elapsed at `now`, earliest first.
    pub fn due(&self, now: f64) -> SmallVec<[f64; 4]> {
        let mut st = self.state.lock();
        let mut fired = SmallVec::new();
        while let Some(&next) = st.deadlines.get(st.cursor) {
            if next > now + TIME_EPSILON {
                break;
            }
            fired.push(next);
            st.cursor += 1;
        }
        if st.cursor >= COMPACT_AFTER {
            let cursor = st.cursor;
            st.deadlines.drain(..cursor);
            st.cursor = 0;
        }
        fired
    }

    /// Earliest deadline still waiting to fire.
    pub fn next_deadline(&self) -> Option<f64> {
        let st = self.state.lock();
        st.deadlines.get(st.cursor).copied()
    }

    pub fn pending(&self) -> usize {
        let st = self.state.lock();
        st.deadlines.len() - st.cursor
    }

    pub fn clear(&self) {
        *self.state.lock() = TimerState::default();
    }
}
