//! Frame clock fed by the host engine's tick callback.
//!
//! The host reports an unscaled delta once per tick; [`FrameClock`] keeps
//! both the unscaled and the `time_scale`-adjusted view of elapsed time.
//! Script waits and deadline timers read the scaled view; click cooldowns
//! read the unscaled one so slow-motion does not stretch input handling.

#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    /// Scaled seconds since the clock was created or reset.
    pub elapsed: f64,
    /// Scaled delta of the last tick.
    pub delta: f64,
    /// Unscaled seconds since the clock was created or reset.
    pub unscaled_elapsed: f64,
    /// Unscaled delta of the last tick.
    pub unscaled_delta: f64,
    pub time_scale: f64,
    /// Number of ticks applied so far.
    pub frame_count: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        FrameClock {
            elapsed: 0.0,
            delta: 0.0,
            unscaled_elapsed: 0.0,
            unscaled_delta: 0.0,
            time_scale: 1.0,
            frame_count: 0,
        }
    }
}

impl FrameClock {
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    /// Apply one host tick. Negative deltas are treated as zero.
    pub fn advance(&mut self, dt: f64) {
        let dt = dt.max(0.0);
        let scaled = dt * self.time_scale;
        self.unscaled_delta = dt;
        self.unscaled_elapsed += dt;
        self.delta = scaled;
        self.elapsed += scaled;
        self.frame_count += 1;
    }

    /// Back to zero, keeping the configured time scale.
    pub fn reset(&mut self) {
        *self = FrameClock::default().with_time_scale(self.time_scale);
    }
}
