//! Frame clock update system.
//!
//! Advances the shared [`FrameClock`] once per host tick, applying the
//! clock's `time_scale` to the provided delta.

use crate::resources::frameclock::FrameClock;

/// Apply the host's unscaled delta. A paused engine still counts the tick
/// but lets no time pass.
pub fn update_frame_clock(clock: &mut FrameClock, dt: f64, paused: bool) {
    clock.advance(if paused { 0.0 } else { dt });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paused_tick_freezes_time() {
        let mut clock = FrameClock::default();
        update_frame_clock(&mut clock, 0.5, false);
        update_frame_clock(&mut clock, 0.5, true);
        assert_eq!(clock.elapsed, 0.5);
        assert_eq!(clock.delta, 0.0);
        assert_eq!(clock.frame_count, 2);
    }

    #[test]
    fn test_time_scale_applies() {
        let mut clock = FrameClock::default().with_time_scale(2.0);
        update_frame_clock(&mut clock, 0.25, false);
        assert_eq!(clock.elapsed, 0.5);
        assert_eq!(clock.unscaled_elapsed, 0.25);
    }
}
