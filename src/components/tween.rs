//! Tween descriptions and live animation runs.
//!
//! - [`TweenSpec`] – what a script asks the tween driver to do
//! - [`AnimationState`] – one live run, shared between the driving script
//!   and the shape so a newer run on the same channel can cancel it
//!
//! Each shape holds at most one [`AnimationState`] per [`TweenChannel`].
//! See [`crate::systems::tween`] for the driver.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use glam::Vec2;
use parking_lot::Mutex;

/// Mutually exclusive animation slots on a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TweenChannel {
    /// Costume frame animation.
    Frame,
    /// Relative or physics-driven displacement.
    Move,
    /// Heading interpolation.
    Turn,
    /// Absolute position interpolation.
    Glide,
}

/// Easing functions for smooth interpolation.
///
/// These functions transform a linear `t` value (0.0 to 1.0) to create
/// different acceleration/deceleration curves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Easing {
    /// Constant speed (no easing).
    #[default]
    Linear,
    /// Starts slow, accelerates (quadratic).
    QuadIn,
    /// Starts fast, decelerates (quadratic).
    QuadOut,
    /// Slow start and end (quadratic).
    QuadInOut,
    /// Starts slow, accelerates (cubic).
    CubicIn,
    /// Starts fast, decelerates (cubic).
    CubicOut,
    /// Slow start and end (cubic).
    CubicInOut,
}

/// The quantity a tween drives, with its endpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TweenTarget {
    Position { from: Vec2, to: Vec2 },
    /// Degrees. Interpolation takes the shorter way around the circle.
    Angle { from: f32, to: f32 },
}

/// A request to the tween driver.
#[derive(Debug, Clone, PartialEq)]
pub struct TweenSpec {
    pub channel: TweenChannel,
    pub target: TweenTarget,
    /// Seconds. Zero or negative completes on the first step.
    pub duration: f64,
    pub easing: Easing,
    /// Named animation played while the tween runs.
    pub animation: Option<String>,
    /// Leave the shape on its last animation instead of resuming the default.
    pub keep_final_pose: bool,
}

impl TweenSpec {
    pub fn new(channel: TweenChannel, target: TweenTarget, duration: f64) -> Self {
        Self {
            channel,
            target,
            duration,
            easing: Easing::Linear,
            animation: None,
            keep_final_pose: false,
        }
    }

    /// Glide to an absolute position.
    pub fn glide(from: Vec2, to: Vec2, duration: f64) -> Self {
        Self::new(TweenChannel::Glide, TweenTarget::Position { from, to }, duration)
    }

    /// Move by walking from `from` to `to`; physics bodies get a velocity instead.
    pub fn walk(from: Vec2, to: Vec2, duration: f64) -> Self {
        Self::new(TweenChannel::Move, TweenTarget::Position { from, to }, duration)
    }

    pub fn turn(from: f32, to: f32, duration: f64) -> Self {
        Self::new(TweenChannel::Turn, TweenTarget::Angle { from, to }, duration)
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn with_animation(mut self, name: impl Into<String>) -> Self {
        self.animation = Some(name.into());
        self
    }

    pub fn keep_final_pose(mut self) -> Self {
        self.keep_final_pose = true;
        self
    }
}

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// One live tween or frame-animation run.
#[derive(Debug)]
pub struct AnimationState {
    pub id: u64,
    pub channel: TweenChannel,
    pub target: Option<TweenTarget>,
    pub duration: f64,
    pub speed: f64,
    /// Audio cue bound to this run, played once at its start.
    pub cue: Option<String>,
    /// The run sets the shape's velocity instead of stepping its position.
    pub drives_velocity: bool,
    elapsed: Mutex<f64>,
    cancelled: AtomicBool,
}

impl AnimationState {
    pub fn new(channel: TweenChannel, duration: f64) -> Self {
        Self {
            id: NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed),
            channel,
            target: None,
            duration,
            speed: 1.0,
            cue: None,
            drives_velocity: false,
            elapsed: Mutex::new(0.0),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn with_target(mut self, target: TweenTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_cue(mut self, cue: Option<String>) -> Self {
        self.cue = cue;
        self
    }

    pub fn driving_velocity(mut self, drives: bool) -> Self {
        self.drives_velocity = drives;
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn elapsed(&self) -> f64 {
        *self.elapsed.lock()
    }

    pub(crate) fn set_elapsed(&self, elapsed: f64) {
        *self.elapsed.lock() = elapsed;
    }
}
