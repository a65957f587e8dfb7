//! Frame-stepped tween driver.
//!
//! Tweens run inside a script thread, one step per tick:
//! - [`run_tween`] – move, glide or turn a shape over a duration
//! - [`play_frames`] – play a named frame animation on the `Frame` channel
//! - [`glide_to`], [`turn_to`], [`move_by`] – shortcuts starting from the
//!   shape's current state
//!
//! Each step computes `percent = clamp01(elapsed / duration)`, applies the
//! eased difference to the previous step, then waits for the next frame.
//! Starting a run on a channel cancels the shape's previous run on that
//! channel before the new run takes its first step.

use std::sync::Arc;

use glam::Vec2;
use log::trace;

use crate::components::shape::{Shape, normalize_degrees};
use crate::components::tween::{
    AnimationState, Easing, TweenChannel, TweenSpec, TweenTarget,
};
use crate::events::audio::AudioCmd;
use crate::events::fault::ScriptResult;
use crate::events::notice::Notice;
use crate::resources::scheduler::ScriptCtx;

/// Apply an easing function to a normalized time value.
///
/// The input `t` is clamped to [0.0, 1.0] and transformed according to the
/// easing curve.
pub(crate) fn ease(e: Easing, t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    match e {
        Easing::Linear => t,
        Easing::QuadIn => t * t,
        Easing::QuadOut => t * (2.0 - t),
        Easing::QuadInOut => {
            if t < 0.5 {
                2.0 * t * t
            } else {
                -1.0 + (4.0 - 2.0 * t) * t
            }
        }
        Easing::CubicIn => t * t * t,
        Easing::CubicOut => {
            let p = t - 1.0;
            p * p * p + 1.0
        }
        Easing::CubicInOut => {
            if t < 0.5 {
                4.0 * t * t * t
            } else {
                let p = 2.0 * t - 2.0;
                0.5 * p * p * p + 1.0
            }
        }
    }
}

/// Signed degrees from `from` to `to` the short way round, in `[-180, 180)`.
pub fn shortest_angle_delta(from: f32, to: f32) -> f32 {
    (to - from + 180.0).rem_euclid(360.0) - 180.0
}

/// One step of a [`TweenProgress`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TweenStep {
    /// Clamped linear progress.
    pub percent: f32,
    /// Eased progress gained since the previous step.
    pub delta: f32,
    pub done: bool,
}

/// Pure stepping state of one run, independent of what it drives.
#[derive(Debug, Clone)]
pub struct TweenProgress {
    duration: f64,
    easing: Easing,
    elapsed: f64,
    eased: f32,
}

impl TweenProgress {
    pub fn new(duration: f64, easing: Easing) -> Self {
        Self {
            duration,
            easing,
            elapsed: 0.0,
            eased: 0.0,
        }
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn step(&mut self, dt: f64) -> TweenStep {
        self.elapsed += dt.max(0.0);
        let percent = if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0) as f32
        };
        let eased = ease(self.easing, percent);
        let delta = eased - self.eased;
        self.eased = eased;
        TweenStep {
            percent,
            delta,
            done: percent >= 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweenOutcome {
    Completed,
    /// Superseded by a newer run on the channel, or the shape was destroyed.
    Cancelled,
}

/// Start the run's animation and cue, and install it on the shape.
///
/// A superseded run that drove the velocity leaves it zeroed.
fn begin(ctx: &ScriptCtx, shape: &Arc<Shape>, run: &Arc<AnimationState>, animation: Option<&str>) -> ScriptResult {
    if let Some(previous) = shape.begin_run(run.clone()) {
        if previous.drives_velocity {
            shape.set_velocity(Vec2::ZERO);
        }
    }
    if let Some(name) = animation {
        shape.set_animation(name)?;
    }
    if let Some(cue) = &run.cue {
        ctx.services().notify(Notice::Audio(AudioCmd::Play {
            shape: Some(shape.id()),
            cue: cue.clone(),
        }));
    }
    Ok(())
}

/// Tear the run down. Velocity and pose are only restored while the run
/// still owns its channel.
fn finish(
    ctx: &ScriptCtx,
    shape: &Arc<Shape>,
    run: &Arc<AnimationState>,
    animation: Option<&str>,
    keep_final_pose: bool,
    drove_velocity: bool,
    outcome: Option<TweenOutcome>,
) {
    let current = shape.end_run(run);
    if current {
        if drove_velocity {
            shape.set_velocity(Vec2::ZERO);
        }
        if !keep_final_pose {
            shape.resume_default_animation();
        }
    }
    if outcome == Some(TweenOutcome::Completed) {
        ctx.services().notify(Notice::AnimationDone {
            shape: shape.id(),
            channel: run.channel,
            animation: animation.map(str::to_string),
        });
    }
    trace!("run {} on {} ended: {:?}", run.id, shape.id(), outcome);
}

fn apply(shape: &Shape, target: TweenTarget, delta: f32) {
    match target {
        TweenTarget::Position { from, to } => shape.translate((to - from) * delta),
        TweenTarget::Angle { from, to } => shape.turn(shortest_angle_delta(from, to) * delta),
    }
}

fn snap(shape: &Shape, channel: TweenChannel, target: TweenTarget) {
    match (channel, target) {
        (TweenChannel::Glide, TweenTarget::Position { to, .. }) => shape.set_position(to),
        (_, TweenTarget::Angle { to, .. }) => shape.set_heading(normalize_degrees(to)),
        _ => {}
    }
}

/// Drive `shape` as `spec` describes until the run completes or is
/// cancelled. Propagates `Cancelled` if the calling thread is aborted.
///
/// A named animation is switched to at the start and its frames advance
/// with the run's elapsed time.
pub fn run_tween(ctx: &ScriptCtx, shape: &Arc<Shape>, spec: TweenSpec) -> ScriptResult<TweenOutcome> {
    let template = match &spec.animation {
        Some(name) => Some(shape.animation_template(name)?.clone()),
        None => None,
    };
    let drove_velocity = spec.channel == TweenChannel::Move
        && spec.duration > 0.0
        && shape.is_solver_driven();
    let run = Arc::new(
        AnimationState::new(spec.channel, spec.duration)
            .with_target(spec.target)
            .with_cue(template.as_ref().and_then(|t| t.cue.clone()))
            .driving_velocity(drove_velocity),
    );
    let animation = spec.animation.as_deref();
    begin(ctx, shape, &run, animation)?;

    if drove_velocity {
        if let TweenTarget::Position { from, to } = spec.target {
            shape.set_velocity((to - from) / spec.duration as f32);
        }
    }

    let mut progress = TweenProgress::new(spec.duration, spec.easing);
    let mut dt = 0.0;
    let outcome = loop {
        if run.is_cancelled() || shape.is_destroyed() {
            break TweenOutcome::Cancelled;
        }
        let step = progress.step(dt);
        run.set_elapsed(progress.elapsed());
        if let Some(template) = &template {
            shape.set_frame(template.frame_at(progress.elapsed()));
        }
        if !drove_velocity {
            apply(shape, spec.target, step.delta);
        }
        if step.done {
            if !drove_velocity {
                snap(shape, spec.channel, spec.target);
            }
            break TweenOutcome::Completed;
        }
        match ctx.wait_next_frame() {
            Ok(delta) => dt = delta * run.speed,
            Err(err) => {
                finish(ctx, shape, &run, animation, spec.keep_final_pose, drove_velocity, None);
                return Err(err);
            }
        }
    };
    finish(
        ctx,
        shape,
        &run,
        animation,
        spec.keep_final_pose,
        drove_velocity,
        Some(outcome),
    );
    Ok(outcome)
}

/// Glide from the current position to `to`.
pub fn glide_to(ctx: &ScriptCtx, shape: &Arc<Shape>, to: Vec2, seconds: f64) -> ScriptResult<TweenOutcome> {
    run_tween(ctx, shape, TweenSpec::glide(shape.position(), to, seconds))
}

/// Walk by `offset`; physics bodies get a velocity for the duration.
pub fn move_by(ctx: &ScriptCtx, shape: &Arc<Shape>, offset: Vec2, seconds: f64) -> ScriptResult<TweenOutcome> {
    let from = shape.position();
    run_tween(ctx, shape, TweenSpec::walk(from, from + offset, seconds))
}

/// Turn from the current heading to `heading` the short way round.
pub fn turn_to(ctx: &ScriptCtx, shape: &Arc<Shape>, heading: f32, seconds: f64) -> ScriptResult<TweenOutcome> {
    run_tween(ctx, shape, TweenSpec::turn(shape.heading(), heading, seconds))
}

/// Play the named frame animation on the `Frame` channel.
///
/// Non-looping animations complete after one pass. Looping ones run until
/// cancelled; their cue plays once for the run, not on every loop.
pub fn play_frames(
    ctx: &ScriptCtx,
    shape: &Arc<Shape>,
    name: &str,
    keep_final_pose: bool,
) -> ScriptResult<TweenOutcome> {
    let template = shape.animation_template(name)?.clone();
    let run = Arc::new(
        AnimationState::new(TweenChannel::Frame, template.pass_duration())
            .with_speed(template.speed)
            .with_cue(template.cue.clone()),
    );
    begin(ctx, shape, &run, Some(name))?;

    let mut elapsed = 0.0;
    let outcome = loop {
        if run.is_cancelled() || shape.is_destroyed() {
            break TweenOutcome::Cancelled;
        }
        shape.set_frame(template.frame_at(elapsed));
        run.set_elapsed(elapsed);
        if !template.looped && elapsed >= template.pass_duration() {
            break TweenOutcome::Completed;
        }
        match ctx.wait_next_frame() {
            Ok(delta) => elapsed += delta,
            Err(err) => {
                finish(ctx, shape, &run, Some(name), keep_final_pose, false, None);
                return Err(err);
            }
        }
    };
    finish(ctx, shape, &run, Some(name), keep_final_pose, false, Some(outcome));
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    const ALL_EASINGS: [Easing; 7] = [
        Easing::Linear,
        Easing::QuadIn,
        Easing::QuadOut,
        Easing::QuadInOut,
        Easing::CubicIn,
        Easing::CubicOut,
        Easing::CubicInOut,
    ];

    // ==================== EASING FUNCTION TESTS ====================

    #[test]
    fn test_ease_endpoints_and_clamping() {
        for easing in ALL_EASINGS {
            assert!(approx_eq(ease(easing, 0.0), 0.0), "{:?} at 0", easing);
            assert!(approx_eq(ease(easing, 1.0), 1.0), "{:?} at 1", easing);
            assert!(approx_eq(ease(easing, -0.5), 0.0), "{:?} below 0", easing);
            assert!(approx_eq(ease(easing, 1.5), 1.0), "{:?} above 1", easing);
        }
    }

    #[test]
    fn test_ease_known_values() {
        assert!(approx_eq(ease(Easing::QuadIn, 0.5), 0.25));
        assert!(approx_eq(ease(Easing::QuadOut, 0.5), 0.75));
        assert!(approx_eq(ease(Easing::QuadInOut, 0.25), 0.125));
        assert!(approx_eq(ease(Easing::QuadInOut, 0.75), 0.875));
        assert!(approx_eq(ease(Easing::CubicIn, 0.5), 0.125));
        assert!(approx_eq(ease(Easing::CubicOut, 0.5), 0.875));
        assert!(approx_eq(ease(Easing::CubicInOut, 0.25), 0.0625));
        assert!(approx_eq(ease(Easing::CubicInOut, 0.75), 0.9375));
    }

    #[test]
    fn test_ease_monotonicity() {
        for easing in ALL_EASINGS {
            let mut prev = ease(easing, 0.0);
            for i in 1..=100 {
                let curr = ease(easing, i as f32 / 100.0);
                assert!(curr >= prev - EPSILON, "{:?} not monotonic at {}", easing, i);
                prev = curr;
            }
        }
    }

    // ==================== ANGLE TESTS ====================

    #[test]
    fn test_shortest_angle_delta_wraps() {
        assert!(approx_eq(shortest_angle_delta(350.0, 10.0), 20.0));
        assert!(approx_eq(shortest_angle_delta(10.0, 350.0), -20.0));
        assert!(approx_eq(shortest_angle_delta(90.0, 180.0), 90.0));
        assert!(approx_eq(shortest_angle_delta(0.0, 0.0), 0.0));
    }

    // ==================== PROGRESS TESTS ====================

    #[test]
    fn test_progress_first_step_is_zero() {
        let mut p = TweenProgress::new(1.0, Easing::Linear);
        let step = p.step(0.0);
        assert_eq!(step.percent, 0.0);
        assert_eq!(step.delta, 0.0);
        assert!(!step.done);
    }

    #[test]
    fn test_progress_deltas_sum_to_one() {
        let mut p = TweenProgress::new(1.0, Easing::CubicInOut);
        let mut total = p.step(0.0).delta;
        let mut steps = 0;
        loop {
            let s = p.step(0.1);
            total += s.delta;
            steps += 1;
            if s.done {
                break;
            }
        }
        assert_eq!(steps, 10);
        assert!(approx_eq(total, 1.0));
    }

    #[test]
    fn test_progress_non_positive_duration_finishes_immediately() {
        for duration in [0.0, -1.0] {
            let mut p = TweenProgress::new(duration, Easing::Linear);
            let step = p.step(0.0);
            assert!(step.done);
            assert_eq!(step.delta, 1.0);
        }
    }

    #[test]
    fn test_progress_overshoot_clamps() {
        let mut p = TweenProgress::new(0.5, Easing::Linear);
        p.step(0.0);
        let s = p.step(2.0);
        assert_eq!(s.percent, 1.0);
        assert!(approx_eq(s.delta, 1.0));
    }

    // ==================== DRIVER TESTS ====================

    use crate::components::animation::AnimationTemplate;
    use crate::components::shape::ShapeKind;
    use crate::resources::frameclock::FrameClock;
    use crate::resources::host::HeadlessHost;
    use crate::resources::services::Services;
    use parking_lot::Mutex;

    fn tick(services: &Services, host: &mut HeadlessHost, clock: &mut FrameClock, dt: f64) {
        clock.advance(dt);
        services.scheduler.tick(clock, host, &services.dispatcher);
    }

    fn shutdown(services: &Services, host: &mut HeadlessHost) {
        services.scheduler.shutdown(host, &services.dispatcher);
    }

    #[test]
    fn test_turn_takes_short_way_round() {
        let services = Services::new(8);
        let mut host = HeadlessHost::new();
        let mut clock = FrameClock::default();
        let cat = services.shapes.add(
            Shape::new(services.shapes.allocate_id(), ShapeKind::Sprite, "cat").with_heading(350.0),
        );
        let target = cat.clone();
        services.spawn(Some(&cat), "turn", move |ctx| {
            turn_to(ctx, &target, 10.0, 1.0)?;
            Ok(())
        });
        tick(&services, &mut host, &mut clock, 0.0);
        tick(&services, &mut host, &mut clock, 0.5);
        let heading = cat.heading();
        assert!(heading <= 20.0 + EPSILON || heading >= 360.0 - EPSILON, "heading {}", heading);
        tick(&services, &mut host, &mut clock, 0.5);
        assert!(approx_eq(cat.heading(), 10.0));
        shutdown(&services, &mut host);
    }

    #[test]
    fn test_newer_glide_supersedes_older() {
        let services = Services::new(8);
        let mut host = HeadlessHost::new();
        let mut clock = FrameClock::default();
        let cat = services.shapes.create(ShapeKind::Sprite, "cat");
        let outcomes = Arc::new(Mutex::new(Vec::new()));

        let (s, o) = (cat.clone(), outcomes.clone());
        services.spawn(Some(&cat), "first", move |ctx| {
            let outcome = glide_to(ctx, &s, Vec2::new(100.0, 0.0), 1.0)?;
            o.lock().push(("first", outcome));
            Ok(())
        });
        tick(&services, &mut host, &mut clock, 0.0);

        let (s, o) = (cat.clone(), outcomes.clone());
        services.spawn(Some(&cat), "second", move |ctx| {
            let outcome = glide_to(ctx, &s, Vec2::new(0.0, 50.0), 0.5)?;
            o.lock().push(("second", outcome));
            Ok(())
        });
        for _ in 0..4 {
            tick(&services, &mut host, &mut clock, 0.25);
        }
        assert_eq!(
            *outcomes.lock(),
            vec![("first", TweenOutcome::Cancelled), ("second", TweenOutcome::Completed)]
        );
        assert_eq!(cat.position(), Vec2::new(0.0, 50.0));
        assert!(cat.active_run(TweenChannel::Glide).is_none());
        assert_eq!(services.notices.len(), 1);
        shutdown(&services, &mut host);
    }

    #[test]
    fn test_play_frames_completes_and_restores_default() {
        let services = Services::new(8);
        let mut host = HeadlessHost::new();
        let mut clock = FrameClock::default();
        let cat = services.shapes.add(
            Shape::new(services.shapes.allocate_id(), ShapeKind::Sprite, "cat")
                .with_animation("idle", AnimationTemplate::new(1, 1.0))
                .with_animation("wave", AnimationTemplate::new(4, 8.0).with_cue("hello"))
                .with_default_animation("idle"),
        );
        let s = cat.clone();
        services.spawn(Some(&cat), "wave", move |ctx| {
            play_frames(ctx, &s, "wave", false)?;
            Ok(())
        });
        tick(&services, &mut host, &mut clock, 0.0);
        assert_eq!(cat.current_animation().as_deref(), Some("wave"));
        for _ in 0..5 {
            tick(&services, &mut host, &mut clock, 0.125);
        }
        assert_eq!(services.scheduler.live_count(), 0);
        assert_eq!(cat.current_animation().as_deref(), Some("idle"));
        let notices = services.notices.drain();
        assert_eq!(
            notices.first(),
            Some(&Notice::Audio(AudioCmd::Play {
                shape: Some(cat.id()),
                cue: "hello".into()
            }))
        );
        assert!(matches!(notices.last(), Some(Notice::AnimationDone { .. })));
        shutdown(&services, &mut host);
    }
}
