//! Per-tick logic system.
//!
//! Runs on the host-owning thread before the scheduler steps scripts:
//! - [`flush_activations`] gives newly added shapes a host proxy and runs
//!   their activation hooks
//! - [`drain_notices`] forwards audio requests to the host and completion
//!   notices to sinks
//! - [`fire_timers`] posts a `Timer` event for every elapsed deadline
//! - [`run_update_hooks`] calls each active shape's per-tick hook

use log::trace;

use crate::components::shape::ShapeId;
use crate::events::audio::AudioCmd;
use crate::events::fault::ScriptFault;
use crate::events::input::Event;
use crate::events::notice::Notice;
use crate::resources::frameclock::FrameClock;
use crate::resources::host::{HostBoundary, ProxyId};
use crate::resources::services::Services;
use crate::systems::dispatch::guarded;

pub fn flush_activations(
    services: &Services,
    host: &mut dyn HostBoundary,
    faults: &mut Vec<ScriptFault>,
) -> usize {
    let pending = services.shapes.take_activations();
    let mut activated = 0;
    for shape in pending {
        if shape.is_destroyed() || shape.proxy().is_some() {
            continue;
        }
        let proxy = host.create_proxy(shape.id(), shape.kind());
        shape.set_proxy(proxy);
        shape.mark_all_dirty();
        activated += 1;
        trace!("activated shape {} as proxy {:?}", shape.id(), proxy);
        if let Some(hook) = shape.activation_hook() {
            guarded("activation hook", false, faults, || hook(services, &shape));
        }
    }
    activated
}

pub fn drain_notices(
    services: &Services,
    host: &mut dyn HostBoundary,
    faults: &mut Vec<ScriptFault>,
) -> usize {
    let notices = services.notices.drain();
    let count = notices.len();
    for notice in notices {
        match notice {
            Notice::Audio(AudioCmd::Play { shape, cue }) => {
                if let Some(proxy) = resolve_audio_target(services, shape) {
                    host.play_audio(proxy, &cue);
                }
            }
            Notice::Audio(AudioCmd::Stop { shape, cue }) => {
                if let Some(proxy) = resolve_audio_target(services, shape) {
                    host.stop_audio(proxy, cue.as_deref());
                }
            }
            Notice::AnimationDone {
                shape,
                channel,
                animation,
            } => {
                for sink in services.sinks.animation_done() {
                    guarded("animation done sink", false, faults, || {
                        sink(services, shape, channel, animation.as_deref())
                    });
                }
            }
        }
    }
    count
}

/// `Some(None)` for stage audio, `Some(Some(proxy))` for a live shape and
/// `None` when the shape is gone or has no proxy yet.
fn resolve_audio_target(services: &Services, shape: Option<ShapeId>) -> Option<Option<ProxyId>> {
    match shape {
        None => Some(None),
        Some(id) => services
            .shapes
            .get(id)
            .filter(|s| !s.is_destroyed())
            .and_then(|s| s.proxy())
            .map(Some),
    }
}

pub fn fire_timers(services: &Services, clock: &FrameClock) -> usize {
    let due = services.timers.due(clock.elapsed);
    for deadline in &due {
        services.post(Event::Timer {
            deadline: *deadline,
            at: clock.unscaled_elapsed,
        });
    }
    due.len()
}

pub fn run_update_hooks(services: &Services, delta: f64, faults: &mut Vec<ScriptFault>) {
    let snapshot = services.shapes.snapshot();
    for shape in snapshot.iter().filter(|s| !s.is_destroyed()) {
        if let Some(hook) = shape.update_hook() {
            guarded("update hook", false, faults, || hook(shape, delta));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::shape::ShapeKind;
    use crate::components::tween::TweenChannel;
    use crate::resources::host::{HeadlessHost, HostCall};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_activation_creates_proxy_and_runs_hook_once() {
        let services = Services::new(8);
        let mut host = HeadlessHost::new();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        let shape = services.shapes.add(
            crate::components::shape::Shape::new(
                services.shapes.allocate_id(),
                ShapeKind::Sprite,
                "hooked",
            )
            .with_activation_hook(move |_, _| *h.lock() += 1),
        );
        let mut faults = Vec::new();
        assert_eq!(flush_activations(&services, &mut host, &mut faults), 1);
        assert_eq!(flush_activations(&services, &mut host, &mut faults), 0);
        assert!(shape.proxy().is_some());
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_removed_before_activation_gets_no_proxy() {
        let services = Services::new(8);
        let mut host = HeadlessHost::new();
        let shape = services.shapes.create(ShapeKind::Sprite, "brief");
        services.shapes.remove(&shape);
        let mut faults = Vec::new();
        assert_eq!(flush_activations(&services, &mut host, &mut faults), 0);
        assert_eq!(host.live_proxies(), 0);
    }

    #[test]
    fn test_audio_notices_reach_host_and_skip_dead_shapes() {
        let services = Services::new(8);
        let mut host = HeadlessHost::new();
        let live = services.shapes.create(ShapeKind::Sprite, "live");
        let dead = services.shapes.create(ShapeKind::Sprite, "dead");
        let mut faults = Vec::new();
        flush_activations(&services, &mut host, &mut faults);
        services.shapes.remove(&dead);
        host.take_calls();

        services.notify(Notice::Audio(AudioCmd::Play { shape: None, cue: "bgm".into() }));
        services.notify(Notice::Audio(AudioCmd::Play {
            shape: Some(live.id()),
            cue: "meow".into(),
        }));
        services.notify(Notice::Audio(AudioCmd::Play {
            shape: Some(dead.id()),
            cue: "ghost".into(),
        }));
        assert_eq!(drain_notices(&services, &mut host, &mut faults), 3);
        assert_eq!(
            host.take_calls(),
            vec![
                HostCall::PlayAudio(None, "bgm".into()),
                HostCall::PlayAudio(live.proxy(), "meow".into()),
            ]
        );
    }

    #[test]
    fn test_animation_done_reaches_sinks() {
        let services = Services::new(8);
        let mut host = HeadlessHost::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        services.sinks.on_animation_done(move |_, shape, channel, anim| {
            s.lock().push((shape, channel, anim.map(str::to_string)));
        });
        let id = ShapeId(9);
        services.notify(Notice::AnimationDone {
            shape: id,
            channel: TweenChannel::Glide,
            animation: None,
        });
        let mut faults = Vec::new();
        drain_notices(&services, &mut host, &mut faults);
        assert_eq!(*seen.lock(), vec![(id, TweenChannel::Glide, None)]);
    }

    #[test]
    fn test_fire_timers_posts_events_in_order() {
        let services = Services::new(8);
        services.timers.register(0.5);
        services.timers.register(0.2);
        let mut clock = FrameClock::default();
        clock.advance(0.6);
        assert_eq!(fire_timers(&services, &clock), 2);
        let deadlines: Vec<f64> = std::iter::from_fn(|| services.mailbox.next())
            .filter_map(|e| match e {
                Event::Timer { deadline, .. } => Some(deadline),
                _ => None,
            })
            .collect();
        assert_eq!(deadlines, vec![0.2, 0.5]);
    }
}
