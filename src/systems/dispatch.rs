//! Event dispatch system.
//!
//! Drains the mailbox one event at a time and synchronously invokes the
//! matching sinks before moving to the next event. Button presses are
//! hit-tested against the active shape snapshot from the top down; the
//! first clickable shape whose proxy contains the point receives the
//! click, and a press that hits nothing is a stage click.
//!
//! Two cooldowns, measured on the unscaled clock, suppress repeated clicks:
//! one per target shape and one for the stage.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use glam::Vec2;
use log::{debug, trace};
use rustc_hash::FxHashMap;

use crate::components::shape::{Shape, ShapeId};
use crate::events::fault::ScriptFault;
use crate::events::input::Event;
use crate::resources::host::HostBoundary;
use crate::resources::services::Services;

#[derive(Debug, Clone)]
pub struct ClickCooldowns {
    target: f64,
    stage: f64,
    last_target: FxHashMap<ShapeId, f64>,
    last_stage: Option<f64>,
}

impl ClickCooldowns {
    pub fn new(target: f64, stage: f64) -> Self {
        Self {
            target: target.max(0.0),
            stage: stage.max(0.0),
            last_target: FxHashMap::default(),
            last_stage: None,
        }
    }

    /// Records the click when allowed.
    pub fn allow_target(&mut self, shape: ShapeId, at: f64) -> bool {
        match self.last_target.get(&shape) {
            Some(last) if at - last < self.target => false,
            _ => {
                self.last_target.insert(shape, at);
                true
            }
        }
    }

    /// Records the click when allowed.
    pub fn allow_stage(&mut self, at: f64) -> bool {
        match self.last_stage {
            Some(last) if at - last < self.stage => false,
            _ => {
                self.last_stage = Some(at);
                true
            }
        }
    }

    pub fn forget(&mut self, shape: ShapeId) {
        self.last_target.remove(&shape);
    }

    pub fn clear(&mut self) {
        self.last_target.clear();
        self.last_stage = None;
    }
}

/// Topmost visible, clickable shape whose host proxy contains `point`.
pub fn hit_test(
    snapshot: &[Arc<Shape>],
    host: &dyn HostBoundary,
    point: Vec2,
) -> Option<Arc<Shape>> {
    snapshot
        .iter()
        .rev()
        .filter(|s| s.is_clickable() && s.is_visible() && !s.is_destroyed())
        .find(|s| s.proxy().is_some_and(|proxy| host.contains_point(proxy, point)))
        .cloned()
}

/// Run `f`, turning a panic into a fault attributed to `label`.
pub(crate) fn guarded(
    label: &str,
    during_setup: bool,
    faults: &mut Vec<ScriptFault>,
    f: impl FnOnce(),
) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        faults.push(ScriptFault::from_callback(label, payload.as_ref(), during_setup));
    }
}

/// Deliver one event to its sinks.
pub fn dispatch_event(
    event: Event,
    services: &Services,
    host: &dyn HostBoundary,
    cooldowns: &mut ClickCooldowns,
    faults: &mut Vec<ScriptFault>,
) {
    trace!("dispatching {:?}", event);
    let sinks = &services.sinks;
    match event {
        Event::LeftButtonDown { pos, at } => {
            let snapshot = services.shapes.snapshot();
            match hit_test(&snapshot, host, pos) {
                Some(shape) => {
                    if !cooldowns.allow_target(shape.id(), at) {
                        debug!("click on {} suppressed by cooldown", shape.id());
                        return;
                    }
                    for sink in sinks.shape_click(shape.id()) {
                        guarded("shape click sink", false, faults, || sink(services, &shape));
                    }
                }
                None => {
                    if !cooldowns.allow_stage(at) {
                        debug!("stage click suppressed by cooldown");
                        return;
                    }
                    for sink in sinks.stage_click() {
                        guarded("stage click sink", false, faults, || sink(services, pos));
                    }
                }
            }
        }
        Event::LeftButtonUp { pos, .. } => {
            for sink in sinks.button_up() {
                guarded("button up sink", false, faults, || sink(services, pos));
            }
        }
        Event::MouseMove { pos, .. } => {
            for sink in sinks.mouse_move() {
                guarded("mouse move sink", false, faults, || sink(services, pos));
            }
        }
        Event::KeyDown { key, .. } => {
            for sink in sinks.key_down(key) {
                guarded("key down sink", false, faults, || sink(services, key));
            }
        }
        Event::KeyUp { key, .. } => {
            for sink in sinks.key_up(key) {
                guarded("key up sink", false, faults, || sink(services, key));
            }
        }
        Event::Start { .. } => {
            for sink in sinks.start() {
                guarded("start sink", true, faults, || sink(services));
            }
        }
        Event::Timer { deadline, .. } => {
            for sink in sinks.timer() {
                guarded("timer sink", false, faults, || sink(services, deadline));
            }
        }
    }
}

/// Dispatch everything queued when the drain started. Events posted by
/// sinks during the drain wait for the next tick.
pub fn drain_mailbox(
    services: &Services,
    host: &dyn HostBoundary,
    cooldowns: &mut ClickCooldowns,
    faults: &mut Vec<ScriptFault>,
) -> usize {
    let budget = services.mailbox.len();
    let mut delivered = 0;
    while delivered < budget {
        let Some(event) = services.mailbox.next() else {
            break;
        };
        dispatch_event(event, services, host, cooldowns, faults);
        delivered += 1;
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::shape::ShapeKind;
    use crate::resources::host::HeadlessHost;
    use parking_lot::Mutex;

    fn place(host: &mut HeadlessHost, shape: &Arc<Shape>, pos: Vec2) {
        let proxy = host.create_proxy(shape.id(), shape.kind());
        host.set_transform(proxy, pos, 90.0);
        shape.set_proxy(proxy);
    }

    // ==================== HIT TEST TESTS ====================

    #[test]
    fn test_hit_test_prefers_topmost() {
        let services = Services::new(8);
        let mut host = HeadlessHost::new();
        let below = services.shapes.create(ShapeKind::Sprite, "below");
        let above = services.shapes.create(ShapeKind::Sprite, "above");
        place(&mut host, &below, Vec2::ZERO);
        place(&mut host, &above, Vec2::new(8.0, 0.0));
        let hit = hit_test(&services.shapes.snapshot(), &host, Vec2::new(4.0, 0.0)).unwrap();
        assert_eq!(hit.id(), above.id());
        let hit = hit_test(&services.shapes.snapshot(), &host, Vec2::new(-12.0, 0.0)).unwrap();
        assert_eq!(hit.id(), below.id());
    }

    #[test]
    fn test_hit_test_skips_backdrops_and_hidden() {
        let services = Services::new(8);
        let mut host = HeadlessHost::new();
        let sprite = services.shapes.create(ShapeKind::Sprite, "s");
        let backdrop = services.shapes.create(ShapeKind::Backdrop, "bg");
        place(&mut host, &sprite, Vec2::ZERO);
        place(&mut host, &backdrop, Vec2::ZERO);
        let snapshot = services.shapes.snapshot();
        assert_eq!(hit_test(&snapshot, &host, Vec2::ZERO).unwrap().id(), sprite.id());
        sprite.set_visible(false);
        assert!(hit_test(&snapshot, &host, Vec2::ZERO).is_none());
    }

    // ==================== COOLDOWN TESTS ====================

    #[test]
    fn test_target_cooldown_suppresses_duplicates() {
        let mut cd = ClickCooldowns::new(0.2, 0.5);
        assert!(cd.allow_target(ShapeId(1), 0.0));
        assert!(!cd.allow_target(ShapeId(1), 0.1));
        assert!(cd.allow_target(ShapeId(2), 0.1));
        assert!(cd.allow_target(ShapeId(1), 0.25));
        assert!(cd.allow_stage(0.0));
        assert!(!cd.allow_stage(0.3));
        assert!(cd.allow_stage(0.5));
    }

    // ==================== DISPATCH TESTS ====================

    #[test]
    fn test_click_routes_to_shape_or_stage() {
        let services = Services::new(8);
        let mut host = HeadlessHost::new();
        let cat = services.shapes.create(ShapeKind::Sprite, "cat");
        place(&mut host, &cat, Vec2::ZERO);

        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        services
            .sinks
            .on_shape_click(cat.id(), move |_, shape| l.lock().push(shape.name().to_string()));
        let l = log.clone();
        services
            .sinks
            .on_stage_click(move |_, pos| l.lock().push(format!("stage {}", pos.x)));

        services.post(Event::LeftButtonDown { pos: Vec2::ZERO, at: 0.0 });
        services.post(Event::LeftButtonDown { pos: Vec2::new(100.0, 0.0), at: 0.0 });
        services.post(Event::LeftButtonDown { pos: Vec2::ZERO, at: 0.05 });
        let mut cd = ClickCooldowns::new(0.2, 0.2);
        let mut faults = Vec::new();
        assert_eq!(drain_mailbox(&services, &host, &mut cd, &mut faults), 3);
        assert_eq!(*log.lock(), vec!["cat".to_string(), "stage 100".to_string()]);
        assert!(faults.is_empty());
    }

    #[test]
    fn test_panicking_sink_becomes_fault() {
        let services = Services::new(8);
        let host = HeadlessHost::new();
        services.sinks.on_start(|_| panic!("bad start"));
        services.post(Event::Start { at: 0.0 });
        let mut cd = ClickCooldowns::new(0.0, 0.0);
        let mut faults = Vec::new();
        drain_mailbox(&services, &host, &mut cd, &mut faults);
        assert_eq!(faults.len(), 1);
        assert!(faults[0].during_setup);
        assert!(faults[0].message.contains("bad start"));
    }
}
