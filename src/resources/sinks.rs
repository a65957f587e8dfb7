//! Event sink registry.
//!
//! Sinks are plain `Arc<dyn Fn>` callbacks invoked synchronously by the
//! dispatch and logic systems on the host-owning thread. Handlers that need
//! to wait should spawn a script thread through the [`Services`] they are
//! given. The registry lock is only held to copy out the matching sinks;
//! sinks themselves run with no lock held, so they may register more sinks.

use std::sync::Arc;

use glam::Vec2;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::components::shape::{Shape, ShapeId};
use crate::components::tween::TweenChannel;
use crate::events::input::KeyCode;
use crate::resources::services::Services;

pub type KeySink = Arc<dyn Fn(&Services, KeyCode) + Send + Sync>;
pub type ShapeSink = Arc<dyn Fn(&Services, &Arc<Shape>) + Send + Sync>;
pub type PointSink = Arc<dyn Fn(&Services, Vec2) + Send + Sync>;
pub type StartSink = Arc<dyn Fn(&Services) + Send + Sync>;
pub type TimerSink = Arc<dyn Fn(&Services, f64) + Send + Sync>;
pub type AnimationDoneSink =
    Arc<dyn Fn(&Services, ShapeId, TweenChannel, Option<&str>) + Send + Sync>;

pub(crate) type Matched<T> = SmallVec<[T; 4]>;

#[derive(Default)]
struct SinkTable {
    key_down: FxHashMap<KeyCode, Vec<KeySink>>,
    any_key_down: Vec<KeySink>,
    key_up: FxHashMap<KeyCode, Vec<KeySink>>,
    any_key_up: Vec<KeySink>,
    shape_click: FxHashMap<ShapeId, Vec<ShapeSink>>,
    stage_click: Vec<PointSink>,
    button_up: Vec<PointSink>,
    mouse_move: Vec<PointSink>,
    start: Vec<StartSink>,
    timer: Vec<TimerSink>,
    animation_done: Vec<AnimationDoneSink>,
}

#[derive(Default)]
pub struct EventSinks {
    table: RwLock<SinkTable>,
}

fn matched<T: Clone>(lists: &[&[T]]) -> Matched<T> {
    lists.iter().flat_map(|l| l.iter().cloned()).collect()
}

impl EventSinks {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== REGISTRATION ====================

    /// `None` listens to every key.
    pub fn on_key_down<F>(&self, key: Option<KeyCode>, sink: F)
    where
        F: Fn(&Services, KeyCode) + Send + Sync + 'static,
    {
        let sink: KeySink = Arc::new(sink);
        let mut t = self.table.write();
        match key {
            Some(key) => t.key_down.entry(key).or_default().push(sink),
            None => t.any_key_down.push(sink),
        }
    }

    /// `None` listens to every key.
    pub fn on_key_up<F>(&self, key: Option<KeyCode>, sink: F)
    where
        F: Fn(&Services, KeyCode) + Send + Sync + 'static,
    {
        let sink: KeySink = Arc::new(sink);
        let mut t = self.table.write();
        match key {
            Some(key) => t.key_up.entry(key).or_default().push(sink),
            None => t.any_key_up.push(sink),
        }
    }

    pub fn on_shape_click<F>(&self, shape: ShapeId, sink: F)
    where
        F: Fn(&Services, &Arc<Shape>) + Send + Sync + 'static,
    {
        let sink: ShapeSink = Arc::new(sink);
        self.table
            .write()
            .shape_click
            .entry(shape)
            .or_default()
            .push(sink);
    }

    /// Clicks that hit no clickable shape.
    pub fn on_stage_click<F>(&self, sink: F)
    where
        F: Fn(&Services, Vec2) + Send + Sync + 'static,
    {
        self.table.write().stage_click.push(Arc::new(sink));
    }

    pub fn on_button_up<F>(&self, sink: F)
    where
        F: Fn(&Services, Vec2) + Send + Sync + 'static,
    {
        self.table.write().button_up.push(Arc::new(sink));
    }

    pub fn on_mouse_move<F>(&self, sink: F)
    where
        F: Fn(&Services, Vec2) + Send + Sync + 'static,
    {
        self.table.write().mouse_move.push(Arc::new(sink));
    }

    pub fn on_start<F>(&self, sink: F)
    where
        F: Fn(&Services) + Send + Sync + 'static,
    {
        self.table.write().start.push(Arc::new(sink));
    }

    pub fn on_timer<F>(&self, sink: F)
    where
        F: Fn(&Services, f64) + Send + Sync + 'static,
    {
        self.table.write().timer.push(Arc::new(sink));
    }

    pub fn on_animation_done<F>(&self, sink: F)
    where
        F: Fn(&Services, ShapeId, TweenChannel, Option<&str>) + Send + Sync + 'static,
    {
        self.table.write().animation_done.push(Arc::new(sink));
    }

    /// Drop every sink bound to `shape`.
    pub fn forget_shape(&self, shape: ShapeId) {
        self.table.write().shape_click.remove(&shape);
    }

    pub fn clear(&self) {
        *self.table.write() = SinkTable::default();
    }

    pub fn has_shape_click(&self, shape: ShapeId) -> bool {
        self.table.read().shape_click.contains_key(&shape)
    }

    // ==================== LOOKUP ====================

    pub(crate) fn key_down(&self, key: KeyCode) -> Matched<KeySink> {
        let t = self.table.read();
        let specific = t.key_down.get(&key).map(Vec::as_slice).unwrap_or_default();
        matched(&[specific, t.any_key_down.as_slice()])
    }

    pub(crate) fn key_up(&self, key: KeyCode) -> Matched<KeySink> {
        let t = self.table.read();
        let specific = t.key_up.get(&key).map(Vec::as_slice).unwrap_or_default();
        matched(&[specific, t.any_key_up.as_slice()])
    }

    pub(crate) fn shape_click(&self, shape: ShapeId) -> Matched<ShapeSink> {
        let t = self.table.read();
        let specific = t.shape_click.get(&shape).map(Vec::as_slice).unwrap_or_default();
        matched(&[specific])
    }

    pub(crate) fn stage_click(&self) -> Matched<PointSink> {
        matched(&[self.table.read().stage_click.as_slice()])
    }

    pub(crate) fn button_up(&self) -> Matched<PointSink> {
        matched(&[self.table.read().button_up.as_slice()])
    }

    pub(crate) fn mouse_move(&self) -> Matched<PointSink> {
        matched(&[self.table.read().mouse_move.as_slice()])
    }

    pub(crate) fn start(&self) -> Matched<StartSink> {
        matched(&[self.table.read().start.as_slice()])
    }

    pub(crate) fn timer(&self) -> Matched<TimerSink> {
        matched(&[self.table.read().timer.as_slice()])
    }

    pub(crate) fn animation_done(&self) -> Matched<AnimationDoneSink> {
        matched(&[self.table.read().animation_done.as_slice()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_key_sinks_specific_then_any() {
        let sinks = EventSinks::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for weight in [1, 10] {
            let hits = hits.clone();
            let key = if weight == 1 { Some(KeyCode(32)) } else { None };
            sinks.on_key_down(key, move |_, _| {
                hits.fetch_add(weight, Ordering::SeqCst);
            });
        }
        assert_eq!(sinks.key_down(KeyCode(32)).len(), 2);
        assert_eq!(sinks.key_down(KeyCode(65)).len(), 1);
        assert!(sinks.key_up(KeyCode(32)).is_empty());
    }

    #[test]
    fn test_forget_shape_drops_click_sinks() {
        let sinks = EventSinks::new();
        sinks.on_shape_click(ShapeId(7), |_, _| {});
        assert!(sinks.has_shape_click(ShapeId(7)));
        sinks.forget_shape(ShapeId(7));
        assert!(sinks.shape_click(ShapeId(7)).is_empty());
    }
}
