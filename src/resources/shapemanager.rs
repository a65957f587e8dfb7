//! Active shape sequence.
//!
//! The sequence is published as an immutable [`ShapeSnapshot`]. Every
//! structural change (add, remove, clone, reorder) builds a new vector and
//! swaps it in, so a snapshot already being scanned by hit-testing or host
//! sync never changes under the reader. After each swap every sprite's
//! render layer is set to its 1-based rank among the sprites of the new
//! sequence; the last element renders on top.
//!
//! Removal takes effect immediately for the sequence but host teardown is
//! deferred: removed shapes are queued until the render callback destroys
//! their proxies.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::components::shape::{Shape, ShapeId, ShapeKind};
use crate::components::shapedesc::ShapeDesc;
use crate::resources::engineconfig::LayerSortMode;

pub type ShapeSnapshot = Arc<Vec<Arc<Shape>>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("clone source {0} is no longer active")]
    SourceInactive(ShapeId),
    #[error("shape {0} is not active")]
    NotActive(ShapeId),
}

pub struct ShapeManager {
    active: RwLock<ShapeSnapshot>,
    activations: Mutex<Vec<Arc<Shape>>>,
    teardown: Mutex<Vec<Arc<Shape>>>,
    sort_mode: Mutex<LayerSortMode>,
    next_id: AtomicU64,
}

impl Default for ShapeManager {
    fn default() -> Self {
        Self::new(LayerSortMode::Manual)
    }
}

impl ShapeManager {
    pub fn new(sort_mode: LayerSortMode) -> Self {
        Self {
            active: RwLock::new(Arc::new(Vec::new())),
            activations: Mutex::new(Vec::new()),
            teardown: Mutex::new(Vec::new()),
            sort_mode: Mutex::new(sort_mode),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an id for a shape about to be built.
    pub fn allocate_id(&self) -> ShapeId {
        ShapeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Current sequence, back to front.
    pub fn snapshot(&self) -> ShapeSnapshot {
        self.active.read().clone()
    }

    pub fn len(&self) -> usize {
        self.active.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.read().is_empty()
    }

    pub fn contains(&self, shape: &Arc<Shape>) -> bool {
        self.active.read().iter().any(|s| Arc::ptr_eq(s, shape))
    }

    pub fn get(&self, id: ShapeId) -> Option<Arc<Shape>> {
        self.active.read().iter().find(|s| s.id() == id).cloned()
    }

    /// First active shape with `name`, bottom-most first.
    pub fn find(&self, name: &str) -> Option<Arc<Shape>> {
        self.active.read().iter().find(|s| s.name() == name).cloned()
    }

    // ==================== STRUCTURAL CHANGES ====================

    /// Build a shape of `kind` and append it on top.
    pub fn create(&self, kind: ShapeKind, name: &str) -> Arc<Shape> {
        self.add(Shape::new(self.allocate_id(), kind, name))
    }

    /// Build a shape from its description and append it on top.
    pub fn create_from_desc(&self, desc: &ShapeDesc) -> Arc<Shape> {
        self.add(desc.build(self.allocate_id()))
    }

    /// Append `shape` on top of the sequence and queue it for activation.
    pub fn add(&self, shape: Shape) -> Arc<Shape> {
        let shape = Arc::new(shape);
        {
            let mut active = self.active.write();
            let mut next = Vec::with_capacity(active.len() + 1);
            next.extend(active.iter().cloned());
            next.push(shape.clone());
            Self::publish(&mut active, next);
        }
        self.activations.lock().push(shape.clone());
        debug!("added shape {} '{}'", shape.id(), shape.name());
        shape
    }

    /// Remove `shape` now and queue its host teardown. Returns false if it
    /// was not active.
    pub fn remove(&self, shape: &Arc<Shape>) -> bool {
        {
            let mut active = self.active.write();
            if !active.iter().any(|s| Arc::ptr_eq(s, shape)) {
                return false;
            }
            let next = active
                .iter()
                .filter(|s| !Arc::ptr_eq(s, shape))
                .cloned()
                .collect();
            Self::publish(&mut active, next);
        }
        shape.destroy();
        shape.set_render_layer(0);
        self.teardown.lock().push(shape.clone());
        debug!("removed shape {} '{}'", shape.id(), shape.name());
        true
    }

    /// Place `clone` directly after `source` in the sequence.
    ///
    /// Layers grow toward the top of the stack, so the clone's sprite rank is
    /// the source's plus one and it renders and hit-tests in front of the
    /// source. Sprites that came after the source shift up by one.
    pub fn insert_cloned_after_source(
        &self,
        source: &Arc<Shape>,
        clone: Shape,
    ) -> Result<Arc<Shape>, ShapeError> {
        let clone = Arc::new(clone);
        {
            let mut active = self.active.write();
            let index = active
                .iter()
                .position(|s| Arc::ptr_eq(s, source))
                .filter(|_| !source.is_destroyed())
                .ok_or(ShapeError::SourceInactive(source.id()))?;
            let mut next: Vec<Arc<Shape>> = active.iter().cloned().collect();
            next.insert(index + 1, clone.clone());
            Self::publish(&mut active, next);
        }
        self.activations.lock().push(clone.clone());
        debug!("cloned shape {} as {}", source.id(), clone.id());
        Ok(clone)
    }

    /// Duplicate `source` under a fresh id and insert it after the source.
    pub fn clone_shape(&self, source: &Arc<Shape>) -> Result<Arc<Shape>, ShapeError> {
        let copy = source.duplicate(self.allocate_id());
        self.insert_cloned_after_source(source, copy)
    }

    /// Remove every shape, e.g. on reset.
    pub fn clear(&self) {
        let removed = {
            let mut active = self.active.write();
            std::mem::replace(&mut *active, Arc::new(Vec::new()))
        };
        // Pending activations are all either in `removed` or already torn down.
        self.activations.lock().clear();
        let mut teardown = self.teardown.lock();
        for shape in removed.iter() {
            shape.destroy();
            teardown.push(shape.clone());
        }
        debug!("cleared {} shape(s)", removed.len());
    }

    // ==================== LAYER ORDER ====================

    pub fn sort_mode(&self) -> LayerSortMode {
        *self.sort_mode.lock()
    }

    pub fn set_sort_mode(&self, mode: LayerSortMode) {
        *self.sort_mode.lock() = mode;
    }

    pub fn bring_to_front(&self, shape: &Arc<Shape>) -> Result<(), ShapeError> {
        self.reorder(shape, "bring_to_front", |_, count| count - 1)
    }

    pub fn send_to_back(&self, shape: &Arc<Shape>) -> Result<(), ShapeError> {
        self.reorder(shape, "send_to_back", |_, _| 0)
    }

    /// Move `shape` by `n` sprite positions; positive is toward the front.
    pub fn shift_layers(&self, shape: &Arc<Shape>, n: i64) -> Result<(), ShapeError> {
        self.reorder(shape, "shift_layers", |rank, count| {
            (rank as i64 + n).clamp(0, count as i64 - 1) as usize
        })
    }

    /// Move a sprite among the sprite slots only; other kinds keep their
    /// positions in the sequence.
    fn reorder<F>(&self, shape: &Arc<Shape>, op: &str, target: F) -> Result<(), ShapeError>
    where
        F: FnOnce(usize, usize) -> usize,
    {
        if self.sort_mode() != LayerSortMode::Manual {
            warn!(
                "{} on shape {} ignored: automatic layer sort is active",
                op,
                shape.id()
            );
            return Ok(());
        }
        if !shape.is_sprite() {
            debug!("{} on non-sprite shape {} ignored", op, shape.id());
            return Ok(());
        }

        let mut active = self.active.write();
        let slots: Vec<usize> = Self::sprite_slots(&active);
        let mut sprites: Vec<Arc<Shape>> = slots.iter().map(|i| active[*i].clone()).collect();
        let rank = sprites
            .iter()
            .position(|s| Arc::ptr_eq(s, shape))
            .ok_or(ShapeError::NotActive(shape.id()))?;
        let to = target(rank, sprites.len());
        if to == rank {
            return Ok(());
        }
        let moved = sprites.remove(rank);
        sprites.insert(to, moved);

        let mut next: Vec<Arc<Shape>> = active.iter().cloned().collect();
        for (slot, sprite) in slots.into_iter().zip(sprites) {
            next[slot] = sprite;
        }
        Self::publish(&mut active, next);
        Ok(())
    }

    /// Reorder sprites by vertical position (larger y in front) when the
    /// vertical sort mode is active. Returns whether the order changed.
    pub fn apply_vertical_sort(&self) -> bool {
        if self.sort_mode() != LayerSortMode::Vertical {
            return false;
        }
        let mut active = self.active.write();
        let slots = Self::sprite_slots(&active);
        let mut sprites: Vec<Arc<Shape>> = slots.iter().map(|i| active[*i].clone()).collect();
        let keys: Vec<f32> = sprites.iter().map(|s| s.position().y).collect();
        if keys.is_sorted_by(|a, b| a.total_cmp(b).is_le()) {
            return false;
        }
        // Stable, so equal heights keep their current relative order.
        sprites.sort_by(|a, b| a.position().y.total_cmp(&b.position().y));
        let mut next: Vec<Arc<Shape>> = active.iter().cloned().collect();
        for (slot, sprite) in slots.into_iter().zip(sprites) {
            next[slot] = sprite;
        }
        Self::publish(&mut active, next);
        true
    }

    fn sprite_slots(seq: &[Arc<Shape>]) -> Vec<usize> {
        seq.iter()
            .enumerate()
            .filter(|(_, s)| s.is_sprite())
            .map(|(i, _)| i)
            .collect()
    }

    /// Swap in `next` and recompute every sprite's rank in one pass.
    fn publish(active: &mut ShapeSnapshot, next: Vec<Arc<Shape>>) {
        let mut rank = 0;
        for shape in &next {
            if shape.is_sprite() {
                rank += 1;
                shape.set_render_layer(rank);
            }
        }
        *active = Arc::new(next);
    }

    // ==================== DEFERRED WORK ====================

    /// Shapes added since the last call, in insertion order.
    pub(crate) fn take_activations(&self) -> Vec<Arc<Shape>> {
        std::mem::take(&mut *self.activations.lock())
    }

    /// Shapes removed since the last call, awaiting host teardown.
    pub(crate) fn take_teardown(&self) -> Vec<Arc<Shape>> {
        std::mem::take(&mut *self.teardown.lock())
    }
}
