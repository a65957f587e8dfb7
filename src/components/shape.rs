//! The polymorphic renderable entity.
//!
//! A [`Shape`] is shared as `Arc<Shape>` between the shape manager, the
//! render/hit-test snapshots and any script threads working on it. All
//! mutable state sits behind short-held locks; setters record what changed
//! in a [`Dirty`] set that the sync system pushes to the host once per
//! render callback.
//!
//! Once destroyed, a shape ignores every mutation and its cancellation
//! [`Signal`] is raised so threads bound to it unwind at their next
//! suspension point.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use glam::Vec2;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::components::animation::AnimationTemplate;
use crate::components::physicsshape::{ColliderKind, PhysicsShapeConfig};
use crate::components::tween::{AnimationState, TweenChannel};
use crate::events::fault::{ScriptError, ScriptResult};
use crate::resources::host::ProxyId;
use crate::resources::scheduler::Signal;
use crate::resources::services::Services;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub u64);

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Sprite,
    Widget,
    Backdrop,
    PenStroke,
}

/// How the host's physics solver treats the shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicsMode {
    /// No body; position is whatever scripts set.
    #[default]
    None,
    /// Immovable body.
    Static,
    /// Moved by velocity, unaffected by forces.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Invoked once after the shape gets its host proxy.
pub type ActivationHook = Arc<dyn Fn(&Services, &Arc<Shape>) + Send + Sync>;
/// Invoked once per tick with the scaled delta while the shape is active.
pub type UpdateHook = Arc<dyn Fn(&Shape, f64) + Send + Sync>;

/// Which parts of a shape changed since the last sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dirty {
    pub transform: bool,
    pub visibility: bool,
    pub velocity: bool,
    pub physics: bool,
    pub layer: bool,
    pub frame: bool,
}

impl Dirty {
    pub fn all() -> Self {
        Self {
            transform: true,
            visibility: true,
            velocity: true,
            physics: true,
            layer: true,
            frame: true,
        }
    }

    pub fn is_clean(&self) -> bool {
        *self == Dirty::default()
    }
}

#[derive(Debug, Clone)]
struct ShapeState {
    position: Vec2,
    heading: f32,
    visible: bool,
    velocity: Vec2,
    physics: PhysicsMode,
    animation: Option<String>,
    frame: usize,
    collider: PhysicsShapeConfig,
    trigger: PhysicsShapeConfig,
    dirty: Dirty,
}

pub struct Shape {
    id: ShapeId,
    name: String,
    kind: ShapeKind,
    state: Mutex<ShapeState>,
    layer: AtomicU32,
    destroyed: AtomicBool,
    cancel: Signal,
    proxy: Mutex<Option<ProxyId>>,
    runs: Mutex<FxHashMap<TweenChannel, Arc<AnimationState>>>,
    animations: FxHashMap<String, AnimationTemplate>,
    default_animation: Option<String>,
    on_activated: Option<ActivationHook>,
    on_update: Option<UpdateHook>,
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("layer", &self.render_layer())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl Shape {
    pub fn new(id: ShapeId, kind: ShapeKind, name: impl Into<String>) -> Self {
        Shape {
            id,
            name: name.into(),
            kind,
            state: Mutex::new(ShapeState {
                position: Vec2::ZERO,
                heading: 90.0,
                visible: true,
                velocity: Vec2::ZERO,
                physics: PhysicsMode::None,
                animation: None,
                frame: 0,
                collider: PhysicsShapeConfig::auto(),
                trigger: PhysicsShapeConfig::disabled(),
                dirty: Dirty::all(),
            }),
            layer: AtomicU32::new(0),
            destroyed: AtomicBool::new(false),
            cancel: Signal::new(),
            proxy: Mutex::new(None),
            runs: Mutex::new(FxHashMap::default()),
            animations: FxHashMap::default(),
            default_animation: None,
            on_activated: None,
            on_update: None,
        }
    }

    pub fn with_position(self, position: Vec2) -> Self {
        self.state.lock().position = position;
        self
    }

    pub fn with_heading(self, heading: f32) -> Self {
        self.state.lock().heading = normalize_degrees(heading);
        self
    }

    pub fn with_visible(self, visible: bool) -> Self {
        self.state.lock().visible = visible;
        self
    }

    pub fn with_physics(self, mode: PhysicsMode) -> Self {
        self.state.lock().physics = mode;
        self
    }

    pub fn with_collider(self, collider: PhysicsShapeConfig) -> Self {
        self.state.lock().collider = collider;
        self
    }

    pub fn with_trigger(self, trigger: PhysicsShapeConfig) -> Self {
        self.state.lock().trigger = trigger;
        self
    }

    pub fn with_animation(mut self, name: impl Into<String>, template: AnimationTemplate) -> Self {
        self.animations.insert(name.into(), template);
        self
    }

    /// Animation resumed after a tween finishes. Also becomes the current one.
    pub fn with_default_animation(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.state.lock().animation = Some(name.clone());
        self.default_animation = Some(name);
        self
    }

    pub fn with_activation_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Services, &Arc<Shape>) + Send + Sync + 'static,
    {
        self.on_activated = Some(Arc::new(hook));
        self
    }

    pub fn with_update_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Shape, f64) + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(hook));
        self
    }

    /// Copy of this shape under a new id: same state, templates and hooks,
    /// no proxy and no live animation runs.
    pub fn duplicate(&self, id: ShapeId) -> Shape {
        let mut state = self.state.lock().clone();
        state.dirty = Dirty::all();
        Shape {
            id,
            name: self.name.clone(),
            kind: self.kind,
            state: Mutex::new(state),
            layer: AtomicU32::new(0),
            destroyed: AtomicBool::new(false),
            cancel: Signal::new(),
            proxy: Mutex::new(None),
            runs: Mutex::new(FxHashMap::default()),
            animations: self.animations.clone(),
            default_animation: self.default_animation.clone(),
            on_activated: self.on_activated.clone(),
            on_update: self.on_update.clone(),
        }
    }

    pub fn id(&self) -> ShapeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn is_sprite(&self) -> bool {
        self.kind == ShapeKind::Sprite
    }

    /// Sprites and widgets receive clicks; backdrops and pen strokes don't.
    pub fn is_clickable(&self) -> bool {
        matches!(self.kind, ShapeKind::Sprite | ShapeKind::Widget)
    }

    // ==================== LIFECYCLE ====================

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Mark destroyed, raise the cancellation signal and cancel every run.
    pub(crate) fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.raise();
        let runs: Vec<_> = self.runs.lock().drain().map(|(_, run)| run).collect();
        for run in runs {
            run.cancel();
        }
    }

    pub fn cancel_signal(&self) -> &Signal {
        &self.cancel
    }

    pub fn proxy(&self) -> Option<ProxyId> {
        *self.proxy.lock()
    }

    pub(crate) fn set_proxy(&self, proxy: ProxyId) {
        *self.proxy.lock() = Some(proxy);
    }

    pub(crate) fn take_proxy(&self) -> Option<ProxyId> {
        self.proxy.lock().take()
    }

    pub(crate) fn activation_hook(&self) -> Option<ActivationHook> {
        self.on_activated.clone()
    }

    pub(crate) fn update_hook(&self) -> Option<UpdateHook> {
        self.on_update.clone()
    }

    // ==================== TRANSFORM ====================

    pub fn position(&self) -> Vec2 {
        self.state.lock().position
    }

    pub fn set_position(&self, position: Vec2) {
        if self.is_destroyed() {
            return;
        }
        let mut st = self.state.lock();
        st.position = position;
        st.dirty.transform = true;
    }

    pub fn translate(&self, delta: Vec2) {
        if self.is_destroyed() {
            return;
        }
        let mut st = self.state.lock();
        st.position += delta;
        st.dirty.transform = true;
    }

    /// Heading in degrees, always within `[0, 360)`.
    pub fn heading(&self) -> f32 {
        self.state.lock().heading
    }

    pub fn set_heading(&self, degrees: f32) {
        if self.is_destroyed() {
            return;
        }
        let mut st = self.state.lock();
        st.heading = normalize_degrees(degrees);
        st.dirty.transform = true;
    }

    pub fn turn(&self, degrees: f32) {
        if self.is_destroyed() {
            return;
        }
        let mut st = self.state.lock();
        st.heading = normalize_degrees(st.heading + degrees);
        st.dirty.transform = true;
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    pub fn set_visible(&self, visible: bool) {
        if self.is_destroyed() {
            return;
        }
        let mut st = self.state.lock();
        if st.visible != visible {
            st.visible = visible;
            st.dirty.visibility = true;
        }
    }

    // ==================== PHYSICS ====================

    pub fn physics_mode(&self) -> PhysicsMode {
        self.state.lock().physics
    }

    /// Whether the host solver moves this shape (physics on, not static).
    pub fn is_solver_driven(&self) -> bool {
        matches!(
            self.physics_mode(),
            PhysicsMode::Kinematic | PhysicsMode::Dynamic
        )
    }

    pub fn velocity(&self) -> Vec2 {
        self.state.lock().velocity
    }

    pub fn set_velocity(&self, velocity: Vec2) {
        if self.is_destroyed() {
            return;
        }
        let mut st = self.state.lock();
        st.velocity = velocity;
        st.dirty.velocity = true;
    }

    pub fn collider(&self) -> PhysicsShapeConfig {
        self.state.lock().collider.clone()
    }

    /// Malformed configs fall back to `Auto`.
    pub fn set_collider(&self, collider: PhysicsShapeConfig) {
        if self.is_destroyed() {
            return;
        }
        let collider = collider.validated(ColliderKind::Auto, "collider");
        let mut st = self.state.lock();
        st.collider = collider;
        st.dirty.physics = true;
    }

    pub fn trigger(&self) -> PhysicsShapeConfig {
        self.state.lock().trigger.clone()
    }

    /// Malformed configs fall back to `Disabled`.
    pub fn set_trigger(&self, trigger: PhysicsShapeConfig) {
        if self.is_destroyed() {
            return;
        }
        let trigger = trigger.validated(ColliderKind::Disabled, "trigger");
        let mut st = self.state.lock();
        st.trigger = trigger;
        st.dirty.physics = true;
    }

    // ==================== RENDER ORDER ====================

    /// 1-based rank among active sprites; 0 for non-sprites and inactive shapes.
    pub fn render_layer(&self) -> u32 {
        self.layer.load(Ordering::Acquire)
    }

    pub(crate) fn set_render_layer(&self, layer: u32) {
        if self.layer.swap(layer, Ordering::AcqRel) != layer {
            self.state.lock().dirty.layer = true;
        }
    }

    // ==================== ANIMATION ====================

    pub fn animation_template(&self, name: &str) -> ScriptResult<&AnimationTemplate> {
        self.animations
            .get(name)
            .ok_or_else(|| ScriptError::AnimationNotFound(name.to_string()))
    }

    pub fn default_animation(&self) -> Option<&str> {
        self.default_animation.as_deref()
    }

    pub fn current_animation(&self) -> Option<String> {
        self.state.lock().animation.clone()
    }

    pub fn frame(&self) -> usize {
        self.state.lock().frame
    }

    /// Switch to a named animation; unknown names are a lookup error.
    pub fn set_animation(&self, name: &str) -> ScriptResult {
        self.animation_template(name)?;
        if self.is_destroyed() {
            return Ok(());
        }
        let mut st = self.state.lock();
        st.animation = Some(name.to_string());
        st.frame = 0;
        st.dirty.frame = true;
        Ok(())
    }

    pub(crate) fn set_frame(&self, frame: usize) {
        if self.is_destroyed() {
            return;
        }
        let mut st = self.state.lock();
        if st.frame != frame {
            st.frame = frame;
            st.dirty.frame = true;
        }
    }

    /// Back to the idle animation, if the shape has one.
    pub fn resume_default_animation(&self) {
        if self.is_destroyed() {
            return;
        }
        let mut st = self.state.lock();
        st.animation = self.default_animation.clone();
        st.frame = 0;
        st.dirty.frame = true;
    }

    /// Install `run` on its channel, cancelling whatever ran there before.
    ///
    /// The previous run's cancellation flag is set before this returns.
    pub fn begin_run(&self, run: Arc<AnimationState>) -> Option<Arc<AnimationState>> {
        if self.is_destroyed() {
            run.cancel();
            return None;
        }
        let previous = self.runs.lock().insert(run.channel, run);
        if let Some(prev) = &previous {
            prev.cancel();
        }
        previous
    }

    /// Remove `run` from its channel. Returns false if a newer run took over.
    pub fn end_run(&self, run: &Arc<AnimationState>) -> bool {
        let mut runs = self.runs.lock();
        match runs.get(&run.channel) {
            Some(current) if Arc::ptr_eq(current, run) => {
                runs.remove(&run.channel);
                true
            }
            _ => false,
        }
    }

    pub fn active_run(&self, channel: TweenChannel) -> Option<Arc<AnimationState>> {
        self.runs.lock().get(&channel).cloned()
    }

    // ==================== SYNC ====================

    pub(crate) fn take_dirty(&self) -> Dirty {
        std::mem::take(&mut self.state.lock().dirty)
    }

    pub(crate) fn mark_all_dirty(&self) {
        self.state.lock().dirty = Dirty::all();
    }
}

/// Wrap any angle into `[0, 360)`.
pub fn normalize_degrees(degrees: f32) -> f32 {
    let d = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if d >= 360.0 { 0.0 } else { d }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprite() -> Shape {
        Shape::new(ShapeId(1), ShapeKind::Sprite, "cat")
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(370.0), 10.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
    }

    #[test]
    fn test_setters_mark_dirty_and_take_clears() {
        let s = sprite();
        s.take_dirty();
        s.set_position(Vec2::new(3.0, 4.0));
        let dirty = s.take_dirty();
        assert!(dirty.transform);
        assert!(!dirty.visibility);
        assert!(s.take_dirty().is_clean());
    }

    #[test]
    fn test_destroyed_shape_ignores_mutation() {
        let s = sprite();
        s.destroy();
        s.take_dirty();
        s.set_position(Vec2::new(9.0, 9.0));
        s.set_visible(false);
        assert_eq!(s.position(), Vec2::ZERO);
        assert!(s.is_visible());
        assert!(s.take_dirty().is_clean());
        assert!(s.cancel_signal().is_raised());
    }

    #[test]
    fn test_begin_run_cancels_previous_on_same_channel() {
        let s = sprite();
        let first = Arc::new(AnimationState::new(TweenChannel::Glide, 1.0));
        let second = Arc::new(AnimationState::new(TweenChannel::Glide, 1.0));
        let other = Arc::new(AnimationState::new(TweenChannel::Turn, 1.0));
        assert!(s.begin_run(first.clone()).is_none());
        s.begin_run(other.clone());
        let prev = s.begin_run(second.clone()).unwrap();
        assert!(Arc::ptr_eq(&prev, &first));
        assert!(first.is_cancelled());
        assert!(!other.is_cancelled());
        assert!(!s.end_run(&first));
        assert!(s.end_run(&second));
    }

    #[test]
    fn test_destroy_cancels_runs() {
        let s = sprite();
        let run = Arc::new(AnimationState::new(TweenChannel::Move, 1.0));
        s.begin_run(run.clone());
        s.destroy();
        assert!(run.is_cancelled());
        assert!(s.active_run(TweenChannel::Move).is_none());
    }

    #[test]
    fn test_unknown_animation_is_lookup_error() {
        let s = sprite().with_animation("walk", AnimationTemplate::new(4, 8.0));
        assert!(s.set_animation("walk").is_ok());
        assert!(matches!(
            s.set_animation("fly"),
            Err(ScriptError::AnimationNotFound(name)) if name == "fly"
        ));
    }

    #[test]
    fn test_duplicate_copies_state_not_identity() {
        let s = sprite()
            .with_position(Vec2::new(1.0, 2.0))
            .with_default_animation("idle")
            .with_animation("idle", AnimationTemplate::new(1, 1.0));
        s.set_proxy(ProxyId(5));
        let copy = s.duplicate(ShapeId(2));
        assert_eq!(copy.id(), ShapeId(2));
        assert_eq!(copy.position(), Vec2::new(1.0, 2.0));
        assert_eq!(copy.current_animation().as_deref(), Some("idle"));
        assert!(copy.proxy().is_none());
    }
}
