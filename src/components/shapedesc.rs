//! Serializable shape descriptions.
//!
//! A [`ShapeDesc`] is the persisted, per-shape configuration: consumed once
//! at construction to build a [`Shape`], never consulted again.
//!
//! ```json
//! {
//!   "name": "cat",
//!   "kind": "sprite",
//!   "position": [10, 20],
//!   "heading": 90,
//!   "physics": "dynamic",
//!   "default_animation": "idle",
//!   "animations": { "idle": { "frames": 2, "fps": 4, "looped": true } },
//!   "collider": { "kind": "rect", "params": [32, 32] },
//!   "trigger": { "kind": "circle", "params": [20] }
//! }
//! ```

use glam::Vec2;
use log::warn;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::components::animation::AnimationTemplate;
use crate::components::physicsshape::{ColliderKind, PhysicsShapeConfig, PhysicsShapeDesc};
use crate::components::shape::{PhysicsMode, Shape, ShapeId, ShapeKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeDesc {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: ShapeKind,
    #[serde(default)]
    pub position: [f32; 2],
    #[serde(default = "default_heading")]
    pub heading: f32,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub physics: PhysicsMode,
    #[serde(default)]
    pub default_animation: Option<String>,
    #[serde(default)]
    pub animations: FxHashMap<String, AnimationTemplate>,
    #[serde(default)]
    pub collider: Option<PhysicsShapeDesc>,
    #[serde(default)]
    pub trigger: Option<PhysicsShapeDesc>,
}

fn default_kind() -> ShapeKind {
    ShapeKind::Sprite
}

fn default_heading() -> f32 {
    90.0
}

fn default_visible() -> bool {
    true
}

impl ShapeDesc {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Build a shape. Malformed collider/trigger entries are logged and
    /// replaced by safe defaults; an unknown default animation is dropped.
    pub fn build(&self, id: ShapeId) -> Shape {
        let collider = match &self.collider {
            Some(desc) => PhysicsShapeConfig::from_desc(
                desc,
                ColliderKind::Auto,
                &format!("{} collider", self.name),
            ),
            None => PhysicsShapeConfig::auto(),
        };
        let trigger = match &self.trigger {
            Some(desc) => PhysicsShapeConfig::from_desc(
                desc,
                ColliderKind::Disabled,
                &format!("{} trigger", self.name),
            ),
            None => PhysicsShapeConfig::disabled(),
        };

        let mut shape = Shape::new(id, self.kind, self.name.clone())
            .with_position(Vec2::new(self.position[0], self.position[1]))
            .with_heading(self.heading)
            .with_visible(self.visible)
            .with_physics(self.physics)
            .with_collider(collider)
            .with_trigger(trigger);
        for (name, template) in &self.animations {
            shape = shape.with_animation(name.clone(), template.clone());
        }
        if let Some(default) = &self.default_animation {
            if self.animations.contains_key(default) {
                shape = shape.with_default_animation(default.clone());
            } else {
                warn!(
                    "Shape '{}': default animation '{}' is not defined, ignoring",
                    self.name, default
                );
            }
        }
        shape
    }
}
