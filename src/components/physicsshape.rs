//! Collider and trigger descriptions pushed to the host's physics solver.
//!
//! A shape carries one collider and one trigger [`PhysicsShapeConfig`].
//! Scripts mutate them freely; the host sees the result on the next sync.
//!
//! Configs built from a [`PhysicsShapeDesc`] or installed on a shape are
//! validated: an unknown kind or a parameter count that does not fit the kind
//! is logged and the field falls back to a safe default (`Auto` for
//! colliders, `Disabled` for triggers). Construction never fails.

use glam::Vec2;
use log::warn;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Geometry of a collider or trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColliderKind {
    /// No physics body for this slot.
    Disabled,
    /// Let the host derive a shape from the current costume bounds.
    Auto,
    /// Params: `[width, height]`.
    Rect,
    /// Params: `[radius]`.
    Circle,
    /// Params: `[radius, height]`.
    Capsule,
    /// Params: `[x0, y0, x1, y1, x2, y2, ...]`, at least three points.
    Polygon,
}

impl ColliderKind {
    fn accepts(&self, count: usize) -> bool {
        match self {
            ColliderKind::Disabled | ColliderKind::Auto => count == 0,
            ColliderKind::Rect | ColliderKind::Capsule => count == 2,
            ColliderKind::Circle => count == 1,
            ColliderKind::Polygon => count >= 6 && count % 2 == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsShapeConfig {
    pub kind: ColliderKind,
    pub params: SmallVec<[f32; 4]>,
    /// Collision layer bits this shape lives on.
    pub layer: u32,
    /// Collision layer bits this shape reacts to.
    pub mask: u32,
    /// Offset of the shape's origin relative to the sprite position.
    pub pivot: Vec2,
}

impl PhysicsShapeConfig {
    pub fn new(kind: ColliderKind) -> Self {
        Self {
            kind,
            params: SmallVec::new(),
            layer: 1,
            mask: u32::MAX,
            pivot: Vec2::ZERO,
        }
    }

    pub fn disabled() -> Self {
        Self::new(ColliderKind::Disabled)
    }

    pub fn auto() -> Self {
        Self::new(ColliderKind::Auto)
    }

    pub fn rect(width: f32, height: f32) -> Self {
        Self {
            params: SmallVec::from_slice(&[width, height]),
            ..Self::new(ColliderKind::Rect)
        }
    }

    pub fn circle(radius: f32) -> Self {
        Self {
            params: SmallVec::from_slice(&[radius]),
            ..Self::new(ColliderKind::Circle)
        }
    }

    pub fn with_layers(mut self, layer: u32, mask: u32) -> Self {
        self.layer = layer;
        self.mask = mask;
        self
    }

    pub fn with_pivot(mut self, pivot: Vec2) -> Self {
        self.pivot = pivot;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.kind != ColliderKind::Disabled
    }

    /// Validate a description, falling back to `fallback` on malformed input.
    ///
    /// `field` names the slot ("collider" or "trigger") in the log line.
    pub fn from_desc(desc: &PhysicsShapeDesc, fallback: ColliderKind, field: &str) -> Self {
        let kind = match parse_kind(&desc.kind) {
            Some(kind) => kind,
            None => {
                warn!(
                    "Unknown {} kind '{}', using {:?}",
                    field, desc.kind, fallback
                );
                return Self::new(fallback);
            }
        };
        if !kind.accepts(desc.params.len()) {
            warn!(
                "Malformed {}: kind {:?} does not take {} params, using {:?}",
                field,
                kind,
                desc.params.len(),
                fallback
            );
            return Self::new(fallback);
        }
        Self {
            kind,
            params: SmallVec::from_slice(&desc.params),
            layer: desc.layer,
            mask: desc.mask,
            pivot: Vec2::new(desc.pivot[0], desc.pivot[1]),
        }
    }

    /// Whether `params` fits `kind`.
    pub fn is_well_formed(&self) -> bool {
        self.kind.accepts(self.params.len())
    }

    /// `self` if well formed, otherwise a bare `fallback` config.
    pub fn validated(self, fallback: ColliderKind, field: &str) -> Self {
        if self.is_well_formed() {
            return self;
        }
        warn!(
            "Malformed {}: kind {:?} does not take {} params, using {:?}",
            field,
            self.kind,
            self.params.len(),
            fallback
        );
        Self::new(fallback)
    }

    /// Axis-aligned half extents, when the geometry has a closed form and
    /// the params fit the kind.
    pub fn half_extents(&self) -> Option<Vec2> {
        if !self.is_well_formed() {
            return None;
        }
        let p = self.params.as_slice();
        match (self.kind, p) {
            (ColliderKind::Rect, &[w, h]) => Some(Vec2::new(w, h) * 0.5),
            (ColliderKind::Circle, &[r]) => Some(Vec2::splat(r)),
            (ColliderKind::Capsule, &[r, h]) => Some(Vec2::new(r, h * 0.5)),
            (ColliderKind::Polygon, points) => {
                let mut max = Vec2::ZERO;
                for p in points.chunks_exact(2) {
                    max = max.max(Vec2::new(p[0].abs(), p[1].abs()));
                }
                Some(max)
            }
            _ => None,
        }
    }
}

fn parse_kind(kind: &str) -> Option<ColliderKind> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "disabled" | "none" => Some(ColliderKind::Disabled),
        "auto" => Some(ColliderKind::Auto),
        "rect" | "rectangle" => Some(ColliderKind::Rect),
        "circle" => Some(ColliderKind::Circle),
        "capsule" => Some(ColliderKind::Capsule),
        "polygon" => Some(ColliderKind::Polygon),
        _ => None,
    }
}

/// Raw collider/trigger description as it appears in a shape description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsShapeDesc {
    pub kind: String,
    #[serde(default)]
    pub params: Vec<f32>,
    #[serde(default = "default_layer")]
    pub layer: u32,
    #[serde(default = "default_mask")]
    pub mask: u32,
    #[serde(default)]
    pub pivot: [f32; 2],
}

fn default_layer() -> u32 {
    1
}

fn default_mask() -> u32 {
    u32::MAX
}
