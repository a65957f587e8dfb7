//! Per-shape data.
//!
//! Submodules overview:
//! - [`animation`] – named frame-animation templates
//! - [`physicsshape`] – collider/trigger descriptions with validation
//! - [`shape`] – the shared, polymorphic renderable entity
//! - [`shapedesc`] – serializable shape descriptions consumed at construction
//! - [`tween`] – tween requests and live animation runs

pub mod animation;
pub mod physicsshape;
pub mod shape;
pub mod shapedesc;
pub mod tween;
