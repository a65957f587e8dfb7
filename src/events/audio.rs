//! Audio requests forwarded to the host boundary.
//!
//! Scripts never touch the host's mixer directly. They queue an
//! [`AudioCmd`] as a [`Notice`](super::notice::Notice) and the per-tick
//! logic system forwards it on the owning thread.

use crate::components::shape::ShapeId;

#[derive(Debug, Clone, PartialEq)]
pub enum AudioCmd {
    /// Play `cue`, positioned at `shape` when given.
    Play { shape: Option<ShapeId>, cue: String },
    /// Stop `cue`, or everything `shape` is playing when `cue` is `None`.
    Stop {
        shape: Option<ShapeId>,
        cue: Option<String>,
    },
}
