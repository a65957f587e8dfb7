//! Discrete events flowing through the mailbox.
//!
//! [`Event`] values are produced by the input-sampling system, the host's
//! input callbacks, the deadline timers and the engine lifecycle. Each one
//! is posted once to the [`Mailbox`](crate::resources::mailbox::Mailbox),
//! drained once by the dispatch system, and then discarded.

use glam::Vec2;

/// Host-specific key code, opaque to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u32);

/// One discrete input or scheduling event.
///
/// `at` is the unscaled clock time at which the event was synthesized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    LeftButtonDown { pos: Vec2, at: f64 },
    LeftButtonUp { pos: Vec2, at: f64 },
    MouseMove { pos: Vec2, at: f64 },
    KeyDown { key: KeyCode, at: f64 },
    KeyUp { key: KeyCode, at: f64 },
    /// The game (re)started.
    Start { at: f64 },
    /// A registered deadline elapsed.
    Timer { deadline: f64, at: f64 },
}

impl Event {
    /// Short tag used in diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            Event::LeftButtonDown { .. } => "LeftButtonDown",
            Event::LeftButtonUp { .. } => "LeftButtonUp",
            Event::MouseMove { .. } => "MouseMove",
            Event::KeyDown { .. } => "KeyDown",
            Event::KeyUp { .. } => "KeyUp",
            Event::Start { .. } => "Start",
            Event::Timer { .. } => "Timer",
        }
    }

    pub fn at(&self) -> f64 {
        match *self {
            Event::LeftButtonDown { at, .. }
            | Event::LeftButtonUp { at, .. }
            | Event::MouseMove { at, .. }
            | Event::KeyDown { at, .. }
            | Event::KeyUp { at, .. }
            | Event::Start { at }
            | Event::Timer { at, .. } => at,
        }
    }
}
