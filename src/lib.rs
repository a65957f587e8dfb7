//! Spritecore library.
//!
//! The execution core of a script-driven 2D game framework: cooperative
//! script threads, event dispatch, shape lifecycle and tweens. Exposed as a
//! library for the demo binary and the integration tests.

pub mod components;
pub mod events;
pub mod game;
pub mod resources;
pub mod systems;
