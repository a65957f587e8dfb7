//! Per-tick procedures.
//!
//! Each system is a plain function over the shared services and, where it
//! needs one, the host boundary. The engine calls them in a fixed order
//! from its host callbacks.
//!
//! Submodules overview
//! - [`dispatch`] – drain the mailbox, hit-test clicks and invoke sinks
//! - [`input`] – diff device samples into discrete events
//! - [`logic`] – shape activation, cross-thread notices, deadline timers and update hooks
//! - [`sync`] – push dirty shape state to the host and tear down removed proxies
//! - [`time`] – advance the frame clock
//! - [`tween`] – frame-stepped move/turn/glide and frame animations

pub mod dispatch;
pub mod input;
pub mod logic;
pub mod sync;
pub mod time;
pub mod tween;
