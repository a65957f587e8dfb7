//! Long-lived shared services.
//!
//! This module groups the state that outlives a single tick: the clock,
//! configuration, queues, the scheduler and the shape manager. Each
//! submodule documents the semantics and intended usage of its resource.
//!
//! Overview
//! - `dispatcher` – marshal work onto the host-owning thread
//! - `engineconfig` – INI-backed tunables and the fault policy
//! - `frameclock` – scaled and unscaled time fed by the host tick
//! - `host` – the host boundary trait and a headless implementation
//! - `input` – raw device state and samplers
//! - `mailbox` – fixed-capacity event queue
//! - `notices` – lock-guarded buffer of cross-thread notices
//! - `scheduler` – cooperative script threads
//! - `services` – the bundle handed to scripts and sinks
//! - `shapemanager` – ordered active shapes and render layers
//! - `sinks` – registered event callbacks
//! - `timers` – sorted one-shot deadlines
pub mod dispatcher;
pub mod engineconfig;
pub mod frameclock;
pub mod host;
pub mod input;
pub mod mailbox;
pub mod notices;
pub mod scheduler;
pub mod services;
pub mod shapemanager;
pub mod sinks;
pub mod timers;
