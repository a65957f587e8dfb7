//! Value types exchanged between loops and threads.
//!
//! Submodules:
//! - [`audio`] – audio requests forwarded to the host boundary
//! - [`fault`] – script cancellation and fault reporting
//! - [`input`] – discrete mailbox events and key codes
//! - [`notice`] – cross-thread notices drained once per tick
pub mod audio;
pub mod fault;
pub mod input;
pub mod notice;
