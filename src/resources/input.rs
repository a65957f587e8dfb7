//! Raw device state and the sampler that provides it.
//!
//! The input-sampling system polls a [`DeviceSampler`] once per tick and
//! diffs the returned [`DeviceState`] against the previous one to
//! synthesize discrete events. Hosts implement the trait over their own
//! keyboard/mouse APIs; [`ScriptedSampler`] replays states pushed by test
//! or demo code.

use std::collections::VecDeque;

use glam::Vec2;
use rustc_hash::FxHashSet;

use crate::events::input::KeyCode;

/// Snapshot of polled device state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub keys_down: FxHashSet<KeyCode>,
    pub mouse: Vec2,
    pub left_button: bool,
}

impl DeviceState {
    pub fn with_key(mut self, key: KeyCode) -> Self {
        self.keys_down.insert(key);
        self
    }

    pub fn with_mouse(mut self, pos: Vec2) -> Self {
        self.mouse = pos;
        self
    }

    pub fn with_button(mut self, down: bool) -> Self {
        self.left_button = down;
        self
    }
}

pub trait DeviceSampler: Send {
    fn sample(&mut self) -> DeviceState;
}

/// Sampler fed from code. Once the queue is empty it keeps returning the
/// last state it handed out.
#[derive(Debug, Default)]
pub struct ScriptedSampler {
    queue: VecDeque<DeviceState>,
    last: DeviceState,
}

impl ScriptedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, state: DeviceState) {
        self.queue.push_back(state);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl DeviceSampler for ScriptedSampler {
    fn sample(&mut self) -> DeviceState {
        if let Some(next) = self.queue.pop_front() {
            self.last = next;
        }
        self.last.clone()
    }
}

/// Sampler with no devices attached.
#[derive(Debug, Default)]
pub struct NullSampler;

impl DeviceSampler for NullSampler {
    fn sample(&mut self) -> DeviceState {
        DeviceState::default()
    }
}
