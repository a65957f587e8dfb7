//! Input sampling system.
//!
//! - [`diff_device_state`] turns two consecutive device samples into
//!   discrete events
//! - [`sample_input`] polls the sampler once, posts the events to the
//!   mailbox and keeps the sample for the next tick
//!
//! Events for one tick come out in a fixed order: key releases, key presses
//! (each by ascending key code), mouse movement, then the button edge.

use smallvec::SmallVec;

use crate::events::input::{Event, KeyCode};
use crate::resources::input::{DeviceSampler, DeviceState};
use crate::resources::mailbox::Mailbox;

pub type SampledEvents = SmallVec<[Event; 8]>;

pub fn diff_device_state(prev: &DeviceState, next: &DeviceState, at: f64) -> SampledEvents {
    let mut events = SampledEvents::new();

    let mut released: SmallVec<[KeyCode; 8]> =
        prev.keys_down.difference(&next.keys_down).copied().collect();
    released.sort_unstable();
    events.extend(released.into_iter().map(|key| Event::KeyUp { key, at }));

    let mut pressed: SmallVec<[KeyCode; 8]> =
        next.keys_down.difference(&prev.keys_down).copied().collect();
    pressed.sort_unstable();
    events.extend(pressed.into_iter().map(|key| Event::KeyDown { key, at }));

    if next.mouse != prev.mouse {
        events.push(Event::MouseMove {
            pos: next.mouse,
            at,
        });
    }

    match (prev.left_button, next.left_button) {
        (false, true) => events.push(Event::LeftButtonDown {
            pos: next.mouse,
            at,
        }),
        (true, false) => events.push(Event::LeftButtonUp {
            pos: next.mouse,
            at,
        }),
        _ => {}
    }
    events
}

/// Poll the device once and post what changed. Returns how many events
/// were accepted by the mailbox.
pub fn sample_input(
    sampler: &mut dyn DeviceSampler,
    previous: &mut DeviceState,
    mailbox: &Mailbox,
    at: f64,
) -> usize {
    let next = sampler.sample();
    let events = diff_device_state(previous, &next, at);
    *previous = next;
    events.into_iter().filter(|e| mailbox.post(*e)).count()
}
