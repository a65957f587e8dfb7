//! The engine context and its host callbacks.
//!
//! [`Engine`] owns everything one game needs: the shared [`Services`], the
//! host boundary, the frame clock, the device sampler and the fault
//! policy. A host drives it by calling the `on_engine_*` callbacks from its
//! owning thread:
//!
//! - `on_engine_update(delta)` – clock, marshaled host jobs, input sampling,
//!   per-tick logic, event dispatch, one scheduler step, fault handling and
//!   per-shape update hooks, in that order
//! - `on_engine_render(delta)` – activation of late shapes, vertical layer
//!   sort, dirty-state sync and deferred proxy teardown
//! - `on_engine_reset()` – aborts every thread, tears down every shape and
//!   re-posts `Start`
//!
//! Nothing here is global; tests create as many engines as they like.

use glam::Vec2;
use log::{error, info, warn};

use crate::events::fault::ScriptFault;
use crate::events::input::{Event, KeyCode};
use crate::resources::engineconfig::{EngineConfig, FaultAction};
use crate::resources::frameclock::FrameClock;
use crate::resources::host::HostBoundary;
use crate::resources::input::{DeviceSampler, DeviceState, NullSampler};
use crate::resources::services::Services;
use crate::systems::dispatch::{ClickCooldowns, drain_mailbox};
use crate::systems::input::sample_input;
use crate::systems::logic::{drain_notices, fire_timers, flush_activations, run_update_hooks};
use crate::systems::sync::{sync_to_host, teardown_destroyed};
use crate::systems::time::update_frame_clock;

pub struct Engine<H: HostBoundary> {
    config: EngineConfig,
    services: Services,
    host: H,
    clock: FrameClock,
    sampler: Box<dyn DeviceSampler>,
    previous: DeviceState,
    cooldowns: ClickCooldowns,
    faults: Vec<ScriptFault>,
    paused: bool,
    quit: bool,
    resets: u64,
}

impl<H: HostBoundary> Engine<H> {
    /// Build an engine owned by the calling thread.
    pub fn new(config: EngineConfig, host: H) -> Self {
        let services = Services::with_sort_mode(config.mailbox_capacity, config.layer_sort);
        let clock = FrameClock::default().with_time_scale(config.time_scale);
        let cooldowns = ClickCooldowns::new(config.target_cooldown, config.stage_cooldown);
        Engine {
            config,
            services,
            host,
            clock,
            sampler: Box::new(NullSampler),
            previous: DeviceState::default(),
            cooldowns,
            faults: Vec::new(),
            paused: false,
            quit: false,
            resets: 0,
        }
    }

    pub fn with_sampler(mut self, sampler: impl DeviceSampler + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Set once a fault escalated to `exit`.
    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Number of full resets performed so far.
    pub fn reset_count(&self) -> u64 {
        self.resets
    }

    // ==================== LIFECYCLE CALLBACKS ====================

    pub fn on_engine_start(&mut self) {
        info!("engine start");
        self.services.post(Event::Start {
            at: self.clock.unscaled_elapsed,
        });
    }

    pub fn on_engine_update(&mut self, delta: f64) {
        update_frame_clock(&mut self.clock, delta, self.paused);
        self.services.dispatcher.pump(&mut self.host);
        if self.paused {
            return;
        }

        sample_input(
            self.sampler.as_mut(),
            &mut self.previous,
            &self.services.mailbox,
            self.clock.unscaled_elapsed,
        );
        flush_activations(&self.services, &mut self.host, &mut self.faults);
        drain_notices(&self.services, &mut self.host, &mut self.faults);
        fire_timers(&self.services, &self.clock);
        drain_mailbox(&self.services, &self.host, &mut self.cooldowns, &mut self.faults);

        let scheduler = self.services.scheduler.clone();
        scheduler.tick(&self.clock, &mut self.host, &self.services.dispatcher);
        self.faults.extend(scheduler.take_faults());
        if self.handle_faults() {
            return;
        }

        run_update_hooks(&self.services, self.clock.delta, &mut self.faults);
        self.handle_faults();
    }

    pub fn on_engine_render(&mut self, _delta: f64) {
        flush_activations(&self.services, &mut self.host, &mut self.faults);
        if self.handle_faults() {
            return;
        }
        self.services.shapes.apply_vertical_sort();
        sync_to_host(&self.services.shapes.snapshot(), &mut self.host);
        teardown_destroyed(&self.services, &mut self.host, &mut self.cooldowns);
    }

    /// One host frame: update then render.
    pub fn step(&mut self, delta: f64) {
        self.on_engine_update(delta);
        self.on_engine_render(delta);
    }

    pub fn on_engine_pause(&mut self, paused: bool) {
        if self.paused != paused {
            info!("engine {}", if paused { "paused" } else { "resumed" });
        }
        self.paused = paused;
    }

    /// Full reset: abort every thread, tear down every shape, drop queued
    /// events, timers and notices, rewind the clock and post `Start` again.
    /// Registered sinks survive.
    pub fn on_engine_reset(&mut self) {
        info!(
            "engine reset: {} thread(s), {} shape(s)",
            self.services.scheduler.live_count(),
            self.services.shapes.len()
        );
        self.teardown_everything();
        self.services.mailbox.clear();
        self.services.timers.clear();
        self.services.notices.drain();
        self.cooldowns.clear();
        self.faults.clear();
        self.clock.reset();
        self.resets += 1;
        self.on_engine_start();
    }

    pub fn on_engine_destroy(&mut self) {
        info!("engine destroy");
        self.teardown_everything();
    }

    fn teardown_everything(&mut self) {
        let scheduler = self.services.scheduler.clone();
        scheduler.shutdown(&mut self.host, &self.services.dispatcher);
        self.services.dispatcher.pump(&mut self.host);
        self.services.shapes.clear();
        teardown_destroyed(&self.services, &mut self.host, &mut self.cooldowns);
    }

    // ==================== HOST INPUT CALLBACKS ====================

    pub fn on_key(&mut self, key: KeyCode, down: bool) {
        let at = self.clock.unscaled_elapsed;
        self.services.post(if down {
            Event::KeyDown { key, at }
        } else {
            Event::KeyUp { key, at }
        });
    }

    pub fn on_mouse_move(&mut self, pos: Vec2) {
        self.services.post(Event::MouseMove {
            pos,
            at: self.clock.unscaled_elapsed,
        });
    }

    pub fn on_mouse_button(&mut self, pos: Vec2, down: bool) {
        let at = self.clock.unscaled_elapsed;
        self.services.post(if down {
            Event::LeftButtonDown { pos, at }
        } else {
            Event::LeftButtonUp { pos, at }
        });
    }

    // ==================== FAULTS ====================

    /// Log pending faults and apply the most severe policy decision.
    /// Returns true if the engine was reset.
    fn handle_faults(&mut self) -> bool {
        if self.faults.is_empty() {
            return false;
        }
        let mut decision = FaultAction::Continue;
        for fault in std::mem::take(&mut self.faults) {
            match (&fault.backtrace, self.config.faults.backtraces) {
                (Some(bt), true) => error!(
                    "{} '{}' faulted: {}\n{}",
                    fault.thread, fault.name, fault.message, bt
                ),
                _ => error!("{} '{}' faulted: {}", fault.thread, fault.name, fault.message),
            }
            decision = most_severe(decision, self.config.faults.action(fault.during_setup));
        }
        match decision {
            FaultAction::Continue => {
                warn!("fault policy: continue");
                false
            }
            FaultAction::Reset => {
                warn!("fault policy: full reset");
                self.on_engine_reset();
                true
            }
            FaultAction::Exit => {
                warn!("fault policy: exit requested");
                self.quit = true;
                false
            }
        }
    }
}

fn most_severe(a: FaultAction, b: FaultAction) -> FaultAction {
    fn rank(action: FaultAction) -> u8 {
        match action {
            FaultAction::Continue => 0,
            FaultAction::Reset => 1,
            FaultAction::Exit => 2,
        }
    }
    if rank(b) > rank(a) { b } else { a }
}

impl<H: HostBoundary> Drop for Engine<H> {
    fn drop(&mut self) {
        let scheduler = self.services.scheduler.clone();
        scheduler.shutdown(&mut self.host, &self.services.dispatcher);
    }
}
