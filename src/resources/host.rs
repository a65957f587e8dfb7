//! The host engine boundary.
//!
//! Rendering, physics and audio live outside the core, behind the
//! synchronous [`HostBoundary`] trait. The host is not reentrant and is
//! owned by exactly one thread; every call happens there, either directly
//! from the engine's tick callbacks or through the
//! [`MainThreadDispatcher`](crate::resources::dispatcher::MainThreadDispatcher).
//!
//! [`HeadlessHost`] is a self-contained implementation that records every
//! setter call and answers queries from rectangle geometry. The demo binary
//! and the tests drive the engine with it.

use glam::Vec2;
use rustc_hash::FxHashMap;

use crate::components::physicsshape::{ColliderKind, PhysicsShapeConfig};
use crate::components::shape::{ShapeId, ShapeKind};

/// Host-side handle for a shape's render/physics proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(pub u64);

pub trait HostBoundary {
    // Proxy lifecycle
    fn create_proxy(&mut self, shape: ShapeId, kind: ShapeKind) -> ProxyId;
    fn destroy_proxy(&mut self, proxy: ProxyId);

    // Setters
    fn set_transform(&mut self, proxy: ProxyId, position: Vec2, heading: f32);
    fn set_visible(&mut self, proxy: ProxyId, visible: bool);
    fn set_layer(&mut self, proxy: ProxyId, layer: u32);
    fn set_frame(&mut self, proxy: ProxyId, animation: Option<&str>, frame: usize);
    fn set_collider(&mut self, proxy: ProxyId, config: &PhysicsShapeConfig);
    fn set_trigger(&mut self, proxy: ProxyId, config: &PhysicsShapeConfig);
    fn set_velocity(&mut self, proxy: ProxyId, velocity: Vec2);
    fn play_audio(&mut self, proxy: Option<ProxyId>, cue: &str);
    fn stop_audio(&mut self, proxy: Option<ProxyId>, cue: Option<&str>);

    // Queries
    fn contains_point(&self, proxy: ProxyId, point: Vec2) -> bool;
    fn collides(&self, a: ProxyId, b: ProxyId) -> bool;
    fn raycast(&self, from: Vec2, to: Vec2, mask: u32) -> Option<ProxyId>;
    fn velocity(&self, proxy: ProxyId) -> Vec2;
    fn gravity(&self) -> Vec2;
}

/// One recorded setter call on a [`HeadlessHost`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    CreateProxy(ShapeId, ProxyId),
    DestroyProxy(ProxyId),
    Transform(ProxyId, Vec2, f32),
    Visible(ProxyId, bool),
    Layer(ProxyId, u32),
    Frame(ProxyId, Option<String>, usize),
    Collider(ProxyId, ColliderKind),
    Trigger(ProxyId, ColliderKind),
    Velocity(ProxyId, Vec2),
    PlayAudio(Option<ProxyId>, String),
    StopAudio(Option<ProxyId>, Option<String>),
}

#[derive(Debug, Clone)]
struct Body {
    shape: ShapeId,
    position: Vec2,
    visible: bool,
    half_extents: Vec2,
    layer: u32,
    velocity: Vec2,
}

/// Half extents used when a collider has no closed-form size.
const AUTO_HALF_EXTENTS: Vec2 = Vec2::new(16.0, 16.0);

/// Headless host: records calls, answers queries from axis-aligned boxes.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    next_proxy: u64,
    bodies: FxHashMap<ProxyId, Body>,
    pub calls: Vec<HostCall>,
    pub gravity: Vec2,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_calls(&mut self) -> Vec<HostCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn live_proxies(&self) -> usize {
        self.bodies.len()
    }

    pub fn proxy_for(&self, shape: ShapeId) -> Option<ProxyId> {
        self.bodies
            .iter()
            .find(|(_, body)| body.shape == shape)
            .map(|(proxy, _)| *proxy)
    }

    pub fn position_of(&self, proxy: ProxyId) -> Option<Vec2> {
        self.bodies.get(&proxy).map(|b| b.position)
    }

    pub fn layer_of(&self, proxy: ProxyId) -> Option<u32> {
        self.bodies.get(&proxy).map(|b| b.layer)
    }

    fn bounds(body: &Body) -> (Vec2, Vec2) {
        (body.position - body.half_extents, body.position + body.half_extents)
    }
}

impl HostBoundary for HeadlessHost {
    fn create_proxy(&mut self, shape: ShapeId, _kind: ShapeKind) -> ProxyId {
        self.next_proxy += 1;
        let proxy = ProxyId(self.next_proxy);
        self.bodies.insert(
            proxy,
            Body {
                shape,
                position: Vec2::ZERO,
                visible: true,
                half_extents: AUTO_HALF_EXTENTS,
                layer: 0,
                velocity: Vec2::ZERO,
            },
        );
        self.calls.push(HostCall::CreateProxy(shape, proxy));
        proxy
    }

    fn destroy_proxy(&mut self, proxy: ProxyId) {
        self.bodies.remove(&proxy);
        self.calls.push(HostCall::DestroyProxy(proxy));
    }

    fn set_transform(&mut self, proxy: ProxyId, position: Vec2, heading: f32) {
        if let Some(body) = self.bodies.get_mut(&proxy) {
            body.position = position;
        }
        self.calls.push(HostCall::Transform(proxy, position, heading));
    }

    fn set_visible(&mut self, proxy: ProxyId, visible: bool) {
        if let Some(body) = self.bodies.get_mut(&proxy) {
            body.visible = visible;
        }
        self.calls.push(HostCall::Visible(proxy, visible));
    }

    fn set_layer(&mut self, proxy: ProxyId, layer: u32) {
        if let Some(body) = self.bodies.get_mut(&proxy) {
            body.layer = layer;
        }
        self.calls.push(HostCall::Layer(proxy, layer));
    }

    fn set_frame(&mut self, proxy: ProxyId, animation: Option<&str>, frame: usize) {
        self.calls
            .push(HostCall::Frame(proxy, animation.map(str::to_string), frame));
    }

    fn set_collider(&mut self, proxy: ProxyId, config: &PhysicsShapeConfig) {
        if let Some(body) = self.bodies.get_mut(&proxy) {
            body.half_extents = config.half_extents().unwrap_or(AUTO_HALF_EXTENTS);
        }
        self.calls.push(HostCall::Collider(proxy, config.kind));
    }

    fn set_trigger(&mut self, proxy: ProxyId, config: &PhysicsShapeConfig) {
        self.calls.push(HostCall::Trigger(proxy, config.kind));
    }

    fn set_velocity(&mut self, proxy: ProxyId, velocity: Vec2) {
        if let Some(body) = self.bodies.get_mut(&proxy) {
            body.velocity = velocity;
        }
        self.calls.push(HostCall::Velocity(proxy, velocity));
    }

    fn play_audio(&mut self, proxy: Option<ProxyId>, cue: &str) {
        self.calls.push(HostCall::PlayAudio(proxy, cue.to_string()));
    }

    fn stop_audio(&mut self, proxy: Option<ProxyId>, cue: Option<&str>) {
        self.calls
            .push(HostCall::StopAudio(proxy, cue.map(str::to_string)));
    }

    fn contains_point(&self, proxy: ProxyId, point: Vec2) -> bool {
        self.bodies.get(&proxy).is_some_and(|body| {
            let (min, max) = Self::bounds(body);
            body.visible && point.cmpge(min).all() && point.cmple(max).all()
        })
    }

    fn collides(&self, a: ProxyId, b: ProxyId) -> bool {
        match (self.bodies.get(&a), self.bodies.get(&b)) {
            (Some(a), Some(b)) => {
                let (amin, amax) = Self::bounds(a);
                let (bmin, bmax) = Self::bounds(b);
                amin.cmple(bmax).all() && bmin.cmple(amax).all()
            }
            _ => false,
        }
    }

    fn raycast(&self, from: Vec2, to: Vec2, _mask: u32) -> Option<ProxyId> {
        // Sampled march; precise enough for a headless stand-in.
        const SAMPLES: usize = 64;
        for i in 0..=SAMPLES {
            let p = from.lerp(to, i as f32 / SAMPLES as f32);
            let mut hits: Vec<ProxyId> = self
                .bodies
                .keys()
                .copied()
                .filter(|proxy| self.contains_point(*proxy, p))
                .collect();
            hits.sort();
            if let Some(hit) = hits.first() {
                return Some(*hit);
            }
        }
        None
    }

    fn velocity(&self, proxy: ProxyId) -> Vec2 {
        self.bodies
            .get(&proxy)
            .map(|b| b.velocity)
            .unwrap_or(Vec2::ZERO)
    }

    fn gravity(&self) -> Vec2 {
        self.gravity
    }
}
