//! Host synchronization system.
//!
//! Runs inside the render callback:
//! - [`sync_to_host`] pushes every changed property of the active shapes to
//!   their host proxies
//! - [`teardown_destroyed`] releases the proxies of removed shapes and
//!   forgets their click sinks

use log::trace;

use crate::components::shape::Shape;
use crate::resources::host::HostBoundary;
use crate::resources::services::Services;
use crate::systems::dispatch::ClickCooldowns;

/// Push dirty state for each active shape. Returns how many shapes had
/// anything to push.
pub fn sync_to_host(shapes: &[std::sync::Arc<Shape>], host: &mut dyn HostBoundary) -> usize {
    let mut synced = 0;
    for shape in shapes.iter().filter(|s| !s.is_destroyed()) {
        let Some(proxy) = shape.proxy() else {
            continue;
        };
        let dirty = shape.take_dirty();
        if dirty.is_clean() {
            continue;
        }
        if dirty.transform {
            host.set_transform(proxy, shape.position(), shape.heading());
        }
        if dirty.visibility {
            host.set_visible(proxy, shape.is_visible());
        }
        if dirty.layer {
            host.set_layer(proxy, shape.render_layer());
        }
        if dirty.physics {
            host.set_collider(proxy, &shape.collider());
            host.set_trigger(proxy, &shape.trigger());
        }
        if dirty.velocity {
            host.set_velocity(proxy, shape.velocity());
        }
        if dirty.frame {
            host.set_frame(proxy, shape.current_animation().as_deref(), shape.frame());
        }
        synced += 1;
    }
    synced
}

pub fn teardown_destroyed(
    services: &Services,
    host: &mut dyn HostBoundary,
    cooldowns: &mut ClickCooldowns,
) -> usize {
    let removed = services.shapes.take_teardown();
    for shape in &removed {
        if let Some(proxy) = shape.take_proxy() {
            host.destroy_proxy(proxy);
        }
        services.sinks.forget_shape(shape.id());
        cooldowns.forget(shape.id());
        trace!("tore down shape {}", shape.id());
    }
    removed.len()
}
