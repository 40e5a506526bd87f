//! Update scheduler
//!
//! Every tick walks the live roots in activation order. Inside a composite,
//! components update in the order cached at construction; composites a
//! component spawned update right after it, and blueprint children update
//! after all of their parent's components.

use std::time::Duration;

use void_core::Services;
use void_resource::Registry;

use crate::component::UpdateContext;
use crate::scene::{ComponentHandle, CompositeHandle, InstanceState, Scene};

/// Run one synchronous update pass; returns how many components were updated
pub fn tick(scene: &mut Scene, registry: &Registry, services: &Services, delta: Duration) -> usize {
    let roots: Vec<CompositeHandle> = scene.roots().collect();
    let mut updated = 0;
    for root in roots {
        updated += tick_composite(scene, registry, services, delta, root);
    }
    updated
}

fn tick_composite(
    scene: &mut Scene,
    registry: &Registry,
    services: &Services,
    delta: Duration,
    handle: CompositeHandle,
) -> usize {
    let Some(composite) = scene.composite(handle) else {
        return 0;
    };
    if composite.state() != InstanceState::Live {
        return 0;
    }
    let ordered: Vec<ComponentHandle> = composite.ordered_components().collect();
    let children: Vec<CompositeHandle> = composite
        .children()
        .iter()
        .copied()
        .filter(|c| scene.composite(*c).map_or(false, |c| c.spawned_by().is_none()))
        .collect();

    let mut updated = 0;
    for component in ordered {
        updated += update_component(scene, registry, services, delta, component);
        let spawned = scene
            .component(component)
            .map(|c| c.spawned().to_vec())
            .unwrap_or_default();
        for child in spawned {
            updated += tick_composite(scene, registry, services, delta, child);
        }
    }
    for child in children {
        updated += tick_composite(scene, registry, services, delta, child);
    }
    updated
}

fn update_component(
    scene: &mut Scene,
    registry: &Registry,
    services: &Services,
    delta: Duration,
    handle: ComponentHandle,
) -> usize {
    let Some(mut behavior) = scene.take_behavior(handle) else {
        return 0;
    };
    if let Some(instance) = scene.component(handle) {
        let mut ctx = UpdateContext {
            handle,
            instance,
            scene: &*scene,
            registry,
            services,
            delta,
        };
        behavior.update(&mut ctx);
    }
    scene.put_behavior(handle, behavior);
    1
}
