//! Capability interface implemented by every concrete component type

use std::time::Duration;

use void_core::{AsAny, InitError, ObjectId, Services, TypeFactory};
use void_resource::{Link, Object, Registry, Resource, ResourceScope, Value};

use crate::blueprint::CompositeBlueprint;
use crate::scene::{ComponentHandle, ComponentInstance, CompositeHandle, CompositeInstance, Scene};

/// Behavior attached to a composite.
///
/// Ordering dependencies are declared per type, through the
/// [`TypeInfo`](void_core::TypeInfo) the type is registered with.
pub trait Component: AsAny + Send {
    /// Staged initialization; only components ordered earlier are visible
    fn init(&mut self, ctx: &mut ComponentContext<'_>) -> Result<(), InitError>;

    /// Per-tick update, in the same order as initialization
    fn update(&mut self, _ctx: &mut UpdateContext<'_>) {}
}

/// Constructor table for component types
pub type ComponentFactory = TypeFactory<dyn Component, Services>;

fn downcast<T: Component>(scene: &Scene, handle: ComponentHandle) -> Option<&T> {
    scene.component(handle)?.downcast_ref()
}

/// View handed to [`Component::init`]
pub struct ComponentContext<'a> {
    pub(crate) handle: ComponentHandle,
    pub(crate) instance: &'a ComponentInstance,
    pub(crate) scene: &'a Scene,
    pub(crate) resources: ResourceScope<'a>,
    pub(crate) services: &'a Services,
    pub(crate) spawns: Vec<CompositeBlueprint>,
}

impl<'a> ComponentContext<'a> {
    /// Handle of the component being initialized
    pub fn handle(&self) -> ComponentHandle {
        self.handle
    }

    /// Full instance identifier (`composite/component`)
    pub fn id(&self) -> &ObjectId {
        self.instance.id()
    }

    /// Owning composite
    pub fn composite(&self) -> CompositeHandle {
        self.instance.composite()
    }

    /// Plain property by name
    pub fn property(&self, name: &str) -> Option<&'a Value> {
        self.instance.property(name)
    }

    /// Plain property that must be present
    pub fn require(&self, name: &str) -> Result<&'a Value, InitError> {
        self.property(name)
            .ok_or_else(|| InitError::new(format!("missing property '{}'", name)))
    }

    /// Linked resource slot
    pub fn link(&self, slot: &str) -> Option<Link> {
        self.instance.link(slot)
    }

    /// Object behind a linked slot. During a reload this is the staged
    /// candidate when the target is part of the reload.
    pub fn object(&self, slot: &str) -> Option<&'a Object> {
        self.resources.registry().get(self.link(slot)?.handle())
    }

    /// Downcast the resource behind a linked slot
    pub fn resource<T: Resource>(&self, slot: &str) -> Option<&'a T> {
        self.object(slot)?.downcast_ref()
    }

    /// Resolved component pointer
    pub fn pointer(&self, slot: &str) -> Option<ComponentHandle> {
        self.instance.pointer(slot)
    }

    /// Downcast the component behind a pointer slot
    pub fn pointer_as<T: Component>(&self, slot: &str) -> Option<&'a T> {
        downcast(self.scene, self.pointer(slot)?)
    }

    /// First initialized sibling of type `T`
    pub fn sibling<T: Component>(&self) -> Option<&'a T> {
        self.get(self.composite())
    }

    /// Component instance by handle, if it has finished initialization
    pub fn component(&self, handle: ComponentHandle) -> Option<&'a ComponentInstance> {
        self.scene.component(handle).filter(|c| c.is_initialized())
    }

    /// Composite instance by handle
    pub fn composite_instance(&self, handle: CompositeHandle) -> Option<&'a CompositeInstance> {
        self.scene.composite(handle)
    }

    /// First initialized component of type `T` on a composite
    pub fn get<T: Component>(&self, composite: CompositeHandle) -> Option<&'a T> {
        self.scene
            .composite(composite)?
            .components()
            .iter()
            .filter_map(|h| self.component(*h))
            .find_map(|c| c.downcast_ref())
    }

    /// Process-wide services
    pub fn services(&self) -> &'a Services {
        self.services
    }

    /// Instantiate a child composite owned by this component. Children are
    /// built depth-first right after this component's init returns.
    pub fn spawn(&mut self, blueprint: CompositeBlueprint) {
        self.spawns.push(blueprint);
    }
}

/// View handed to [`Component::update`]
pub struct UpdateContext<'a> {
    pub(crate) handle: ComponentHandle,
    pub(crate) instance: &'a ComponentInstance,
    pub(crate) scene: &'a Scene,
    pub(crate) registry: &'a Registry,
    pub(crate) services: &'a Services,
    pub(crate) delta: Duration,
}

impl<'a> UpdateContext<'a> {
    /// Handle of the component being updated
    pub fn handle(&self) -> ComponentHandle {
        self.handle
    }

    /// Full instance identifier
    pub fn id(&self) -> &ObjectId {
        self.instance.id()
    }

    /// Time since the previous tick
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Time since the previous tick, in seconds
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Plain property by name
    pub fn property(&self, name: &str) -> Option<&'a Value> {
        self.instance.property(name)
    }

    /// Downcast the live resource behind a linked slot
    pub fn resource<T: Resource>(&self, slot: &str) -> Option<&'a T> {
        self.registry.resolve_as(&self.instance.link(slot)?)
    }

    /// Downcast the component behind a pointer slot
    pub fn pointer_as<T: Component>(&self, slot: &str) -> Option<&'a T> {
        downcast(self.scene, self.instance.pointer(slot)?)
    }

    /// First sibling of type `T`
    pub fn sibling<T: Component>(&self) -> Option<&'a T> {
        self.scene
            .composite(self.instance.composite())?
            .components()
            .iter()
            .filter(|h| **h != self.handle)
            .find_map(|h| downcast(self.scene, *h))
    }

    /// Read access to the scene
    pub fn scene(&self) -> &'a Scene {
        self.scene
    }

    /// Process-wide services
    pub fn services(&self) -> &'a Services {
        self.services
    }
}
