//! # void_scene - Composite instances and their ordering
//!
//! Turns blueprints into live composite trees:
//! - **Blueprints**: declarative composites with components and children
//! - **Sorter**: stable, type-level dependency ordering with cycle reports
//! - **Instantiator**: all-or-nothing construction with staged init
//! - **Scene**: arenas owning every composite and component instance
//! - **Scheduler**: per-tick updates in construction order
//!
//! ## Example
//!
//! ```ignore
//! use void_scene::prelude::*;
//!
//! let root = Instantiator::new(&mut scene, registry.scope(), &components, &services)
//!     .instantiate(&blueprint, blueprint.id.clone())?;
//! scene.activate(root, blueprint);
//! tick(&mut scene, &registry, &services, Duration::from_millis(16));
//! ```

pub mod blueprint;
pub mod component;
pub mod instantiate;
pub mod path;
pub mod scene;
pub mod schedule;
pub mod sort;

pub use blueprint::{ComponentDescriptor, CompositeBlueprint};
pub use component::{Component, ComponentContext, ComponentFactory, UpdateContext};
pub use instantiate::Instantiator;
pub use path::{ComponentPath, Step};
pub use scene::{
    ComponentHandle, ComponentInstance, CompositeHandle, CompositeInstance, InstanceState, Scene,
};
pub use schedule::tick;
pub use sort::{order, SortItem};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::blueprint::{ComponentDescriptor, CompositeBlueprint};
    pub use crate::component::{Component, ComponentContext, ComponentFactory, UpdateContext};
    pub use crate::instantiate::Instantiator;
    pub use crate::scene::{ComponentHandle, CompositeHandle, Scene};
    pub use crate::schedule::tick;
}
