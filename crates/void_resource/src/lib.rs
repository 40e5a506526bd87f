//! # void_resource - Declared objects and their registry
//!
//! Everything a descriptor batch turns into before composites are built:
//! - **Descriptors**: parsed declarations with plain values and references
//! - **Objects**: live instances with owning ([`Embed`]) and aliasing
//!   ([`Link`]) relations
//! - **Registry**: sole owner of every object, with staging and deferred
//!   destruction
//! - **Resolver**: rewrites identifier slots into relations
//! - **Loader**: stages, initializes and commits or discards a batch
//!
//! ## Example
//!
//! ```ignore
//! use void_resource::prelude::*;
//!
//! let staged = StagedObjects::stage(&mut registry, &factory, &services, &descriptors)?;
//! staged.resolve(&mut registry)?;
//! staged.initialize(&mut registry, &services, StageMode::Load)?;
//! staged.commit(&mut registry);
//! ```

pub mod descriptor;
pub mod loader;
pub mod object;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod value;

pub use descriptor::ObjectDescriptor;
pub use loader::{init_order, CommitSummary, StageMode, StagedObjects};
pub use object::{Embed, Link, Object, ObjectHandle, ObjectState, Reference};
pub use registry::{Registry, ResourceScope};
pub use resolver::resolve;
pub use resource::{InitContext, Resource, ResourceFactory};
pub use value::{Property, RefKind, Value};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::descriptor::ObjectDescriptor;
    pub use crate::loader::{StageMode, StagedObjects};
    pub use crate::object::{Link, ObjectHandle};
    pub use crate::registry::Registry;
    pub use crate::resource::{InitContext, Resource, ResourceFactory};
    pub use crate::value::{Property, Value};
}
