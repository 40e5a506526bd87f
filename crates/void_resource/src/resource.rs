//! Capability interface implemented by every concrete resource type

use void_core::{AsAny, FinishMode, InitError, ObjectId, Services, TypeFactory};

use crate::object::{Link, Object, ObjectHandle};
use crate::registry::Registry;
use crate::value::Value;

/// Behavior of a declared object.
///
/// A resource is constructed blank by the [`ResourceFactory`], then
/// initialized once its references are resolved. During a reload the new
/// version is initialized while the previous one is still live, and is told
/// through [`Resource::finish`] whether it replaced it or was thrown away.
pub trait Resource: AsAny + Send {
    /// Read properties and referenced objects; may reject the object
    fn init(&mut self, ctx: &InitContext<'_>) -> Result<(), InitError>;

    /// Called once the staged version has been committed or discarded
    fn finish(&mut self, _mode: FinishMode) {}
}

/// Constructor table for resource types
pub type ResourceFactory = TypeFactory<dyn Resource, Services>;

/// Read-only view handed to [`Resource::init`]
pub struct InitContext<'a> {
    pub(crate) handle: ObjectHandle,
    pub(crate) object: &'a Object,
    pub(crate) registry: &'a Registry,
    pub(crate) services: &'a Services,
}

impl<'a> InitContext<'a> {
    /// Arena handle of the object being initialized
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    /// Identifier of the object being initialized
    pub fn id(&self) -> &ObjectId {
        self.object.id()
    }

    /// Plain property by name
    pub fn property(&self, name: &str) -> Option<&'a Value> {
        self.object.property(name)
    }

    /// Plain property that must be present
    pub fn require(&self, name: &str) -> Result<&'a Value, InitError> {
        self.property(name)
            .ok_or_else(|| InitError::new(format!("missing property '{}'", name)))
    }

    /// Resolved aliasing view of a reference slot
    pub fn link(&self, slot: &str) -> Option<Link> {
        self.object.link(slot)
    }

    /// Resolved aliasing views of a list slot
    pub fn links(&self, slot: &str) -> Vec<Link> {
        self.object.links(slot)
    }

    /// The object behind a reference slot
    pub fn target(&self, slot: &str) -> Option<&'a Object> {
        let link = self.object.link(slot)?;
        self.registry.get(link.handle())
    }

    /// Downcast the resource behind a reference slot.
    ///
    /// Referenced objects are initialized first unless they form a cycle with
    /// this one; a self reference yields `None`.
    pub fn resource<T: Resource>(&self, slot: &str) -> Option<&'a T> {
        self.target(slot)?.downcast_ref()
    }

    /// The live version this object is about to replace, if any
    pub fn previous<T: Resource>(&self) -> Option<&'a T> {
        let handle = self.registry.lookup(self.object.id().as_str())?;
        if handle == self.handle {
            return None;
        }
        self.registry.get(handle)?.downcast_ref()
    }

    /// The registry, for lookups beyond this object's own references
    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    /// Process-wide services
    pub fn services(&self) -> &'a Services {
        self.services
    }
}
