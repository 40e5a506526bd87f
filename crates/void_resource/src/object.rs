//! Live objects and their references

use core::fmt;
use std::collections::BTreeMap;

use void_core::{Handle, ObjectId};

use crate::resource::Resource;
use crate::value::{RefKind, Value};

/// Handle to an object slot in the registry arena
pub type ObjectHandle = Handle<Object>;

/// Aliasing reference: "this object uses that one".
///
/// A link never keeps its target alive. Once the target is retired, lookups
/// through the link fail cleanly instead of reaching a stale object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    target: ObjectHandle,
}

impl Link {
    pub(crate) fn new(target: ObjectHandle) -> Self {
        Self { target }
    }

    /// Arena handle of the target
    pub fn handle(&self) -> ObjectHandle {
        self.target
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({:?})", self.target)
    }
}

/// Owning reference: the holder controls the target's lifetime.
///
/// Not `Clone`; an object has at most one owner. Retiring or discarding the
/// owner takes the owned object with it.
#[derive(PartialEq, Eq, Hash)]
pub struct Embed {
    target: ObjectHandle,
}

impl Embed {
    pub(crate) fn new(target: ObjectHandle) -> Self {
        Self { target }
    }

    /// Arena handle of the owned object
    pub fn handle(&self) -> ObjectHandle {
        self.target
    }

    /// Borrow as a non-owning link
    pub fn as_link(&self) -> Link {
        Link::new(self.target)
    }
}

impl fmt::Debug for Embed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Embed({:?})", self.target)
    }
}

/// A reference slot, before or after resolution
#[derive(Debug, PartialEq, Eq)]
pub enum Reference {
    /// Holds only the target identifier
    Unresolved { kind: RefKind, target: ObjectId },
    /// Resolved aliasing relation
    Linked(Link),
    /// Resolved owning relation
    Embedded(Embed),
}

impl Reference {
    /// Whether the slot still holds a raw identifier
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Reference::Unresolved { .. })
    }

    /// Target handle once resolved
    pub fn handle(&self) -> Option<ObjectHandle> {
        match self {
            Reference::Unresolved { .. } => None,
            Reference::Linked(link) => Some(link.handle()),
            Reference::Embedded(embed) => Some(embed.handle()),
        }
    }

    /// Non-owning view of the target once resolved
    pub fn as_link(&self) -> Option<Link> {
        self.handle().map(Link::new)
    }
}

/// Where an object is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectState {
    /// Candidate built during load or reload; not reachable by identifier
    Staged,
    /// Committed and reachable by identifier
    Live,
    /// Replaced or removed; kept only until the next collection
    Retired,
}

/// A live, typed object owned by the registry
pub struct Object {
    pub(crate) id: ObjectId,
    pub(crate) type_name: String,
    pub(crate) properties: BTreeMap<String, Value>,
    pub(crate) references: BTreeMap<String, Vec<Reference>>,
    pub(crate) owner: Option<ObjectHandle>,
    pub(crate) state: ObjectState,
    pub(crate) resource: Option<Box<dyn Resource>>,
}

impl Object {
    pub(crate) fn new(id: ObjectId, type_name: impl Into<String>, resource: Box<dyn Resource>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            properties: BTreeMap::new(),
            references: BTreeMap::new(),
            owner: None,
            state: ObjectState::Staged,
            resource: Some(resource),
        }
    }

    /// Object identifier
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Registered type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Lifecycle state
    pub fn state(&self) -> ObjectState {
        self.state
    }

    /// Whether reachable through identifier lookups
    pub fn is_live(&self) -> bool {
        self.state == ObjectState::Live
    }

    /// Object embedding this one, if any
    pub fn owner(&self) -> Option<ObjectHandle> {
        self.owner
    }

    /// Plain property by name
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// All plain properties
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Reference slots by name
    pub fn references(&self) -> &BTreeMap<String, Vec<Reference>> {
        &self.references
    }

    /// First reference in a slot
    pub fn reference(&self, slot: &str) -> Option<&Reference> {
        self.references.get(slot).and_then(|r| r.first())
    }

    /// Resolved aliasing view of a slot
    pub fn link(&self, slot: &str) -> Option<Link> {
        self.reference(slot).and_then(Reference::as_link)
    }

    /// Resolved aliasing views of every entry in a list slot
    pub fn links(&self, slot: &str) -> Vec<Link> {
        self.references
            .get(slot)
            .map(|refs| refs.iter().filter_map(Reference::as_link).collect())
            .unwrap_or_default()
    }

    /// Handles of every resolved target, owned or not
    pub fn targets(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.references.values().flatten().filter_map(Reference::handle)
    }

    /// Handles of owned objects
    pub fn embedded(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.references.values().flatten().filter_map(|r| match r {
            Reference::Embedded(embed) => Some(embed.handle()),
            _ => None,
        })
    }

    /// Whether every reference slot is resolved
    pub fn is_resolved(&self) -> bool {
        self.references.values().flatten().all(Reference::is_resolved)
    }

    /// Behavior object; `None` only while it is being initialized
    pub fn resource(&self) -> Option<&dyn Resource> {
        self.resource.as_deref()
    }

    /// Mutable behavior object
    pub fn resource_mut(&mut self) -> Option<&mut (dyn Resource + 'static)> {
        self.resource.as_deref_mut()
    }

    /// Downcast the behavior object
    pub fn downcast_ref<T: Resource>(&self) -> Option<&T> {
        self.resource.as_deref()?.as_any().downcast_ref()
    }

    /// Downcast the behavior object mutably
    pub fn downcast_mut<T: Resource>(&mut self) -> Option<&mut T> {
        self.resource.as_deref_mut()?.as_any_mut().downcast_mut()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("state", &self.state)
            .field("references", &self.references)
            .finish()
    }
}
