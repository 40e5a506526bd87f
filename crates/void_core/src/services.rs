//! Explicit service context
//!
//! Process-wide services (a device, a clock, an audio host) are registered
//! once and then handed to every init and update call through their context,
//! instead of being fetched from a global.

use core::any::{Any, TypeId};
use core::fmt;
use std::collections::BTreeMap;

/// Type-keyed bag of shared services
#[derive(Default)]
pub struct Services {
    entries: BTreeMap<TypeId, (&'static str, Box<dyn Any + Send + Sync>)>,
}

impl Services {
    /// Create an empty service bag
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register a service, replacing any previous one of the same type
    pub fn insert<S: Any + Send + Sync>(&mut self, service: S) -> &mut Self {
        self.entries.insert(
            TypeId::of::<S>(),
            (core::any::type_name::<S>(), Box::new(service)),
        );
        self
    }

    /// Look up a service
    pub fn get<S: Any + Send + Sync>(&self) -> Option<&S> {
        self.entries.get(&TypeId::of::<S>())?.1.downcast_ref()
    }

    /// Look up a service mutably
    pub fn get_mut<S: Any + Send + Sync>(&mut self) -> Option<&mut S> {
        self.entries.get_mut(&TypeId::of::<S>())?.1.downcast_mut()
    }

    /// Check whether a service of type `S` is registered
    pub fn contains<S: Any + Send + Sync>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<S>())
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.values().map(|(name, _)| name))
            .finish()
    }
}
