//! Object registry: the single owner of every object
//!
//! Objects live in a generational arena. Only committed objects are indexed by
//! identifier; staged candidates sit in the arena unindexed until they are
//! promoted, and retired objects leave the index immediately but stay in the
//! arena until [`Registry::collect_retired`] runs. Handles to collected slots
//! fail cleanly.

use std::collections::{BTreeMap, BTreeSet};

use void_core::{unique_id, FinishMode, HandleMap, ObjectId};

use crate::object::{Link, Object, ObjectHandle, ObjectState};
use crate::resource::Resource;

/// Owner of all objects
#[derive(Debug, Default)]
pub struct Registry {
    objects: HandleMap<Object>,
    index: BTreeMap<ObjectId, ObjectHandle>,
    retired: Vec<ObjectHandle>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if no object is live
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Check whether an identifier names a live object
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Handle of the live object with this identifier
    pub fn lookup(&self, id: &str) -> Option<ObjectHandle> {
        self.index.get(id).copied()
    }

    /// Live object by identifier
    pub fn find(&self, id: &str) -> Option<&Object> {
        self.objects.get(self.lookup(id)?)
    }

    /// Live resource by identifier, downcast
    pub fn resource<T: Resource>(&self, id: &str) -> Option<&T> {
        self.find(id)?.downcast_ref()
    }

    /// Object in any state by handle.
    ///
    /// Retired objects stay reachable here until collected, so work already
    /// holding a handle can finish with the old version.
    pub fn get(&self, handle: ObjectHandle) -> Option<&Object> {
        self.objects.get(handle)
    }

    /// Mutable object in any state by handle
    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut Object> {
        self.objects.get_mut(handle)
    }

    /// Follow an aliasing reference; fails once the target is retired
    pub fn resolve(&self, link: &Link) -> Option<&Object> {
        self.objects.get(link.handle()).filter(|o| o.is_live())
    }

    /// Follow an aliasing reference and downcast the target
    pub fn resolve_as<T: Resource>(&self, link: &Link) -> Option<&T> {
        self.resolve(link)?.downcast_ref()
    }

    /// Live objects in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &Object)> {
        self.index
            .iter()
            .filter_map(|(id, handle)| self.objects.get(*handle).map(|o| (id, o)))
    }

    /// Identifiers of live objects in order
    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.index.keys()
    }

    /// Number of staged candidates
    pub fn staged_len(&self) -> usize {
        self.objects
            .iter()
            .filter(|(_, o)| o.state == ObjectState::Staged)
            .count()
    }

    /// Number of retired objects awaiting collection
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Handles of retired objects awaiting collection
    pub fn retired(&self) -> &[ObjectHandle] {
        &self.retired
    }

    /// First free identifier of the form `resource::<type>`, `resource::<type>_1`, ...
    pub fn unique_id(&self, type_name: &str) -> ObjectId {
        unique_id(&format!("resource::{}", type_name), |candidate| {
            self.index.contains_key(candidate)
        })
    }

    /// Live objects that reference any of `roots`, directly or transitively.
    ///
    /// The roots themselves are not part of the result.
    pub fn dependents(&self, roots: &BTreeSet<ObjectId>) -> BTreeSet<ObjectId> {
        let mut reached: BTreeSet<ObjectHandle> =
            roots.iter().filter_map(|id| self.lookup(id.as_str())).collect();
        let mut result = BTreeSet::new();

        loop {
            let before = result.len();
            for (id, object) in self.iter() {
                if roots.contains(id) || result.contains(id) {
                    continue;
                }
                if object.targets().any(|t| reached.contains(&t)) {
                    if let Some(handle) = self.lookup(id.as_str()) {
                        reached.insert(handle);
                    }
                    result.insert(id.clone());
                }
            }
            if result.len() == before {
                return result;
            }
        }
    }

    /// Add an object as a staged candidate
    pub(crate) fn insert_staged(&mut self, mut object: Object) -> ObjectHandle {
        object.state = ObjectState::Staged;
        self.objects.insert(object)
    }

    pub(crate) fn take_resource(&mut self, handle: ObjectHandle) -> Option<Box<dyn Resource>> {
        self.objects.get_mut(handle)?.resource.take()
    }

    pub(crate) fn put_resource(&mut self, handle: ObjectHandle, resource: Box<dyn Resource>) {
        if let Some(object) = self.objects.get_mut(handle) {
            object.resource = Some(resource);
        }
    }

    /// Make a staged candidate live under its identifier.
    ///
    /// Returns the handle of the version it replaced, which is left live in
    /// the arena; the caller retires it.
    pub fn promote(&mut self, handle: ObjectHandle) -> Option<ObjectHandle> {
        let object = self.objects.get_mut(handle)?;
        if object.state != ObjectState::Staged {
            return None;
        }
        object.state = ObjectState::Live;
        if let Some(resource) = object.resource.as_deref_mut() {
            resource.finish(FinishMode::Commit);
        }
        let previous = self.index.insert(object.id.clone(), handle);
        previous.filter(|p| *p != handle)
    }

    /// Throw away a staged candidate and every staged object it embeds
    pub fn discard(&mut self, handle: ObjectHandle) -> usize {
        let mut pending = vec![handle];
        let mut count = 0;
        while let Some(h) = pending.pop() {
            let staged = self
                .objects
                .get(h)
                .map_or(false, |o| o.state == ObjectState::Staged);
            if !staged {
                continue;
            }
            if let Some(mut object) = self.objects.remove(h) {
                if let Some(resource) = object.resource.as_deref_mut() {
                    resource.finish(FinishMode::Rollback);
                }
                pending.extend(object.embedded().filter(|t| *t != h));
                count += 1;
            }
        }
        count
    }

    /// Remove a live object from identifier lookups and queue it for
    /// destruction. Objects it embeds are retired with it.
    ///
    /// Returns how many objects were retired.
    pub fn retire(&mut self, handle: ObjectHandle) -> usize {
        let mut pending = vec![handle];
        let mut count = 0;
        while let Some(h) = pending.pop() {
            let Some(object) = self.objects.get_mut(h) else {
                continue;
            };
            if object.state != ObjectState::Live {
                continue;
            }
            if self.index.get(&object.id) == Some(&h) {
                self.index.remove(&object.id);
            }
            object.state = ObjectState::Retired;
            pending.extend(object.embedded().filter(|t| *t != h));
            self.retired.push(h);
            count += 1;
        }
        if count > 0 {
            log::debug!("Retired {} object(s), {} awaiting collection", count, self.retired.len());
        }
        count
    }

    /// Retire the live object with this identifier
    pub fn retire_id(&mut self, id: &str) -> usize {
        match self.lookup(id) {
            Some(handle) => self.retire(handle),
            None => 0,
        }
    }

    /// Destroy every retired object. Calling it again with nothing retired
    /// since is a no-op.
    pub fn collect_retired(&mut self) -> usize {
        let mut count = 0;
        for handle in self.retired.drain(..) {
            if self.objects.remove(handle).is_some() {
                count += 1;
            }
        }
        if count > 0 {
            log::debug!("Collected {} retired object(s)", count);
        }
        count
    }

    /// Lookup scope covering only live objects
    pub fn scope(&self) -> ResourceScope<'_> {
        ResourceScope {
            registry: self,
            staged: None,
        }
    }
}

/// Identifier lookup over live objects, optionally shadowed by a staged batch.
///
/// While a reload is being validated, references into the reloaded subset
/// must reach the candidates rather than the versions they replace.
#[derive(Clone, Copy, Debug)]
pub struct ResourceScope<'a> {
    registry: &'a Registry,
    staged: Option<&'a BTreeMap<ObjectId, ObjectHandle>>,
}

impl<'a> ResourceScope<'a> {
    /// Scope where `staged` shadows live objects with the same identifier
    pub fn with_staged(registry: &'a Registry, staged: &'a BTreeMap<ObjectId, ObjectHandle>) -> Self {
        Self {
            registry,
            staged: Some(staged),
        }
    }

    /// Resolve an identifier, staged candidates first
    pub fn lookup(&self, id: &str) -> Option<ObjectHandle> {
        self.staged
            .and_then(|staged| staged.get(id).copied())
            .or_else(|| self.registry.lookup(id))
    }

    /// Aliasing reference to whatever the identifier resolves to
    pub fn link(&self, id: &str) -> Option<Link> {
        self.lookup(id).map(Link::new)
    }

    /// Whether the identifier names a staged candidate
    pub fn is_staged(&self, id: &str) -> bool {
        self.staged.map_or(false, |staged| staged.contains_key(id))
    }

    /// Underlying registry
    pub fn registry(&self) -> &'a Registry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use void_core::InitError;

    use crate::resource::InitContext;

    struct Tracked {
        commits: Arc<AtomicUsize>,
        rollbacks: Arc<AtomicUsize>,
    }

    impl Resource for Tracked {
        fn init(&mut self, _ctx: &InitContext<'_>) -> Result<(), InitError> {
            Ok(())
        }

        fn finish(&mut self, mode: FinishMode) {
            match mode {
                FinishMode::Commit => self.commits.fetch_add(1, Ordering::SeqCst),
                FinishMode::Rollback => self.rollbacks.fetch_add(1, Ordering::SeqCst),
            };
        }
    }

    fn tracked(id: &str, commits: &Arc<AtomicUsize>, rollbacks: &Arc<AtomicUsize>) -> Object {
        Object::new(
            id.into(),
            "Tracked",
            Box::new(Tracked {
                commits: commits.clone(),
                rollbacks: rollbacks.clone(),
            }),
        )
    }

    #[test]
    fn test_staged_objects_are_not_indexed() {
        let (c, r) = (Arc::default(), Arc::default());
        let mut registry = Registry::new();
        let handle = registry.insert_staged(tracked("a", &c, &r));

        assert!(registry.lookup("a").is_none());
        assert_eq!(registry.staged_len(), 1);

        assert_eq!(registry.promote(handle), None);
        assert_eq!(registry.lookup("a"), Some(handle));
        assert_eq!(c.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_replace_then_collect() {
        let (c, r) = (Arc::default(), Arc::default());
        let mut registry = Registry::new();
        let old = registry.insert_staged(tracked("a", &c, &r));
        registry.promote(old);

        let new = registry.insert_staged(tracked("a", &c, &r));
        let replaced = registry.promote(new);
        assert_eq!(replaced, Some(old));
        assert_eq!(registry.retire(old), 1);

        // Retired objects leave lookups but stay reachable by handle.
        assert_eq!(registry.lookup("a"), Some(new));
        assert!(registry.get(old).is_some());
        assert!(registry.resolve(&Link::new(old)).is_none());

        assert_eq!(registry.collect_retired(), 1);
        assert_eq!(registry.collect_retired(), 0);
        assert!(registry.get(old).is_none());
    }

    #[test]
    fn test_discard_calls_rollback() {
        let (c, r) = (Arc::default(), Arc::default());
        let mut registry = Registry::new();
        let handle = registry.insert_staged(tracked("a", &c, &r));

        assert_eq!(registry.discard(handle), 1);
        assert_eq!(r.load(Ordering::SeqCst), 1);
        assert!(registry.get(handle).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unique_runtime_ids() {
        let (c, r) = (Arc::default(), Arc::default());
        let mut registry = Registry::new();
        assert_eq!(registry.unique_id("Mesh"), "resource::Mesh");

        let h = registry.insert_staged(tracked("resource::Mesh", &c, &r));
        registry.promote(h);
        assert_eq!(registry.unique_id("Mesh"), "resource::Mesh_1");
    }
}
