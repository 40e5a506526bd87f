//! Staged loading of a descriptor batch
//!
//! A batch is staged next to the live objects, resolved, initialized in
//! reference order and then either committed as a whole or discarded as a
//! whole. Nothing in a batch becomes reachable by identifier before commit.

use std::collections::{BTreeMap, BTreeSet};

use void_core::{BatchResult, Error, ErrorReport, ObjectId, Services};

use crate::descriptor::ObjectDescriptor;
use crate::object::{Object, ObjectHandle, Reference};
use crate::registry::{Registry, ResourceScope};
use crate::resolver;
use crate::resource::{InitContext, ResourceFactory};
use crate::value::Property;

/// Whether a batch is the first version of its objects or a replacement
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageMode {
    /// Initial load; init failures report `InitFailed`
    Load,
    /// Reload; init failures report `StagedReplacementRejected`
    Reload,
}

/// What a commit changed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Objects that did not exist before
    pub added: Vec<ObjectId>,
    /// Objects whose previous version was replaced
    pub replaced: Vec<ObjectId>,
    /// Old versions retired, including owned objects
    pub retired: usize,
}

/// A batch of staged candidates
#[derive(Debug, Default)]
pub struct StagedObjects {
    handles: Vec<ObjectHandle>,
    index: BTreeMap<ObjectId, ObjectHandle>,
}

impl StagedObjects {
    /// Create a blank candidate for every descriptor.
    ///
    /// Identifier and type errors are collected for the whole batch; if there
    /// are any, nothing is added to the registry.
    pub fn stage(
        registry: &mut Registry,
        factory: &ResourceFactory,
        services: &Services,
        descriptors: &[ObjectDescriptor],
    ) -> BatchResult<Self> {
        let mut report = ErrorReport::new();
        let mut seen = BTreeSet::new();
        let mut blanks = Vec::with_capacity(descriptors.len());

        for desc in descriptors {
            if let Err(e) = desc.id.validate() {
                report.push(e);
                continue;
            }
            if !seen.insert(desc.id.clone()) {
                report.push(Error::DuplicateIdentifier(desc.id.to_string()));
                continue;
            }
            match factory.create(desc.id.as_str(), &desc.type_name, services) {
                Ok(resource) => blanks.push((desc, resource)),
                Err(e) => report.push(e),
            }
        }
        if !report.is_empty() {
            return Err(report);
        }

        let mut staged = Self::default();
        for (desc, resource) in blanks {
            let mut object = Object::new(desc.id.clone(), desc.type_name.clone(), resource);
            for (name, property) in &desc.properties {
                match property {
                    Property::Value(value) => {
                        object.properties.insert(name.clone(), value.clone());
                    }
                    _ => {
                        let refs = property
                            .targets()
                            .into_iter()
                            .map(|(kind, target)| Reference::Unresolved {
                                kind,
                                target: ObjectId::new(target),
                            })
                            .collect();
                        object.references.insert(name.clone(), refs);
                    }
                }
            }
            let handle = registry.insert_staged(object);
            staged.handles.push(handle);
            staged.index.insert(desc.id.clone(), handle);
        }
        log::debug!("Staged {} object(s)", staged.handles.len());
        Ok(staged)
    }

    /// Candidate handles in declaration order
    pub fn handles(&self) -> &[ObjectHandle] {
        &self.handles
    }

    /// Candidates by identifier
    pub fn index(&self) -> &BTreeMap<ObjectId, ObjectHandle> {
        &self.index
    }

    /// Whether the batch stages this identifier
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Number of candidates
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Lookup scope where candidates shadow the live versions they replace
    pub fn scope<'a>(&'a self, registry: &'a Registry) -> ResourceScope<'a> {
        ResourceScope::with_staged(registry, &self.index)
    }

    /// Wire every candidate's references
    pub fn resolve(&self, registry: &mut Registry) -> BatchResult<()> {
        resolver::resolve(registry, &self.handles)
    }

    /// Initialize candidates, referenced objects first.
    ///
    /// A failing candidate does not stop the pass; candidates that reference
    /// it are skipped since they would observe a half-built object.
    pub fn initialize(&self, registry: &mut Registry, services: &Services, mode: StageMode) -> BatchResult<()> {
        let mut report = ErrorReport::new();
        let mut failed: BTreeSet<ObjectHandle> = BTreeSet::new();

        for handle in init_order(registry, &self.handles) {
            let blocked = registry
                .get(handle)
                .map_or(false, |o| o.targets().any(|t| t != handle && failed.contains(&t)));
            if blocked {
                failed.insert(handle);
                continue;
            }

            let Some(mut resource) = registry.take_resource(handle) else {
                continue;
            };
            let result = match registry.get(handle) {
                Some(object) => {
                    let ctx = InitContext {
                        handle,
                        object,
                        registry: &*registry,
                        services,
                    };
                    resource.init(&ctx).map_err(|reason| (object.id().to_string(), reason))
                }
                None => Ok(()),
            };
            registry.put_resource(handle, resource);

            if let Err((object, reason)) = result {
                log::warn!("Object '{}' failed to initialize: {}", object, reason);
                failed.insert(handle);
                report.push(match mode {
                    StageMode::Load => Error::InitFailed {
                        object,
                        reason: reason.0,
                    },
                    StageMode::Reload => Error::StagedReplacementRejected {
                        object,
                        reason: reason.0,
                    },
                });
            }
        }
        report.check()
    }

    /// Promote every candidate and retire the versions they replace.
    ///
    /// Cannot fail: all fallible work happened during staging and
    /// initialization.
    pub fn commit(self, registry: &mut Registry) -> CommitSummary {
        let mut summary = CommitSummary::default();
        let mut previous = Vec::new();

        for &handle in &self.handles {
            let Some(id) = registry.get(handle).map(|o| o.id().clone()) else {
                continue;
            };
            match registry.promote(handle) {
                Some(old) => {
                    previous.push(old);
                    summary.replaced.push(id);
                }
                None => summary.added.push(id),
            }
        }
        for old in previous {
            summary.retired += registry.retire(old);
        }
        log::debug!(
            "Committed {} new and {} replaced object(s)",
            summary.added.len(),
            summary.replaced.len()
        );
        summary
    }

    /// Throw every candidate away; live objects are untouched
    pub fn discard(self, registry: &mut Registry) -> usize {
        let count = self.handles.iter().map(|h| registry.discard(*h)).sum::<usize>();
        log::debug!("Discarded {} staged object(s)", count);
        count
    }
}

/// Initialization order for a batch: every object after the batch members it
/// references. Reference cycles fall back to declaration order.
pub fn init_order(registry: &Registry, batch: &[ObjectHandle]) -> Vec<ObjectHandle> {
    let members: BTreeSet<ObjectHandle> = batch.iter().copied().collect();
    let mut visited = BTreeSet::new();
    let mut order = Vec::with_capacity(batch.len());

    fn visit(
        registry: &Registry,
        members: &BTreeSet<ObjectHandle>,
        handle: ObjectHandle,
        visited: &mut BTreeSet<ObjectHandle>,
        order: &mut Vec<ObjectHandle>,
    ) {
        if !visited.insert(handle) {
            return;
        }
        if let Some(object) = registry.get(handle) {
            for target in object.targets() {
                if members.contains(&target) {
                    visit(registry, members, target, visited, order);
                }
            }
        }
        order.push(handle);
    }

    for &handle in batch {
        visit(registry, &members, handle, &mut visited, &mut order);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use std::sync::{Arc, Mutex};
    use void_core::{InitError, TypeInfo};

    struct Logged {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Resource for Logged {
        fn init(&mut self, ctx: &InitContext<'_>) -> Result<(), InitError> {
            self.log.lock().unwrap().push(ctx.id().to_string());
            if ctx.property("fail").and_then(|v| v.as_bool()) == Some(true) {
                return Err("refused".into());
            }
            Ok(())
        }
    }

    fn factory(log: &Arc<Mutex<Vec<String>>>) -> ResourceFactory {
        let log = log.clone();
        let mut factory = ResourceFactory::new();
        factory.register(TypeInfo::new("Logged"), move |_: &Services| {
            Box::new(Logged { log: log.clone() })
        });
        factory
    }

    #[test]
    fn test_references_initialize_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        let services = Services::new();
        let staged = StagedObjects::stage(
            &mut registry,
            &factory(&log),
            &services,
            &[
                ObjectDescriptor::new("material", "Logged").link("shader", "shader"),
                ObjectDescriptor::new("shader", "Logged"),
                ObjectDescriptor::new("a", "Logged").link("b", "b"),
                ObjectDescriptor::new("b", "Logged").link("a", "a"),
            ],
        )
        .unwrap();
        staged.resolve(&mut registry).unwrap();
        staged.initialize(&mut registry, &services, StageMode::Load).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["shader", "material", "b", "a"]);
    }

    #[test]
    fn test_stage_rejects_bad_batch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        let report = StagedObjects::stage(
            &mut registry,
            &factory(&log),
            &Services::new(),
            &[
                ObjectDescriptor::new("a", "Logged"),
                ObjectDescriptor::new("a", "Logged"),
                ObjectDescriptor::new("b", "Missing"),
                ObjectDescriptor::new("", "Logged"),
            ],
        )
        .unwrap_err();

        assert_eq!(report.len(), 3);
        assert!(report.contains(|e| matches!(e, Error::DuplicateIdentifier(id) if id == "a")));
        assert!(report.contains(|e| matches!(e, Error::UnknownType { type_name, .. } if type_name == "Missing")));
        assert!(report.contains(|e| matches!(e, Error::InvalidIdentifier(_))));
        assert_eq!(registry.staged_len(), 0);
    }

    #[test]
    fn test_failed_init_skips_dependents() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        let services = Services::new();
        let staged = StagedObjects::stage(
            &mut registry,
            &factory(&log),
            &services,
            &[
                ObjectDescriptor::new("device", "Logged").with("fail", true),
                ObjectDescriptor::new("buffer", "Logged").link("device", "device"),
                ObjectDescriptor::new("other", "Logged").with("fail", true),
            ],
        )
        .unwrap();
        staged.resolve(&mut registry).unwrap();

        let report = staged
            .initialize(&mut registry, &services, StageMode::Reload)
            .unwrap_err();
        assert_eq!(report.len(), 2);
        assert!(report.contains(|e| matches!(
            e,
            Error::StagedReplacementRejected { object, reason } if object == "device" && reason == "refused"
        )));
        assert_eq!(*log.lock().unwrap(), vec!["device", "other"]);

        assert_eq!(staged.discard(&mut registry), 3);
        assert_eq!(registry.staged_len(), 0);
    }
}
