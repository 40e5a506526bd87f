//! Pointer resolution: rewrite identifier slots into direct relations
//!
//! Resolution only answers "does the named target exist". Every failure in a
//! batch is collected before returning, and nothing is rewritten unless the
//! whole batch resolves.

use std::collections::BTreeMap;

use void_core::{BatchResult, Error, ErrorReport, ObjectId};

use crate::object::{Embed, Link, ObjectHandle, Reference};
use crate::registry::{Registry, ResourceScope};
use crate::value::RefKind;

struct Rewrite {
    object: ObjectHandle,
    slot: String,
    index: usize,
    reference: Reference,
}

fn slot_label(slot: &str, index: usize, count: usize) -> String {
    if count > 1 {
        format!("{}[{}]", slot, index)
    } else {
        slot.to_string()
    }
}

/// Resolve every unresolved reference held by the objects in `batch`.
///
/// Targets are looked up among the batch first and then among live objects.
/// Owning references must point into the batch and each target may have only
/// one owner; an object embedding itself records no ownership.
pub fn resolve(registry: &mut Registry, batch: &[ObjectHandle]) -> BatchResult<()> {
    let staged: BTreeMap<ObjectId, ObjectHandle> = batch
        .iter()
        .filter_map(|h| registry.get(*h).map(|o| (o.id().clone(), *h)))
        .collect();
    let scope = ResourceScope::with_staged(registry, &staged);

    let mut report = ErrorReport::new();
    let mut rewrites = Vec::new();
    let mut owners: BTreeMap<ObjectHandle, ObjectHandle> = BTreeMap::new();

    for &handle in batch {
        let Some(object) = registry.get(handle) else {
            continue;
        };
        for (slot, refs) in object.references() {
            for (index, reference) in refs.iter().enumerate() {
                let Reference::Unresolved { kind, target } = reference else {
                    continue;
                };
                let label = || slot_label(slot, index, refs.len());

                let resolved = match kind {
                    RefKind::Link => match scope.lookup(target.as_str()) {
                        Some(t) => Reference::Linked(Link::new(t)),
                        None => {
                            report.push(Error::UnresolvedReference {
                                object: object.id().to_string(),
                                slot: label(),
                                target: target.to_string(),
                            });
                            continue;
                        }
                    },
                    RefKind::Embed => {
                        if !scope.is_staged(target.as_str()) {
                            let error = if registry.contains(target.as_str()) {
                                Error::ForeignEmbed {
                                    object: object.id().to_string(),
                                    slot: label(),
                                    target: target.to_string(),
                                }
                            } else {
                                Error::UnresolvedReference {
                                    object: object.id().to_string(),
                                    slot: label(),
                                    target: target.to_string(),
                                }
                            };
                            report.push(error);
                            continue;
                        }
                        let Some(t) = scope.lookup(target.as_str()) else {
                            continue;
                        };
                        if t != handle {
                            if let Some(first) = owners.insert(t, handle) {
                                if first != handle {
                                    let first_id = registry
                                        .get(first)
                                        .map(|o| o.id().to_string())
                                        .unwrap_or_default();
                                    report.push(Error::OwnershipConflict {
                                        target: target.to_string(),
                                        first: first_id,
                                        second: object.id().to_string(),
                                    });
                                }
                            }
                        }
                        Reference::Embedded(Embed::new(t))
                    }
                };

                rewrites.push(Rewrite {
                    object: handle,
                    slot: slot.clone(),
                    index,
                    reference: resolved,
                });
            }
        }
    }

    if !report.is_empty() {
        log::debug!("Reference resolution failed with {} error(s)", report.len());
        return Err(report);
    }

    for rewrite in rewrites {
        if let Some(object) = registry.get_mut(rewrite.object) {
            if let Some(slot) = object
                .references
                .get_mut(&rewrite.slot)
                .and_then(|refs| refs.get_mut(rewrite.index))
            {
                *slot = rewrite.reference;
            }
        }
    }
    for (target, owner) in owners {
        if let Some(object) = registry.get_mut(target) {
            object.owner = Some(owner);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ObjectDescriptor;
    use crate::loader::StagedObjects;
    use crate::resource::{InitContext, Resource, ResourceFactory};
    use void_core::{InitError, Services, TypeInfo};

    struct Blob;

    impl Resource for Blob {
        fn init(&mut self, _ctx: &InitContext<'_>) -> Result<(), InitError> {
            Ok(())
        }
    }

    fn factory() -> ResourceFactory {
        let mut factory = ResourceFactory::new();
        factory.register(TypeInfo::new("Blob"), |_: &Services| Box::new(Blob));
        factory
    }

    fn stage(registry: &mut Registry, descs: &[ObjectDescriptor]) -> StagedObjects {
        StagedObjects::stage(registry, &factory(), &Services::new(), descs).unwrap()
    }

    #[test]
    fn test_all_broken_references_reported() {
        let mut registry = Registry::new();
        let staged = stage(
            &mut registry,
            &[
                ObjectDescriptor::new("a", "Blob").link("x", "nope"),
                ObjectDescriptor::new("b", "Blob").links("ys", ["a", "gone"]),
            ],
        );

        let report = resolve(&mut registry, staged.handles()).unwrap_err();
        assert_eq!(report.len(), 2);
        assert!(report.contains(|e| matches!(
            e,
            Error::UnresolvedReference { object, slot, target } if object == "b" && slot == "ys[1]" && target == "gone"
        )));

        // Nothing was rewritten.
        let a = registry.get(staged.handles()[0]).unwrap();
        assert!(!a.is_resolved());
    }

    #[test]
    fn test_shared_target_and_self_reference() {
        let mut registry = Registry::new();
        let staged = stage(
            &mut registry,
            &[
                ObjectDescriptor::new("shared", "Blob").link("me", "shared"),
                ObjectDescriptor::new("a", "Blob").link("s", "shared"),
                ObjectDescriptor::new("b", "Blob").link("s", "shared"),
            ],
        );
        resolve(&mut registry, staged.handles()).unwrap();

        let shared = staged.handles()[0];
        let a = registry.get(staged.handles()[1]).unwrap().link("s").unwrap();
        let b = registry.get(staged.handles()[2]).unwrap().link("s").unwrap();
        assert_eq!(a.handle(), shared);
        assert_eq!(b.handle(), shared);
        assert_eq!(registry.get(shared).unwrap().link("me").unwrap().handle(), shared);
    }

    #[test]
    fn test_embed_rules() {
        let mut registry = Registry::new();
        let staged = stage(
            &mut registry,
            &[
                ObjectDescriptor::new("params", "Blob"),
                ObjectDescriptor::new("m1", "Blob").embed("p", "params"),
                ObjectDescriptor::new("m2", "Blob").embed("p", "params"),
            ],
        );
        let report = resolve(&mut registry, staged.handles()).unwrap_err();
        assert!(report.contains(|e| matches!(
            e,
            Error::OwnershipConflict { target, first, second } if target == "params" && first == "m1" && second == "m2"
        )));
    }

    #[test]
    fn test_embed_must_stay_in_batch() {
        let mut registry = Registry::new();
        let first = stage(&mut registry, &[ObjectDescriptor::new("params", "Blob")]);
        first.commit(&mut registry);

        let second = stage(&mut registry, &[ObjectDescriptor::new("m", "Blob").embed("p", "params")]);
        let report = resolve(&mut registry, second.handles()).unwrap_err();
        assert!(report.contains(|e| matches!(e, Error::ForeignEmbed { .. })));
    }
}
