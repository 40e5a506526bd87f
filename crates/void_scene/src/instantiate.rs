//! Instantiation engine
//!
//! Builds a composite tree from a blueprint in four steps per composite:
//! create blank components, sort them, initialize them in order (each one may
//! spawn child composites, built depth-first before the next component runs),
//! then build the blueprint's own children. The tree stays staged; the first
//! failure discards everything built so far.

use std::collections::BTreeMap;

use void_core::{BatchResult, Error, ErrorReport, ObjectId, Services};
use void_resource::{ResourceScope, StageMode};

use crate::blueprint::CompositeBlueprint;
use crate::component::{ComponentContext, ComponentFactory};
use crate::path::ComponentPath;
use crate::scene::{ComponentHandle, ComponentInstance, CompositeHandle, CompositeInstance, Scene};
use crate::sort::{self, SortItem};

/// Builds staged composite trees into a [`Scene`]
pub struct Instantiator<'a> {
    scene: &'a mut Scene,
    resources: ResourceScope<'a>,
    factory: &'a ComponentFactory,
    services: &'a Services,
    mode: StageMode,
    staged_roots: Option<&'a BTreeMap<ObjectId, CompositeHandle>>,
}

impl<'a> Instantiator<'a> {
    /// Create an instantiator. Resource links resolve through `resources`,
    /// so a reload can point new composites at staged candidates.
    pub fn new(
        scene: &'a mut Scene,
        resources: ResourceScope<'a>,
        factory: &'a ComponentFactory,
        services: &'a Services,
    ) -> Self {
        Self {
            scene,
            resources,
            factory,
            services,
            mode: StageMode::Load,
            staged_roots: None,
        }
    }

    /// Report init failures as rejected replacements instead
    pub fn with_mode(mut self, mode: StageMode) -> Self {
        self.mode = mode;
        self
    }

    /// Resolve absolute pointers against these staged roots before the
    /// live ones
    pub fn with_staged_roots(mut self, roots: &'a BTreeMap<ObjectId, CompositeHandle>) -> Self {
        self.staged_roots = Some(roots);
        self
    }

    /// Report what can be checked without running any component: unknown
    /// component types and resource links that resolve to nothing, over the
    /// declared tree of `blueprint` rooted at `id`.
    pub fn check(&self, blueprint: &CompositeBlueprint, id: &ObjectId) -> ErrorReport {
        let mut report = blueprint.validate();
        if !report.is_empty() {
            return report;
        }
        let mut pending = vec![(blueprint, id.clone())];
        while let Some((blueprint, id)) = pending.pop() {
            for desc in &blueprint.components {
                let instance_id = format!("{}/{}", id, desc.id);
                if self.factory.info(&desc.type_name).is_none() {
                    report.push(Error::UnknownType {
                        object: instance_id.clone(),
                        type_name: desc.type_name.clone(),
                    });
                }
                for (slot, target) in &desc.links {
                    if self.resources.lookup(target.as_str()).is_none() {
                        report.push(Error::UnresolvedReference {
                            object: instance_id.clone(),
                            slot: slot.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
            for (i, child) in blueprint.children.iter().enumerate() {
                let earlier = blueprint.children[..i].iter().filter(|c| c.id == child.id).count();
                let child_id = match earlier {
                    0 => format!("{}/{}", id, child.id),
                    n => format!("{}/{}:{}", id, child.id, n),
                };
                pending.push((child, ObjectId::new(child_id)));
            }
        }
        report
    }

    /// Build a staged tree with root identifier `id`.
    ///
    /// On success the tree is complete but not live; hand it to
    /// [`Scene::activate`] or [`Scene::replace`]. On failure the scene is
    /// left as it was.
    pub fn instantiate(&mut self, blueprint: &CompositeBlueprint, id: ObjectId) -> BatchResult<CompositeHandle> {
        blueprint.validate().check()?;

        let mut created = Vec::new();
        match self.build(blueprint, id.clone(), None, None, None, &mut created) {
            Ok(root) => {
                log::debug!("Instantiated '{}' ({} composite(s))", id, created.len());
                Ok(root)
            }
            Err(report) => {
                for handle in created.into_iter().rev() {
                    self.scene.remove_composite(handle);
                }
                log::warn!("Instantiation of '{}' failed: {}", id, report);
                Err(report)
            }
        }
    }

    fn child_id(&self, parent: CompositeHandle, name: &ObjectId) -> ObjectId {
        let Some(composite) = self.scene.composite(parent) else {
            return name.clone();
        };
        let base = format!("{}/{}", composite.id(), name);
        let duplicates = composite
            .children()
            .iter()
            .filter(|c| self.scene.composite(**c).map_or(false, |c| c.name() == name))
            .count();
        if duplicates == 0 {
            ObjectId::new(base)
        } else {
            ObjectId::new(format!("{}:{}", base, duplicates))
        }
    }

    fn build(
        &mut self,
        blueprint: &CompositeBlueprint,
        id: ObjectId,
        parent: Option<CompositeHandle>,
        spawned_by: Option<ComponentHandle>,
        root: Option<CompositeHandle>,
        created: &mut Vec<CompositeHandle>,
    ) -> BatchResult<CompositeHandle> {
        let handle = self.scene.insert_composite(CompositeInstance::new(
            id.clone(),
            blueprint.id.clone(),
            parent,
            spawned_by,
        ));
        created.push(handle);
        let root = root.unwrap_or(handle);

        // 1. Blank components with their resource links
        let mut report = ErrorReport::new();
        let mut blanks = Vec::with_capacity(blueprint.components.len());
        for desc in &blueprint.components {
            let instance_id = ObjectId::new(format!("{}/{}", id, desc.id));
            let behavior = match self.factory.create(instance_id.as_str(), &desc.type_name, self.services) {
                Ok(behavior) => behavior,
                Err(e) => {
                    report.push(e);
                    continue;
                }
            };
            let mut links = BTreeMap::new();
            for (slot, target) in &desc.links {
                match self.resources.link(target.as_str()) {
                    Some(link) => {
                        links.insert(slot.clone(), (target.clone(), link));
                    }
                    None => report.push(Error::UnresolvedReference {
                        object: instance_id.to_string(),
                        slot: slot.clone(),
                        target: target.to_string(),
                    }),
                }
            }
            let dependencies = self
                .factory
                .info(&desc.type_name)
                .map(|info| info.dependencies.clone())
                .unwrap_or_default();
            blanks.push(ComponentInstance {
                id: instance_id,
                name: desc.id.clone(),
                type_name: desc.type_name.clone(),
                composite: handle,
                properties: desc.properties.clone(),
                links,
                pointers: Default::default(),
                dependencies,
                spawned: Vec::new(),
                initialized: false,
                component: Some(behavior),
            });
        }
        report.check()?;
        let components: Vec<ComponentHandle> = blanks
            .into_iter()
            .map(|c| self.scene.insert_component(c))
            .collect();

        // 2. Initialization order
        let order = {
            let instances: Vec<&ComponentInstance> =
                components.iter().filter_map(|c| self.scene.component(*c)).collect();
            let items: Vec<SortItem<'_>> = instances
                .iter()
                .map(|c| SortItem {
                    id: c.id().as_str(),
                    type_name: c.type_name(),
                    dependencies: c.dependencies(),
                })
                .collect();
            sort::order(&items)?
        };
        if let Some(composite) = self.scene.composite_mut(handle) {
            composite.order = order.clone();
        }

        // 3. Staged initialization, spawning children depth-first
        for index in order {
            let component = components[index];
            let desc = &blueprint.components[index];

            let empty = BTreeMap::new();
            let staged_roots = self.staged_roots.unwrap_or(&empty);
            for (slot, path) in &desc.pointers {
                let target = ComponentPath::parse(path)
                    .and_then(|p| p.resolve(&*self.scene, handle, root, staged_roots))
                    .map_err(|reason| Error::ComponentPath {
                        component: format!("{}/{}", id, desc.id),
                        path: path.clone(),
                        reason,
                    })?;
                if let Some(instance) = self.scene.component_mut(component) {
                    instance.pointers.insert(slot.clone(), target);
                }
            }

            let spawns = self.init_component(component)?;

            for child in spawns {
                child.validate().check()?;
                let child_id = self.child_id(handle, &child.id);
                let spawned = self.build(&child, child_id, Some(handle), Some(component), Some(root), created)?;
                if let Some(instance) = self.scene.component_mut(component) {
                    instance.spawned.push(spawned);
                }
            }
        }

        // 4. Blueprint children
        for child in &blueprint.children {
            let child_id = self.child_id(handle, &child.id);
            self.build(child, child_id, Some(handle), None, Some(root), created)?;
        }

        Ok(handle)
    }

    /// Run one component's init; returns the blueprints it asked to spawn
    fn init_component(&mut self, handle: ComponentHandle) -> BatchResult<Vec<CompositeBlueprint>> {
        let Some(mut behavior) = self.scene.take_behavior(handle) else {
            return Ok(Vec::new());
        };

        let result = match self.scene.component(handle) {
            Some(instance) => {
                let mut ctx = ComponentContext {
                    handle,
                    instance,
                    scene: &*self.scene,
                    resources: self.resources,
                    services: self.services,
                    spawns: Vec::new(),
                };
                behavior
                    .init(&mut ctx)
                    .map(|_| ctx.spawns)
                    .map_err(|reason| (instance.id().to_string(), reason))
            }
            None => Ok(Vec::new()),
        };
        self.scene.put_behavior(handle, behavior);

        match result {
            Ok(spawns) => {
                if let Some(instance) = self.scene.component_mut(handle) {
                    instance.initialized = true;
                }
                Ok(spawns)
            }
            Err((object, reason)) => Err(match self.mode {
                StageMode::Load => Error::InitFailed {
                    object,
                    reason: reason.0,
                },
                StageMode::Reload => Error::StagedReplacementRejected {
                    object,
                    reason: reason.0,
                },
            }
            .into()),
        }
    }
}
