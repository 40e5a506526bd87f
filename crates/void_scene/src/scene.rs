//! Runtime composite hierarchy
//!
//! Composites and components live in two generational arenas. A tree being
//! instantiated is `Staged` and unreachable by identifier; activating it makes
//! every composite and component in it live at once. Replaced or despawned
//! trees are retired and stay in the arenas until collected.

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

use void_core::{unique_id, Handle, HandleMap, ObjectId};
use void_resource::{Link, Value};

use crate::blueprint::CompositeBlueprint;
use crate::component::Component;

/// Handle to a composite instance
pub type CompositeHandle = Handle<CompositeInstance>;

/// Handle to a component instance
pub type ComponentHandle = Handle<ComponentInstance>;

/// Lifecycle of an instance tree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstanceState {
    /// Under construction; not visible to lookups or ticks
    Staged,
    /// Reachable and ticked
    Live,
    /// Replaced or despawned; awaiting collection
    Retired,
}

/// Runtime counterpart of one component descriptor
pub struct ComponentInstance {
    pub(crate) id: ObjectId,
    pub(crate) name: ObjectId,
    pub(crate) type_name: String,
    pub(crate) composite: CompositeHandle,
    pub(crate) properties: BTreeMap<String, Value>,
    pub(crate) links: BTreeMap<String, (ObjectId, Link)>,
    pub(crate) pointers: BTreeMap<String, ComponentHandle>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) spawned: Vec<CompositeHandle>,
    pub(crate) initialized: bool,
    pub(crate) component: Option<Box<dyn Component>>,
}

impl ComponentInstance {
    /// Full instance identifier (`composite/component`)
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Identifier declared in the blueprint
    pub fn name(&self) -> &ObjectId {
        &self.name
    }

    /// Registered type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Owning composite
    pub fn composite(&self) -> CompositeHandle {
        self.composite
    }

    /// Plain property
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Linked resource slot
    pub fn link(&self, slot: &str) -> Option<Link> {
        self.links.get(slot).map(|(_, link)| *link)
    }

    /// Identifiers of every linked resource
    pub fn linked_ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.links.values().map(|(id, _)| id)
    }

    /// Resolved component pointer
    pub fn pointer(&self, slot: &str) -> Option<ComponentHandle> {
        self.pointers.get(slot).copied()
    }

    /// Every resolved pointer target
    pub fn pointer_targets(&self) -> impl Iterator<Item = ComponentHandle> + '_ {
        self.pointers.values().copied()
    }

    /// Component types this one is ordered after
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Composites spawned by this component during init
    pub fn spawned(&self) -> &[CompositeHandle] {
        &self.spawned
    }

    /// Whether staged initialization has completed
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Behavior object; `None` only while it is being called
    pub fn behavior(&self) -> Option<&dyn Component> {
        self.component.as_deref()
    }

    /// Downcast the behavior object
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.component.as_deref()?.as_any().downcast_ref()
    }

    /// Downcast the behavior object mutably
    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.component.as_deref_mut()?.as_any_mut().downcast_mut()
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("initialized", &self.initialized)
            .finish()
    }
}

/// Runtime counterpart of a blueprint
#[derive(Debug)]
pub struct CompositeInstance {
    pub(crate) id: ObjectId,
    pub(crate) name: ObjectId,
    pub(crate) parent: Option<CompositeHandle>,
    pub(crate) spawned_by: Option<ComponentHandle>,
    pub(crate) components: Vec<ComponentHandle>,
    pub(crate) order: Vec<usize>,
    pub(crate) children: Vec<CompositeHandle>,
    pub(crate) state: InstanceState,
}

impl CompositeInstance {
    pub(crate) fn new(
        id: ObjectId,
        name: ObjectId,
        parent: Option<CompositeHandle>,
        spawned_by: Option<ComponentHandle>,
    ) -> Self {
        Self {
            id,
            name,
            parent,
            spawned_by,
            components: Vec::new(),
            order: Vec::new(),
            children: Vec::new(),
            state: InstanceState::Staged,
        }
    }

    /// Full instance identifier
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Blueprint identifier this instance was built from
    pub fn name(&self) -> &ObjectId {
        &self.name
    }

    /// Parent composite
    pub fn parent(&self) -> Option<CompositeHandle> {
        self.parent
    }

    /// Component that spawned this composite during its init
    pub fn spawned_by(&self) -> Option<ComponentHandle> {
        self.spawned_by
    }

    /// Components in declaration order
    pub fn components(&self) -> &[ComponentHandle] {
        &self.components
    }

    /// Components in initialization (and update) order
    pub fn ordered_components(&self) -> impl Iterator<Item = ComponentHandle> + '_ {
        self.order.iter().filter_map(|i| self.components.get(*i).copied())
    }

    /// Child composites in creation order
    pub fn children(&self) -> &[CompositeHandle] {
        &self.children
    }

    /// Lifecycle state
    pub fn state(&self) -> InstanceState {
        self.state
    }
}

#[derive(Debug)]
struct Root {
    handle: CompositeHandle,
    blueprint: CompositeBlueprint,
}

/// Owner of every composite and component instance
#[derive(Debug, Default)]
pub struct Scene {
    composites: HandleMap<CompositeInstance>,
    components: HandleMap<ComponentInstance>,
    roots: Vec<Root>,
    index: BTreeMap<ObjectId, CompositeHandle>,
    component_index: BTreeMap<ObjectId, ComponentHandle>,
    retired: Vec<CompositeHandle>,
}

impl Scene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Composite by handle, in any state
    pub fn composite(&self, handle: CompositeHandle) -> Option<&CompositeInstance> {
        self.composites.get(handle)
    }

    /// Component by handle, in any state
    pub fn component(&self, handle: ComponentHandle) -> Option<&ComponentInstance> {
        self.components.get(handle)
    }

    /// Mutable component by handle
    pub fn component_mut(&mut self, handle: ComponentHandle) -> Option<&mut ComponentInstance> {
        self.components.get_mut(handle)
    }

    /// Live composite by full identifier
    pub fn find(&self, id: &str) -> Option<CompositeHandle> {
        self.index.get(id).copied()
    }

    /// Live component by full identifier
    pub fn find_component(&self, id: &str) -> Option<ComponentHandle> {
        self.component_index.get(id).copied()
    }

    /// Whether a live composite has this identifier
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Number of live composites, children included
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if nothing is live
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Live root composites in activation order
    pub fn roots(&self) -> impl Iterator<Item = CompositeHandle> + '_ {
        self.roots.iter().map(|r| r.handle)
    }

    /// Blueprint a live root was built from
    pub fn root_blueprint(&self, root: CompositeHandle) -> Option<&CompositeBlueprint> {
        self.roots.iter().find(|r| r.handle == root).map(|r| &r.blueprint)
    }

    /// Live roots built from the blueprint with this identifier
    pub fn roots_from(&self, blueprint: &str) -> Vec<CompositeHandle> {
        self.roots
            .iter()
            .filter(|r| r.blueprint.id == *blueprint)
            .map(|r| r.handle)
            .collect()
    }

    /// Live roots with a component linking any of `resources`
    pub fn roots_linking(&self, resources: &BTreeSet<ObjectId>) -> Vec<CompositeHandle> {
        self.roots
            .iter()
            .map(|r| r.handle)
            .filter(|root| {
                self.tree_components(*root).into_iter().any(|c| {
                    self.component(c)
                        .map_or(false, |c| c.linked_ids().any(|id| resources.contains(id)))
                })
            })
            .collect()
    }

    /// Live roots outside `targets` with a component pointing into one of
    /// the `targets` trees
    pub fn roots_pointing_into(&self, targets: &BTreeSet<CompositeHandle>) -> Vec<CompositeHandle> {
        self.roots
            .iter()
            .map(|r| r.handle)
            .filter(|root| !targets.contains(root))
            .filter(|root| {
                self.tree_components(*root).into_iter().any(|c| {
                    self.component(c).map_or(false, |c| {
                        c.pointer_targets().any(|t| {
                            self.component(t)
                                .map_or(false, |t| targets.contains(&self.root_of(t.composite)))
                        })
                    })
                })
            })
            .collect()
    }

    /// Root of the tree `composite` belongs to
    pub fn root_of(&self, composite: CompositeHandle) -> CompositeHandle {
        let mut current = composite;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Number of retired trees awaiting collection
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// First free root identifier of the form `base`, `base_1`, ...
    pub fn unique_root_id(&self, base: &str) -> ObjectId {
        unique_id(base, |candidate| self.index.contains_key(candidate))
    }

    /// Composites in a tree, pre-order, starting with `root`
    pub fn tree(&self, root: CompositeHandle) -> Vec<CompositeHandle> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(h) = stack.pop() {
            if let Some(composite) = self.composites.get(h) {
                out.push(h);
                stack.extend(composite.children.iter().rev().copied());
            }
        }
        out
    }

    /// Components in a tree, composite by composite
    pub fn tree_components(&self, root: CompositeHandle) -> Vec<ComponentHandle> {
        self.tree(root)
            .into_iter()
            .filter_map(|h| self.composites.get(h))
            .flat_map(|c| c.components.iter().copied())
            .collect()
    }

    // Queries

    /// First component of type `T` on a composite
    pub fn get<T: Component>(&self, composite: CompositeHandle) -> Option<&T> {
        self.composites
            .get(composite)?
            .components
            .iter()
            .find_map(|h| self.components.get(*h)?.downcast_ref())
    }

    /// Every component of type `T` on a composite
    pub fn get_all<T: Component>(&self, composite: CompositeHandle) -> Vec<&T> {
        self.composites
            .get(composite)
            .map(|c| {
                c.components
                    .iter()
                    .filter_map(|h| self.components.get(*h)?.downcast_ref())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every component of type `T` on a composite and its descendants
    pub fn get_recursive<T: Component>(&self, composite: CompositeHandle) -> Vec<&T> {
        self.tree_components(composite)
            .into_iter()
            .filter_map(|h| self.components.get(h)?.downcast_ref())
            .collect()
    }

    /// Whether a composite has a component of type `T`
    pub fn has<T: Component>(&self, composite: CompositeHandle) -> bool {
        self.get::<T>(composite).is_some()
    }

    /// Component on a composite by its declared identifier
    pub fn component_named(&self, composite: CompositeHandle, name: &str) -> Option<ComponentHandle> {
        self.composites
            .get(composite)?
            .components
            .iter()
            .copied()
            .find(|h| self.components.get(*h).map_or(false, |c| c.name == *name))
    }

    /// Parent of a composite
    pub fn parent(&self, composite: CompositeHandle) -> Option<CompositeHandle> {
        self.composites.get(composite)?.parent
    }

    /// Children of a composite
    pub fn children(&self, composite: CompositeHandle) -> &[CompositeHandle] {
        self.composites
            .get(composite)
            .map(|c| c.children.as_slice())
            .unwrap_or(&[])
    }

    // Construction, used by the instantiator

    pub(crate) fn insert_composite(&mut self, composite: CompositeInstance) -> CompositeHandle {
        let parent = composite.parent;
        let handle = self.composites.insert(composite);
        if let Some(parent) = parent.and_then(|p| self.composites.get_mut(p)) {
            parent.children.push(handle);
        }
        handle
    }

    pub(crate) fn composite_mut(&mut self, handle: CompositeHandle) -> Option<&mut CompositeInstance> {
        self.composites.get_mut(handle)
    }

    pub(crate) fn insert_component(&mut self, component: ComponentInstance) -> ComponentHandle {
        let composite = component.composite;
        let handle = self.components.insert(component);
        if let Some(composite) = self.composites.get_mut(composite) {
            composite.components.push(handle);
        }
        handle
    }

    pub(crate) fn take_behavior(&mut self, handle: ComponentHandle) -> Option<Box<dyn Component>> {
        self.components.get_mut(handle)?.component.take()
    }

    pub(crate) fn put_behavior(&mut self, handle: ComponentHandle, component: Box<dyn Component>) {
        if let Some(instance) = self.components.get_mut(handle) {
            instance.component = Some(component);
        }
    }

    /// Remove one composite and its components from the arenas
    pub(crate) fn remove_composite(&mut self, handle: CompositeHandle) {
        if let Some(composite) = self.composites.remove(handle) {
            for component in composite.components {
                self.components.remove(component);
            }
        }
    }

    // Lifecycle

    fn set_tree_state(&mut self, root: CompositeHandle, state: InstanceState) {
        for h in self.tree(root) {
            let Some(composite) = self.composites.get_mut(h) else {
                continue;
            };
            composite.state = state;
            match state {
                InstanceState::Live => {
                    self.index.insert(composite.id.clone(), h);
                    for c in &composite.components {
                        if let Some(component) = self.components.get(*c) {
                            self.component_index.insert(component.id.clone(), *c);
                        }
                    }
                }
                _ => {
                    if self.index.get(&composite.id) == Some(&h) {
                        self.index.remove(&composite.id);
                    }
                    for c in &composite.components {
                        if let Some(component) = self.components.get(*c) {
                            if self.component_index.get(&component.id) == Some(c) {
                                self.component_index.remove(&component.id);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Make a staged tree live as a new root
    pub fn activate(&mut self, root: CompositeHandle, blueprint: CompositeBlueprint) {
        self.set_tree_state(root, InstanceState::Live);
        self.roots.push(Root {
            handle: root,
            blueprint,
        });
        log::debug!("Activated composite tree {:?}", root);
    }

    /// Swap a live root for a staged tree, keeping its tick position.
    /// The old tree is retired.
    pub fn replace(&mut self, old: CompositeHandle, new: CompositeHandle, blueprint: CompositeBlueprint) {
        let Some(position) = self.roots.iter().position(|r| r.handle == old) else {
            self.activate(new, blueprint);
            return;
        };
        self.set_tree_state(old, InstanceState::Retired);
        self.retired.push(old);
        self.set_tree_state(new, InstanceState::Live);
        self.roots[position] = Root {
            handle: new,
            blueprint,
        };
        log::debug!("Replaced composite tree {:?} with {:?}", old, new);
    }

    /// Remove a live root from lookups and ticks; destruction waits for
    /// [`Scene::collect_retired`]
    pub fn retire(&mut self, root: CompositeHandle) -> bool {
        let Some(position) = self.roots.iter().position(|r| r.handle == root) else {
            return false;
        };
        self.roots.remove(position);
        self.set_tree_state(root, InstanceState::Retired);
        self.retired.push(root);
        true
    }

    /// Throw away a staged tree
    pub fn discard(&mut self, root: CompositeHandle) -> usize {
        let staged = self
            .composites
            .get(root)
            .map_or(false, |c| c.state == InstanceState::Staged);
        if !staged {
            return 0;
        }
        let tree = self.tree(root);
        let count = tree.len();
        if let Some(parent) = self.parent(root).and_then(|p| self.composites.get_mut(p)) {
            parent.children.retain(|c| *c != root);
        }
        for h in tree {
            self.remove_composite(h);
        }
        count
    }

    /// Destroy every retired tree
    pub fn collect_retired(&mut self) -> usize {
        let mut count = 0;
        for root in std::mem::take(&mut self.retired) {
            for h in self.tree(root) {
                self.remove_composite(h);
                count += 1;
            }
        }
        if count > 0 {
            log::debug!("Collected {} retired composite(s)", count);
        }
        count
    }
}
