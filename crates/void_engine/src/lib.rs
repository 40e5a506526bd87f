//! # void_engine - Void runtime engine
//!
//! Ties resources and composites into one runtime:
//! - Descriptor batch loading, applied completely or not at all
//! - Transactional reload with staged candidates and rollback
//! - Deferred destruction of replaced objects
//! - Frame updates in dependency order
//!
//! ## Example
//!
//! ```ignore
//! use void_engine::prelude::*;
//!
//! let mut engine = Engine::builder()
//!     .config(EngineConfig::load("engine.toml")?)
//!     .resource(TypeInfo::new("Mesh"), |_: &Services| Box::new(Mesh::default()))
//!     .component(TypeInfo::new("Renderer"), |_: &Services| Box::new(Renderer::default()))
//!     .build();
//!
//! engine.load(batch)?;
//! loop {
//!     engine.tick(frame_delta);
//!     if let Some(changed) = watcher.poll() {
//!         engine.begin_reload(changed)?;
//!     }
//!     if backend.drained() {
//!         engine.collect_retired();
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

pub mod batch;
pub mod config;
pub mod reload;

pub use batch::DescriptorBatch;
pub use config::{ConfigError, ConfigResult, EngineConfig};
pub use reload::{Reload, ReloadSummary, Validated};

pub use void_core;
pub use void_resource;
pub use void_scene;

use void_core::{BatchResult, ObjectId, Services, TypeInfo};
use void_resource::{ObjectDescriptor, Property, Registry, Resource, ResourceFactory, StageMode};
use void_scene::{Component, ComponentFactory, CompositeBlueprint, CompositeHandle, Instantiator, Scene};

/// Frame timing information
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameTime {
    /// Clamped delta of the last tick
    pub delta: Duration,
    /// Total clamped time ticked so far
    pub total: Duration,
    /// Number of ticks run
    pub frame: u64,
}

/// The runtime: sole owner of every object and composite instance
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) registry: Registry,
    pub(crate) scene: Scene,
    pub(crate) resource_types: ResourceFactory,
    pub(crate) component_types: ComponentFactory,
    pub(crate) services: Services,
    /// Descriptors of live objects, kept so dependents can be restaged
    pub(crate) descriptors: BTreeMap<ObjectId, ObjectDescriptor>,
    time: FrameTime,
}

impl Engine {
    /// Create an engine builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Create an engine with default configuration and no registered types
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with custom configuration. Out-of-range values are
    /// reported and replaced by their default when used.
    pub fn with_config(config: EngineConfig) -> Self {
        warn_invalid(&config);
        Self {
            config,
            registry: Registry::new(),
            scene: Scene::new(),
            resource_types: ResourceFactory::new(),
            component_types: ComponentFactory::new(),
            services: Services::new(),
            descriptors: BTreeMap::new(),
            time: FrameTime::default(),
        }
    }

    /// Register a resource type
    pub fn register_resource<F>(&mut self, info: TypeInfo, constructor: F) -> &mut Self
    where
        F: Fn(&Services) -> Box<dyn Resource> + Send + Sync + 'static,
    {
        log::debug!("Registered resource type '{}'", info.name);
        self.resource_types.register(info, constructor);
        self
    }

    /// Register a component type
    pub fn register_component<F>(&mut self, info: TypeInfo, constructor: F) -> &mut Self
    where
        F: Fn(&Services) -> Box<dyn Component> + Send + Sync + 'static,
    {
        log::debug!("Registered component type '{}'", info.name);
        self.component_types.register(info, constructor);
        self
    }

    // Descriptor batches

    /// Load a batch as new objects and root composites.
    ///
    /// Either everything in the batch becomes live or nothing does.
    pub fn load(&mut self, batch: DescriptorBatch) -> BatchResult<ReloadSummary> {
        Ok(Reload::stage(self, batch, StageMode::Load)?.validate()?.commit())
    }

    /// Reload a batch of changed descriptors and commit it.
    ///
    /// Objects in the batch replace their live versions; dependents and the
    /// composites that use them are rebuilt. On error nothing changed.
    pub fn begin_reload(&mut self, batch: DescriptorBatch) -> BatchResult<ReloadSummary> {
        Ok(self.stage_reload(batch)?.validate()?.commit())
    }

    /// Stage a reload and hand back the transaction for step-by-step control
    pub fn stage_reload(&mut self, batch: DescriptorBatch) -> BatchResult<Reload<'_>> {
        Reload::stage(self, batch, StageMode::Reload)
    }

    /// Create an object at runtime under a generated identifier
    /// (`resource::<type>`, `resource::<type>_1`, ...)
    pub fn create_resource<I>(&mut self, type_name: &str, properties: I) -> BatchResult<ObjectId>
    where
        I: IntoIterator<Item = (String, Property)>,
    {
        let id = self.registry.unique_id(type_name);
        let mut descriptor = ObjectDescriptor::new(id.clone(), type_name);
        descriptor.properties.extend(properties);
        self.load(DescriptorBatch::new().object(descriptor))?;
        Ok(id)
    }

    // Composites

    /// Build and activate a root composite. Its identifier is the
    /// blueprint id, suffixed when that id is taken.
    pub fn spawn(&mut self, blueprint: CompositeBlueprint) -> BatchResult<CompositeHandle> {
        let id = self.scene.unique_root_id(blueprint.id.as_str());
        let root = Instantiator::new(
            &mut self.scene,
            self.registry.scope(),
            &self.component_types,
            &self.services,
        )
        .instantiate(&blueprint, id)?;
        self.scene.activate(root, blueprint);
        Ok(root)
    }

    /// Stop updating a root composite; its tree is destroyed at the next
    /// [`Engine::collect_retired`]
    pub fn despawn(&mut self, root: CompositeHandle) -> bool {
        let retired = self.scene.retire(root);
        if retired {
            self.check_retire_queue();
        }
        retired
    }

    // Deferred destruction

    /// Remove a live object from lookups. Objects it embeds go with it.
    ///
    /// An object embedded by a live owner is refused; retire the owner
    /// instead. Links to a retired object stop resolving and composites
    /// holding them are not rebuilt.
    pub fn retire(&mut self, id: &str) -> usize {
        let owner = self
            .registry
            .find(id)
            .and_then(|o| o.owner())
            .and_then(|h| self.registry.get(h))
            .filter(|o| o.is_live());
        if let Some(owner) = owner {
            log::warn!("Not retiring '{}': embedded by live '{}'", id, owner.id());
            return 0;
        }

        let count = self.registry.retire_id(id);
        if count > 0 {
            let registry = &self.registry;
            self.descriptors.retain(|id, _| registry.contains(id.as_str()));
            self.check_retire_queue();
        }
        count
    }

    /// Destroy every retired object and composite tree.
    ///
    /// Call once in-flight work referencing old versions has drained.
    pub fn collect_retired(&mut self) -> usize {
        let objects = self.registry.collect_retired();
        let composites = self.scene.collect_retired();
        if objects + composites > 0 {
            log::info!(
                "Collected {} object(s) and {} composite(s)",
                objects,
                composites
            );
        }
        objects + composites
    }

    /// Retired objects and composite trees awaiting collection
    pub fn retired_len(&self) -> usize {
        self.registry.retired_len() + self.scene.retired_len()
    }

    pub(crate) fn check_retire_queue(&self) {
        let pending = self.retired_len();
        if pending > self.config.retire_warn_threshold {
            log::warn!(
                "{} retired entries awaiting collection (threshold {})",
                pending,
                self.config.retire_warn_threshold
            );
        }
    }

    // Frame

    /// Run one update pass over every live root composite.
    ///
    /// `delta` is clamped to `max_delta_time`. Returns the number of
    /// components updated.
    pub fn tick(&mut self, delta: Duration) -> usize {
        let delta = delta.min(self.config.max_delta());
        self.time.delta = delta;
        self.time.total += delta;
        self.time.frame += 1;
        let updated = void_scene::tick(&mut self.scene, &self.registry, &self.services, delta);
        log::trace!("Frame {}: updated {} component(s)", self.time.frame, updated);
        updated
    }

    // Accessors

    /// Get the configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the frame timing
    pub fn time(&self) -> &FrameTime {
        &self.time
    }

    /// Get the current frame number
    pub fn frame(&self) -> u64 {
        self.time.frame
    }

    /// Get the object registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get the scene
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Get the shared services
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Get mutable shared services
    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }

    /// Get the resource types
    pub fn resource_types(&self) -> &ResourceFactory {
        &self.resource_types
    }

    /// Get the component types
    pub fn component_types(&self) -> &ComponentFactory {
        &self.component_types
    }

    /// Descriptor a live object was built from
    pub fn descriptor(&self, id: &str) -> Option<&ObjectDescriptor> {
        self.descriptors.get(id)
    }

    /// Live object data by identifier
    pub fn resource<T: Resource>(&self, id: &str) -> Option<&T> {
        self.registry.resource(id)
    }

    /// First component of type `T` on the live root composite `root`
    pub fn component<T: Component>(&self, root: &str) -> Option<&T> {
        self.scene.find(root).and_then(|h| self.scene.get::<T>(h))
    }
}

fn warn_invalid(config: &EngineConfig) {
    if let Err(e) = config.validate() {
        log::warn!("{}; using {:?}", e, config.max_delta());
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing an engine
pub struct EngineBuilder {
    engine: Engine,
}

impl EngineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            engine: Engine::new(),
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        warn_invalid(&config);
        self.engine.config = config;
        self
    }

    /// Register a resource type
    pub fn resource<F>(mut self, info: TypeInfo, constructor: F) -> Self
    where
        F: Fn(&Services) -> Box<dyn Resource> + Send + Sync + 'static,
    {
        self.engine.register_resource(info, constructor);
        self
    }

    /// Register a component type
    pub fn component<F>(mut self, info: TypeInfo, constructor: F) -> Self
    where
        F: Fn(&Services) -> Box<dyn Component> + Send + Sync + 'static,
    {
        self.engine.register_component(info, constructor);
        self
    }

    /// Add a shared service
    pub fn service<S: std::any::Any + Send + Sync>(mut self, service: S) -> Self {
        self.engine.services.insert(service);
        self
    }

    /// Build the engine
    pub fn build(self) -> Engine {
        self.engine
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::{
        DescriptorBatch, Engine, EngineBuilder, EngineConfig, FrameTime, Reload, ReloadSummary,
        Validated,
    };

    pub use void_core::prelude::*;
    pub use void_resource::prelude::*;
    pub use void_scene::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_config() {
        let engine = Engine::builder()
            .config(EngineConfig {
                max_delta_time: 0.1,
                ..EngineConfig::default()
            })
            .service(42u32)
            .build();

        assert_eq!(engine.config().max_delta_time, 0.1);
        assert_eq!(engine.services().get::<u32>(), Some(&42));
    }

    #[test]
    fn test_tick_clamps_delta() {
        let mut engine = Engine::new();
        assert_eq!(engine.tick(Duration::from_secs(5)), 0);
        assert_eq!(engine.frame(), 1);
        assert_eq!(engine.time().delta, engine.config().max_delta());
    }

    #[test]
    fn test_out_of_range_delta_cap_does_not_panic() {
        for max_delta_time in [1e30, -1.0, f32::NAN] {
            let mut engine = Engine::with_config(EngineConfig {
                max_delta_time,
                ..EngineConfig::default()
            });
            engine.tick(Duration::from_millis(16));
            engine.tick(Duration::from_secs(5));
            assert_eq!(engine.time().delta, EngineConfig::default().max_delta());
        }
    }

    #[test]
    fn test_empty_batch_commits() {
        let mut engine = Engine::new();
        let summary = engine.load(DescriptorBatch::new()).unwrap();
        assert!(summary.objects.added.is_empty());
        assert_eq!(summary.phases.last(), Some(&void_core::ReloadPhase::Idle));
        assert_eq!(engine.collect_retired(), 0);
    }
}
