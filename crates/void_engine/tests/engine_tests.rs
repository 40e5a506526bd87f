//! Integration tests for void_engine
//!
//! Tests batch loading, transactional reload, rollback, deferred destruction
//! and frame updates through the engine facade

use std::sync::{Arc, Mutex};
use std::time::Duration;

use void_core::{Error, FinishMode, InitError, ObjectId, ReloadPhase, Services, TypeInfo};
use void_engine::*;
use void_resource::{InitContext, ObjectDescriptor, ObjectHandle, Property, Resource, Value};
use void_scene::{
    Component, ComponentContext, ComponentDescriptor, CompositeBlueprint, UpdateContext,
};

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Stand-in for a backend buffer: every replacement is the next version
struct Buffer {
    id: String,
    size: i64,
    version: u32,
    journal: Journal,
}

impl Resource for Buffer {
    fn init(&mut self, ctx: &InitContext<'_>) -> Result<(), InitError> {
        self.id = ctx.id().to_string();
        self.size = ctx.property("size").and_then(Value::as_i64).unwrap_or(0);
        self.version = ctx.previous::<Buffer>().map_or(1, |old| old.version + 1);
        if ctx.property("unavailable").is_some() {
            return Err("handle unavailable".into());
        }
        Ok(())
    }

    fn finish(&mut self, mode: FinishMode) {
        let action = match mode {
            FinishMode::Commit => "commit",
            FinishMode::Rollback => "rollback",
        };
        self.journal.push(format!("{} {} v{}", action, self.id, self.version));
    }
}

/// Remembers the version of the buffer it was built against
#[derive(Default)]
struct Material {
    buffer_version: Option<u32>,
}

impl Resource for Material {
    fn init(&mut self, ctx: &InitContext<'_>) -> Result<(), InitError> {
        self.buffer_version = ctx.resource::<Buffer>("buffer").map(|b| b.version);
        Ok(())
    }
}

#[derive(Default)]
struct Renderer {
    built_against: u32,
}

impl Component for Renderer {
    fn init(&mut self, ctx: &mut ComponentContext<'_>) -> Result<(), InitError> {
        let buffer = ctx
            .resource::<Buffer>("buffer")
            .ok_or_else(|| InitError::new("no buffer"))?;
        self.built_against = buffer.version;
        Ok(())
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        let version = ctx.resource::<Buffer>("buffer").map_or(0, |b| b.version);
        if let Some(journal) = ctx.services().get::<Journal>() {
            journal.push(format!("tick {} v{}", ctx.id(), version));
        }
    }
}

/// Follows the renderer behind its `target` pointer
struct Follower;

impl Component for Follower {
    fn init(&mut self, ctx: &mut ComponentContext<'_>) -> Result<(), InitError> {
        ctx.pointer_as::<Renderer>("target")
            .map(|_| ())
            .ok_or_else(|| InitError::new("no target"))
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        let version = ctx.pointer_as::<Renderer>("target").map_or(0, |r| r.built_against);
        if let Some(journal) = ctx.services().get::<Journal>() {
            journal.push(format!("follow {} v{}", ctx.id(), version));
        }
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn engine_with(config: EngineConfig) -> (Engine, Journal) {
    init_logging();
    let journal = Journal::default();
    let engine = Engine::builder()
        .config(config)
        .service(journal.clone())
        .resource(TypeInfo::new("Buffer"), |services: &Services| {
            Box::new(Buffer {
                id: String::new(),
                size: 0,
                version: 0,
                journal: services.get::<Journal>().cloned().unwrap_or_default(),
            })
        })
        .resource(TypeInfo::new("Material"), |_: &Services| Box::new(Material::default()))
        .component(TypeInfo::new("Renderer"), |_: &Services| Box::new(Renderer::default()))
        .component(TypeInfo::new("Follower"), |_: &Services| Box::new(Follower))
        .build();
    (engine, journal)
}

fn engine() -> (Engine, Journal) {
    engine_with(EngineConfig::default())
}

fn buffer(id: &str, size: i64) -> ObjectDescriptor {
    ObjectDescriptor::new(id, "Buffer").with("size", size)
}

fn player() -> CompositeBlueprint {
    CompositeBlueprint::new("player")
        .component(ComponentDescriptor::new("r", "Renderer").link("buffer", "B"))
}

fn cam() -> CompositeBlueprint {
    CompositeBlueprint::new("cam")
        .component(ComponentDescriptor::new("f", "Follower").pointer("target", "player/r"))
}

fn version(engine: &Engine, id: &str) -> Option<u32> {
    engine.resource::<Buffer>(id).map(|b| b.version)
}

/// Identifier and handle of every live object, plus live root composites
fn snapshot(engine: &Engine) -> (Vec<(ObjectId, ObjectHandle)>, Vec<ObjectId>) {
    let objects = engine
        .registry()
        .ids()
        .filter_map(|id| engine.registry().lookup(id.as_str()).map(|h| (id.clone(), h)))
        .collect();
    let roots = engine
        .scene()
        .roots()
        .filter_map(|r| engine.scene().composite(r).map(|c| c.id().clone()))
        .collect();
    (objects, roots)
}

#[test]
fn test_load_and_tick() {
    let (mut engine, journal) = engine();
    let summary = engine
        .load(DescriptorBatch::new().object(buffer("B", 4)).composite(player()))
        .unwrap();

    assert_eq!(summary.objects.added, vec![ObjectId::from("B")]);
    assert_eq!(summary.spawned, vec![ObjectId::from("player")]);
    assert_eq!(
        summary.phases,
        vec![
            ReloadPhase::Idle,
            ReloadPhase::Staging,
            ReloadPhase::Validating,
            ReloadPhase::Committing,
            ReloadPhase::Idle,
        ]
    );
    assert_eq!(journal.take(), vec!["commit B v1"]);

    assert_eq!(engine.tick(Duration::from_millis(16)), 1);
    assert_eq!(journal.take(), vec!["tick player/r v1"]);
    assert_eq!(engine.component::<Renderer>("player").map(|r| r.built_against), Some(1));
}

#[test]
fn test_missing_reference_target() {
    let (mut engine, _journal) = engine();
    let report = engine
        .load(DescriptorBatch::new().object(buffer("O", 1).link("device", "missing")))
        .unwrap_err();

    assert!(report.contains(|e| matches!(
        e,
        Error::UnresolvedReference { object, target, .. } if object == "O" && target == "missing"
    )));
    assert!(engine.registry().is_empty());
    assert_eq!(engine.registry().staged_len(), 0);
}

#[test]
fn test_rejected_replacement_keeps_original() {
    let (mut engine, journal) = engine();
    engine
        .load(DescriptorBatch::new().object(buffer("B", 4)).composite(player()))
        .unwrap();
    let before = snapshot(&engine);
    journal.take();

    let report = engine
        .begin_reload(DescriptorBatch::new().object(buffer("B", 8).with("unavailable", true)))
        .unwrap_err();

    assert_eq!(
        report.errors(),
        &[Error::StagedReplacementRejected {
            object: "B".into(),
            reason: "handle unavailable".into()
        }]
    );
    assert_eq!(version(&engine, "B"), Some(1));
    assert_eq!(engine.resource::<Buffer>("B").map(|b| b.size), Some(4));
    assert_eq!(snapshot(&engine), before);
    assert_eq!(engine.registry().staged_len(), 0);
    assert_eq!(engine.retired_len(), 0);
    assert_eq!(journal.take(), vec!["rollback B v2"]);
}

#[test]
fn test_commit_swaps_and_defers_destruction() {
    let (mut engine, journal) = engine();
    engine
        .load(DescriptorBatch::new().object(buffer("B", 4)).composite(player()))
        .unwrap();
    let old = engine.registry().lookup("B").unwrap();
    let old_root = engine.scene().find("player").unwrap();
    journal.take();

    let summary = engine.begin_reload(DescriptorBatch::new().object(buffer("B", 8))).unwrap();
    assert_eq!(summary.objects.replaced, vec![ObjectId::from("B")]);
    assert_eq!(summary.rebuilt, vec![ObjectId::from("player")]);
    assert_eq!(journal.take(), vec!["commit B v2"]);

    // New candidate behind the identifier, old one only in retire bookkeeping
    let new = engine.registry().lookup("B").unwrap();
    assert_ne!(new, old);
    assert_eq!(version(&engine, "B"), Some(2));
    assert!(engine.registry().retired().contains(&old));
    assert!(engine.registry().get(old).is_some());
    assert_ne!(engine.scene().find("player"), Some(old_root));

    engine.tick(Duration::from_millis(16));
    assert_eq!(journal.take(), vec!["tick player/r v2"]);

    assert_eq!(engine.collect_retired(), 2);
    assert!(engine.registry().get(old).is_none());
    assert!(engine.scene().composite(old_root).is_none());
    assert_eq!(engine.collect_retired(), 0);
}

#[test]
fn test_rollback_leaves_registry_identical() {
    let (mut engine, journal) = engine();
    engine
        .load(
            DescriptorBatch::new()
                .object(buffer("B", 4))
                .object(ObjectDescriptor::new("M", "Material").link("buffer", "B"))
                .composite(player()),
        )
        .unwrap();
    let before = snapshot(&engine);
    journal.take();

    let report = engine
        .begin_reload(
            DescriptorBatch::new()
                .object(buffer("B", 8))
                .object(buffer("X", 1).with("unavailable", true)),
        )
        .unwrap_err();

    assert!(report.contains(|e| matches!(
        e,
        Error::StagedReplacementRejected { object, .. } if object == "X"
    )));
    assert_eq!(snapshot(&engine), before);
    assert_eq!(engine.registry().staged_len(), 0);
    assert_eq!(engine.retired_len(), 0);
    assert_eq!(version(&engine, "B"), Some(1));
    assert_eq!(engine.resource::<Material>("M").unwrap().buffer_version, Some(1));

    let mut rolled_back = journal.take();
    rolled_back.sort();
    assert_eq!(rolled_back, vec!["rollback B v2", "rollback X v1"]);
}

#[test]
fn test_failed_composite_rolls_back_objects() {
    let (mut engine, journal) = engine();
    let bad = CompositeBlueprint::new("bad").component(ComponentDescriptor::new("r", "Renderer"));

    let report = engine
        .load(DescriptorBatch::new().object(buffer("B", 4)).composite(bad))
        .unwrap_err();

    assert_eq!(
        report.errors(),
        &[Error::InitFailed {
            object: "bad/r".into(),
            reason: "no buffer".into()
        }]
    );
    assert!(engine.registry().is_empty());
    assert!(engine.scene().is_empty());
    assert_eq!(journal.take(), vec!["rollback B v1"]);
}

#[test]
fn test_dependents_are_restaged() {
    let (mut engine, _journal) = engine();
    engine
        .load(
            DescriptorBatch::new()
                .object(buffer("B", 4))
                .object(ObjectDescriptor::new("M", "Material").link("buffer", "B")),
        )
        .unwrap();

    let summary = engine.begin_reload(DescriptorBatch::new().object(buffer("B", 8))).unwrap();
    assert_eq!(summary.restaged, vec![ObjectId::from("M")]);
    assert_eq!(summary.objects.replaced.len(), 2);
    assert_eq!(engine.resource::<Material>("M").unwrap().buffer_version, Some(2));
}

#[test]
fn test_dependents_kept_when_disabled() {
    let (mut engine, _journal) = engine_with(EngineConfig {
        reinit_dependents: false,
        ..EngineConfig::default()
    });
    engine
        .load(
            DescriptorBatch::new()
                .object(buffer("B", 4))
                .object(ObjectDescriptor::new("M", "Material").link("buffer", "B")),
        )
        .unwrap();

    let summary = engine.begin_reload(DescriptorBatch::new().object(buffer("B", 8))).unwrap();
    assert!(summary.restaged.is_empty());

    // M still points at the retired version, which no longer resolves
    let link = engine.registry().find("M").and_then(|m| m.link("buffer")).unwrap();
    assert!(engine.registry().resolve(&link).is_none());
    assert_eq!(engine.resource::<Material>("M").unwrap().buffer_version, Some(1));
}

#[test]
fn test_embedded_reload_restages_owner() {
    let (mut engine, _journal) = engine_with(EngineConfig {
        reinit_dependents: false,
        ..EngineConfig::default()
    });
    engine
        .load(
            DescriptorBatch::new()
                .object(buffer("P", 1))
                .object(ObjectDescriptor::new("M", "Material").embed("buffer", "P")),
        )
        .unwrap();

    let summary = engine.begin_reload(DescriptorBatch::new().object(buffer("P", 2))).unwrap();
    assert_eq!(summary.restaged, vec![ObjectId::from("M")]);
    assert_eq!(engine.resource::<Material>("M").unwrap().buffer_version, Some(2));

    let p = engine.registry().lookup("P").unwrap();
    let m = engine.registry().lookup("M").unwrap();
    assert_eq!(engine.registry().get(p).and_then(|o| o.owner()), Some(m));
}

#[test]
fn test_step_by_step_abort_and_drop() {
    let (mut engine, journal) = engine();
    engine
        .load(DescriptorBatch::new().object(buffer("B", 4)).composite(player()))
        .unwrap();
    let before = snapshot(&engine);
    journal.take();

    let reload = engine.stage_reload(DescriptorBatch::new().object(buffer("B", 8))).unwrap();
    assert_eq!(reload.phase(), ReloadPhase::Staging);
    assert_eq!(reload.composites(), vec![&ObjectId::from("player")]);
    let validated = reload.validate().unwrap();
    assert_eq!(validated.phase(), ReloadPhase::Validating);
    validated.abort();

    assert_eq!(snapshot(&engine), before);
    assert_eq!(journal.take(), vec!["rollback B v2"]);

    {
        let _dropped = engine.stage_reload(DescriptorBatch::new().object(buffer("B", 16))).unwrap();
    }
    assert_eq!(snapshot(&engine), before);
    assert_eq!(engine.registry().staged_len(), 0);
    assert_eq!(engine.scene().len(), 1);
    assert_eq!(version(&engine, "B"), Some(1));
}

#[test]
fn test_load_rejects_live_ids() {
    let (mut engine, _journal) = engine();
    engine.load(DescriptorBatch::new().object(buffer("B", 4))).unwrap();

    let report = engine.load(DescriptorBatch::new().object(buffer("B", 8))).unwrap_err();
    assert!(report.contains(|e| matches!(e, Error::DuplicateIdentifier(id) if id == "B")));
    assert_eq!(version(&engine, "B"), Some(1));

    let (mut lenient, _journal) = engine_with(EngineConfig {
        reject_live_ids_on_load: false,
        ..EngineConfig::default()
    });
    lenient.load(DescriptorBatch::new().object(buffer("B", 4))).unwrap();
    let summary = lenient.load(DescriptorBatch::new().object(buffer("B", 8))).unwrap();
    assert_eq!(summary.objects.replaced, vec![ObjectId::from("B")]);
    assert_eq!(version(&lenient, "B"), Some(2));
}

#[test]
fn test_batch_duplicates_rejected() {
    let (mut engine, _journal) = engine();
    let report = engine
        .load(DescriptorBatch::new().object(buffer("B", 1)).object(buffer("B", 2)))
        .unwrap_err();
    assert!(report.contains(|e| matches!(e, Error::DuplicateIdentifier(id) if id == "B")));
    assert!(engine.registry().is_empty());
}

#[test]
fn test_create_resource_generates_ids() {
    let (mut engine, _journal) = engine();
    let size = || vec![("size".to_string(), Property::Value(Value::Int(3)))];

    let first = engine.create_resource("Buffer", size()).unwrap();
    let second = engine.create_resource("Buffer", size()).unwrap();
    assert_eq!(first, "resource::Buffer");
    assert_eq!(second, "resource::Buffer_1");
    assert_eq!(engine.resource::<Buffer>("resource::Buffer_1").map(|b| b.size), Some(3));
    assert!(engine.descriptor("resource::Buffer").is_some());

    let report = engine.create_resource("Nope", Vec::new()).unwrap_err();
    assert!(report.contains(|e| matches!(e, Error::UnknownType { type_name, .. } if type_name == "Nope")));
}

#[test]
fn test_spawn_and_despawn() {
    let (mut engine, journal) = engine();
    engine.load(DescriptorBatch::new().object(buffer("B", 4))).unwrap();

    journal.take();

    let first = engine.spawn(player()).unwrap();
    let second = engine.spawn(player()).unwrap();
    assert_eq!(engine.scene().composite(second).unwrap().id(), "player_1");

    engine.tick(Duration::from_millis(16));
    assert_eq!(journal.take(), vec!["tick player/r v1", "tick player_1/r v1"]);

    assert!(engine.despawn(first));
    assert!(!engine.despawn(first));
    engine.tick(Duration::from_millis(16));
    assert_eq!(journal.take(), vec!["tick player_1/r v1"]);

    // Reloading the linked buffer rebuilds the remaining spawned root
    let summary = engine.begin_reload(DescriptorBatch::new().object(buffer("B", 8))).unwrap();
    assert_eq!(summary.rebuilt, vec![ObjectId::from("player_1")]);

    assert_eq!(engine.collect_retired(), 3);
    assert!(engine.scene().composite(first).is_none());
}

#[test]
fn test_retire_removes_from_lookup() {
    let (mut engine, _journal) = engine();
    engine.load(DescriptorBatch::new().object(buffer("B", 4))).unwrap();
    let handle = engine.registry().lookup("B").unwrap();

    assert_eq!(engine.retire("B"), 1);
    assert!(engine.registry().lookup("B").is_none());
    assert!(engine.descriptor("B").is_none());
    assert!(engine.registry().get(handle).is_some());

    assert_eq!(engine.collect_retired(), 1);
    assert!(engine.registry().get(handle).is_none());
}

#[test]
fn test_retire_refuses_embedded_object() {
    let (mut engine, _journal) = engine();
    engine
        .load(
            DescriptorBatch::new()
                .object(buffer("P", 1))
                .object(ObjectDescriptor::new("M", "Material").embed("buffer", "P")),
        )
        .unwrap();

    assert_eq!(engine.retire("P"), 0);
    assert!(engine.registry().lookup("P").is_some());
    assert!(engine.descriptor("P").is_some());
    assert_eq!(engine.retired_len(), 0);

    assert_eq!(engine.retire("M"), 2);
    assert!(engine.registry().lookup("P").is_none());
    assert_eq!(engine.collect_retired(), 2);
}

#[test]
fn test_pointer_to_root_declared_later_in_batch() {
    let (mut engine, journal) = engine();
    let summary = engine
        .load(
            DescriptorBatch::new()
                .object(buffer("B", 4))
                .composite(cam())
                .composite(player()),
        )
        .unwrap();

    assert_eq!(summary.spawned, vec![ObjectId::from("player"), ObjectId::from("cam")]);
    journal.take();

    engine.tick(Duration::from_millis(16));
    assert_eq!(journal.take(), vec!["tick player/r v1", "follow cam/f v1"]);
}

#[test]
fn test_reload_rebuilds_roots_pointing_into_rebuilt_tree() {
    let (mut engine, journal) = engine();
    engine
        .load(DescriptorBatch::new().object(buffer("B", 4)).composite(player()))
        .unwrap();
    engine.load(DescriptorBatch::new().composite(cam())).unwrap();
    let old_cam = engine.scene().find("cam").unwrap();

    let summary = engine.begin_reload(DescriptorBatch::new().object(buffer("B", 8))).unwrap();
    assert_eq!(summary.rebuilt, vec![ObjectId::from("player"), ObjectId::from("cam")]);
    assert_ne!(engine.scene().find("cam"), Some(old_cam));
    journal.take();

    engine.tick(Duration::from_millis(16));
    assert_eq!(journal.take(), vec!["tick player/r v2", "follow cam/f v2"]);

    // B, player and cam each leave one retired version behind
    assert_eq!(engine.collect_retired(), 3);
    engine.tick(Duration::from_millis(16));
    assert_eq!(journal.take(), vec!["tick player/r v2", "follow cam/f v2"]);
}

#[test]
fn test_blueprint_errors_reported_with_object_errors() {
    let (mut engine, journal) = engine();
    let bad = CompositeBlueprint::new("bad")
        .component(ComponentDescriptor::new("r", "Renderer").link("buffer", "nowhere"));

    let report = engine
        .load(
            DescriptorBatch::new()
                .object(buffer("X", 1).with("unavailable", true))
                .composite(bad),
        )
        .unwrap_err();

    assert_eq!(report.len(), 2);
    assert!(report.contains(|e| matches!(e, Error::InitFailed { object, .. } if object == "X")));
    assert!(report.contains(|e| matches!(
        e,
        Error::UnresolvedReference { object, target, .. } if object == "bad/r" && target == "nowhere"
    )));
    assert!(engine.registry().is_empty());
    assert!(engine.scene().is_empty());
    assert_eq!(journal.take(), vec!["rollback X v1"]);
}
