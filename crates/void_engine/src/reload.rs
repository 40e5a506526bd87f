//! Reload coordinator
//!
//! Applies a descriptor batch as one transaction:
//!
//! ```text
//! Idle -> Staging -> Validating -> Committing -> Idle
//!            \            \
//!             +------------+---> RollingBack -> Idle
//! ```
//!
//! Staging builds candidates next to the live objects without touching them.
//! Validating wires candidates together, runs their init (where they may
//! reject themselves) and builds the composite trees that use them. Committing
//! only swaps handles, so it cannot fail. Any error before that point throws
//! every candidate away and leaves the registry and scene as they were.
//!
//! [`Reload`] and [`Validated`] are the two halves of the transaction. Dropping
//! either without committing rolls back.

use std::collections::{BTreeMap, BTreeSet};

use void_core::{BatchResult, Error, ErrorReport, ObjectId, PhaseTracker, ReloadPhase};
use void_resource::{CommitSummary, ObjectDescriptor, StageMode, StagedObjects};
use void_scene::{CompositeBlueprint, CompositeHandle, Instantiator, Scene};

use crate::batch::DescriptorBatch;
use crate::Engine;

/// What an applied batch changed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Objects added or replaced
    pub objects: CommitSummary,
    /// Objects outside the batch that were rebuilt because they depend on it
    pub restaged: Vec<ObjectId>,
    /// Root composites built for the first time
    pub spawned: Vec<ObjectId>,
    /// Root composites rebuilt in place of their previous tree
    pub rebuilt: Vec<ObjectId>,
    /// Phases the transaction went through
    pub phases: Vec<ReloadPhase>,
}

/// A root composite the transaction builds
#[derive(Debug)]
struct RootPlan {
    id: ObjectId,
    replaces: Option<CompositeHandle>,
    blueprint: CompositeBlueprint,
}

struct Transaction<'e> {
    engine: &'e mut Engine,
    mode: StageMode,
    tracker: PhaseTracker,
    descriptors: Vec<ObjectDescriptor>,
    restaged: Vec<ObjectId>,
    objects: Option<StagedObjects>,
    plans: Vec<RootPlan>,
    built: Vec<CompositeHandle>,
}

impl<'e> Transaction<'e> {
    fn stage(engine: &'e mut Engine, batch: DescriptorBatch, mode: StageMode) -> BatchResult<Self> {
        let mut txn = Self {
            engine,
            mode,
            tracker: PhaseTracker::new(),
            descriptors: Vec::new(),
            restaged: Vec::new(),
            objects: None,
            plans: Vec::new(),
            built: Vec::new(),
        };
        txn.tracker.advance(ReloadPhase::Staging);
        log::debug!(
            "Staging {} object(s) and {} composite(s) ({:?})",
            batch.objects.len(),
            batch.composites.len(),
            mode
        );

        match txn.stage_batch(batch) {
            Ok(()) => Ok(txn),
            Err(report) => {
                txn.roll_back(Some(&report));
                Err(report)
            }
        }
    }

    fn stage_batch(&mut self, batch: DescriptorBatch) -> BatchResult<()> {
        batch.validate().check()?;
        let engine = &mut *self.engine;

        if self.mode == StageMode::Load && engine.config.reject_live_ids_on_load {
            let mut report = ErrorReport::new();
            for desc in &batch.objects {
                if engine.registry.contains(desc.id.as_str()) {
                    report.push(Error::DuplicateIdentifier(desc.id.to_string()));
                }
            }
            for blueprint in &batch.composites {
                if engine.scene.contains(blueprint.id.as_str()) {
                    report.push(Error::DuplicateIdentifier(blueprint.id.to_string()));
                }
            }
            report.check()?;
        }

        let (descriptors, restaged) = expand(engine, batch.objects);
        let objects = StagedObjects::stage(
            &mut engine.registry,
            &engine.resource_types,
            &engine.services,
            &descriptors,
        )?;
        let affected: BTreeSet<ObjectId> = descriptors.iter().map(|d| d.id.clone()).collect();

        self.plans = plan_roots(&engine.scene, batch.composites, &affected);
        self.objects = Some(objects);
        self.descriptors = descriptors;
        self.restaged = restaged;
        Ok(())
    }

    fn validate(&mut self) -> BatchResult<()> {
        self.tracker.advance(ReloadPhase::Validating);
        match self.validate_candidates() {
            Ok(()) => Ok(()),
            Err(report) => {
                self.roll_back(Some(&report));
                Err(report)
            }
        }
    }

    fn validate_candidates(&mut self) -> BatchResult<()> {
        let engine = &mut *self.engine;
        let Some(objects) = self.objects.as_ref() else {
            return Ok(());
        };
        let mut report = ErrorReport::new();
        let ready = match objects.resolve(&mut engine.registry) {
            Ok(()) => objects.initialize(&mut engine.registry, &engine.services, self.mode),
            Err(errors) => Err(errors),
        };

        // Composites are only built on top of objects that initialized; when
        // those failed, still report what the blueprints get wrong on their own.
        if let Err(errors) = ready {
            report.merge(errors);
            for plan in &self.plans {
                let checked = Instantiator::new(
                    &mut engine.scene,
                    objects.scope(&engine.registry),
                    &engine.component_types,
                    &engine.services,
                )
                .check(&plan.blueprint, &plan.id);
                report.merge(checked);
            }
            return report.check();
        }

        let mut staged_roots = BTreeMap::new();
        for plan in &self.plans {
            let result = Instantiator::new(
                &mut engine.scene,
                objects.scope(&engine.registry),
                &engine.component_types,
                &engine.services,
            )
            .with_mode(self.mode)
            .with_staged_roots(&staged_roots)
            .instantiate(&plan.blueprint, plan.id.clone());
            match result {
                Ok(root) => {
                    staged_roots.insert(plan.id.clone(), root);
                    self.built.push(root);
                }
                Err(errors) => report.merge(errors),
            }
        }
        report.check()
    }

    fn commit(&mut self) -> ReloadSummary {
        self.tracker.advance(ReloadPhase::Committing);
        let engine = &mut *self.engine;

        let objects = self
            .objects
            .take()
            .map(|staged| staged.commit(&mut engine.registry))
            .unwrap_or_default();

        let mut spawned = Vec::new();
        let mut rebuilt = Vec::new();
        let plans = std::mem::take(&mut self.plans);
        let built = std::mem::take(&mut self.built);
        for (plan, root) in plans.into_iter().zip(built) {
            match plan.replaces {
                Some(old) => {
                    engine.scene.replace(old, root, plan.blueprint);
                    rebuilt.push(plan.id);
                }
                None => {
                    engine.scene.activate(root, plan.blueprint);
                    spawned.push(plan.id);
                }
            }
        }

        for desc in self.descriptors.drain(..) {
            engine.descriptors.insert(desc.id.clone(), desc);
        }
        let registry = &engine.registry;
        engine.descriptors.retain(|id, _| registry.contains(id.as_str()));
        engine.check_retire_queue();

        self.tracker.advance(ReloadPhase::Idle);
        log::info!(
            "Committed {} new, {} replaced, {} restaged object(s); {} composite(s) spawned, {} rebuilt",
            objects.added.len(),
            objects.replaced.len(),
            self.restaged.len(),
            spawned.len(),
            rebuilt.len()
        );

        ReloadSummary {
            objects,
            restaged: std::mem::take(&mut self.restaged),
            spawned,
            rebuilt,
            phases: self.tracker.history().to_vec(),
        }
    }

    /// Discard every candidate. A no-op once the transaction has finished.
    fn roll_back(&mut self, report: Option<&ErrorReport>) {
        if !self.tracker.current().is_cancellable() {
            return;
        }
        self.tracker.advance(ReloadPhase::RollingBack);
        let engine = &mut *self.engine;

        let mut composites = 0;
        for root in self.built.drain(..) {
            composites += engine.scene.discard(root);
        }
        let objects = self
            .objects
            .take()
            .map_or(0, |staged| staged.discard(&mut engine.registry));

        self.tracker.advance(ReloadPhase::Idle);
        match report {
            Some(report) => log::warn!(
                "Rolled back {} object(s) and {} composite(s) after {} error(s): {}",
                objects,
                composites,
                report.len(),
                report
            ),
            None => log::info!("Aborted; discarded {} object(s) and {} composite(s)", objects, composites),
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.roll_back(None);
    }
}

/// Grow a batch with the live objects it drags along: objects that reference
/// batch members (when enabled), owners of batch members, and everything a
/// batch member embeds. Returns the grown descriptor list and the identifiers
/// that were added to it.
fn expand(engine: &Engine, objects: Vec<ObjectDescriptor>) -> (Vec<ObjectDescriptor>, Vec<ObjectId>) {
    let mut ids: BTreeSet<ObjectId> = objects.iter().map(|d| d.id.clone()).collect();
    let mut descriptors = objects;
    let mut restaged = Vec::new();
    let mut unknown = BTreeSet::new();

    loop {
        let mut extra = BTreeSet::new();
        if engine.config.reinit_dependents {
            extra.extend(engine.registry.dependents(&ids));
        }
        for id in &ids {
            let owner = engine
                .registry
                .find(id.as_str())
                .and_then(|o| o.owner())
                .and_then(|h| engine.registry.get(h));
            if let Some(owner) = owner {
                extra.insert(owner.id().clone());
            }
        }
        for desc in &descriptors {
            extra.extend(desc.embedded().map(ObjectId::from));
        }

        let mut grew = false;
        for id in extra {
            if ids.contains(&id) || unknown.contains(&id) {
                continue;
            }
            match engine.descriptors.get(&id) {
                Some(desc) => {
                    descriptors.push(desc.clone());
                    restaged.push(id.clone());
                    ids.insert(id);
                    grew = true;
                }
                None => {
                    log::debug!("No retained descriptor for '{}'; not restaged", id);
                    unknown.insert(id);
                }
            }
        }
        if !grew {
            return (descriptors, restaged);
        }
    }
}

/// Decide which root composites to build: one per blueprint in the batch
/// (replacing every live root built from it), plus a rebuild of every live
/// root whose components link an affected object or point into a rebuilt
/// tree. Roots are ordered so that absolute pointer targets are built first.
fn plan_roots(scene: &Scene, blueprints: Vec<CompositeBlueprint>, affected: &BTreeSet<ObjectId>) -> Vec<RootPlan> {
    let mut plans = Vec::new();
    let mut planned = BTreeSet::new();
    let root_id = |root: CompositeHandle| scene.composite(root).map(|c| c.id().clone());

    for blueprint in blueprints {
        let roots = scene.roots_from(blueprint.id.as_str());
        if roots.is_empty() {
            plans.push(RootPlan {
                id: scene.unique_root_id(blueprint.id.as_str()),
                replaces: None,
                blueprint,
            });
            continue;
        }
        for root in roots {
            if let Some(id) = root_id(root) {
                planned.insert(root);
                plans.push(RootPlan {
                    id,
                    replaces: Some(root),
                    blueprint: blueprint.clone(),
                });
            }
        }
    }

    let mut rebuild = |root: CompositeHandle, plans: &mut Vec<RootPlan>| {
        if !planned.insert(root) {
            return false;
        }
        match (root_id(root), scene.root_blueprint(root)) {
            (Some(id), Some(blueprint)) => {
                plans.push(RootPlan {
                    id,
                    replaces: Some(root),
                    blueprint: blueprint.clone(),
                });
                true
            }
            _ => false,
        }
    };

    for root in scene.roots_linking(affected) {
        rebuild(root, &mut plans);
    }

    // Pointers into a rebuilt tree would keep the retired components
    loop {
        let replaced: BTreeSet<CompositeHandle> = plans.iter().filter_map(|p| p.replaces).collect();
        let mut grew = false;
        for root in scene.roots_pointing_into(&replaced) {
            grew |= rebuild(root, &mut plans);
        }
        if !grew {
            break;
        }
    }

    order_plans(plans)
}

/// Stable order in which every plan comes after the plans its absolute
/// pointers name. Cycles keep declaration order; the pointer that closes
/// the cycle then fails to resolve.
fn order_plans(plans: Vec<RootPlan>) -> Vec<RootPlan> {
    let needs: Vec<BTreeSet<String>> = plans.iter().map(|p| p.blueprint.pointer_roots()).collect();
    let mut pending: Vec<usize> = (0..plans.len()).collect();
    let mut order = Vec::with_capacity(plans.len());
    while !pending.is_empty() {
        let next = pending
            .iter()
            .position(|&i| {
                !pending
                    .iter()
                    .any(|&j| j != i && needs[i].contains(plans[j].id.as_str()))
            })
            .unwrap_or(0);
        order.push(pending.remove(next));
    }

    let mut slots: Vec<Option<RootPlan>> = plans.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// A staged transaction waiting for validation
pub struct Reload<'e> {
    txn: Transaction<'e>,
}

impl<'e> Reload<'e> {
    /// Stage `batch` against `engine`. On error nothing was changed.
    pub(crate) fn stage(engine: &'e mut Engine, batch: DescriptorBatch, mode: StageMode) -> BatchResult<Self> {
        Transaction::stage(engine, batch, mode).map(|txn| Self { txn })
    }

    /// Current phase
    pub fn phase(&self) -> ReloadPhase {
        self.txn.tracker.current()
    }

    /// Identifiers of every staged candidate
    pub fn staged(&self) -> Vec<&ObjectId> {
        self.txn.descriptors.iter().map(|d| &d.id).collect()
    }

    /// Staged identifiers that were not in the batch
    pub fn restaged(&self) -> &[ObjectId] {
        &self.txn.restaged
    }

    /// Identifiers of the root composites that will be built
    pub fn composites(&self) -> Vec<&ObjectId> {
        self.txn.plans.iter().map(|p| &p.id).collect()
    }

    /// Resolve, initialize and build candidates. On error the whole
    /// transaction has already been rolled back.
    pub fn validate(mut self) -> BatchResult<Validated<'e>> {
        self.txn.validate()?;
        Ok(Validated { txn: self.txn })
    }

    /// Throw the candidates away
    pub fn abort(mut self) {
        self.txn.roll_back(None);
    }
}

/// A validated transaction; committing it cannot fail
pub struct Validated<'e> {
    txn: Transaction<'e>,
}

impl<'e> Validated<'e> {
    /// Current phase
    pub fn phase(&self) -> ReloadPhase {
        self.txn.tracker.current()
    }

    /// Swap every candidate in and retire what it replaces
    pub fn commit(mut self) -> ReloadSummary {
        self.txn.commit()
    }

    /// Throw the candidates away
    pub fn abort(mut self) {
        self.txn.roll_back(None);
    }
}
