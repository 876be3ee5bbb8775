//! Node composition and timer loops.
//!
//! The [`Node`] wires the curse engine to an [`EntityStore`], a
//! [`CurseStore`] backend, an injected [`Clock`] and a broadcast channel of
//! [`CurseEvent`]s. Each joined entity gets one timer task driving its
//! sample, expiry and narehate steps; every step locks that entity's mutex,
//! so steps for one entity never interleave.
//!
//! Persistence runs on the blocking pool against owned snapshots. Failures
//! are logged and never stop sampling.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use abyss_core::clock::SystemClock;
use abyss_core::constants::EVENT_CHANNEL_CAPACITY;
use abyss_core::error::{AbyssError, ConfigError, StorageError};
use abyss_core::events::CurseEvent;
use abyss_core::region::{ExemptionZone, RegionConfig, RegionMode};
use abyss_core::traits::{Clock, CurseEventSink, CurseStore, ExemptionSet};
use abyss_core::types::{EntityId, Narehate, Position};
use abyss_curse::{
    CurseStateMachine, EntityCurseState, ExemptionRegistry, NarehateConverter, NarehateOutcome,
    RegionClassifier, SampleOutcome,
};

use crate::config::NodeConfig;
use crate::storage::{MemoryStore, RocksStore};
use crate::store::{EntityStore, SharedState};

/// Publishes engine events on the node's broadcast channel.
struct Broadcast<'a>(&'a broadcast::Sender<CurseEvent>);

impl CurseEventSink for Broadcast<'_> {
    fn emit(&mut self, event: CurseEvent) {
        // Having no subscribers is fine.
        let _ = self.0.send(event);
    }
}

/// Latest host-reported facts about a joined entity.
#[derive(Debug, Clone, Copy)]
struct Session {
    position: Position,
    deep_debuff: bool,
}

/// Engine parts built from one region snapshot. Swapped whole on reload.
struct Engine {
    machine: CurseStateMachine,
    converter: NarehateConverter,
}

impl Engine {
    fn build(region: Arc<RegionConfig>, registry: &Arc<ExemptionRegistry>) -> Self {
        let exemptions: Arc<dyn ExemptionSet> = registry.clone();
        let converter = NarehateConverter::new(
            region.narehate_cap(),
            region.narehate_cap_probability,
            Arc::clone(registry),
        );
        Self {
            machine: CurseStateMachine::new(RegionClassifier::new(region, exemptions)),
            converter,
        }
    }
}

/// Read-only view of one entity for debug tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityReport {
    pub entity: EntityId,
    pub safe_height: f64,
    pub last_y: f64,
    pub rise_total: f64,
    pub rise_records: usize,
    pub layer: u8,
    pub remaining_ticks: u64,
    pub arm: Option<i64>,
    pub narehate: Narehate,
    pub exposure_secs: Option<u64>,
    pub alive: bool,
    pub exempt: bool,
}

/// The curse service, composing engine, storage, timers and event fan-out.
pub struct Node {
    config: NodeConfig,
    engine: RwLock<Arc<Engine>>,
    registry: Arc<ExemptionRegistry>,
    entities: EntityStore,
    sessions: DashMap<EntityId, Session>,
    timers: DashMap<EntityId, JoinHandle<()>>,
    /// Quit entities whose final save failed. Evicted by the next save that
    /// persists them.
    pending_evict: DashSet<EntityId>,
    store: Arc<dyn CurseStore>,
    clock: Arc<dyn Clock>,
    rng: Mutex<Box<dyn RngCore + Send>>,
    events: broadcast::Sender<CurseEvent>,
}

impl Node {
    /// Open the configured backend (RocksDB, or memory when ephemeral) with
    /// the system clock.
    pub fn open(config: NodeConfig) -> Result<Arc<Self>, AbyssError> {
        let store: Arc<dyn CurseStore> = if config.ephemeral {
            Arc::new(MemoryStore::new())
        } else {
            std::fs::create_dir_all(&config.data_dir)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Arc::new(RocksStore::open(config.db_path())?)
        };
        Self::new(config, store, Arc::new(SystemClock))
    }

    /// Create a node over an explicit store and clock.
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn CurseStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, AbyssError> {
        Self::with_rng(config, store, clock, Box::new(StdRng::from_entropy()))
    }

    /// Like [`new`](Self::new) with a caller-supplied random source for the
    /// narehate draws.
    pub fn with_rng(
        config: NodeConfig,
        store: Arc<dyn CurseStore>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn RngCore + Send>,
    ) -> Result<Arc<Self>, AbyssError> {
        config.validate()?;

        let registry = match store.load_exemptions() {
            Ok(ids) => ExemptionRegistry::from_ids(ids),
            Err(e) => {
                warn!(error = %e, "failed to load exemption grants, starting empty");
                ExemptionRegistry::new()
            }
        };
        let registry = Arc::new(registry);
        let engine = Engine::build(Arc::new(config.region.clone()), &registry);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            mode = %config.region.mode,
            radius = config.region.radius,
            exempt = registry.len(),
            "curse node initialized"
        );

        Ok(Arc::new(Self {
            config,
            engine: RwLock::new(Arc::new(engine)),
            registry,
            entities: EntityStore::new(),
            sessions: DashMap::new(),
            timers: DashMap::new(),
            pending_evict: DashSet::new(),
            store,
            clock,
            rng: Mutex::new(rng),
            events,
        }))
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CurseEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Live region snapshot.
    pub fn region(&self) -> Arc<RegionConfig> {
        Arc::clone(self.engine().machine.classifier().config())
    }

    pub fn tracked(&self) -> Vec<EntityId> {
        self.entities.ids()
    }

    pub fn is_tracked(&self, id: &EntityId) -> bool {
        self.entities.contains(id)
    }

    fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine.read())
    }

    fn sink(&self) -> Broadcast<'_> {
        Broadcast(&self.events)
    }

    fn handle(&self, id: &EntityId) -> Result<SharedState, AbyssError> {
        self.entities
            .get(id)
            .ok_or_else(|| AbyssError::UnknownEntity(id.to_string()))
    }

    fn session(&self, id: &EntityId) -> Result<Session, AbyssError> {
        self.sessions
            .get(id)
            .map(|s| *s)
            .ok_or_else(|| AbyssError::UnknownEntity(id.to_string()))
    }

    /// Run a store write on the blocking pool, or inline outside a runtime.
    fn offload<F>(&self, what: &'static str, id: EntityId, write: F)
    where
        F: FnOnce(&dyn CurseStore) -> Result<(), StorageError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = move || {
            if let Err(e) = write(store.as_ref()) {
                warn!(entity = %id, error = %e, "{} failed", what);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn_blocking(task);
            }
            Err(_) => task(),
        }
    }

    // --- Lifecycle ---

    /// Join or reconnect. Loads persisted state (fresh on absence or
    /// corruption), applies the reconnect rules and starts the timers.
    pub async fn join(self: &Arc<Self>, id: EntityId, pos: Position) {
        let handle = match self.entities.get(&id) {
            Some(handle) => handle,
            None => {
                let state = self.load_or_create(id, pos.y).await;
                self.entities.put(state)
            }
        };
        self.pending_evict.remove(&id);
        self.sessions.insert(id, Session { position: pos, deep_debuff: false });

        {
            let engine = self.engine();
            let now = self.clock.now();
            let mut state = handle.lock();
            engine.machine.on_join(&mut state, &pos, now, &mut self.sink());
        }

        self.spawn_timers(id);
        info!(entity = %id, y = pos.y, "entity joined");
    }

    async fn load_or_create(&self, id: EntityId, y: f64) -> EntityCurseState {
        let window = self.region().rise_window();
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.load(&id)).await {
            Ok(Ok(Some(snapshot))) => EntityCurseState::from_snapshot(id, &snapshot, window),
            Ok(Ok(None)) => EntityCurseState::new(id, y, window),
            Ok(Err(e)) => {
                warn!(entity = %id, error = %e, "failed to load curse state, starting fresh");
                EntityCurseState::new(id, y, window)
            }
            Err(e) => {
                warn!(entity = %id, error = %e, "curse state load task failed, starting fresh");
                EntityCurseState::new(id, y, window)
            }
        }
    }

    /// Quit. Stops the timers, persists a snapshot and evicts the entity
    /// once the write succeeded. Returns whether it was persisted; if not,
    /// the next successful save evicts it.
    pub async fn quit(&self, id: EntityId) -> Result<bool, AbyssError> {
        if let Some((_, timer)) = self.timers.remove(&id) {
            timer.abort();
        }
        self.sessions.remove(&id);
        let handle = self.handle(&id)?;

        let snapshot = {
            let state = handle.lock();
            self.engine().machine.on_quit(&state, &mut self.sink());
            state.snapshot()
        };

        let store = Arc::clone(&self.store);
        let saved = tokio::task::spawn_blocking(move || store.save(&id, &snapshot))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
            .and_then(|r| r);

        match saved {
            Ok(()) => {
                self.entities.delete(&id);
                info!(entity = %id, "entity quit, curse state saved");
                Ok(true)
            }
            Err(e) => {
                warn!(entity = %id, error = %e, "failed to save curse state on quit, keeping it in memory");
                self.pending_evict.insert(id);
                Ok(false)
            }
        }
    }

    /// Death interrupt at `pos`. Returns whether the death came from a live
    /// curse.
    pub fn death(&self, id: EntityId, pos: Position) -> Result<bool, AbyssError> {
        let handle = self.handle(&id)?;
        self.update_position(id, pos)?;
        let now = self.clock.now();
        let mut state = handle.lock();
        Ok(self.engine().machine.on_death(&mut state, pos.y, now, &mut self.sink()))
    }

    pub fn respawn(&self, id: EntityId, pos: Position) -> Result<(), AbyssError> {
        let handle = self.handle(&id)?;
        self.update_position(id, pos)?;
        let mut state = handle.lock();
        self.engine().machine.on_respawn(&mut state, pos.y);
        Ok(())
    }

    /// Record the latest position. The next sample step reads it.
    pub fn update_position(&self, id: EntityId, pos: Position) -> Result<(), AbyssError> {
        let mut session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AbyssError::UnknownEntity(id.to_string()))?;
        session.position = pos;
        Ok(())
    }

    /// Record whether the host currently sees the deep-curse debuff.
    pub fn set_deep_debuff(&self, id: EntityId, present: bool) -> Result<(), AbyssError> {
        let mut session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AbyssError::UnknownEntity(id.to_string()))?;
        session.deep_debuff = present;
        Ok(())
    }

    // --- Timer steps ---

    pub fn sample_entity(&self, id: EntityId) -> Result<SampleOutcome, AbyssError> {
        let handle = self.handle(&id)?;
        let session = self.session(&id)?;
        let engine = self.engine();
        let now = self.clock.now();
        let mut state = handle.lock();
        Ok(engine.machine.sample(&mut state, &session.position, now, &mut self.sink()))
    }

    pub fn check_expiry(&self, id: EntityId) -> Result<Option<u8>, AbyssError> {
        let handle = self.handle(&id)?;
        let engine = self.engine();
        let now = self.clock.now();
        let mut state = handle.lock();
        Ok(engine.machine.check_expiry(&mut state, now, &mut self.sink()))
    }

    pub fn check_narehate(&self, id: EntityId) -> Result<NarehateOutcome, AbyssError> {
        let handle = self.handle(&id)?;
        let session = self.session(&id)?;
        let engine = self.engine();
        let now = self.clock.now();

        let outcome = {
            let mut state = handle.lock();
            let mut rng = self.rng.lock();
            engine.converter.check(
                &mut state,
                engine.machine.classifier(),
                &session.position,
                session.deep_debuff,
                now,
                &mut **rng,
                &mut self.sink(),
            )
        };

        if let NarehateOutcome::Converted(_) = outcome {
            self.offload("exemption save", id, move |store| store.save_exemption(&id));
        }
        Ok(outcome)
    }

    fn spawn_timers(self: &Arc<Self>, id: EntityId) {
        let node = Arc::clone(self);
        let sample_every = self.config.sample_interval();
        let expiry_every = self.config.expiry_interval();
        let narehate_every = self.region().narehate_interval();

        let task = tokio::spawn(async move {
            let mut sample = tokio::time::interval(sample_every);
            let mut expiry = tokio::time::interval(expiry_every);
            let mut narehate = tokio::time::interval_at(
                tokio::time::Instant::now() + narehate_every,
                narehate_every,
            );
            for ticker in [&mut sample, &mut expiry, &mut narehate] {
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            }

            loop {
                let step = tokio::select! {
                    _ = sample.tick() => node.sample_entity(id).map(|_| ()),
                    _ = expiry.tick() => node.check_expiry(id).map(|_| ()),
                    _ = narehate.tick() => node.check_narehate(id).map(|_| ()),
                };
                if let Err(e) = step {
                    debug!(entity = %id, error = %e, "entity timers stopping");
                    break;
                }
            }
        });

        if let Some(previous) = self.timers.insert(id, task) {
            previous.abort();
        }
    }

    // --- Queries ---

    /// Whether item use is currently blocked. Expires a lapsed curse.
    pub fn restricts_interaction(&self, id: EntityId) -> Result<bool, AbyssError> {
        let handle = self.handle(&id)?;
        let engine = self.engine();
        let now = self.clock.now();
        let mut state = handle.lock();
        Ok(engine.machine.restricts_interaction(&mut state, now, &mut self.sink()))
    }

    pub fn restricts_chat(&self, id: EntityId) -> Result<bool, AbyssError> {
        let session = self.session(&id)?;
        Ok(self.engine().machine.restricts_chat(&session.position))
    }

    pub fn inspect(&self, id: EntityId) -> Option<EntityReport> {
        let handle = self.entities.get(&id)?;
        let engine = self.engine();
        let now = self.clock.now();
        let state = handle.lock();
        Some(EntityReport {
            entity: state.id,
            safe_height: state.safe_height,
            last_y: state.last_sampled_y,
            rise_total: state.rise.peek_total(),
            rise_records: state.rise.len(),
            layer: state.current_layer(),
            remaining_ticks: state.curse.map_or(0, |c| c.remaining_ticks(now)),
            arm: state.curse.map(|c| c.arm),
            narehate: state.narehate,
            exposure_secs: state.deep_exposure_start.map(|s| s.elapsed_until(now).as_secs()),
            alive: state.alive,
            exempt: engine.machine.classifier().is_exempt_entity(&state.id),
        })
    }

    // --- Administration ---

    /// Grant runtime exemption. Returns `false` if already granted.
    pub fn grant_exemption(&self, id: EntityId) -> bool {
        if !self.registry.grant(id) {
            return false;
        }
        self.sink().emit(CurseEvent::ExemptionGranted { entity: id });
        self.offload("exemption save", id, move |store| store.save_exemption(&id));
        info!(entity = %id, "exemption granted");
        true
    }

    /// Revoke a runtime exemption. Narehate status itself is kept.
    pub fn revoke_exemption(&self, id: EntityId) -> bool {
        if !self.registry.revoke(&id) {
            return false;
        }
        self.sink().emit(CurseEvent::ExemptionRevoked { entity: id });
        self.offload("exemption removal", id, move |store| store.remove_exemption(&id));
        info!(entity = %id, "exemption revoked");
        true
    }

    pub fn exemptions(&self) -> Vec<EntityId> {
        self.registry.list()
    }

    pub fn exemption_zones(&self) -> Vec<ExemptionZone> {
        self.region().exemption_zones.clone()
    }

    /// Add a zone to the live region. Returns its index.
    pub fn add_exemption_zone(&self, zone: ExemptionZone) -> Result<usize, ConfigError> {
        let mut next = (*self.region()).clone();
        next.exemption_zones.push(zone);
        let index = next.exemption_zones.len() - 1;
        self.reload_region(next)?;
        Ok(index)
    }

    pub fn remove_exemption_zone(&self, index: usize) -> Result<Option<ExemptionZone>, ConfigError> {
        let mut next = (*self.region()).clone();
        if index >= next.exemption_zones.len() {
            return Ok(None);
        }
        let removed = next.exemption_zones.remove(index);
        self.reload_region(next)?;
        Ok(Some(removed))
    }

    /// Switch the region mode. Bounded mode needs a positive radius.
    pub fn set_mode(&self, mode: RegionMode) -> Result<(), ConfigError> {
        let current = self.region();
        if mode == RegionMode::Bounded && current.radius <= 0 {
            warn!(radius = current.radius, "refusing bounded mode without a positive radius");
            return Err(ConfigError::InvalidValue {
                field: "mode",
                reason: format!("bounded mode needs a positive radius, got {}", current.radius),
            });
        }
        let mut next = (*current).clone();
        next.mode = mode;
        self.reload_region(next)
    }

    /// Swap in a new region snapshot. Steps already running finish with the
    /// old one. Runtime exemptions carry over; tracked rise windows take the
    /// new length. The narehate interval applies to timers started later.
    pub fn reload_region(&self, region: RegionConfig) -> Result<(), ConfigError> {
        region.validate()?;
        let window = region.rise_window();
        let region = Arc::new(region);
        let engine = Arc::new(Engine::build(Arc::clone(&region), &self.registry));
        *self.engine.write() = engine;

        for handle in self.entities.handles() {
            handle.lock().rise.set_span(window);
        }
        info!(
            mode = %region.mode,
            radius = region.radius,
            layers = region.layers.len(),
            zones = region.exemption_zones.len(),
            "region configuration reloaded"
        );
        Ok(())
    }

    // --- Persistence ---

    /// Persist every tracked entity and flush, then evict quit entities
    /// that are now saved. Returns how many were saved.
    pub async fn save_all(&self) -> usize {
        let snapshots = self.entities.snapshots();
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || {
            let mut saved = Vec::with_capacity(snapshots.len());
            for (id, snapshot) in &snapshots {
                match store.save(id, snapshot) {
                    Ok(()) => saved.push(*id),
                    Err(e) => warn!(entity = %id, error = %e, "failed to save curse state"),
                }
            }
            if let Err(e) = store.flush() {
                warn!(error = %e, "failed to flush curse store");
            }
            saved
        })
        .await;

        match result {
            Ok(saved) => {
                for id in &saved {
                    if !self.sessions.contains_key(id) && self.pending_evict.remove(id).is_some() {
                        self.entities.delete(id);
                        info!(entity = %id, "quit entity saved on retry, evicted");
                    }
                }
                debug!(saved = saved.len(), "curse state saved");
                saved.len()
            }
            Err(e) => {
                warn!(error = %e, "save task failed");
                0
            }
        }
    }

    /// Autosave loop. Runs until the task is dropped.
    pub async fn run(self: &Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.autosave_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let saved = self.save_all().await;
            info!(saved, "autosave complete");
        }
    }

    /// Stop every timer and persist everything.
    pub async fn shutdown(&self) -> usize {
        let ids: Vec<EntityId> = self.timers.iter().map(|r| *r.key()).collect();
        for id in ids {
            if let Some((_, timer)) = self.timers.remove(&id) {
                timer.abort();
            }
        }
        let saved = self.save_all().await;
        info!(saved, "curse node shut down");
        saved
    }
}
