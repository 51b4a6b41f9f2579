//! Per-entity blacklist with tick-based expiry.
//!
//! Each `(entity, resource)` pair is either absent or active. An active pair
//! has a timestamp and exactly one pending `BlacklistExpiry` event in the
//! scheduler at `timestamp + duration`. Every mutation keeps the active set,
//! the timestamps, the scheduler and the identity registry in step.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};

use contracts::{
    BlacklistConfig, BlacklistEntryView, BlacklistSnapshot, EntityBlacklistView, EntityId,
    EntityRef, EventKind, ExpiredEntry, RebuildSummary, ResourceDef, ResourceHash, Tick,
    TimestampRecord, SCHEMA_VERSION_V1,
};

use crate::log_batcher::LogBatcher;
use crate::registry::IdentityRegistry;
use crate::scheduler::{ScheduledEvent, TickEventHandler, TickEventScheduler};
use crate::world::WorldView;

const EXPIRY: EventKind = EventKind::BlacklistExpiry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    EmptyActiveSet(EntityId),
    TimestampMismatch(EntityId),
    OrphanTimestamps(EntityId),
    TimerCount {
        entity_id: EntityId,
        resource_hash: ResourceHash,
        pending: usize,
    },
    TimerTick {
        entity_id: EntityId,
        resource_hash: ResourceHash,
        expected: Tick,
        actual: Option<Tick>,
    },
    OrphanTimer {
        entity_id: EntityId,
        resource_hash: ResourceHash,
        tick: Tick,
    },
    EmptyBucket,
    UnregisteredEntity(EntityId),
    UnregisteredResource(ResourceHash),
    UnreferencedResource(ResourceHash),
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyActiveSet(id) => write!(f, "entity {id} has an empty active set"),
            Self::TimestampMismatch(id) => {
                write!(f, "entity {id} timestamps do not match its active set")
            }
            Self::OrphanTimestamps(id) => {
                write!(f, "entity {id} has timestamps but no active set")
            }
            Self::TimerCount {
                entity_id,
                resource_hash,
                pending,
            } => write!(
                f,
                "pair ({entity_id}, {resource_hash}) has {pending} pending timers, expected 1"
            ),
            Self::TimerTick {
                entity_id,
                resource_hash,
                expected,
                actual,
            } => write!(
                f,
                "pair ({entity_id}, {resource_hash}) timer at {actual:?}, expected {expected}"
            ),
            Self::OrphanTimer {
                entity_id,
                resource_hash,
                tick,
            } => write!(
                f,
                "timer at {tick} for inactive pair ({entity_id}, {resource_hash})"
            ),
            Self::EmptyBucket => write!(f, "scheduler holds an empty bucket"),
            Self::UnregisteredEntity(id) => write!(f, "active entity {id} is not registered"),
            Self::UnregisteredResource(hash) => {
                write!(f, "active resource {hash} is not registered")
            }
            Self::UnreferencedResource(hash) => {
                write!(f, "resource {hash} is registered but no entry references it")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

#[derive(Debug, Clone)]
pub struct BlacklistStore {
    config: BlacklistConfig,
    duration: u64,
    current_tick: Tick,
    active: BTreeMap<EntityId, BTreeSet<ResourceHash>>,
    timestamps: BTreeMap<EntityId, BTreeMap<ResourceHash, Tick>>,
    registry: IdentityRegistry,
    scheduler: TickEventScheduler<EventKind>,
    log_batcher: LogBatcher,
    /// Expiries delivered by the dispatch in progress.
    expired: Vec<ExpiredEntry>,
}

impl BlacklistStore {
    pub fn new(config: BlacklistConfig) -> Self {
        Self {
            duration: config.effective_duration(),
            current_tick: config.starting_tick,
            config,
            active: BTreeMap::new(),
            timestamps: BTreeMap::new(),
            registry: IdentityRegistry::new(),
            scheduler: TickEventScheduler::new(),
            log_batcher: LogBatcher::new(),
            expired: Vec::new(),
        }
    }

    pub fn config(&self) -> &BlacklistConfig {
        &self.config
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Moves the clock without firing anything.
    pub fn set_current_tick(&mut self, tick: Tick) {
        self.current_tick = tick;
    }

    pub fn set_debug_logging(&mut self, enabled: bool) {
        self.config.debug_logging = enabled;
        if !enabled {
            self.log_batcher.clear();
        }
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &TickEventScheduler<EventKind> {
        &self.scheduler
    }

    // -- queries ------------------------------------------------------------

    pub fn is_blacklisted(&self, resource: &ResourceDef, entity: &EntityRef) -> bool {
        self.contains(entity.id, resource.hash)
    }

    pub fn contains(&self, entity_id: EntityId, resource_hash: ResourceHash) -> bool {
        self.active
            .get(&entity_id)
            .is_some_and(|set| set.contains(&resource_hash))
    }

    pub fn blacklisted_at(&self, entity_id: EntityId, resource_hash: ResourceHash) -> Option<Tick> {
        self.timestamps
            .get(&entity_id)
            .and_then(|entries| entries.get(&resource_hash))
            .copied()
    }

    pub fn expires_at(&self, entity_id: EntityId, resource_hash: ResourceHash) -> Option<Tick> {
        self.blacklisted_at(entity_id, resource_hash)
            .map(|stamp| stamp.saturating_add(self.duration))
    }

    pub fn blacklisted_for(&self, entity_id: EntityId) -> Vec<ResourceDef> {
        self.active
            .get(&entity_id)
            .map(|set| {
                set.iter()
                    .filter_map(|hash| self.registry.resolve_hash(*hash).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn tracked_entity_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_entry_count(&self) -> usize {
        self.active.values().map(BTreeSet::len).sum()
    }

    pub fn pending_log_notes(&self) -> usize {
        self.log_batcher.pending_len()
    }

    // -- transitions --------------------------------------------------------

    /// Blacklists `resource` for `entity` until `now + duration`. Re-adding an
    /// active pair moves its expiry instead of adding a second timer.
    pub fn add(&mut self, resource: &ResourceDef, entity: &EntityRef, reason: &str) {
        self.registry.register(entity);
        self.registry.register_hash(resource);

        let (entity_id, resource_hash) = (entity.id, resource.hash);
        if self.contains(entity_id, resource_hash) {
            self.scheduler
                .cancel(EXPIRY, entity_id.get(), resource_hash.get());
        }

        let stamp = self.current_tick;
        self.timestamps
            .entry(entity_id)
            .or_default()
            .insert(resource_hash, stamp);
        self.active.entry(entity_id).or_default().insert(resource_hash);
        self.scheduler.schedule(
            stamp.saturating_add(self.duration),
            EXPIRY,
            entity_id.get(),
            resource_hash.get(),
        );

        if self.config.debug_logging {
            self.log_batcher.record(entity, reason, &resource.label);
        }
    }

    /// Returns whether the pair was active. The entity's registry mapping is
    /// kept; `cleanup` sweeps it once nothing references it.
    pub fn remove(&mut self, resource: &ResourceDef, entity: &EntityRef) -> bool {
        self.remove_entry(entity.id, resource.hash)
    }

    /// Expiry path for a fired event. Unresolvable ids are ignored. A timer
    /// still pending for the pair is cancelled so a direct call leaves no
    /// orphan behind.
    pub fn on_expired(
        &mut self,
        entity_id: EntityId,
        resource_hash: ResourceHash,
    ) -> Option<ExpiredEntry> {
        if self.registry.resolve(entity_id).is_none()
            || self.registry.resolve_hash(resource_hash).is_none()
        {
            tracing::trace!(%entity_id, %resource_hash, "expiry for unregistered ids dropped");
            return None;
        }

        if !self.remove_entry(entity_id, resource_hash) {
            tracing::trace!(%entity_id, %resource_hash, "expiry for inactive pair dropped");
            return None;
        }

        Some(ExpiredEntry {
            entity_id,
            resource_hash,
            tick: self.current_tick,
        })
    }

    /// Sets the clock to `tick` and dispatches that tick's bucket. Only the
    /// exact bucket is drained; callers advancing by more than one tick fire
    /// each intermediate tick themselves.
    pub fn advance_to(&mut self, tick: Tick) -> Vec<ExpiredEntry> {
        self.current_tick = tick;
        for event in self.scheduler.fire(tick) {
            self.handle_event(event);
        }
        std::mem::take(&mut self.expired)
    }

    pub fn clear_entity(&mut self, entity: &EntityRef) -> usize {
        self.evict_entity(entity.id)
    }

    pub fn clear_all(&mut self) {
        for (entity_id, resources) in &self.active {
            for hash in resources {
                self.scheduler.cancel(EXPIRY, entity_id.get(), hash.get());
            }
        }
        self.active.clear();
        self.timestamps.clear();
        self.registry.clear();
        self.log_batcher.clear();
    }

    /// Evicts every entity the world reports destroyed or dead, then drops
    /// registry mappings that no longer back an active entry.
    pub fn cleanup(&mut self, world: &impl WorldView) -> Vec<EntityId> {
        let dead = self
            .active
            .keys()
            .copied()
            .filter(|entity_id| match self.registry.resolve(*entity_id) {
                Some(entity) => world.is_destroyed_or_dead(entity),
                None => true,
            })
            .collect::<Vec<_>>();

        for entity_id in &dead {
            let evicted = self.evict_entity(*entity_id);
            tracing::debug!(%entity_id, evicted, "evicted blacklist entries of dead entity");
        }

        let active = &self.active;
        let referenced = active
            .values()
            .flat_map(|set| set.iter().copied())
            .collect::<BTreeSet<_>>();
        self.registry
            .retain(|id| active.contains_key(&id), |hash| referenced.contains(&hash));

        dead
    }

    /// Replaces all state with entries rebuilt from persisted triples.
    ///
    /// Entries of dead or unknown entities and unknown resources are dropped,
    /// and so are entries whose expiry is not after the current tick. Stale
    /// entries vanish silently; no expiry is reported for them.
    pub fn rebuild_from_timestamps(
        &mut self,
        records: impl IntoIterator<Item = TimestampRecord>,
        world: &impl WorldView,
    ) -> RebuildSummary {
        self.reset();

        let mut restored = BTreeMap::<EntityId, BTreeMap<ResourceHash, Tick>>::new();
        for record in records {
            let slot = restored
                .entry(record.entity_id)
                .or_default()
                .entry(record.resource_hash)
                .or_insert(record.blacklisted_at);
            *slot = (*slot).max(record.blacklisted_at);
        }

        let mut summary = RebuildSummary::default();
        for (entity_id, entries) in restored {
            let entity = match world.entity(entity_id) {
                Some(entity) if !world.is_destroyed_or_dead(&entity) => entity,
                _ => {
                    summary.dropped_dead += entries.len();
                    continue;
                }
            };

            for (resource_hash, stamp) in entries {
                let Some(resource) = world.resource(resource_hash) else {
                    summary.dropped_unresolved += 1;
                    continue;
                };

                let expire_tick = stamp.saturating_add(self.duration);
                if expire_tick <= self.current_tick {
                    summary.dropped_stale += 1;
                    continue;
                }

                self.registry.register(&entity);
                self.registry.register_hash(&resource);
                self.timestamps
                    .entry(entity_id)
                    .or_default()
                    .insert(resource_hash, stamp);
                self.active.entry(entity_id).or_default().insert(resource_hash);
                self.scheduler
                    .schedule(expire_tick, EXPIRY, entity_id.get(), resource_hash.get());
                summary.restored += 1;
            }
        }

        tracing::debug!(
            restored = summary.restored,
            dropped_stale = summary.dropped_stale,
            dropped_dead = summary.dropped_dead,
            dropped_unresolved = summary.dropped_unresolved,
            "rebuilt blacklist schedule"
        );
        summary
    }

    /// Tears down every map, the scheduler and pending log notes.
    pub fn reset(&mut self) {
        self.active.clear();
        self.timestamps.clear();
        self.registry.clear();
        self.scheduler.reset();
        self.log_batcher.clear();
        self.expired.clear();
    }

    pub fn flush_logs(&mut self) -> Vec<String> {
        self.log_batcher.flush()
    }

    // -- persistence and inspection -------------------------------------------

    pub fn export_timestamps(&self) -> Vec<TimestampRecord> {
        self.timestamps
            .iter()
            .flat_map(|(entity_id, entries)| {
                entries.iter().map(move |(resource_hash, stamp)| TimestampRecord {
                    entity_id: *entity_id,
                    resource_hash: *resource_hash,
                    blacklisted_at: *stamp,
                })
            })
            .collect()
    }

    pub fn snapshot(&self) -> BlacklistSnapshot {
        let entities = self
            .active
            .iter()
            .map(|(entity_id, resources)| EntityBlacklistView {
                entity: self.entity_or_placeholder(*entity_id),
                entries: resources
                    .iter()
                    .map(|hash| {
                        let blacklisted_at = self.blacklisted_at(*entity_id, *hash).unwrap_or(0);
                        BlacklistEntryView {
                            resource: self.resource_or_placeholder(*hash),
                            blacklisted_at,
                            expires_at: blacklisted_at.saturating_add(self.duration),
                        }
                    })
                    .collect(),
            })
            .collect();

        BlacklistSnapshot {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            tick: self.current_tick,
            duration_ticks: self.duration,
            pending_timers: self.scheduler.pending_len(),
            entities,
        }
    }

    /// One line per tracked entity with its blacklisted resources by label.
    pub fn debug_info(&self) -> String {
        let mut out = format!(
            "blacklist tick={} duration={} entities={} entries={} timers={}",
            self.current_tick,
            self.duration,
            self.tracked_entity_count(),
            self.active_entry_count(),
            self.scheduler.pending_len()
        );
        for view in self.snapshot().entities {
            let entries = view
                .entries
                .iter()
                .map(|entry| format!("{} (until {})", entry.resource.label, entry.expires_at))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, "\n  {} [{}]: {}", view.entity.label, view.entity.id, entries);
        }
        out
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.scheduler.has_empty_bucket() {
            return Err(InvariantViolation::EmptyBucket);
        }

        for (entity_id, resources) in &self.active {
            if resources.is_empty() {
                return Err(InvariantViolation::EmptyActiveSet(*entity_id));
            }
            let stamped = self
                .timestamps
                .get(entity_id)
                .map(|entries| entries.keys().copied().collect::<BTreeSet<_>>());
            if stamped.as_ref() != Some(resources) {
                return Err(InvariantViolation::TimestampMismatch(*entity_id));
            }
            if self.registry.resolve(*entity_id).is_none() {
                return Err(InvariantViolation::UnregisteredEntity(*entity_id));
            }

            for resource_hash in resources {
                if self.registry.resolve_hash(*resource_hash).is_none() {
                    return Err(InvariantViolation::UnregisteredResource(*resource_hash));
                }
                let pending =
                    self.scheduler
                        .pending_for(EXPIRY, entity_id.get(), resource_hash.get());
                if pending != 1 {
                    return Err(InvariantViolation::TimerCount {
                        entity_id: *entity_id,
                        resource_hash: *resource_hash,
                        pending,
                    });
                }
                let expected = self
                    .expires_at(*entity_id, *resource_hash)
                    .unwrap_or_default();
                let actual =
                    self.scheduler
                        .due_tick_for(EXPIRY, entity_id.get(), resource_hash.get());
                if actual != Some(expected) {
                    return Err(InvariantViolation::TimerTick {
                        entity_id: *entity_id,
                        resource_hash: *resource_hash,
                        expected,
                        actual,
                    });
                }
            }
        }

        if let Some(entity_id) = self
            .timestamps
            .keys()
            .find(|entity_id| !self.active.contains_key(entity_id))
        {
            return Err(InvariantViolation::OrphanTimestamps(*entity_id));
        }

        // Resource mappings are released as soon as the last entry goes.
        if let Some(resource_hash) = self.registry.resource_hashes().find(|hash| {
            !self
                .active
                .values()
                .any(|resources| resources.contains(hash))
        }) {
            return Err(InvariantViolation::UnreferencedResource(resource_hash));
        }

        for event in self.scheduler.iter().filter(|event| event.kind == EXPIRY) {
            let (entity_id, resource_hash) = (EntityId(event.id_a), ResourceHash(event.id_b));
            if !self.contains(entity_id, resource_hash) {
                return Err(InvariantViolation::OrphanTimer {
                    entity_id,
                    resource_hash,
                    tick: event.tick,
                });
            }
        }

        Ok(())
    }

    // -- internals ----------------------------------------------------------

    fn remove_entry(&mut self, entity_id: EntityId, resource_hash: ResourceHash) -> bool {
        let Some(resources) = self.active.get_mut(&entity_id) else {
            return false;
        };
        if !resources.remove(&resource_hash) {
            return false;
        }
        let emptied = resources.is_empty();

        // No-op when the event was already drained by `fire`.
        self.scheduler
            .cancel(EXPIRY, entity_id.get(), resource_hash.get());
        if let Some(entries) = self.timestamps.get_mut(&entity_id) {
            entries.remove(&resource_hash);
        }
        if emptied {
            self.active.remove(&entity_id);
            self.timestamps.remove(&entity_id);
            self.log_batcher.drop_entity(entity_id);
        }
        self.release_hash_if_unused(resource_hash);
        true
    }

    fn evict_entity(&mut self, entity_id: EntityId) -> usize {
        self.registry.unregister(entity_id);
        self.log_batcher.drop_entity(entity_id);
        self.timestamps.remove(&entity_id);
        let Some(resources) = self.active.remove(&entity_id) else {
            return 0;
        };

        for resource_hash in &resources {
            self.scheduler
                .cancel(EXPIRY, entity_id.get(), resource_hash.get());
        }
        for resource_hash in &resources {
            self.release_hash_if_unused(*resource_hash);
        }
        resources.len()
    }

    fn release_hash_if_unused(&mut self, resource_hash: ResourceHash) {
        let referenced = self
            .active
            .values()
            .any(|resources| resources.contains(&resource_hash));
        if !referenced {
            self.registry.unregister_hash(resource_hash);
        }
    }

    fn entity_or_placeholder(&self, entity_id: EntityId) -> EntityRef {
        self.registry
            .resolve(entity_id)
            .cloned()
            .unwrap_or_else(|| EntityRef::new(entity_id, format!("entity#{entity_id}")))
    }

    fn resource_or_placeholder(&self, resource_hash: ResourceHash) -> ResourceDef {
        self.registry
            .resolve_hash(resource_hash)
            .cloned()
            .unwrap_or_else(|| ResourceDef::new(resource_hash, format!("resource#{resource_hash}")))
    }
}

impl TickEventHandler<EventKind> for BlacklistStore {
    fn handle_event(&mut self, event: ScheduledEvent<EventKind>) {
        match event.kind {
            EventKind::BlacklistExpiry => {
                if let Some(expired) =
                    self.on_expired(EntityId(event.id_a), ResourceHash(event.id_b))
                {
                    self.expired.push(expired);
                }
            }
        }
    }
}
