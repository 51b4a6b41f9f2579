//! In-process session facade that drives the blacklist core once per tick,
//! with a roster world, SQLite persistence of blacklist timestamps and an
//! HTTP surface.

mod persistence;
mod roster;
mod server;

use std::path::Path;

use blacklist_core::BlacklistStore;
use contracts::{
    ApiError, BlacklistConfig, BlacklistSnapshot, EntityId, EntityRef, ErrorCode, RebuildSummary,
    ResourceDef, ResourceHash, RosterEntry, SessionStatus, StepReport, Tick, SCHEMA_VERSION_V1,
};
pub use persistence::{PersistedSession, PersistenceError, SqliteSessionStore};
pub use roster::Roster;
pub use server::{serve, ServerError};

#[derive(Debug)]
pub struct SessionApi {
    roster: Roster,
    store: BlacklistStore,
    persistence: Option<SqliteSessionStore>,
    last_persistence_error: Option<String>,
}

impl SessionApi {
    pub fn from_config(config: BlacklistConfig) -> Self {
        Self {
            roster: Roster::default(),
            store: BlacklistStore::new(config),
            persistence: None,
            last_persistence_error: None,
        }
    }

    /// Rebuilds a session from persisted state. Roster and clock come back
    /// as saved; the schedule is reconstructed from the timestamps.
    pub fn from_persisted(session: PersistedSession) -> (Self, RebuildSummary) {
        let PersistedSession {
            config,
            current_tick,
            next_entity_id,
            roster,
            resources,
            timestamps,
        } = session;

        let roster = Roster::restore(roster, resources, next_entity_id);
        let mut store = BlacklistStore::new(config);
        store.set_current_tick(current_tick);
        let summary = store.rebuild_from_timestamps(timestamps, &roster);

        let api = Self {
            roster,
            store,
            persistence: None,
            last_persistence_error: None,
        };
        (api, summary)
    }

    pub fn load_from_sqlite(
        path: impl AsRef<Path>,
        session_id: &str,
    ) -> Result<(Self, RebuildSummary), PersistenceError> {
        let sqlite = SqliteSessionStore::open(path)?;
        let persisted = sqlite.load_session(session_id)?;
        let (mut api, summary) = Self::from_persisted(persisted);
        api.persistence = Some(sqlite);
        tracing::info!(
            session_id,
            tick = api.current_tick(),
            restored = summary.restored,
            dropped_stale = summary.dropped_stale,
            "loaded session"
        );
        Ok((api, summary))
    }

    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        self.persistence = Some(SqliteSessionStore::open(path)?);
        Ok(())
    }

    pub fn save(&mut self) -> Result<(), PersistenceError> {
        let session = self.persisted();
        let Some(sqlite) = self.persistence.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };
        sqlite.save_session(&session)?;
        self.last_persistence_error = None;
        tracing::info!(
            session_id = session.config.session_id.as_str(),
            tick = session.current_tick,
            entries = session.timestamps.len(),
            "saved session"
        );
        Ok(())
    }

    pub fn persisted(&self) -> PersistedSession {
        PersistedSession {
            config: self.store.config().clone(),
            current_tick: self.store.current_tick(),
            next_entity_id: self.roster.next_entity_id(),
            roster: self.roster.entries().cloned().collect(),
            resources: self.roster.resources().cloned().collect(),
            timestamps: self.store.export_timestamps(),
        }
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.store.config().session_id
    }

    pub fn config(&self) -> &BlacklistConfig {
        self.store.config()
    }

    pub fn current_tick(&self) -> Tick {
        self.store.current_tick()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            session_id: self.session_id().to_string(),
            current_tick: self.store.current_tick(),
            tracked_entities: self.store.tracked_entity_count(),
            active_entries: self.store.active_entry_count(),
            pending_timers: self.store.scheduler().pending_len(),
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn store(&self) -> &BlacklistStore {
        &self.store
    }

    // -- world ------------------------------------------------------------------

    pub fn spawn_entity(&mut self, label: impl Into<String>) -> EntityRef {
        self.roster.spawn(label)
    }

    /// Marks the entity dead. Its entries stay until the next cleanup pass.
    pub fn kill_entity(&mut self, id: EntityId) -> Result<RosterEntry, ApiError> {
        self.roster
            .kill(id)
            .cloned()
            .ok_or_else(|| ApiError::unknown_entity(id))
    }

    pub fn define_resource(&mut self, label: impl Into<String>) -> ResourceDef {
        self.roster.define_resource(label)
    }

    // -- blacklist ---------------------------------------------------------------

    pub fn blacklist(
        &mut self,
        entity_id: EntityId,
        resource_hash: ResourceHash,
        reason: &str,
    ) -> Result<Tick, ApiError> {
        let (entity, resource) = self.resolve_pair(entity_id, resource_hash)?;
        self.store.add(&resource, &entity, reason);
        Ok(self
            .store
            .expires_at(entity_id, resource_hash)
            .unwrap_or_default())
    }

    pub fn unblacklist(
        &mut self,
        entity_id: EntityId,
        resource_hash: ResourceHash,
    ) -> Result<bool, ApiError> {
        let (entity, resource) = self.resolve_pair(entity_id, resource_hash)?;
        Ok(self.store.remove(&resource, &entity))
    }

    pub fn is_blacklisted(&self, entity_id: EntityId, resource_hash: ResourceHash) -> bool {
        self.store.contains(entity_id, resource_hash)
    }

    pub fn clear_entity(&mut self, entity_id: EntityId) -> Result<usize, ApiError> {
        let entity = self
            .roster
            .get(entity_id)
            .map(|entry| entry.entity.clone())
            .ok_or_else(|| ApiError::unknown_entity(entity_id))?;
        Ok(self.store.clear_entity(&entity))
    }

    pub fn clear_all(&mut self) {
        self.store.clear_all();
    }

    pub fn cleanup_now(&mut self) -> Vec<EntityId> {
        self.store.cleanup(&self.roster)
    }

    /// Turning debug logging off discards notes not yet flushed.
    pub fn set_debug_logging(&mut self, enabled: bool) {
        self.store.set_debug_logging(enabled);
    }

    pub fn flush_logs(&mut self) -> Vec<String> {
        self.store.flush_logs()
    }

    pub fn debug_info(&self) -> String {
        self.store.debug_info()
    }

    pub fn snapshot(&self) -> BlacklistSnapshot {
        self.store.snapshot()
    }

    // -- driver -------------------------------------------------------------------

    /// Advances `steps` ticks, firing every intermediate tick in order and
    /// running cleanup on the configured cadence.
    pub fn step(&mut self, steps: u64) -> StepReport {
        let cadence = self.store.config().cleanup_every_ticks;
        let mut report = StepReport::default();

        for _ in 0..steps {
            let tick = self.store.current_tick().saturating_add(1);
            report.expired.extend(self.store.advance_to(tick));
            if cadence > 0 && tick % cadence == 0 {
                report
                    .evicted_entities
                    .extend(self.store.cleanup(&self.roster));
            }
            report.advanced_ticks += 1;
        }

        if self.store.config().debug_logging {
            report.log_lines = self.store.flush_logs();
        }
        report.current_tick = self.store.current_tick();
        self.save_if_attached();
        report
    }

    pub fn run_to_tick(&mut self, target_tick: Tick) -> StepReport {
        let steps = target_tick.saturating_sub(self.store.current_tick());
        self.step(steps)
    }

    fn save_if_attached(&mut self) {
        if self.persistence.is_none() {
            return;
        }

        if let Err(err) = self.save() {
            tracing::warn!(error = %err, "session save failed");
            self.last_persistence_error = Some(err.to_string());
        }
    }

    fn resolve_pair(
        &self,
        entity_id: EntityId,
        resource_hash: ResourceHash,
    ) -> Result<(EntityRef, ResourceDef), ApiError> {
        let entity = self
            .roster
            .get(entity_id)
            .map(|entry| entry.entity.clone())
            .ok_or_else(|| ApiError::unknown_entity(entity_id))?;
        let resource = self
            .roster
            .get_resource(resource_hash)
            .cloned()
            .ok_or_else(|| ApiError::unknown_resource(resource_hash))?;
        Ok((entity, resource))
    }
}

pub fn validate_config(config: &BlacklistConfig) -> Result<(), ApiError> {
    if config.schema_version != SCHEMA_VERSION_V1 {
        return Err(ApiError::new(
            ErrorCode::InvalidRequest,
            "Unsupported schema_version",
            Some(format!(
                "got={} expected={}",
                config.schema_version, SCHEMA_VERSION_V1
            )),
        ));
    }
    if config.session_id.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::InvalidRequest,
            "session_id must not be empty",
            None,
        ));
    }
    if config.duration_ticks == 0 {
        return Err(ApiError::new(
            ErrorCode::InvalidRequest,
            "duration_ticks must be >= 1",
            None,
        ));
    }
    Ok(())
}
