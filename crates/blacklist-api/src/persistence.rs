use std::fmt;
use std::path::Path;

use contracts::{
    BlacklistConfig, EntityId, EntityRef, ResourceDef, ResourceHash, RosterEntry, Tick,
    TimestampRecord,
};
use rusqlite::{params, Connection, OptionalExtension};

/// Everything the session needs to come back after a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub config: BlacklistConfig,
    pub current_tick: Tick,
    pub next_entity_id: u64,
    pub roster: Vec<RosterEntry>,
    pub resources: Vec<ResourceDef>,
    pub timestamps: Vec<TimestampRecord>,
}

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    Corrupt(String),
    NotAttached,
    SessionNotFound(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::Corrupt(detail) => write!(f, "corrupt row: {detail}"),
            Self::NotAttached => write!(f, "sqlite store is not attached"),
            Self::SessionNotFound(session_id) => write!(f, "session not found: {session_id}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

#[derive(Debug)]
pub struct SqliteSessionStore {
    conn: Connection,
}

impl SqliteSessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    /// Replaces the stored state of `session.config.session_id` in one transaction.
    pub fn save_session(&mut self, session: &PersistedSession) -> Result<(), PersistenceError> {
        let session_id = session.config.session_id.as_str();
        let config_json = serde_json::to_string(&session.config)?;
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO sessions (
                session_id,
                schema_version,
                config_json,
                current_tick,
                next_entity_id,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(session_id) DO UPDATE SET
                schema_version = excluded.schema_version,
                config_json = excluded.config_json,
                current_tick = excluded.current_tick,
                next_entity_id = excluded.next_entity_id,
                updated_at = excluded.updated_at",
            params![
                session_id,
                session.config.schema_version.as_str(),
                config_json,
                session.current_tick.to_string(),
                session.next_entity_id.to_string(),
                tick_stamp(session.current_tick),
            ],
        )?;

        for table in ["roster_entities", "roster_resources", "blacklist_timestamps"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE session_id = ?1"),
                params![session_id],
            )?;
        }

        for entry in &session.roster {
            tx.execute(
                "INSERT INTO roster_entities (session_id, entity_id, label, alive)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    session_id,
                    entry.entity.id.to_string(),
                    entry.entity.label.as_str(),
                    if entry.alive { 1_i64 } else { 0_i64 },
                ],
            )?;
        }

        for resource in &session.resources {
            tx.execute(
                "INSERT INTO roster_resources (session_id, resource_hash, label)
                 VALUES (?1, ?2, ?3)",
                params![
                    session_id,
                    resource.hash.to_string(),
                    resource.label.as_str()
                ],
            )?;
        }

        for record in &session.timestamps {
            tx.execute(
                "INSERT INTO blacklist_timestamps (
                    session_id,
                    entity_id,
                    resource_hash,
                    blacklisted_at
                 ) VALUES (?1, ?2, ?3, ?4)",
                params![
                    session_id,
                    record.entity_id.to_string(),
                    record.resource_hash.to_string(),
                    record.blacklisted_at.to_string(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn load_session(&self, session_id: &str) -> Result<PersistedSession, PersistenceError> {
        let row: Option<(String, String, String)> = self
            .conn
            .query_row(
                "SELECT config_json, current_tick, next_entity_id
                 FROM sessions
                 WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((config_json, current_tick, next_entity_id)) = row else {
            return Err(PersistenceError::SessionNotFound(session_id.to_string()));
        };

        let mut stmt = self.conn.prepare(
            "SELECT entity_id, label, alive
             FROM roster_entities
             WHERE session_id = ?1
             ORDER BY entity_id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let mut roster = Vec::new();
        for row in rows {
            let (entity_id, label, alive) = row?;
            roster.push(RosterEntry {
                entity: EntityRef::new(EntityId(parse_u64(&entity_id, "entity_id")?), label),
                alive: alive != 0,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT resource_hash, label
             FROM roster_resources
             WHERE session_id = ?1
             ORDER BY label ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut resources = Vec::new();
        for row in rows {
            let (hash, label) = row?;
            resources.push(ResourceDef::new(
                ResourceHash(parse_u64(&hash, "resource_hash")?),
                label,
            ));
        }

        let mut stmt = self.conn.prepare(
            "SELECT entity_id, resource_hash, blacklisted_at
             FROM blacklist_timestamps
             WHERE session_id = ?1",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut timestamps = Vec::new();
        for row in rows {
            let (entity_id, hash, stamp) = row?;
            timestamps.push(TimestampRecord {
                entity_id: EntityId(parse_u64(&entity_id, "entity_id")?),
                resource_hash: ResourceHash(parse_u64(&hash, "resource_hash")?),
                blacklisted_at: parse_u64(&stamp, "blacklisted_at")?,
            });
        }
        timestamps.sort();

        Ok(PersistedSession {
            config: serde_json::from_str(&config_json)?,
            current_tick: parse_u64(&current_tick, "current_tick")?,
            next_entity_id: parse_u64(&next_entity_id, "next_entity_id")?,
            roster,
            resources,
            timestamps,
        })
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                schema_version TEXT NOT NULL,
                config_json TEXT NOT NULL,
                current_tick TEXT NOT NULL,
                next_entity_id TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS roster_entities (
                session_id TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                label TEXT NOT NULL,
                alive INTEGER NOT NULL,
                PRIMARY KEY (session_id, entity_id)
            );

            CREATE TABLE IF NOT EXISTS roster_resources (
                session_id TEXT NOT NULL,
                resource_hash TEXT NOT NULL,
                label TEXT NOT NULL,
                PRIMARY KEY (session_id, resource_hash)
            );

            CREATE TABLE IF NOT EXISTS blacklist_timestamps (
                session_id TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                resource_hash TEXT NOT NULL,
                blacklisted_at TEXT NOT NULL,
                PRIMARY KEY (session_id, entity_id, resource_hash)
            );

            CREATE INDEX IF NOT EXISTS idx_timestamps_session ON blacklist_timestamps(session_id);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', 'tick-000000')",
            [],
        )?;

        Ok(())
    }
}

fn parse_u64(raw: &str, column: &str) -> Result<u64, PersistenceError> {
    raw.parse::<u64>()
        .map_err(|_| PersistenceError::Corrupt(format!("{column}={raw}")))
}

fn tick_stamp(tick: Tick) -> String {
    format!("tick-{tick:06}")
}
