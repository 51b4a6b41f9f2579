//! v1 cross-boundary contracts for the blacklist core, session API, persistence and CLI.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod serde_u64_string;

pub const SCHEMA_VERSION_V1: &str = "1.0";
pub const DEFAULT_BLACKLIST_DURATION_TICKS: u64 = 2_500;
pub const DEFAULT_CLEANUP_EVERY_TICKS: u64 = 250;

/// One discrete step of the external simulation clock.
pub type Tick = u64;

macro_rules! wire_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serde_u64_string::serialize(&self.0, serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                serde_u64_string::deserialize(deserializer).map(Self)
            }
        }
    };
}

wire_id!(
    /// Process-unique id of a game actor. Never reused while the actor is alive.
    EntityId
);

wire_id!(
    /// Stable hash of an immutable resource definition (a weapon or item type).
    ResourceHash
);

impl ResourceHash {
    /// FNV-1a 64 over the definition label. Stable across processes and reloads.
    pub fn from_label(label: &str) -> Self {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in label.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Self(hash)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityRef {
    pub id: EntityId,
    pub label: String,
}

impl EntityRef {
    pub fn new(id: impl Into<EntityId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceDef {
    pub hash: ResourceHash,
    pub label: String,
}

impl ResourceDef {
    pub fn new(hash: impl Into<ResourceHash>, label: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            label: label.into(),
        }
    }

    pub fn from_label(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            hash: ResourceHash::from_label(&label),
            label,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BlacklistExpiry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlacklistConfig {
    pub schema_version: String,
    pub session_id: String,
    pub duration_ticks: u64,
    #[serde(default)]
    pub debug_logging: bool,
    #[serde(default = "default_cleanup_every_ticks")]
    pub cleanup_every_ticks: u64,
    #[serde(default)]
    pub starting_tick: Tick,
}

fn default_cleanup_every_ticks() -> u64 {
    DEFAULT_CLEANUP_EVERY_TICKS
}

impl BlacklistConfig {
    /// Duration used for scheduling. A zero duration would schedule into the
    /// current tick's already-drained bucket, so it is clamped.
    pub fn effective_duration(&self) -> u64 {
        self.duration_ticks.max(1)
    }
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            session_id: "session_local_001".to_string(),
            duration_ticks: DEFAULT_BLACKLIST_DURATION_TICKS,
            debug_logging: false,
            cleanup_every_ticks: DEFAULT_CLEANUP_EVERY_TICKS,
            starting_tick: 0,
        }
    }
}

/// Durable `(entity, resource, timestamp)` triple handed to and from persistence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampRecord {
    pub entity_id: EntityId,
    pub resource_hash: ResourceHash,
    #[serde(with = "serde_u64_string")]
    pub blacklisted_at: Tick,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpiredEntry {
    pub entity_id: EntityId,
    pub resource_hash: ResourceHash,
    pub tick: Tick,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RebuildSummary {
    pub restored: usize,
    pub dropped_stale: usize,
    pub dropped_dead: usize,
    pub dropped_unresolved: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlacklistEntryView {
    pub resource: ResourceDef,
    pub blacklisted_at: Tick,
    pub expires_at: Tick,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityBlacklistView {
    pub entity: EntityRef,
    pub entries: Vec<BlacklistEntryView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlacklistSnapshot {
    pub schema_version: String,
    pub tick: Tick,
    pub duration_ticks: u64,
    pub pending_timers: usize,
    pub entities: Vec<EntityBlacklistView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterEntry {
    pub entity: EntityRef,
    pub alive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepReport {
    pub advanced_ticks: u64,
    pub current_tick: Tick,
    pub expired: Vec<ExpiredEntry>,
    pub evicted_entities: Vec<EntityId>,
    pub log_lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStatus {
    pub schema_version: String,
    pub session_id: String,
    pub current_tick: Tick,
    pub tracked_entities: usize,
    pub active_entries: usize,
    pub pending_timers: usize,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session_id={} tick={} entities={} entries={} timers={}",
            self.session_id,
            self.current_tick,
            self.tracked_entities,
            self.active_entries,
            self.pending_timers
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownEntity,
    UnknownResource,
    InvalidRequest,
    PersistenceUnavailable,
    SessionNotFound,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }

    pub fn unknown_entity(id: EntityId) -> Self {
        Self::new(
            ErrorCode::UnknownEntity,
            "entity is not present in the roster",
            Some(format!("entity_id={id}")),
        )
    }

    pub fn unknown_resource(hash: ResourceHash) -> Self {
        Self::new(
            ErrorCode::UnknownResource,
            "resource is not defined",
            Some(format!("resource_hash={hash}")),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{:?}: {} ({details})", self.error_code, self.message),
            None => write!(f, "{:?}: {}", self.error_code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_hash_is_stable_for_label() {
        assert_eq!(ResourceHash::from_label("AK47"), ResourceHash::from_label("AK47"));
        assert_ne!(ResourceHash::from_label("AK47"), ResourceHash::from_label("M16"));
        assert_eq!(ResourceHash::from_label("").get(), 0xcbf2_9ce4_8422_2325);
    }

    #[test]
    fn timestamp_record_encodes_ids_as_strings() {
        let record = TimestampRecord {
            entity_id: EntityId(7),
            resource_hash: ResourceHash(u64::MAX),
            blacklisted_at: 100,
        };
        let raw = serde_json::to_value(record).expect("serialize record");
        assert_eq!(raw["entity_id"], "7");
        assert_eq!(raw["resource_hash"], u64::MAX.to_string());
        assert_eq!(raw["blacklisted_at"], "100");

        let decoded: TimestampRecord = serde_json::from_value(raw).expect("deserialize record");
        assert_eq!(decoded, record);
    }

    #[test]
    fn config_defaults_fill_missing_optional_fields() {
        let parsed: BlacklistConfig = serde_json::from_str(
            r#"{"schema_version":"1.0","session_id":"s1","duration_ticks":0}"#,
        )
        .expect("config parses");
        assert!(!parsed.debug_logging);
        assert_eq!(parsed.cleanup_every_ticks, DEFAULT_CLEANUP_EVERY_TICKS);
        assert_eq!(parsed.effective_duration(), 1);
        assert_eq!(BlacklistConfig::default().effective_duration(), 2_500);
    }
}
