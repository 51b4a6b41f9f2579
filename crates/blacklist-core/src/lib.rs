//! Tick-expiring per-entity blacklist: a bucketed event scheduler, a stable-id
//! registry and the state machine they drive.

pub mod blacklist;
pub mod log_batcher;
pub mod registry;
pub mod scheduler;
pub mod world;

pub use blacklist::{BlacklistStore, InvariantViolation};
pub use log_batcher::LogBatcher;
pub use registry::IdentityRegistry;
pub use scheduler::{ScheduledEvent, TickEventHandler, TickEventScheduler};
pub use world::WorldView;
