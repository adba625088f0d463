//! Coordinator-side membership registry
//!
//! The coordinator owns the authoritative server list:
//! - Enlist, crash, and removal handling with durable-log-backed transitions
//! - Versioned update batches disseminated to membership servers
//! - Replication group assignment over enlisted backups
//! - Local subscription for in-process components
//! - Recovery by durable-log replay after a coordinator restart

pub mod entry;
pub mod log;
pub mod replication;
pub mod server_list;
pub mod tracker;
pub mod updater;

pub use entry::{Entry, ServerStatus};
pub use log::{DurableLog, EntryId, FileLog, LogAdapter, LogRecord, MemoryLog};
pub use server_list::CoordinatorServerList;
pub use tracker::{EventQueueTracker, ServerChangeEvent, ServerTracker};
pub use updater::{UpdateRpc, UpdateTransport};

/// Hook into master-recovery orchestration. Invoked for every server that
/// leaves the cluster; the manager decides whether recovery applies.
pub trait RecoveryManager: Send + Sync {
    fn start_master_recovery(&self, entry: &Entry);
}

/// Recovery hook that ignores failures, for clusters without master data.
pub struct NoopRecovery;

impl RecoveryManager for NoopRecovery {
    fn start_master_recovery(&self, _entry: &Entry) {}
}
