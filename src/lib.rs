//! # coordlist
//!
//! Cluster membership coordination for a distributed in-memory storage
//! cluster:
//! - Authoritative, versioned server list held by the coordinator
//! - State transitions logged to an external durable log before they become
//!   visible, so a coordinator restart can rebuild the list by replay
//! - A background dissemination task that pushes incremental and full-list
//!   updates to every membership-subscribing server until the whole cluster
//!   acknowledges the current version
//! - Replication group assignment over enlisted backups
//! - Load- and conflict-aware backup selection used by masters when they
//!   replicate segments
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               Coordinator                    │
//! │  CoordinatorServerList ──► DurableLog        │
//! │        │    (enlist / crash / remove)        │
//! │        ▼                                     │
//! │  dissemination task (bounded-concurrency RPC)│
//! └──────┬─────────────┬──────────────┬──────────┘
//!        │ update      │ update       │ update
//!   ┌────▼─────┐  ┌────▼─────┐  ┌─────▼────┐
//!   │ Server 1 │  │ Server 2 │  │ Server 3 │
//!   │ (master) │  │ (backup) │  │ (backup) │
//!   └──────────┘  └──────────┘  └──────────┘
//!
//!   Masters pick replica targets with BackupSelector against a
//!   backup-only snapshot fetched from the coordinator.
//! ```

pub mod backup;
pub mod common;
pub mod coordinator;

// Re-export commonly used types
pub use backup::BackupSelector;
pub use common::{Error, Result, ServerId, ServiceMask};
pub use coordinator::CoordinatorServerList;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
