//! Master-side backup selection
//!
//! Masters replicate each segment to a primary backup and one or more
//! secondaries. The selector picks the primary for load (least expected read
//! time during recovery) and the secondaries for disjointness.

pub mod selector;

pub use selector::{BackupHost, BackupLoad, BackupSelector, CoordinatorClient};
