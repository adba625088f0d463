//! Cluster membership wire messages
//!
//! A `ServerListWire` carries either a full snapshot of the membership or an
//! incremental delta. Receivers apply the entries positionally, in the order
//! they appear, so a removal of an old occupant of a slot always precedes the
//! addition of its replacement.

use serde::{Deserialize, Serialize};

/// Whether a message carries the whole list or only a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerListKind {
    FullList,
    Update,
}

/// One server as published to the cluster.
///
/// Field order is part of the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntryWire {
    pub services: u32,
    pub server_id: u64,
    pub service_locator: String,
    pub status: u32,
    /// 0 for servers without a backup service; the field is always present.
    pub expected_read_mbytes_per_sec: u32,
    pub replication_id: u64,
}

/// A versioned membership publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerListWire {
    pub version: u64,
    pub kind: ServerListKind,
    pub servers: Vec<ServerEntryWire>,
}
