//! Per-server records held by the coordinator

use crate::common::service_mask::ServiceType;
use crate::common::{ServerEntryWire, ServerId, ServiceMask};
use crate::coordinator::log::EntryId;
use serde::{Deserialize, Serialize};

/// Version value meaning "no version seen yet"; a membership server in this
/// state needs a full list before it can apply deltas.
pub const UNINITIALIZED_VERSION: u64 = u64::MAX;

/// Lifecycle state of a listed server.
///
/// `Down` is transient: it is written into an outgoing delta to publish a
/// removal, and the slot is emptied in the same critical section, so the
/// state is never observed in the list itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Up,
    Crashed,
    Down,
}

impl ServerStatus {
    pub fn as_wire(self) -> u32 {
        match self {
            ServerStatus::Up => 0,
            ServerStatus::Crashed => 1,
            ServerStatus::Down => 2,
        }
    }

    pub fn from_wire(status: u32) -> Option<Self> {
        match status {
            0 => Some(ServerStatus::Up),
            1 => Some(ServerStatus::Crashed),
            2 => Some(ServerStatus::Down),
            _ => None,
        }
    }
}

/// Everything the coordinator tracks about one enlisted server.
#[derive(Debug, Clone)]
pub struct Entry {
    pub server_id: ServerId,
    pub service_locator: String,
    pub services: ServiceMask,
    pub status: ServerStatus,
    /// Read speed of the server's storage; meaningful only for backups.
    pub expected_read_mbytes_per_sec: u32,
    /// Replication group of the backup; 0 = unassigned.
    pub replication_id: u64,
    /// Opaque recovery metadata, kept for master-recovery orchestration.
    pub master_recovery_info: Vec<u8>,

    /// Highest membership version this server has acknowledged.
    pub verified_version: u64,
    /// Version promised to an outstanding update RPC; equals
    /// `verified_version` when none is in flight.
    pub update_version: u64,

    /// Durable-log entry holding this server's enlistment record; 0 = none.
    pub server_info_log_id: EntryId,
    /// Durable-log entry holding this server's latest update record; 0 = none.
    pub server_update_log_id: EntryId,
}

impl Entry {
    pub fn new(server_id: ServerId, service_locator: String, services: ServiceMask) -> Self {
        Self {
            server_id,
            service_locator,
            services,
            status: ServerStatus::Up,
            expected_read_mbytes_per_sec: 0,
            replication_id: 0,
            master_recovery_info: Vec::new(),
            verified_version: UNINITIALIZED_VERSION,
            update_version: UNINITIALIZED_VERSION,
            server_info_log_id: 0,
            server_update_log_id: 0,
        }
    }

    pub fn is_master(&self) -> bool {
        self.services.has(ServiceType::Master)
    }

    pub fn is_backup(&self) -> bool {
        self.services.has(ServiceType::Backup)
    }

    pub fn is_membership(&self) -> bool {
        self.services.has(ServiceType::Membership)
    }

    pub fn to_wire(&self) -> ServerEntryWire {
        ServerEntryWire {
            services: self.services.serialize_wire(),
            server_id: self.server_id.raw(),
            service_locator: self.service_locator.clone(),
            status: self.status.as_wire(),
            // Receivers expect the field even for non-backups.
            expected_read_mbytes_per_sec: if self.is_backup() {
                self.expected_read_mbytes_per_sec
            } else {
                0
            },
            replication_id: self.replication_id,
        }
    }
}

/// One position in the server list. Index 0 is reserved and never allocated.
#[derive(Debug, Default)]
pub struct Slot {
    pub entry: Option<Entry>,
    /// Generation number the next occupant of this slot will carry.
    pub next_generation: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_defaults() {
        let entry = Entry::new(
            ServerId::new(1, 0),
            "mock:host=m1".to_string(),
            ServiceType::Master | ServiceType::Membership,
        );
        assert_eq!(entry.status, ServerStatus::Up);
        assert_eq!(entry.replication_id, 0);
        assert_eq!(entry.verified_version, UNINITIALIZED_VERSION);
        assert_eq!(entry.update_version, UNINITIALIZED_VERSION);
        assert!(entry.is_master());
        assert!(!entry.is_backup());
    }

    #[test]
    fn test_wire_read_speed_zeroed_for_non_backups() {
        let mut master = Entry::new(
            ServerId::new(1, 0),
            "mock:host=m1".to_string(),
            ServiceMask::from(ServiceType::Master),
        );
        master.expected_read_mbytes_per_sec = 100;
        assert_eq!(master.to_wire().expected_read_mbytes_per_sec, 0);

        let mut backup = Entry::new(
            ServerId::new(2, 0),
            "mock:host=b1".to_string(),
            ServiceMask::from(ServiceType::Backup),
        );
        backup.expected_read_mbytes_per_sec = 100;
        assert_eq!(backup.to_wire().expected_read_mbytes_per_sec, 100);
    }

    #[test]
    fn test_status_wire_codes() {
        assert_eq!(ServerStatus::Up.as_wire(), 0);
        assert_eq!(ServerStatus::Crashed.as_wire(), 1);
        assert_eq!(ServerStatus::Down.as_wire(), 2);
        assert_eq!(ServerStatus::from_wire(1), Some(ServerStatus::Crashed));
        assert_eq!(ServerStatus::from_wire(9), None);
    }
}
