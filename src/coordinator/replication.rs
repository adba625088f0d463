//! Replication group lifecycle
//!
//! Backups are grouped into fixed-size replication groups that collectively
//! host the replicas of a segment. The coordinator assigns group ids as
//! enough ungrouped backups come up, and revokes them when a member goes
//! down; every change rides the same versioned delta stream as the rest of
//! the membership state.

use crate::common::ServerId;
use crate::coordinator::entry::ServerStatus;
use crate::coordinator::server_list::{ListState, Shared};

impl Shared {
    /// Give every member of `group` the replication id `replication_id`.
    ///
    /// Returns false without retrying if any member has left the list; the
    /// caller reacts to whatever event removed it.
    pub(crate) fn assign_replication_group(
        &self,
        state: &mut ListState,
        replication_id: u64,
        group: &[ServerId],
    ) -> bool {
        for backup_id in group {
            if state.get_entry(*backup_id).is_none() {
                return false;
            }
            self.set_replication_id(state, *backup_id, replication_id);
        }
        true
    }

    /// Group ungrouped, up backups into new replication groups while enough
    /// of them exist.
    pub(crate) fn create_replication_group(&self, state: &mut ListState) {
        let mut free_backups: Vec<ServerId> = Vec::new();
        for slot in &state.slots {
            if let Some(entry) = &slot.entry {
                if entry.is_backup()
                    && entry.status == ServerStatus::Up
                    && entry.replication_id == 0
                {
                    free_backups.push(entry.server_id);
                }
            }
        }

        let group_size = self.config.replication_group_size;
        while free_backups.len() >= group_size {
            let mut group = Vec::with_capacity(group_size);
            for _ in 0..group_size {
                if let Some(backup_id) = free_backups.pop() {
                    group.push(backup_id);
                }
            }
            let replication_id = state.next_replication_id;
            self.assign_replication_group(state, replication_id, &group);
            state.next_replication_id += 1;
        }
    }

    /// Return every member of `group_id` to the unassigned group.
    pub(crate) fn remove_replication_group(&self, state: &mut ListState, group_id: u64) {
        // Group 0 is the unassigned marker.
        if group_id == 0 {
            return;
        }
        let mut group: Vec<ServerId> = Vec::new();
        for slot in &state.slots {
            if let Some(entry) = &slot.entry {
                if entry.is_backup() && entry.replication_id == group_id {
                    group.push(entry.server_id);
                }
            }
        }
        if !group.is_empty() {
            self.assign_replication_group(state, 0, &group);
        }
    }

    /// Change one backup's replication id and publish the change. No-op
    /// unless the entry is up.
    pub(crate) fn set_replication_id(
        &self,
        state: &mut ListState,
        server_id: ServerId,
        replication_id: u64,
    ) {
        let wire = match state.get_entry_mut(server_id) {
            Some(entry) if entry.status == ServerStatus::Up => {
                entry.replication_id = replication_id;
                entry.to_wire()
            }
            _ => return,
        };
        state.update.push(wire);
    }
}
