//! Authoritative cluster membership registry
//!
//! The `CoordinatorServerList` tracks every server in the cluster, assigns
//! server ids, and publishes versioned membership updates. Mutations follow a
//! strict shape: append a record to the durable log, apply the change in
//! memory while accumulating delta rows, then push the delta as a new
//! version for the dissemination task to fan out.
//!
//! Ordering matters twice over. Rows within a delta are applied positionally
//! by receivers, so a removal of a slot's old occupant always precedes the
//! addition of its replacement. Versions are strictly monotonic and gap-free;
//! a version is spent only on a non-empty delta.

use crate::common::service_mask::ServiceType;
use crate::common::{
    Error, ListConfig, Result, ServerEntryWire, ServerId, ServerListKind, ServerListWire,
    ServiceMask,
};
use crate::coordinator::entry::{Entry, ServerStatus, Slot, UNINITIALIZED_VERSION};
use crate::coordinator::log::{
    DurableLog, EntryId, LogAdapter, LogRecord, ServerDownInfo, ServerInformation,
    ServerUpdateInfo, NO_ENTRY_ID,
};
use crate::coordinator::tracker::{ServerChangeEvent, ServerTracker};
use crate::coordinator::updater::UpdateTransport;
use crate::coordinator::RecoveryManager;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

fn not_found(server_id: ServerId) -> Error {
    Error::NotFound(format!("invalid server id ({})", server_id))
}

/// One published membership version.
///
/// `full` starts out empty and is materialized the first time the
/// dissemination task needs to bootstrap a server that has never seen the
/// list; it is kept alongside the delta so other new servers at the same
/// version reuse it.
pub(crate) struct UpdateBatch {
    pub(crate) version: u64,
    pub(crate) incremental: Arc<ServerListWire>,
    pub(crate) full: Option<Arc<ServerListWire>>,
}

/// Bookkeeping carried between work-finding scans of the dissemination task.
#[derive(Debug)]
pub(crate) struct ScanState {
    /// Where the previous scan left off; scans resume here for fairness.
    pub(crate) search_index: usize,
    /// Minimum verified version seen so far in the current scan.
    pub(crate) min_version: u64,
    /// Version at which a full scan last found no work; suppresses rescans
    /// until something changes.
    pub(crate) no_work_found_for_epoch: u64,
}

impl Default for ScanState {
    fn default() -> Self {
        Self {
            search_index: 0,
            min_version: UNINITIALIZED_VERSION,
            no_work_found_for_epoch: 0,
        }
    }
}

/// Mutable list state; everything here is guarded by the one list mutex.
pub(crate) struct ListState {
    pub(crate) slots: Vec<Slot>,
    pub(crate) number_of_masters: u32,
    pub(crate) number_of_backups: u32,
    /// Membership version; bumped on every non-empty published delta.
    pub(crate) version: u64,
    /// Every updatable server has confirmed at least this version; batches at
    /// or below it are prunable.
    pub(crate) min_confirmed_version: u64,
    pub(crate) num_updating_servers: u64,
    pub(crate) next_replication_id: u64,
    pub(crate) last_scan: ScanState,
    /// Delta rows accumulated since the last push.
    pub(crate) update: Vec<ServerEntryWire>,
    /// Published batches not yet confirmed by the whole cluster.
    pub(crate) updates: VecDeque<UpdateBatch>,
    pub(crate) trackers: Vec<Arc<dyn ServerTracker>>,
}

fn notify_trackers(trackers: &[Arc<dyn ServerTracker>], entry: &Entry, event: ServerChangeEvent) {
    for tracker in trackers {
        tracker.enqueue_change(entry, event);
    }
    for tracker in trackers {
        tracker.fire_callback();
    }
}

impl ListState {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            number_of_masters: 0,
            number_of_backups: 0,
            version: 0,
            min_confirmed_version: 0,
            num_updating_servers: 0,
            next_replication_id: 1,
            last_scan: ScanState::default(),
            update: Vec::new(),
            updates: VecDeque::new(),
            trackers: Vec::new(),
        }
    }

    pub(crate) fn get_entry(&self, server_id: ServerId) -> Option<&Entry> {
        let index = server_id.index() as usize;
        self.slots
            .get(index)
            .and_then(|slot| slot.entry.as_ref())
            .filter(|entry| entry.server_id == server_id)
    }

    pub(crate) fn get_entry_mut(&mut self, server_id: ServerId) -> Option<&mut Entry> {
        let index = server_id.index() as usize;
        self.slots
            .get_mut(index)
            .and_then(|slot| slot.entry.as_mut())
            .filter(|entry| entry.server_id == server_id)
    }

    /// First free slot index; index 0 is reserved and never handed out.
    fn first_free_index(&mut self) -> usize {
        let mut index = 1;
        while index < self.slots.len() {
            if self.slots[index].entry.is_none() {
                break;
            }
            index += 1;
        }
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, Slot::default);
        }
        index
    }

    /// Allocate a fresh unique server id. A placeholder entry occupies the
    /// slot until `add` fills in the real details, so a second allocation
    /// cannot hand out the same index.
    fn generate_unique_id(&mut self) -> ServerId {
        let index = self.first_free_index();
        let slot = &mut self.slots[index];
        let id = ServerId::new(index as u32, slot.next_generation);
        slot.next_generation = slot.next_generation.wrapping_add(1);
        slot.entry = Some(Entry::new(id, String::new(), ServiceMask::EMPTY));
        id
    }

    /// Record a server in its slot, count it, and append an ADD row to the
    /// pending delta. Removals of a prior occupant must already be in the
    /// delta so receivers see them first.
    pub(crate) fn add(
        &mut self,
        server_id: ServerId,
        service_locator: &str,
        services: ServiceMask,
        read_speed: u32,
    ) {
        let index = server_id.index() as usize;
        // During recovery the id arrives from the log rather than from
        // generate_unique_id, so the slot may not exist yet.
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, Slot::default);
        }

        let mut entry = Entry::new(server_id, service_locator.to_string(), services);
        if entry.is_master() {
            self.number_of_masters += 1;
        }
        if entry.is_backup() {
            self.number_of_backups += 1;
            entry.expected_read_mbytes_per_sec = read_speed;
        }

        let slot = &mut self.slots[index];
        slot.next_generation = server_id.generation().wrapping_add(1);
        let entry = slot.entry.insert(entry);
        let wire = entry.to_wire();
        self.update.push(wire);

        if let Some(entry) = &self.slots[index].entry {
            notify_trackers(&self.trackers, entry, ServerChangeEvent::Added);
        }
    }

    /// Mark a server crashed, keeping its slot (recovery may still need its
    /// replicas). No-op if already crashed.
    pub(crate) fn crashed(&mut self, server_id: ServerId) -> Result<()> {
        let index = server_id.index() as usize;
        let wire = {
            let entry = match self
                .slots
                .get_mut(index)
                .and_then(|slot| slot.entry.as_mut())
            {
                Some(entry) if entry.server_id == server_id => entry,
                _ => return Err(not_found(server_id)),
            };
            if entry.status == ServerStatus::Crashed {
                return Ok(());
            }
            debug_assert!(entry.status != ServerStatus::Down);
            entry.status = ServerStatus::Crashed;
            entry.to_wire()
        };

        let entry_counts = self.slots[index].entry.as_ref();
        if let Some(entry) = entry_counts {
            if entry.is_master() {
                self.number_of_masters -= 1;
            }
            if entry.is_backup() {
                self.number_of_backups -= 1;
            }
        }
        self.update.push(wire);

        if let Some(entry) = &self.slots[index].entry {
            notify_trackers(&self.trackers, entry, ServerChangeEvent::Crashed);
        }
        Ok(())
    }

    /// Take a server out of the list entirely. The DOWN status exists only in
    /// the published row; the slot is emptied in the same critical section.
    pub(crate) fn remove(&mut self, server_id: ServerId) -> Result<()> {
        let index = server_id.index() as usize;
        let present = self
            .slots
            .get(index)
            .and_then(|slot| slot.entry.as_ref())
            .map_or(false, |entry| entry.server_id == server_id);
        if !present {
            return Err(not_found(server_id));
        }

        self.crashed(server_id)?;

        let wire = {
            let entry = self.slots[index]
                .entry
                .as_mut()
                .ok_or_else(|| not_found(server_id))?;
            entry.status = ServerStatus::Down;
            entry.to_wire()
        };
        self.update.push(wire);

        let removed = self.slots[index]
            .entry
            .take()
            .ok_or_else(|| not_found(server_id))?;
        notify_trackers(&self.trackers, &removed, ServerChangeEvent::Removed);
        Ok(())
    }

    /// Serialize every entry whose services intersect `services`, in slot
    /// order. The order is part of the wire contract.
    pub(crate) fn serialize(&self, services: ServiceMask) -> ServerListWire {
        let mut servers = Vec::new();
        for slot in &self.slots {
            if let Some(entry) = &slot.entry {
                if entry.services.intersects(services) {
                    servers.push(entry.to_wire());
                }
            }
        }
        ServerListWire {
            version: self.version,
            kind: ServerListKind::FullList,
            servers,
        }
    }

    /// Full snapshot as disseminated to membership servers.
    pub(crate) fn serialize_full(&self) -> ServerListWire {
        self.serialize(ServiceType::Master | ServiceType::Backup)
    }

    pub(crate) fn set_server_info_log_id(
        &mut self,
        server_id: ServerId,
        entry_id: EntryId,
    ) -> Result<()> {
        let entry = self
            .get_entry_mut(server_id)
            .ok_or_else(|| not_found(server_id))?;
        entry.server_info_log_id = entry_id;
        Ok(())
    }

    pub(crate) fn is_cluster_up_to_date(&self) -> bool {
        self.slots.is_empty()
            || (self.num_updating_servers == 0 && self.min_confirmed_version == self.version)
    }
}

/// State shared between the public handle and the dissemination task.
pub(crate) struct Shared {
    pub(crate) state: Mutex<ListState>,
    /// Wakes the dissemination task; signaled on push and on halt.
    pub(crate) has_updates_or_stop: Condvar,
    /// Wakes `sync` callers once the cluster has caught up.
    pub(crate) list_up_to_date: Condvar,
    pub(crate) stop_updater: AtomicBool,
    pub(crate) log: LogAdapter,
    pub(crate) recovery: Arc<dyn RecoveryManager>,
    pub(crate) transport: Arc<dyn UpdateTransport>,
    pub(crate) config: ListConfig,
}

impl Shared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap()
    }

    /// Publish the pending delta as the next version and wake the
    /// dissemination task. Empty deltas don't spend a version.
    pub(crate) fn push_update(&self, state: &mut ListState) {
        if state.update.is_empty() {
            return;
        }
        state.version += 1;
        let wire = ServerListWire {
            version: state.version,
            kind: ServerListKind::Update,
            servers: std::mem::take(&mut state.update),
        };
        state.updates.push_back(UpdateBatch {
            version: state.version,
            incremental: Arc::new(wire),
            full: None,
        });
        self.has_updates_or_stop.notify_one();
    }

    /// Drop batches every updatable server has confirmed.
    pub(crate) fn prune_updates(&self, state: &mut ListState) {
        if state.min_confirmed_version == UNINITIALIZED_VERSION {
            return;
        }
        if state.min_confirmed_version > state.version {
            tracing::error!(
                "inconsistent state detected: min confirmed version {} is larger than the \
                 current version {}; this should never happen",
                state.min_confirmed_version,
                state.version
            );
            // Reset in the hopes of it being a transient bug.
            state.min_confirmed_version = 0;
            return;
        }

        while state
            .updates
            .front()
            .map_or(false, |batch| batch.version <= state.min_confirmed_version)
        {
            state.updates.pop_front();
        }
        if state.updates.is_empty() {
            self.list_up_to_date.notify_all();
        }
    }

    /// Enlist path: allocate an id, log `ServerEnlisting`, then complete.
    fn execute_enlist(
        &self,
        state: &mut ListState,
        services: ServiceMask,
        read_speed: u32,
        service_locator: &str,
    ) -> Result<ServerId> {
        let new_id = state.generate_unique_id();

        let info = ServerInformation {
            server_id: new_id.raw(),
            services: services.serialize_wire(),
            read_speed,
            service_locator: service_locator.to_string(),
        };
        let entry_id = self.log.append(&LogRecord::ServerEnlisting(info), &[])?;
        state.set_server_info_log_id(new_id, entry_id)?;
        tracing::debug!("durable log: ServerEnlisting entry id {}", entry_id);

        self.complete_enlist(state, new_id, services, read_speed, service_locator, entry_id)
    }

    /// Second half of enlisting, also replayed directly during coordinator
    /// recovery: record the server, form replication groups if it backs up,
    /// and supersede the `ServerEnlisting` record with `ServerEnlisted`.
    pub(crate) fn complete_enlist(
        &self,
        state: &mut ListState,
        new_id: ServerId,
        services: ServiceMask,
        read_speed: u32,
        service_locator: &str,
        enlisting_id: EntryId,
    ) -> Result<ServerId> {
        state.add(new_id, service_locator, services, read_speed);

        tracing::info!(
            "enlisting new server at {} (server id {}) supporting services: {}",
            service_locator,
            new_id,
            services
        );

        if services.has(ServiceType::Backup) {
            tracing::debug!("backup at id {} has {} MB/s read", new_id, read_speed);
            self.create_replication_group(state);
        }

        let info = ServerInformation {
            server_id: new_id.raw(),
            services: services.serialize_wire(),
            read_speed,
            service_locator: service_locator.to_string(),
        };
        let entry_id = self
            .log
            .append(&LogRecord::ServerEnlisted(info), &[enlisting_id])?;
        state.set_server_info_log_id(new_id, entry_id)?;
        tracing::debug!("durable log: ServerEnlisted entry id {}", entry_id);

        Ok(new_id)
    }

    pub(crate) fn server_down_locked(
        &self,
        state: &mut ListState,
        server_id: ServerId,
    ) -> Result<()> {
        self.execute_server_down(state, server_id)?;
        self.push_update(state);
        Ok(())
    }

    fn execute_server_down(&self, state: &mut ListState, server_id: ServerId) -> Result<()> {
        // Fail before touching the log so it never records unknown servers.
        if state.get_entry(server_id).is_none() {
            return Err(not_found(server_id));
        }
        let entry_id = self.log.append(
            &LogRecord::ServerDown(ServerDownInfo {
                server_id: server_id.raw(),
            }),
            &[],
        )?;
        tracing::debug!("durable log: ServerDown entry id {}", entry_id);
        self.complete_server_down(state, server_id, entry_id)
    }

    /// Second half of a server-down, also replayed directly during
    /// coordinator recovery.
    pub(crate) fn complete_server_down(
        &self,
        state: &mut ListState,
        server_id: ServerId,
        entry_id: EntryId,
    ) -> Result<()> {
        // Snapshot before the entry is mutated or dropped; the log ids are
        // needed for the invalidation batch afterwards.
        let entry = state
            .get_entry(server_id)
            .cloned()
            .ok_or_else(|| not_found(server_id))?;

        state.crashed(server_id)?;
        // Without a master service there is no recovery to wait for, so the
        // server transitions straight out of the list.
        if !entry.is_master() {
            state.remove(server_id)?;
        }

        self.recovery.start_master_recovery(&entry);

        self.remove_replication_group(state, entry.replication_id);
        self.create_replication_group(state);

        let mut invalidates = vec![entry.server_info_log_id, entry_id];
        if entry.server_update_log_id != NO_ENTRY_ID {
            invalidates.push(entry.server_update_log_id);
        }
        invalidates.retain(|id| *id != NO_ENTRY_ID);
        self.log.invalidate(&invalidates)?;
        Ok(())
    }

    /// Record new master-recovery metadata, superseding any prior
    /// `ServerUpdate` record for the server.
    fn execute_set_master_recovery_info(
        &self,
        state: &mut ListState,
        server_id: ServerId,
        info: &[u8],
    ) -> Result<()> {
        let old_entry_id = state
            .get_entry(server_id)
            .map(|entry| entry.server_update_log_id)
            .unwrap_or(NO_ENTRY_ID);

        let mut invalidates = Vec::new();
        let mut update = if old_entry_id != NO_ENTRY_ID {
            match self.log.read(old_entry_id)? {
                LogRecord::ServerUpdate(update) => {
                    invalidates.push(old_entry_id);
                    update
                }
                other => {
                    return Err(Error::Corrupted(format!(
                        "expected ServerUpdate at entry {}, found {}",
                        old_entry_id,
                        other.entry_type()
                    )))
                }
            }
        } else {
            ServerUpdateInfo {
                server_id: server_id.raw(),
                master_recovery_info: Vec::new(),
            }
        };
        update.master_recovery_info = info.to_vec();

        let entry_id = self
            .log
            .append(&LogRecord::ServerUpdate(update), &invalidates)?;
        self.complete_set_master_recovery_info(state, server_id, info, entry_id)
    }

    /// Second half of a recovery-info update, also replayed directly during
    /// coordinator recovery.
    pub(crate) fn complete_set_master_recovery_info(
        &self,
        state: &mut ListState,
        server_id: ServerId,
        info: &[u8],
        entry_id: EntryId,
    ) -> Result<()> {
        match state.get_entry_mut(server_id) {
            Some(entry) => {
                entry.server_update_log_id = entry_id;
                entry.master_recovery_info = info.to_vec();
                Ok(())
            }
            None => {
                tracing::warn!(
                    "set_master_recovery_info: server {} doesn't exist",
                    server_id
                );
                self.log.invalidate(&[entry_id])?;
                Err(not_found(server_id))
            }
        }
    }
}

/// The coordinator's server list.
///
/// All public operations serialize on one internal mutex. A dedicated
/// background task disseminates published updates; it is started explicitly
/// or by `sync`, and halted on drop.
pub struct CoordinatorServerList {
    pub(crate) shared: Arc<Shared>,
    pub(crate) updater: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CoordinatorServerList {
    pub fn new(
        log: Arc<dyn DurableLog>,
        recovery: Arc<dyn RecoveryManager>,
        transport: Arc<dyn UpdateTransport>,
        config: ListConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ListState::new()),
                has_updates_or_stop: Condvar::new(),
                list_up_to_date: Condvar::new(),
                stop_updater: AtomicBool::new(true),
                log: LogAdapter::new(log),
                recovery,
                transport,
                config,
            }),
            updater: Mutex::new(None),
        })
    }

    /// Enlist a server, optionally replacing a failed predecessor.
    ///
    /// Returns the id assigned to the new server.
    pub fn enlist_server(
        &self,
        replaces_id: Option<ServerId>,
        services: ServiceMask,
        read_speed: u32,
        service_locator: &str,
    ) -> Result<ServerId> {
        let mut state = self.shared.lock_state();

        // The removal of a replaced server must land in the update stream
        // before the addition of its replacement, so receivers applying rows
        // positionally drop the old id first.
        if let Some(replaces) = replaces_id {
            if state.get_entry(replaces).is_some() {
                tracing::info!(
                    "{} is enlisting claiming to replace server id {}, which is still in the \
                     server list, taking its word for it and assuming the old server has failed",
                    service_locator,
                    replaces
                );
                self.shared.server_down_locked(&mut state, replaces)?;
            }
        }

        let new_id =
            self.shared
                .execute_enlist(&mut state, services, read_speed, service_locator)?;

        if let Some(replaces) = replaces_id {
            tracing::info!(
                "newly enlisted server {} replaces server {}",
                new_id,
                replaces
            );
        }

        self.shared.push_update(&mut state);
        Ok(new_id)
    }

    /// Force a server out of the cluster.
    pub fn server_down(&self, server_id: ServerId) -> Result<()> {
        let mut state = self.shared.lock_state();
        self.shared.server_down_locked(&mut state, server_id)
    }

    /// Remove a crashed server once its recovery has completed.
    pub fn remove_after_recovery(&self, server_id: ServerId) -> Result<()> {
        let mut state = self.shared.lock_state();
        state.remove(server_id)?;
        self.shared.push_update(&mut state);
        Ok(())
    }

    /// Record metadata needed to safely recover the master at `server_id`.
    /// Does not publish a cluster update.
    pub fn set_master_recovery_info(&self, server_id: ServerId, info: &[u8]) -> Result<()> {
        let mut state = self.shared.lock_state();
        {
            let entry = state
                .get_entry_mut(server_id)
                .ok_or_else(|| not_found(server_id))?;
            entry.master_recovery_info = info.to_vec();
        }
        self.shared
            .execute_set_master_recovery_info(&mut state, server_id, info)
    }

    /// Snapshot of every server offering a service in `services`.
    pub fn serialize(&self, services: ServiceMask) -> ServerListWire {
        self.shared.lock_state().serialize(services)
    }

    /// Details for one server; the generation must match.
    pub fn get(&self, server_id: ServerId) -> Result<Entry> {
        self.shared
            .lock_state()
            .get_entry(server_id)
            .cloned()
            .ok_or_else(|| not_found(server_id))
    }

    /// Details for the occupant of one slot.
    pub fn get_by_index(&self, index: usize) -> Result<Entry> {
        self.shared
            .lock_state()
            .slots
            .get(index)
            .and_then(|slot| slot.entry.clone())
            .ok_or_else(|| Error::NotFound(format!("no server at index {}", index)))
    }

    /// Number of masters; crashed servers are not counted.
    pub fn master_count(&self) -> u32 {
        self.shared.lock_state().number_of_masters
    }

    /// Number of backups; crashed servers are not counted.
    pub fn backup_count(&self) -> u32 {
        self.shared.lock_state().number_of_backups
    }

    pub fn version(&self) -> u64 {
        self.shared.lock_state().version
    }

    pub fn slot_count(&self) -> usize {
        self.shared.lock_state().slots.len()
    }

    pub fn is_cluster_up_to_date(&self) -> bool {
        self.shared.lock_state().is_cluster_up_to_date()
    }

    /// Subscribe a local component to membership changes. Callbacks run under
    /// the list lock and must not call back into the list.
    pub fn register_tracker(&self, tracker: Arc<dyn ServerTracker>) {
        self.shared.lock_state().trackers.push(tracker);
    }

    /// Block until every membership server has acknowledged the current
    /// version. Starts the dissemination task if it is halted.
    pub fn sync(&self) {
        self.start_updater();
        let mut state = self.shared.lock_state();
        while !state.is_cluster_up_to_date() {
            state = self.shared.list_up_to_date.wait(state).unwrap();
        }
    }

    // === Coordinator recovery ===

    /// Replay a server whose enlistment had fully completed before the
    /// coordinator crashed. The cluster already saw the addition, so
    /// publication is suppressed unless configured otherwise; the record is
    /// deliberately not re-invalidated either.
    pub fn recover_enlisted_server(
        &self,
        info: &ServerInformation,
        entry_id: EntryId,
    ) -> Result<()> {
        let mut state = self.shared.lock_state();
        tracing::debug!("recover_enlisted_server()");
        let server_id = ServerId::from_raw(info.server_id);
        let mark = state.update.len();
        state.add(
            server_id,
            &info.service_locator,
            ServiceMask::deserialize_wire(info.services),
            info.read_speed,
        );
        state.set_server_info_log_id(server_id, entry_id)?;
        if self.shared.config.publish_recovered_enlistment {
            self.shared.push_update(&mut state);
        } else {
            // The pre-crash coordinator already published this addition.
            state.update.truncate(mark);
        }
        Ok(())
    }

    /// Complete an enlistment that was interrupted by a coordinator crash.
    pub fn recover_enlist_server(
        &self,
        info: &ServerInformation,
        entry_id: EntryId,
    ) -> Result<ServerId> {
        let mut state = self.shared.lock_state();
        tracing::debug!("recover_enlist_server()");
        let new_id = self.shared.complete_enlist(
            &mut state,
            ServerId::from_raw(info.server_id),
            ServiceMask::deserialize_wire(info.services),
            info.read_speed,
            &info.service_locator,
            entry_id,
        )?;
        self.shared.push_update(&mut state);
        Ok(new_id)
    }

    /// Complete a server-down that was interrupted by a coordinator crash.
    pub fn recover_server_down(&self, info: &ServerDownInfo, entry_id: EntryId) -> Result<()> {
        let mut state = self.shared.lock_state();
        tracing::debug!("recover_server_down()");
        self.shared
            .complete_server_down(&mut state, ServerId::from_raw(info.server_id), entry_id)
    }

    /// Re-apply recorded master-recovery metadata.
    pub fn recover_master_recovery_info(
        &self,
        info: &ServerUpdateInfo,
        entry_id: EntryId,
    ) -> Result<()> {
        let mut state = self.shared.lock_state();
        tracing::debug!("recover_master_recovery_info()");
        self.shared.complete_set_master_recovery_info(
            &mut state,
            ServerId::from_raw(info.server_id),
            &info.master_recovery_info,
            entry_id,
        )
    }

    /// Rebuild membership by replaying the durable log in append order.
    pub fn replay_log(&self) -> Result<()> {
        for (entry_id, record) in self.shared.log.read_all()? {
            match record {
                LogRecord::ServerEnlisted(info) => self.recover_enlisted_server(&info, entry_id)?,
                LogRecord::ServerEnlisting(info) => {
                    self.recover_enlist_server(&info, entry_id)?;
                }
                LogRecord::ServerDown(info) => self.recover_server_down(&info, entry_id)?,
                LogRecord::ServerUpdate(info) => {
                    self.recover_master_recovery_info(&info, entry_id)?
                }
            }
        }
        Ok(())
    }
}

impl Drop for CoordinatorServerList {
    fn drop(&mut self) {
        self.halt_updater();
    }
}
