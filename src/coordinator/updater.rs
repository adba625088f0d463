//! Asynchronous membership dissemination
//!
//! A dedicated task keeps every membership server's copy of the list
//! current. It manages starting, polling, and finishing update RPCs away
//! from the list's critical sections: only `get_work`, `work_success`,
//! `work_failed`, and `wait_for_work` take the list lock; issuing and
//! polling RPCs never does.
//!
//! The task maintains a pool of RPC slots whose size adapts toward a steady
//! state where roughly one RPC finishes per iteration: each pass reaps every
//! finished RPC, starts at most one new RPC, and grows the pool when all
//! slots are busy. Starting an RPC is far more expensive than polling one,
//! so capping starts per pass keeps the polling tight while the pool ramps
//! up to whatever concurrency the cluster needs.
//!
//! Per-target bookkeeping lives on the entries themselves: a server's
//! `verified_version` is the newest version it acknowledged, and its
//! `update_version` is the version promised to an in-flight RPC. A scan of
//! the list also maintains `min_confirmed_version`, below which update
//! batches can be pruned.

use crate::common::{Error, Result, ServerId, ServerListKind, ServerListWire};
use crate::common::service_mask::ServiceType;
use crate::coordinator::entry::{ServerStatus, UNINITIALIZED_VERSION};
use crate::coordinator::server_list::{CoordinatorServerList, Shared, UpdateBatch};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

/// Slots added to the RPC pool whenever every slot is busy.
const RPC_POOL_GROWTH: usize = 8;

/// An in-flight membership update RPC, pollable by the dissemination task.
pub trait UpdateRpc: Send {
    fn is_ready(&self) -> bool;

    /// Block until the RPC completes. `Err(ServerNotUp)` means the target is
    /// no longer part of the cluster; callers treat it as delivered.
    fn wait(self: Box<Self>) -> Result<()>;

    fn cancel(self: Box<Self>);
}

/// Transport used to push membership updates to servers.
pub trait UpdateTransport: Send + Sync {
    fn start_update(
        &self,
        target: ServerId,
        service_locator: &str,
        list: Arc<ServerListWire>,
    ) -> Box<dyn UpdateRpc>;
}

/// One unit of dissemination work: a wire message for one target. The unit
/// owns the message, so pruning the update buffer can never invalidate it.
pub(crate) struct WorkUnit {
    pub(crate) target: ServerId,
    pub(crate) service_locator: String,
    pub(crate) wire: Arc<ServerListWire>,
}

struct ActiveRpc {
    target: ServerId,
    rpc: Box<dyn UpdateRpc>,
}

impl CoordinatorServerList {
    /// Start the dissemination task if it is not running.
    pub fn start_updater(&self) {
        let mut handle = self.updater.lock().unwrap();
        if handle.is_none() {
            self.shared.stop_updater.store(false, Ordering::SeqCst);
            let shared = Arc::clone(&self.shared);
            *handle = Some(
                thread::Builder::new()
                    .name("csl-updater".into())
                    .spawn(move || update_loop(shared))
                    .expect("failed to spawn updater thread"),
            );
        }
        // Tell it to look for work regardless.
        self.shared.has_updates_or_stop.notify_one();
    }

    /// Stop the dissemination task, cancelling in-flight update RPCs; the
    /// cluster may be left out of date. Call `sync` first to force a
    /// synchronization point. Blocks until the task exits.
    pub fn halt_updater(&self) {
        {
            let _state = self.shared.lock_state();
            self.shared.stop_updater.store(true, Ordering::SeqCst);
            self.shared.has_updates_or_stop.notify_one();
        }
        if let Some(handle) = self.updater.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Top-level loop of the dissemination task.
fn update_loop(shared: Arc<Shared>) {
    let mut max_rpcs = shared.config.update_rpc_pool_size.max(1);
    let mut active: Vec<ActiveRpc> = Vec::new();

    while !shared.stop_updater.load(Ordering::SeqCst) {
        // Reap every finished RPC.
        let mut finished_any = false;
        let mut i = 0;
        while i < active.len() {
            if shared.stop_updater.load(Ordering::SeqCst) {
                break;
            }
            if !active[i].rpc.is_ready() {
                i += 1;
                continue;
            }
            let done = active.swap_remove(i);
            finished_any = true;
            match done.rpc.wait() {
                Ok(()) => shared.work_success(done.target),
                // No longer a target; for bookkeeping that counts as done.
                Err(Error::ServerNotUp(_)) => shared.work_success(done.target),
                Err(err) => {
                    tracing::debug!("membership update to {} failed: {}", done.target, err);
                    shared.work_failed(done.target);
                }
            }
        }

        // Start at most one new RPC.
        let mut started = false;
        if active.len() < max_rpcs && !shared.stop_updater.load(Ordering::SeqCst) {
            if let Some(unit) = shared.get_work() {
                let rpc =
                    shared
                        .transport
                        .start_update(unit.target, &unit.service_locator, unit.wire);
                active.push(ActiveRpc {
                    target: unit.target,
                    rpc,
                });
                started = true;
            }
        }

        // Grow the pool, or sleep when nothing is in flight.
        if active.len() >= max_rpcs {
            max_rpcs += RPC_POOL_GROWTH;
        } else if active.is_empty() && !started {
            shared.wait_for_work();
        } else if !finished_any && !started {
            thread::yield_now();
        }
    }

    // Halting: everything still in flight is rolled back and cancelled.
    for entry in active {
        shared.work_failed(entry.target);
        entry.rpc.cancel();
    }
}

impl Shared {
    /// Sleep until there are updates to send or the task is halted. Wakes
    /// `sync` callers while the list is fully confirmed.
    pub(crate) fn wait_for_work(&self) {
        let mut state = self.lock_state();
        while state.min_confirmed_version == state.version
            && !self.stop_updater.load(Ordering::SeqCst)
        {
            self.list_up_to_date.notify_all();
            state = self.has_updates_or_stop.wait(state).unwrap();
        }
    }

    /// Find a membership server that needs an update and has none in flight.
    ///
    /// Must eventually be followed by `work_success` or `work_failed` for the
    /// returned target; until then the target is skipped by later scans.
    ///
    /// Scans resume where the previous call left off so updates fan out
    /// across the list. A full scan also recomputes `min_confirmed_version`
    /// and prunes confirmed batches; if a scan at the current version finds
    /// nothing, scanning is skipped until the version moves or an RPC
    /// completes short of it.
    pub(crate) fn get_work(&self) -> Option<WorkUnit> {
        let mut guard = self.lock_state();
        let state = &mut *guard;

        if state.slots.is_empty()
            || (state.num_updating_servers > 0
                && state.last_scan.no_work_found_for_epoch == state.version)
        {
            return None;
        }

        let len = state.slots.len();
        let start = state.last_scan.search_index % len;
        let mut i = start;
        let mut num_updatable: u64 = 0;
        loop {
            let candidate = match state.slots[i].entry.as_ref() {
                Some(entry)
                    if entry.status == ServerStatus::Up
                        && entry.services.has(ServiceType::Membership) =>
                {
                    Some((entry.server_id, entry.verified_version, entry.update_version))
                }
                _ => None,
            };

            if let Some((target, verified, update_version)) = candidate {
                num_updatable += 1;
                if verified < state.last_scan.min_version {
                    state.last_scan.min_version = verified;
                }

                // Needs an update and has no RPC outstanding.
                if update_version != state.version && update_version == verified {
                    let (wire, tail) = if verified == UNINITIALIZED_VERSION {
                        // Never seen the list: send a full snapshot,
                        // materialized lazily on the newest batch so other
                        // new servers at this version share it.
                        if state.updates.is_empty() {
                            let version = state.version;
                            state.updates.push_back(UpdateBatch {
                                version,
                                incremental: Arc::new(ServerListWire {
                                    version,
                                    kind: ServerListKind::Update,
                                    servers: Vec::new(),
                                }),
                                full: None,
                            });
                        }
                        if state.updates.back().map_or(false, |b| b.full.is_none()) {
                            let snapshot = Arc::new(state.serialize_full());
                            if let Some(batch) = state.updates.back_mut() {
                                batch.full = Some(snapshot);
                            }
                        }
                        let batch = state.updates.back()?;
                        (Arc::clone(batch.full.as_ref()?), state.version)
                    } else {
                        // Behind: send the next incremental batch.
                        let front_version = state.updates.front()?.version;
                        let offset = (verified + 1 - front_version) as usize;
                        (Arc::clone(&state.updates[offset].incremental), verified + 1)
                    };

                    state.num_updating_servers += 1;
                    state.last_scan.search_index = i;
                    let mut service_locator = String::new();
                    if let Some(entry) = state.slots[i].entry.as_mut() {
                        entry.update_version = tail;
                        service_locator = entry.service_locator.clone();
                    }
                    return Some(WorkUnit {
                        target,
                        service_locator,
                        wire,
                    });
                }
            }

            i = (i + 1) % len;

            // Wrapping past the start of the list commits the scan's
            // statistics and prunes what the whole cluster has confirmed.
            if i == 0 {
                if state.last_scan.min_version != UNINITIALIZED_VERSION {
                    state.min_confirmed_version = state.last_scan.min_version;
                }
                state.last_scan.min_version = UNINITIALIZED_VERSION;
                self.prune_updates(state);
            }
            if i == start {
                break;
            }
        }

        // With no updatable servers at all, everything is confirmed.
        if num_updatable == 0 {
            state.min_confirmed_version = state.version;
            self.prune_updates(state);
        }

        state.last_scan.no_work_found_for_epoch = state.version;
        None
    }

    /// Record that a work unit was delivered: the target has verified the
    /// promised version. Safe against targets that vanished meanwhile.
    pub(crate) fn work_success(&self, id: ServerId) {
        let mut state = self.lock_state();

        if state.num_updating_servers > 0 {
            state.num_updating_servers -= 1;
        } else {
            tracing::error!(
                "bookkeeping issue detected: the count of updating servers went negative; not a \
                 total failure, but the updater will spin even without work; caused by mismatched \
                 get_work() and work_success()/work_failed() calls"
            );
        }

        let version = state.version;
        let mut rescan = false;
        match state.get_entry_mut(id) {
            None => {
                // Unusual, but not an error: the server answered an update
                // and then left the list.
                tracing::debug!(
                    "server {} responded to a server list update but is no longer in the server \
                     list",
                    id
                );
                return;
            }
            Some(server) => {
                if server.verified_version == server.update_version {
                    tracing::error!(
                        "work_success invoked for server {} even though no update was sent out or \
                         it has already been invoked; possible race/bookkeeping issue",
                        id
                    );
                } else {
                    tracing::debug!(
                        "server list update success: {} ({} => {})",
                        id,
                        server.verified_version,
                        server.update_version
                    );
                    server.verified_version = server.update_version;
                }
                // Not caught up all the way, or the last updater finished:
                // force a rescan so min_confirmed_version moves.
                if server.verified_version < version {
                    rescan = true;
                }
            }
        }
        if rescan {
            state.last_scan.no_work_found_for_epoch = 0;
        }
    }

    /// Roll a work unit back after a failed delivery; the target will be
    /// picked up again by a later scan.
    pub(crate) fn work_failed(&self, id: ServerId) {
        let mut state = self.lock_state();

        if state.num_updating_servers > 0 {
            state.num_updating_servers -= 1;
        } else {
            tracing::error!(
                "bookkeeping issue detected: the count of updating servers went negative; not a \
                 total failure, but the updater will spin even without work; caused by mismatched \
                 get_work() and work_success()/work_failed() calls"
            );
        }

        if let Some(server) = state.get_entry_mut(id) {
            server.update_version = server.verified_version;
            tracing::debug!(
                "server list update failed: {} ({} => {})",
                id,
                server.verified_version,
                server.update_version
            );
        }

        state.last_scan.no_work_found_for_epoch = 0;
    }
}
