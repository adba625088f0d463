//! Backup selection for segment replication
//!
//! The selector works against a cached, backup-only snapshot of the server
//! list fetched from the coordinator. Primaries are chosen by sampling a
//! handful of backups and keeping the one with the shortest expected
//! recovery read time; secondaries are sampled until one avoids conflicts
//! with the replicas already chosen. When the cached list cannot satisfy the
//! constraints, it is refreshed from the coordinator and selection retries
//! for as long as it takes.

use crate::common::service_mask::ServiceType;
use crate::common::{Error, Result, ServerId, ServerListWire, ServiceMask};
use crate::coordinator::entry::ServerStatus;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Size of one segment in bytes; used to estimate recovery read times.
const SEGMENT_SIZE: u64 = 8 * 1024 * 1024;

/// Number of uniform samples a primary pick is drawn from.
const PRIMARY_SAMPLES: usize = 5;

/// Fetches the coordinator's current list of backups.
pub trait CoordinatorClient: Send + Sync {
    fn backup_list(&self) -> Result<ServerListWire>;
}

/// Packs and unpacks the 8-byte per-host scratch word tracking how loaded a
/// backup is: disk bandwidth in the low half, the number of primary segments
/// this master has stored on it in the high half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackupLoad {
    /// Disk bandwidth of the host in MB/s.
    pub bandwidth: u32,
    /// Number of primary segments this master has stored on the backup.
    pub num_segments: u32,
}

impl BackupLoad {
    pub fn pack(self) -> u64 {
        (u64::from(self.num_segments) << 32) | u64::from(self.bandwidth)
    }

    pub fn unpack(word: u64) -> Self {
        Self {
            bandwidth: (word & 0xffff_ffff) as u32,
            num_segments: (word >> 32) as u32,
        }
    }

    /// Expected number of milliseconds the backup would take to read all of
    /// the primary segments this master has stored on it, plus one more.
    pub fn expected_read_ms(self) -> u32 {
        // Hosts that never reported a bandwidth default to 100 MB/s.
        let bandwidth = if self.bandwidth == 0 {
            100
        } else {
            self.bandwidth
        };
        if bandwidth == 1 {
            return 1;
        }
        ((u64::from(self.num_segments) + 1) * 1000 * SEGMENT_SIZE
            / 1024
            / 1024
            / u64::from(bandwidth)) as u32
    }
}

/// One cached backup host.
#[derive(Debug, Clone)]
pub struct BackupHost {
    pub server_id: ServerId,
    pub service_locator: String,
    /// Scratch word packing a `BackupLoad`.
    pub user_data: u64,
}

/// Chooses backups for a master's segments.
pub struct BackupSelector {
    coordinator: Option<Arc<dyn CoordinatorClient>>,
    hosts: Vec<BackupHost>,
    /// Permutation of host indexes driving `random_host`. Positions before
    /// `num_used_hosts` were returned this round, the rest are candidates.
    hosts_order: Vec<usize>,
    num_used_hosts: usize,
    rng: StdRng,
}

impl BackupSelector {
    pub fn new(coordinator: Option<Arc<dyn CoordinatorClient>>) -> Self {
        Self {
            coordinator,
            hosts: Vec::new(),
            hosts_order: Vec::new(),
            num_used_hosts: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Choose `num_backups` backups for a segment. The first entry of the
    /// result is the primary replica; the rest are mutually non-conflicting
    /// secondaries.
    ///
    /// Retries against refreshed host lists for as long as the constraints
    /// are unsatisfiable, so this only terminates once the coordinator
    /// serves enough distinct backups.
    pub fn select(&mut self, num_backups: usize) -> Result<Vec<ServerId>> {
        let mut chosen = Vec::with_capacity(num_backups);
        if num_backups == 0 {
            return Ok(chosen);
        }
        while self.hosts.is_empty() {
            self.refresh()?;
        }

        // Primary: the least loaded of a few uniform samples.
        let mut primary = self.random_host();
        for _ in 0..PRIMARY_SAMPLES - 1 {
            let candidate = self.random_host();
            if self.load(primary).expected_read_ms() > self.load(candidate).expected_read_ms() {
                primary = candidate;
            }
        }
        let mut load = self.load(primary);
        tracing::debug!(
            "chose backup with {} segments and {} MB/s disk bandwidth (expected time to read on \
             recovery is {} ms)",
            load.num_segments,
            load.bandwidth,
            load.expected_read_ms()
        );
        load.num_segments += 1;
        self.hosts[primary].user_data = load.pack();
        chosen.push(self.hosts[primary].server_id);

        // Secondaries: anything that doesn't conflict with what we have.
        for _ in 1..num_backups {
            let secondary = self.select_additional(&chosen)?;
            chosen.push(self.hosts[secondary].server_id);
        }
        Ok(chosen)
    }

    /// Find a backup that conflicts with none of `chosen`, refreshing the
    /// host list whenever the sampling budget runs out.
    fn select_additional(&mut self, chosen: &[ServerId]) -> Result<usize> {
        loop {
            for _ in 0..self.hosts.len() * 2 {
                let host = self.random_host();
                if !self.conflicts_with_any(host, chosen) {
                    return Ok(host);
                }
            }
            // The constraints must be unsatisfiable with the current list.
            tracing::info!("current list of backups is insufficient, refreshing");
            self.refresh()?;
        }
    }

    /// Return a random backup, visiting every backup at least once in any
    /// `2 * hosts.len()` consecutive calls.
    ///
    /// Conceptually, a set of candidates starts as the whole host list and a
    /// set of used hosts starts empty; each call moves one random candidate
    /// into the used set and returns it, starting over once the candidates
    /// run out. `hosts_order` implements both sets in place: indexes before
    /// `num_used_hosts` are used, the rest are candidates.
    fn random_host(&mut self) -> usize {
        debug_assert!(!self.hosts.is_empty());
        if self.num_used_hosts >= self.hosts_order.len() {
            self.num_used_hosts = 0;
        }
        let i = self.num_used_hosts;
        self.num_used_hosts += 1;
        let j = i + self.rng.gen_range(0..self.hosts_order.len() - i);
        self.hosts_order.swap(i, j);
        self.hosts_order[i]
    }

    fn load(&self, host: usize) -> BackupLoad {
        BackupLoad::unpack(self.hosts[host].user_data)
    }

    /// Whether placing a replica on `a` is unwise given a replica on `b`.
    /// Same-host is the only conflict today; rack or power-source awareness
    /// can slot in here without callers changing.
    fn conflict(&self, a: usize, b: ServerId) -> bool {
        self.hosts[a].server_id == b
    }

    fn conflicts_with_any(&self, a: usize, chosen: &[ServerId]) -> bool {
        chosen.iter().any(|b| self.conflict(a, *b))
    }

    /// Replace the cached host list with a fresh backup list from the
    /// coordinator. Segment counts restart at zero.
    fn refresh(&mut self) -> Result<()> {
        let coordinator = self.coordinator.as_ref().ok_or(Error::NoCoordinator)?;
        let list = coordinator.backup_list()?;

        self.hosts = list
            .servers
            .iter()
            .filter(|entry| {
                ServiceMask::deserialize_wire(entry.services).has(ServiceType::Backup)
                    && entry.status == ServerStatus::Up.as_wire()
            })
            .map(|entry| BackupHost {
                server_id: ServerId::from_raw(entry.server_id),
                service_locator: entry.service_locator.clone(),
                user_data: BackupLoad {
                    bandwidth: entry.expected_read_mbytes_per_sec,
                    num_segments: 0,
                }
                .pack(),
            })
            .collect();
        self.hosts_order = (0..self.hosts.len()).collect();
        self.num_used_hosts = 0;
        Ok(())
    }

    /// The cached host list.
    pub fn hosts(&self) -> &[BackupHost] {
        &self.hosts
    }
}
