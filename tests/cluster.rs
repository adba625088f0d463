//! Cluster membership integration tests
//!
//! These drive the full stack: mutators on the caller thread, the
//! dissemination task in the background, and a scripted transport standing in
//! for the cluster's membership servers.

use coordlist::common::{ListConfig, ServerListKind, ServerListWire, ServiceMask, ServiceType};
use coordlist::coordinator::{
    CoordinatorServerList, MemoryLog, NoopRecovery, ServerStatus, UpdateRpc, UpdateTransport,
};
use coordlist::{Error, Result, ServerId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct ReadyRpc {
    result: Result<()>,
}

impl UpdateRpc for ReadyRpc {
    fn is_ready(&self) -> bool {
        true
    }
    fn wait(self: Box<Self>) -> Result<()> {
        self.result
    }
    fn cancel(self: Box<Self>) {}
}

/// Records every update sent; outcomes come from a scripting hook.
struct ScriptedTransport {
    sent: Mutex<Vec<(ServerId, Arc<ServerListWire>)>>,
    outcome: Box<dyn Fn(usize) -> Result<()> + Send + Sync>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    fn succeeding() -> Self {
        Self::with_outcome(|_| Ok(()))
    }

    fn with_outcome(outcome: impl Fn(usize) -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            outcome: Box::new(outcome),
            calls: AtomicUsize::new(0),
        }
    }

    fn sent_to(&self, target: ServerId) -> Vec<Arc<ServerListWire>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == target)
            .map(|(_, wire)| Arc::clone(wire))
            .collect()
    }
}

impl UpdateTransport for ScriptedTransport {
    fn start_update(
        &self,
        target: ServerId,
        _locator: &str,
        list: Arc<ServerListWire>,
    ) -> Box<dyn UpdateRpc> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push((target, list));
        Box::new(ReadyRpc {
            result: (self.outcome)(call),
        })
    }
}

fn cluster(transport: Arc<ScriptedTransport>) -> CoordinatorServerList {
    CoordinatorServerList::new(
        Arc::new(MemoryLog::new()),
        Arc::new(NoopRecovery),
        transport,
        ListConfig::default(),
    )
    .unwrap()
}

const MASTER: ServiceType = ServiceType::Master;
const BACKUP: ServiceType = ServiceType::Backup;
const MEMBERSHIP: ServiceType = ServiceType::Membership;

#[test]
fn test_convergence_with_one_membership_server() {
    let transport = Arc::new(ScriptedTransport::succeeding());
    let csl = cluster(transport.clone());

    let m = csl
        .enlist_server(None, MASTER | MEMBERSHIP, 0, "mock:host=m1")
        .unwrap();
    csl.enlist_server(None, ServiceMask::from(BACKUP), 100, "mock:host=b1")
        .unwrap();
    csl.enlist_server(None, ServiceMask::from(BACKUP), 100, "mock:host=b2")
        .unwrap();

    csl.sync();

    assert!(csl.is_cluster_up_to_date());
    let entry = csl.get(m).unwrap();
    assert_eq!(entry.verified_version, csl.version());

    // The first message to m bootstraps it with a full list; everything
    // after is an incremental update with strictly increasing versions.
    let messages = transport.sent_to(m);
    assert!(!messages.is_empty());
    assert_eq!(messages[0].kind, ServerListKind::FullList);
    let versions: Vec<_> = messages.iter().map(|wire| wire.version).collect();
    for pair in versions.windows(2) {
        assert!(pair[0] < pair[1], "versions not increasing: {:?}", versions);
    }
    for wire in &messages[1..] {
        assert_eq!(wire.kind, ServerListKind::Update);
    }
    assert_eq!(*versions.last().unwrap(), csl.version());

    csl.halt_updater();
}

#[test]
fn test_replacement_publishes_removal_before_addition() {
    let transport = Arc::new(ScriptedTransport::succeeding());
    let csl = cluster(transport.clone());

    let observer = csl
        .enlist_server(None, ServiceMask::from(MEMBERSHIP), 0, "mock:host=obs")
        .unwrap();
    // Keep the observer caught up so the replacement arrives as incremental
    // deltas rather than folded into its bootstrap snapshot.
    csl.sync();
    let s1 = csl
        .enlist_server(None, BACKUP | MEMBERSHIP, 100, "mock:host=b1")
        .unwrap();
    csl.sync();
    let s2 = csl
        .enlist_server(Some(s1), BACKUP | MEMBERSHIP, 100, "mock:host=b2")
        .unwrap();
    assert_eq!(s2.index(), s1.index());
    assert_eq!(s2.generation(), s1.generation() + 1);

    csl.sync();

    // Flatten everything the observer received and keep rows touching the
    // contested slot: the crash of the old generation must come before the
    // add of the new one.
    let rows: Vec<_> = transport
        .sent_to(observer)
        .iter()
        .flat_map(|wire| wire.servers.clone())
        .filter(|row| ServerId::from_raw(row.server_id).index() == s1.index())
        .collect();

    let crash_pos = rows
        .iter()
        .position(|row| {
            row.server_id == s1.raw() && row.status == ServerStatus::Crashed.as_wire()
        })
        .expect("crash row not published");
    let add_pos = rows
        .iter()
        .position(|row| row.server_id == s2.raw() && row.status == ServerStatus::Up.as_wire())
        .expect("replacement add row not published");
    assert!(crash_pos < add_pos);

    csl.halt_updater();
}

#[test]
fn test_retries_until_transport_recovers() {
    // The first three deliveries fail; dissemination keeps retrying with no
    // backoff until the transport comes back.
    let transport = Arc::new(ScriptedTransport::with_outcome(|call| {
        if call < 3 {
            Err(Error::Rpc("connection refused".into()))
        } else {
            Ok(())
        }
    }));
    let csl = cluster(transport.clone());

    let m = csl
        .enlist_server(None, ServiceMask::from(MEMBERSHIP), 0, "mock:host=m1")
        .unwrap();
    csl.enlist_server(None, ServiceMask::from(BACKUP), 100, "mock:host=b1")
        .unwrap();

    csl.sync();

    assert_eq!(csl.get(m).unwrap().verified_version, csl.version());
    assert!(transport.calls.load(Ordering::SeqCst) > 3);

    csl.halt_updater();
}

#[test]
fn test_server_not_up_counts_as_delivered() {
    let transport = Arc::new(ScriptedTransport::with_outcome(|_| {
        Err(Error::ServerNotUp("mock:host=m1".into()))
    }));
    let csl = cluster(transport);

    csl.enlist_server(None, ServiceMask::from(MEMBERSHIP), 0, "mock:host=m1")
        .unwrap();

    // The target claims to be gone; for dissemination bookkeeping that is
    // as good as delivered, so sync still terminates.
    csl.sync();
    assert!(csl.is_cluster_up_to_date());

    csl.halt_updater();
}

#[test]
fn test_counts_track_up_servers() {
    let transport = Arc::new(ScriptedTransport::succeeding());
    let csl = cluster(transport);

    let m1 = csl
        .enlist_server(None, MASTER | MEMBERSHIP, 0, "mock:host=m1")
        .unwrap();
    let mb = csl
        .enlist_server(None, MASTER | BACKUP, 100, "mock:host=mb1")
        .unwrap();
    let b1 = csl
        .enlist_server(None, ServiceMask::from(BACKUP), 100, "mock:host=b1")
        .unwrap();
    assert_eq!(csl.master_count(), 2);
    assert_eq!(csl.backup_count(), 2);

    csl.server_down(b1).unwrap();
    assert_eq!(csl.master_count(), 2);
    assert_eq!(csl.backup_count(), 1);

    csl.server_down(mb).unwrap();
    assert_eq!(csl.master_count(), 1);
    assert_eq!(csl.backup_count(), 0);

    csl.remove_after_recovery(mb).unwrap();
    assert_eq!(csl.master_count(), 1);
    assert_eq!(csl.get(m1).unwrap().status, ServerStatus::Up);
}

#[test]
fn test_replication_groups_over_cluster_lifecycle() {
    let transport = Arc::new(ScriptedTransport::succeeding());
    let csl = cluster(transport);

    let backups: Vec<_> = (1..=6)
        .map(|n| {
            csl.enlist_server(
                None,
                ServiceMask::from(BACKUP),
                100,
                &format!("mock:host=b{}", n),
            )
            .unwrap()
        })
        .collect();

    let first_group: Vec<_> = backups[..3]
        .iter()
        .map(|b| csl.get(*b).unwrap().replication_id)
        .collect();
    assert_eq!(first_group, vec![1, 1, 1]);
    let second_group: Vec<_> = backups[3..]
        .iter()
        .map(|b| csl.get(*b).unwrap().replication_id)
        .collect();
    assert_eq!(second_group, vec![2, 2, 2]);

    // Losing one member frees the survivors for a later group.
    csl.server_down(backups[0]).unwrap();
    assert_eq!(csl.get(backups[1]).unwrap().replication_id, 0);
    assert_eq!(csl.get(backups[2]).unwrap().replication_id, 0);
}
