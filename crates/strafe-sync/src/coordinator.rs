//! Per-subscriber synchronization orchestration
//!
//! One `WorldSnapshot` arrives per simulation tick. `fan_out` turns it into
//! one wire payload per subscriber: the interest grid scopes the world down
//! to what that observer can see, the delta compressor diffs the scoped view
//! against the subscriber's acknowledged baseline, and the codec packs the
//! result. Acknowledgments advance baselines. Periodic checksums catch
//! clients whose reconstruction drifted; a mismatch schedules a full
//! keyframe rather than a patch, since the extent of the divergence is
//! unknown.
//!
//! A baseline is tracked as an id set alongside its sequence. The scoped id
//! set of every unacknowledged packet is retained, so when an ack lands the
//! coordinator knows exactly which entities that client holds. Entities that
//! crossed the interest boundary between acks then produce correct create
//! and delete records instead of updates the client cannot apply.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use strafe_core::{
    ClientId, EntityId, EntityState, SnapshotSeq, StrafeError, StrafeResult, Vec3,
};
use strafe_replication::codec;
use strafe_replication::{
    Delta, EntityDelta, InterestGrid, SnapshotConfig, SnapshotStore, WorldSnapshot,
    DEFAULT_CELL_SIZE,
};

use crate::checksum::{self, SyncVerdict};
use crate::conflict::{ConflictResolver, UpdateProposal};

/// Coordinator tunables.
#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    /// Interest radius around each observer, in world units.
    pub interest_radius: f32,
    /// Interest grid cell edge length, in world units.
    pub cell_size: f32,
    /// Attach a world checksum to every Nth fan-out. Zero disables
    /// desync detection.
    pub checksum_interval: u64,
    /// Upper bound on concurrently encoding subscribers.
    pub fanout_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            interest_radius: 256.0,
            cell_size: DEFAULT_CELL_SIZE,
            checksum_interval: 30,
            fanout_concurrency: 8,
        }
    }
}

/// Counters accumulated across the coordinator's lifetime.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncStats {
    /// Fan-outs that had a snapshot to work with.
    pub ticks: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    /// Packets carrying full state rather than a delta.
    pub keyframes: u64,
    /// Acknowledgments that advanced a baseline.
    pub acks: u64,
    /// Full resends forced by a baseline falling out of snapshot history.
    pub resyncs: u64,
    /// Checksum mismatches reported by clients.
    pub desyncs: u64,
}

/// One encoded payload addressed to one subscriber.
#[derive(Clone, Debug)]
pub struct SubscriberPacket {
    pub client: ClientId,
    /// [`SnapshotSeq::ZERO`] marks a keyframe.
    pub baseline_seq: SnapshotSeq,
    pub seq: SnapshotSeq,
    pub payload: Bytes,
    /// Entities created, updated, or deleted by this payload.
    pub change_count: usize,
    /// Present on checksum ticks. The client is expected to hash its world
    /// after applying this payload and report the result back.
    pub checksum: Option<u64>,
}

/// Scoped id set of a packet sent but not yet acknowledged.
struct SentFrame {
    seq: SnapshotSeq,
    scope: HashSet<EntityId>,
}

struct Subscriber {
    position: Vec3,
    /// Last acknowledged snapshot, or `None` before first contact and after
    /// any event that invalidates the client's world.
    baseline: Option<SnapshotSeq>,
    /// Entity ids the client holds after applying the acknowledged chain.
    known: HashSet<EntityId>,
    sent: VecDeque<SentFrame>,
    /// Checksum attached to the most recent checksum packet, kept until the
    /// client reports theirs for the same sequence.
    expected_checksum: Option<(SnapshotSeq, u64)>,
}

impl Subscriber {
    fn new(position: Vec3) -> Self {
        Subscriber {
            position,
            baseline: None,
            known: HashSet::new(),
            sent: VecDeque::new(),
            expected_checksum: None,
        }
    }

    /// Forget everything the client was assumed to hold. The next fan-out
    /// sends a keyframe.
    fn invalidate(&mut self) {
        self.baseline = None;
        self.known.clear();
        self.sent.clear();
        self.expected_checksum = None;
    }
}

/// Everything one subscriber's encode needs, detached from the coordinator
/// so subscribers encode concurrently.
struct SyncJob {
    client: ClientId,
    baseline_seq: SnapshotSeq,
    baseline: HashMap<EntityId, EntityState>,
    seq: SnapshotSeq,
    current: HashMap<EntityId, EntityState>,
    scope: HashSet<EntityId>,
    want_checksum: bool,
}

struct SyncOutcome {
    packet: SubscriberPacket,
    scope: HashSet<EntityId>,
}

impl SyncJob {
    fn run(self) -> StrafeResult<SyncOutcome> {
        let delta = Delta::compute(self.baseline_seq, &self.baseline, self.seq, &self.current);
        let payload = codec::encode(&delta)?;
        let checksum = self
            .want_checksum
            .then(|| checksum::world_checksum(&self.current));
        Ok(SyncOutcome {
            packet: SubscriberPacket {
                client: self.client,
                baseline_seq: self.baseline_seq,
                seq: self.seq,
                change_count: delta.change_count(),
                payload,
                checksum,
            },
            scope: self.scope,
        })
    }
}

/// Fans world snapshots out to subscribers and folds their acknowledgments,
/// update proposals, and checksum reports back in.
pub struct SyncCoordinator {
    config: SyncConfig,
    store: SnapshotStore,
    interest: InterestGrid,
    /// Entity ids present in the most recently ingested snapshot.
    tracked: HashSet<EntityId>,
    subscribers: HashMap<ClientId, Subscriber>,
    resolver: ConflictResolver,
    pending: HashMap<EntityId, Vec<UpdateProposal>>,
    stats: SyncStats,
}

impl SyncCoordinator {
    pub fn new(config: SyncConfig, snapshots: SnapshotConfig) -> Self {
        assert!(
            config.interest_radius > 0.0 && config.interest_radius.is_finite(),
            "interest radius must be positive and finite"
        );
        SyncCoordinator {
            interest: InterestGrid::new(config.cell_size),
            store: SnapshotStore::new(snapshots),
            tracked: HashSet::new(),
            subscribers: HashMap::new(),
            resolver: ConflictResolver::default(),
            pending: HashMap::new(),
            stats: SyncStats::default(),
            config,
        }
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Snapshot history, for render-time sampling beside the sync path.
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn resolver_mut(&mut self) -> &mut ConflictResolver {
        &mut self.resolver
    }

    /// Accept the tick's snapshot: reindex entity positions, drop despawned
    /// entities from the grid, and append to history.
    pub fn ingest(&mut self, snapshot: WorldSnapshot) -> Arc<WorldSnapshot> {
        for (id, state) in &snapshot.entities {
            self.interest.update_entity(*id, state.position);
        }
        self.tracked.retain(|id| {
            if snapshot.entities.contains_key(id) {
                true
            } else {
                self.interest.remove_entity(*id);
                false
            }
        });
        self.tracked.extend(snapshot.entities.keys().copied());
        self.store.append(snapshot)
    }

    /// Register an observer. Re-adding an existing client resets them to
    /// first-contact state, which covers reconnects.
    pub fn add_subscriber(&mut self, client: ClientId, position: Vec3) {
        info!(client = ?client, "subscriber added");
        self.subscribers.insert(client, Subscriber::new(position));
    }

    pub fn remove_subscriber(&mut self, client: ClientId) -> bool {
        let removed = self.subscribers.remove(&client).is_some();
        if removed {
            info!(client = ?client, "subscriber removed");
        }
        removed
    }

    pub fn update_observer(&mut self, client: ClientId, position: Vec3) -> StrafeResult<()> {
        let sub = self
            .subscribers
            .get_mut(&client)
            .ok_or(StrafeError::UnknownSubscriber(client))?;
        sub.position = position;
        Ok(())
    }

    /// Trash a client's assumed state so the next fan-out keyframes them.
    pub fn force_resync(&mut self, client: ClientId) -> StrafeResult<()> {
        let sub = self
            .subscribers
            .get_mut(&client)
            .ok_or(StrafeError::UnknownSubscriber(client))?;
        info!(client = ?client, "full resync forced");
        sub.invalidate();
        Ok(())
    }

    /// Record that `client` has applied every payload up to and including
    /// `seq`. Stale and duplicate acks are ignored.
    pub fn handle_ack(&mut self, client: ClientId, seq: SnapshotSeq) -> StrafeResult<()> {
        let sub = self
            .subscribers
            .get_mut(&client)
            .ok_or(StrafeError::UnknownSubscriber(client))?;
        if sub.baseline.is_some_and(|baseline| seq <= baseline) {
            return Ok(());
        }

        while let Some(frame) = sub.sent.pop_front() {
            match frame.seq.cmp(&seq) {
                Ordering::Less => continue,
                Ordering::Equal => {
                    sub.baseline = Some(seq);
                    sub.known = frame.scope;
                    self.stats.acks += 1;
                    return Ok(());
                }
                Ordering::Greater => {
                    sub.sent.push_front(frame);
                    break;
                }
            }
        }

        // No record of what was in that packet, so what the client holds is
        // unknown. Start over from a keyframe.
        debug!(client = ?client, seq = %seq, "ack without a sent record, falling back to keyframe");
        sub.invalidate();
        Ok(())
    }

    /// Queue a state-change proposal for the next resolution pass.
    pub fn submit_update(&mut self, entity: EntityId, proposal: UpdateProposal) {
        self.pending.entry(entity).or_default().push(proposal);
    }

    /// Resolve all pending proposals into one winning change per entity,
    /// ordered by entity id. The simulation applies these before producing
    /// its next snapshot.
    pub fn drain_resolved(&mut self) -> Vec<(EntityId, EntityDelta)> {
        let mut resolved: Vec<_> = self
            .pending
            .drain()
            .filter_map(|(entity, proposals)| {
                self.resolver
                    .resolve(entity, &proposals)
                    .map(|change| (entity, change))
            })
            .collect();
        resolved.sort_by_key(|(entity, _)| *entity);
        resolved
    }

    /// Build one payload per subscriber from the latest snapshot.
    ///
    /// Compression and encoding run on the task pool, at most
    /// `fanout_concurrency` subscribers at a time. Packets come back ordered
    /// by client id. With no snapshot ingested yet this is a no-op.
    pub async fn fan_out(&mut self) -> StrafeResult<Vec<SubscriberPacket>> {
        let Some(latest) = self.store.latest() else {
            return Ok(Vec::new());
        };
        self.stats.ticks += 1;
        let checksum_due = self.config.checksum_interval != 0
            && self.stats.ticks % self.config.checksum_interval == 0;

        let mut jobs = Vec::with_capacity(self.subscribers.len());
        for (client, sub) in &mut self.subscribers {
            let scope = self
                .interest
                .query(sub.position, self.config.interest_radius);
            let current: HashMap<_, _> = scope
                .iter()
                .filter_map(|id| latest.entities.get(id).map(|state| (*id, state.clone())))
                .collect();

            let (baseline_seq, baseline) = match sub.baseline {
                None => (SnapshotSeq::ZERO, HashMap::new()),
                Some(seq) => match self.store.get(seq) {
                    Some(snapshot) => {
                        let held = sub
                            .known
                            .iter()
                            .filter_map(|id| {
                                snapshot.entities.get(id).map(|state| (*id, state.clone()))
                            })
                            .collect();
                        (seq, held)
                    }
                    None => {
                        let err = StrafeError::BaselineExpired {
                            baseline: seq,
                            oldest: self.store.oldest_seq().unwrap_or(SnapshotSeq::ZERO),
                        };
                        warn!(client = ?client, %err, "resending full state");
                        sub.invalidate();
                        self.stats.resyncs += 1;
                        (SnapshotSeq::ZERO, HashMap::new())
                    }
                },
            };

            jobs.push(SyncJob {
                client: *client,
                baseline_seq,
                baseline,
                seq: latest.seq,
                current,
                scope,
                want_checksum: checksum_due,
            });
        }

        let concurrency = self.config.fanout_concurrency.max(1);
        let mut workers = JoinSet::new();
        let mut remaining = jobs.into_iter();
        let mut outcomes = Vec::with_capacity(remaining.len());
        loop {
            while workers.len() < concurrency {
                let Some(job) = remaining.next() else { break };
                workers.spawn(async move { job.run() });
            }
            let Some(joined) = workers.join_next().await else {
                break;
            };
            // A worker error aborts the rest of the set on drop.
            let outcome =
                joined.map_err(|err| StrafeError::SyncWorkerFailed(err.to_string()))??;
            outcomes.push(outcome);
        }

        let mut packets = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            if let Some(sub) = self.subscribers.get_mut(&outcome.packet.client) {
                sub.sent.push_back(SentFrame {
                    seq: outcome.packet.seq,
                    scope: outcome.scope,
                });
                // Frames older than snapshot history can never ack cleanly.
                while sub.sent.len() > self.store.config().capacity {
                    sub.sent.pop_front();
                }
                if let Some(sum) = outcome.packet.checksum {
                    sub.expected_checksum = Some((outcome.packet.seq, sum));
                }
            }
            self.stats.packets_sent += 1;
            self.stats.bytes_sent += outcome.packet.payload.len() as u64;
            if outcome.packet.baseline_seq == SnapshotSeq::ZERO {
                self.stats.keyframes += 1;
            }
            packets.push(outcome.packet);
        }
        packets.sort_by_key(|packet| packet.client);
        Ok(packets)
    }

    /// Compare a client's reported world checksum against the one attached
    /// to the packet it hashed after.
    ///
    /// A report for a sequence there is no stored expectation for proves
    /// nothing either way and passes. A mismatch invalidates the client, so
    /// the next fan-out keyframes them.
    pub fn handle_checksum_report(
        &mut self,
        client: ClientId,
        seq: SnapshotSeq,
        reported: u64,
    ) -> StrafeResult<SyncVerdict> {
        let sub = self
            .subscribers
            .get_mut(&client)
            .ok_or(StrafeError::UnknownSubscriber(client))?;
        let Some((expected_seq, expected)) = sub.expected_checksum else {
            return Ok(SyncVerdict::InSync);
        };
        if expected_seq != seq {
            return Ok(SyncVerdict::InSync);
        }
        match checksum::verify(reported, expected) {
            SyncVerdict::InSync => Ok(SyncVerdict::InSync),
            SyncVerdict::Desynced => {
                let err = StrafeError::DesyncDetected { client, seq };
                warn!(%err, "scheduling full resync");
                sub.invalidate();
                self.stats.desyncs += 1;
                Ok(SyncVerdict::Desynced)
            }
        }
    }
}
