//! Deterministic end-to-end session simulation
//!
//! Drives a [`SyncCoordinator`] the way a live session would: entities move
//! every tick, one snapshot lands, payloads fan out, simulated clients
//! decode and apply them, and acks come back over a link that drops a
//! seeded fraction. Time is a [`ManualClock`] and the only randomness is
//! the ack-loss roll, so a failing run replays exactly.
//!
//! Clients are modeled honestly: each keeps its recent reconstructions
//! keyed by sequence and applies a delta to the reconstruction matching the
//! payload's baseline, never to whatever it rendered last. Checksum reports
//! hash the newest reconstruction, so an induced corruption surfaces
//! through the same detection path production clients use.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strafe_core::{
    ClientId, Clock, EntityId, EntityState, ManualClock, SnapshotSeq, StrafeError, StrafeResult,
    Vec3,
};
use strafe_replication::{codec, SnapshotConfig, WorldSnapshot};
use strafe_sync::{world_checksum, SubscriberPacket, SyncConfig, SyncCoordinator, SyncVerdict};

/// Scalar slot every simulated entity spawns with.
pub const HEALTH_SLOT: u8 = 0;

/// Simulation shape and fault model.
#[derive(Clone, Copy, Debug)]
pub struct SimConfig {
    pub entities: usize,
    pub subscribers: usize,
    pub tick: Duration,
    /// Probability that a client's ack never reaches the coordinator.
    pub ack_loss: f64,
    pub seed: u64,
    pub sync: SyncConfig,
    pub snapshots: SnapshotConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            entities: 32,
            subscribers: 4,
            tick: Duration::from_millis(50),
            ack_loss: 0.0,
            seed: 7,
            sync: SyncConfig::default(),
            snapshots: SnapshotConfig::default(),
        }
    }
}

/// What one simulation step produced.
#[derive(Clone, Copy, Debug, Default)]
pub struct StepReport {
    pub seq: SnapshotSeq,
    pub packets: usize,
    pub bytes: u64,
    pub keyframes: usize,
    pub dropped_acks: usize,
    pub desyncs: usize,
}

/// Totals over a whole run.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimSummary {
    pub steps: u32,
    pub packets: u64,
    pub bytes: u64,
    pub keyframes: u64,
    pub dropped_acks: u64,
    pub desyncs: u64,
}

/// A subscriber's view of the session: reconstructions by sequence, newest
/// last, bounded like the server's snapshot history.
struct SimClient {
    history: HashMap<SnapshotSeq, HashMap<EntityId, EntityState>>,
    order: VecDeque<SnapshotSeq>,
    latest: Option<SnapshotSeq>,
    capacity: usize,
}

impl SimClient {
    fn new(capacity: usize) -> Self {
        SimClient {
            history: HashMap::new(),
            order: VecDeque::new(),
            latest: None,
            capacity,
        }
    }

    /// Decode a payload and apply it to the reconstruction it was computed
    /// against.
    fn apply(&mut self, packet: &SubscriberPacket) -> StrafeResult<()> {
        let delta = codec::decode(&packet.payload)?;
        let mut world = if delta.is_keyframe() {
            HashMap::new()
        } else {
            self.history
                .get(&delta.baseline_seq)
                .cloned()
                .ok_or(StrafeError::BaselineExpired {
                    baseline: delta.baseline_seq,
                    oldest: self.order.front().copied().unwrap_or(SnapshotSeq::ZERO),
                })?
        };
        delta.apply(&mut world)?;

        self.history.insert(packet.seq, world);
        self.order.push_back(packet.seq);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.history.remove(&evicted);
            }
        }
        self.latest = Some(packet.seq);
        Ok(())
    }

    fn world(&self) -> Option<&HashMap<EntityId, EntityState>> {
        self.latest.and_then(|seq| self.history.get(&seq))
    }
}

/// Server, subscribers, and the moving world, stepped in lockstep.
pub struct SessionSim {
    config: SimConfig,
    coordinator: SyncCoordinator,
    clock: ManualClock,
    world: HashMap<EntityId, EntityState>,
    clients: HashMap<ClientId, SimClient>,
    rng: StdRng,
    seq: SnapshotSeq,
    /// Every checksum mismatch observed, oldest first.
    desynced: Vec<(ClientId, SnapshotSeq)>,
}

impl SessionSim {
    pub fn new(config: SimConfig) -> Self {
        let mut coordinator = SyncCoordinator::new(config.sync, config.snapshots);
        let mut clients = HashMap::new();
        for n in 0..config.subscribers {
            let client = ClientId::new(n as u64 + 1);
            coordinator.add_subscriber(client, Vec3::new(n as f32 * 8.0, 0.0, 0.0));
            clients.insert(client, SimClient::new(config.snapshots.capacity));
        }

        // Entities on a line through the observer cluster, a fifth of them
        // stationary, the rest drifting at up to eight units per second.
        let mut world = HashMap::new();
        for i in 0..config.entities {
            let id = EntityId::new(i as u64 + 1);
            let position = Vec3::new(i as f32 * 24.0 - 300.0, 0.0, 0.0);
            let velocity = Vec3::new(((i % 5) as f32 - 2.0) * 4.0, 0.0, 0.0);
            let state = EntityState::new(position)
                .with_velocity(velocity)
                .with_scalar(HEALTH_SLOT, 100.0);
            world.insert(id, state);
        }

        SessionSim {
            rng: StdRng::seed_from_u64(config.seed),
            coordinator,
            clock: ManualClock::new(),
            world,
            clients,
            seq: SnapshotSeq::ZERO,
            desynced: Vec::new(),
            config,
        }
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// The newest world a client has reconstructed.
    pub fn client_world(&self, client: ClientId) -> Option<&HashMap<EntityId, EntityState>> {
        self.clients.get(&client).and_then(SimClient::world)
    }

    pub fn desync_log(&self) -> &[(ClientId, SnapshotSeq)] {
        &self.desynced
    }

    /// Advance one tick: move entities, snapshot, fan out, apply, report,
    /// ack (unless the loss roll eats it).
    pub async fn step(&mut self) -> StrafeResult<StepReport> {
        self.clock.advance(self.config.tick);
        let dt = self.config.tick.as_secs_f32();
        for state in self.world.values_mut() {
            state.position = state.position + state.velocity * dt;
        }

        self.seq = self.seq.next();
        let mut snapshot = WorldSnapshot::new(self.seq, self.clock.now());
        for (id, state) in &self.world {
            snapshot.insert(*id, state.clone());
        }
        self.coordinator.ingest(snapshot);

        let packets = self.coordinator.fan_out().await?;
        let mut report = StepReport {
            seq: self.seq,
            packets: packets.len(),
            ..StepReport::default()
        };

        for packet in packets {
            report.bytes += packet.payload.len() as u64;
            if packet.baseline_seq == SnapshotSeq::ZERO {
                report.keyframes += 1;
            }
            let Some(client) = self.clients.get_mut(&packet.client) else {
                continue;
            };
            client.apply(&packet)?;

            if packet.checksum.is_some() {
                let reported = client.world().map(world_checksum).unwrap_or(0);
                let verdict =
                    self.coordinator
                        .handle_checksum_report(packet.client, packet.seq, reported)?;
                if verdict == SyncVerdict::Desynced {
                    self.desynced.push((packet.client, packet.seq));
                    report.desyncs += 1;
                }
            }

            if self.rng.gen::<f64>() < self.config.ack_loss {
                report.dropped_acks += 1;
            } else {
                self.coordinator.handle_ack(packet.client, packet.seq)?;
            }
        }
        Ok(report)
    }

    /// Step `steps` times and total the reports.
    pub async fn run(&mut self, steps: u32) -> StrafeResult<SimSummary> {
        let mut summary = SimSummary::default();
        for _ in 0..steps {
            let report = self.step().await?;
            summary.steps += 1;
            summary.packets += report.packets as u64;
            summary.bytes += report.bytes;
            summary.keyframes += report.keyframes as u64;
            summary.dropped_acks += report.dropped_acks as u64;
            summary.desyncs += report.desyncs as u64;
        }
        Ok(summary)
    }

    /// Plant a bogus scalar in every entity of `client`'s newest
    /// reconstruction. The simulation script never touches scalars, so the
    /// damage persists until a keyframe rebuilds the world, and the next
    /// checksum round must catch it.
    pub fn corrupt(&mut self, client: ClientId) -> bool {
        let Some(sim) = self.clients.get_mut(&client) else {
            return false;
        };
        let Some(seq) = sim.latest else {
            return false;
        };
        let Some(world) = sim.history.get_mut(&seq) else {
            return false;
        };
        for state in world.values_mut() {
            state.set_scalar(u8::MAX, 1.0);
        }
        !world.is_empty()
    }

    /// Error out if any checksum round ever caught a divergent client.
    pub fn demand_sync(&self) -> StrafeResult<()> {
        match self.desynced.first() {
            None => Ok(()),
            Some((client, seq)) => Err(StrafeError::DesyncDetected {
                client: *client,
                seq: *seq,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn verified_every_tick() -> SimConfig {
        SimConfig {
            sync: SyncConfig {
                checksum_interval: 1,
                ..SyncConfig::default()
            },
            ..SimConfig::default()
        }
    }

    #[tokio::test]
    async fn test_clean_session_stays_in_sync() {
        let mut sim = SessionSim::new(verified_every_tick());
        let summary = sim.run(50).await.unwrap();

        assert_eq!(summary.packets, 50 * 4);
        // Only first contact keyframes; every later packet is a delta.
        assert_eq!(summary.keyframes, 4);
        assert_eq!(summary.desyncs, 0);
        sim.demand_sync().unwrap();
    }

    #[tokio::test]
    async fn test_lossy_acks_never_desync() {
        let mut sim = SessionSim::new(SimConfig {
            ack_loss: 0.5,
            seed: 11,
            ..verified_every_tick()
        });
        let summary = sim.run(100).await.unwrap();

        assert!(summary.dropped_acks > 0);
        assert_eq!(summary.desyncs, 0);
        sim.demand_sync().unwrap();
    }

    #[tokio::test]
    async fn test_total_ack_loss_degrades_to_keyframes() {
        let mut sim = SessionSim::new(SimConfig {
            ack_loss: 1.0,
            ..verified_every_tick()
        });
        let summary = sim.run(10).await.unwrap();

        // Baselines never advance, so every packet carries full state, and
        // full state is always correct.
        assert_eq!(summary.keyframes, summary.packets);
        assert_eq!(summary.desyncs, 0);
    }

    #[tokio::test]
    async fn test_corruption_is_detected_and_healed() {
        let mut sim = SessionSim::new(verified_every_tick());
        let victim = ClientId::new(1);
        sim.run(5).await.unwrap();

        assert!(sim.corrupt(victim));
        let report = sim.step().await.unwrap();
        assert_eq!(report.desyncs, 1);
        assert!(matches!(
            sim.demand_sync(),
            Err(StrafeError::DesyncDetected { client, .. }) if client == victim
        ));

        // Recovery: the keyframe rebuilds the victim, checksums pass again.
        let report = sim.step().await.unwrap();
        assert_eq!(report.keyframes, 1);
        assert_eq!(report.desyncs, 0);
    }

    #[tokio::test]
    async fn test_expired_baselines_heal_through_keyframes() {
        let mut sim = SessionSim::new(SimConfig {
            ack_loss: 0.8,
            seed: 13,
            snapshots: SnapshotConfig {
                capacity: 2,
                ..SnapshotConfig::default()
            },
            ..verified_every_tick()
        });
        let summary = sim.run(50).await.unwrap();

        assert!(sim.coordinator().stats().resyncs > 0);
        assert_eq!(summary.desyncs, 0);
        sim.demand_sync().unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        // Whatever the loss rate and seed, honest clients must never trip
        // a checksum round.
        #[test]
        fn prop_honest_clients_stay_in_sync(
            seed in 0u64..512,
            ack_loss in 0.0f64..0.95,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("test runtime");
            let mut sim = SessionSim::new(SimConfig {
                seed,
                ack_loss,
                ..verified_every_tick()
            });
            let summary = rt.block_on(sim.run(20)).expect("sim run");

            prop_assert_eq!(summary.desyncs, 0);
            prop_assert!(sim.demand_sync().is_ok());
        }
    }

    #[tokio::test]
    async fn test_client_view_matches_server_scope() {
        let mut sim = SessionSim::new(SimConfig::default());
        sim.run(3).await.unwrap();

        let world = sim.client_world(ClientId::new(1)).unwrap();
        assert!(!world.is_empty());
        // Entities far outside the interest radius never reach the client.
        assert!(world.len() < sim.coordinator().store().latest().unwrap().len());
    }
}
