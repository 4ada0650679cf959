//! Snapshot history and time-shifted sampling
//!
//! The simulation tick appends one [`WorldSnapshot`] per tick; observers
//! sample the world at `now - interpolation_delay` and get a view blended
//! between the two snapshots bracketing that time. Sampling ahead of the
//! newest snapshot extrapolates along known velocity, bounded by a
//! configured horizon, then freezes.
//!
//! Stored snapshots are immutable behind `Arc`, so the store is single
//! writer, many readers: a sample holds the lock only long enough to clone
//! at most two handles, and appends only ever evict from the oldest end.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use strafe_core::{interp_fraction, EntityId, EntityState, SimTime, SnapshotSeq, Vec3};

/// One immutable world state at a point on the session timeline.
#[derive(Clone, Debug, Default)]
pub struct WorldSnapshot {
    pub seq: SnapshotSeq,
    pub server_time: SimTime,
    pub entities: HashMap<EntityId, EntityState>,
}

impl WorldSnapshot {
    pub fn new(seq: SnapshotSeq, server_time: SimTime) -> Self {
        WorldSnapshot {
            seq,
            server_time,
            entities: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: EntityId, state: EntityState) {
        self.entities.insert(id, state);
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityState> {
        self.entities.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Store tunables.
#[derive(Clone, Copy, Debug)]
pub struct SnapshotConfig {
    /// Snapshots retained before the oldest is evicted.
    pub capacity: usize,
    /// How far behind real time observers render.
    pub interpolation_delay: Duration,
    /// Furthest a sample may run ahead of the newest snapshot before the
    /// view freezes.
    pub max_extrapolation: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            capacity: 64,
            interpolation_delay: Duration::from_millis(100),
            max_extrapolation: Duration::from_millis(250),
        }
    }
}

/// A resolved view of the world at one point in time.
#[derive(Clone, Debug)]
pub struct WorldView {
    pub time: SimTime,
    pub entities: HashMap<EntityId, EntityState>,
}

impl WorldView {
    pub fn entity(&self, id: EntityId) -> Option<&EntityState> {
        self.entities.get(&id)
    }
}

/// Bounded, time-ordered snapshot history.
pub struct SnapshotStore {
    config: SnapshotConfig,
    buffer: RwLock<VecDeque<Arc<WorldSnapshot>>>,
}

impl SnapshotStore {
    pub fn new(config: SnapshotConfig) -> Self {
        assert!(config.capacity >= 2, "interpolation needs two snapshots");
        SnapshotStore {
            config,
            buffer: RwLock::new(VecDeque::with_capacity(config.capacity)),
        }
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Store a snapshot, evicting the oldest once at capacity.
    ///
    /// The caller appends in non-decreasing `server_time` and ascending
    /// `seq` order (the simulation tick is the single writer).
    pub fn append(&self, snapshot: WorldSnapshot) -> Arc<WorldSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut buffer = self.buffer.write();
        debug_assert!(
            buffer
                .back()
                .map_or(true, |last| last.server_time <= snapshot.server_time
                    && last.seq < snapshot.seq),
            "snapshots must be appended in order"
        );
        while buffer.len() >= self.config.capacity {
            buffer.pop_front();
        }
        buffer.push_back(Arc::clone(&snapshot));
        snapshot
    }

    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.read().is_empty()
    }

    pub fn latest(&self) -> Option<Arc<WorldSnapshot>> {
        self.buffer.read().back().cloned()
    }

    pub fn oldest_seq(&self) -> Option<SnapshotSeq> {
        self.buffer.read().front().map(|s| s.seq)
    }

    pub fn latest_seq(&self) -> Option<SnapshotSeq> {
        self.buffer.read().back().map(|s| s.seq)
    }

    /// Look up a retained snapshot by sequence number.
    pub fn get(&self, seq: SnapshotSeq) -> Option<Arc<WorldSnapshot>> {
        let buffer = self.buffer.read();
        buffer
            .binary_search_by_key(&seq, |s| s.seq)
            .ok()
            .map(|idx| Arc::clone(&buffer[idx]))
    }

    /// The render timeline: observers look this far into the past.
    pub fn render_time(&self, now: SimTime) -> SimTime {
        now - self.config.interpolation_delay
    }

    /// Resolve the world as of `render_time`. None only while no snapshot
    /// has been stored yet.
    pub fn sample(&self, render_time: SimTime) -> Option<WorldView> {
        // Clone the handles under the read lock, interpolate outside it.
        let (prev, next) = {
            let buffer = self.buffer.read();
            if buffer.is_empty() {
                return None;
            }
            let idx = buffer.partition_point(|s| s.server_time <= render_time);
            if idx == 0 {
                (Arc::clone(&buffer[0]), None)
            } else if idx == buffer.len() {
                let anchor = Arc::clone(&buffer[idx - 1]);
                let before = idx.checked_sub(2).map(|i| Arc::clone(&buffer[i]));
                return Some(self.extrapolate(anchor, before, render_time));
            } else {
                (Arc::clone(&buffer[idx - 1]), Some(Arc::clone(&buffer[idx])))
            }
        };

        match next {
            Some(next) => Some(interpolate(&prev, &next, render_time)),
            // Render time precedes all history: clamp to the oldest state.
            None => Some(WorldView {
                time: render_time,
                entities: prev.entities.clone(),
            }),
        }
    }

    /// Project `anchor` forward to `render_time`, at most the configured
    /// horizon past it. Entities with no velocity borrow one derived from
    /// the previous snapshot's positions.
    fn extrapolate(
        &self,
        anchor: Arc<WorldSnapshot>,
        before: Option<Arc<WorldSnapshot>>,
        render_time: SimTime,
    ) -> WorldView {
        let ahead = render_time.since(anchor.server_time);
        let horizon = ahead.min(self.config.max_extrapolation);
        let dt = horizon.as_secs_f64() as f32;

        let derive_span = before
            .as_ref()
            .map(|b| anchor.server_time.since(b.server_time).as_secs_f64() as f32)
            .unwrap_or(0.0);

        let mut entities = HashMap::with_capacity(anchor.entities.len());
        for (id, state) in &anchor.entities {
            let velocity = if state.velocity != Vec3::ZERO {
                state.velocity
            } else {
                match before.as_ref().and_then(|b| b.entity(*id)) {
                    Some(past) if derive_span > 0.0 => {
                        (state.position - past.position) * (1.0 / derive_span)
                    }
                    _ => Vec3::ZERO,
                }
            };

            let mut projected = state.clone();
            projected.position = state.position + velocity * dt;
            entities.insert(*id, projected);
        }

        WorldView {
            time: render_time,
            entities,
        }
    }
}

/// Blend two bracketing snapshots. Entities present on only one side
/// appear or disappear at the midpoint instead of interpolating across
/// the boundary.
fn interpolate(prev: &WorldSnapshot, next: &WorldSnapshot, at: SimTime) -> WorldView {
    let t = interp_fraction(prev.server_time, next.server_time, at);
    let mut entities = HashMap::with_capacity(next.entities.len());

    for (id, after) in &next.entities {
        match prev.entities.get(id) {
            Some(before) => {
                entities.insert(*id, before.lerp(after, t));
            }
            None if t >= 0.5 => {
                entities.insert(*id, after.clone());
            }
            None => {}
        }
    }
    for (id, before) in &prev.entities {
        if !next.entities.contains_key(id) && t < 0.5 {
            entities.insert(*id, before.clone());
        }
    }

    WorldView { time: at, entities }
}
