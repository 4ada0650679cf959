//! Delta compression against acknowledged baselines
//!
//! A [`Delta`] is the minimal changeset taking a subscriber from the state
//! it last acknowledged to the current state: entities absent from the
//! baseline are `created`, absent from the current state `deleted`, and
//! changed in between `updated` with only the fields that differ. Idle
//! entities cost nothing. Computation reads exactly the two views it is
//! given, so per-subscriber runs share nothing and can proceed in parallel.

use std::collections::{BTreeMap, HashMap};

use strafe_core::{
    EntityId, EntityState, FieldMask, ScalarSlot, SnapshotSeq, StrafeError, StrafeResult, Vec3,
};

/// Field-granular change record for one updated entity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityDelta {
    pub position: Option<Vec3>,
    pub velocity: Option<Vec3>,
    pub orientation: Option<f32>,
    /// Full replacement map when any slot changed. Slot-level diffing is
    /// not worth the bookkeeping at the handful of scalars entities carry.
    pub scalars: Option<BTreeMap<ScalarSlot, f32>>,
}

impl EntityDelta {
    /// Diff two states; equal states yield an empty delta.
    pub fn between(before: &EntityState, after: &EntityState) -> Self {
        EntityDelta {
            position: (before.position != after.position).then_some(after.position),
            velocity: (before.velocity != after.velocity).then_some(after.velocity),
            orientation: (before.orientation != after.orientation).then_some(after.orientation),
            scalars: (before.scalars != after.scalars).then(|| after.scalars.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none()
            && self.velocity.is_none()
            && self.orientation.is_none()
            && self.scalars.is_none()
    }

    /// Which fields this delta carries, as the wire mask byte.
    pub fn mask(&self) -> FieldMask {
        let mut mask = FieldMask::NONE;
        if self.position.is_some() {
            mask = mask.with(FieldMask::POSITION);
        }
        if self.velocity.is_some() {
            mask = mask.with(FieldMask::VELOCITY);
        }
        if self.orientation.is_some() {
            mask = mask.with(FieldMask::ORIENTATION);
        }
        if self.scalars.is_some() {
            mask = mask.with(FieldMask::SCALARS);
        }
        mask
    }

    /// Overlay the carried fields onto a state, leaving the rest alone.
    pub fn apply_to(&self, state: &mut EntityState) {
        if let Some(position) = self.position {
            state.position = position;
        }
        if let Some(velocity) = self.velocity {
            state.velocity = velocity;
        }
        if let Some(orientation) = self.orientation {
            state.orientation = orientation;
        }
        if let Some(scalars) = &self.scalars {
            state.scalars = scalars.clone();
        }
    }
}

/// Changeset between an acknowledged baseline and the current state.
///
/// Entries are sorted by entity id, so the encoded bytes of a given delta
/// are deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Delta {
    /// Baseline this delta builds on. [`SnapshotSeq::ZERO`] marks a
    /// keyframe built from nothing; real snapshot seqs start at one.
    pub baseline_seq: SnapshotSeq,
    pub seq: SnapshotSeq,
    pub created: Vec<(EntityId, EntityState)>,
    pub updated: Vec<(EntityId, EntityDelta)>,
    pub deleted: Vec<EntityId>,
}

impl Delta {
    /// Diff `current` against `baseline`.
    pub fn compute(
        baseline_seq: SnapshotSeq,
        baseline: &HashMap<EntityId, EntityState>,
        seq: SnapshotSeq,
        current: &HashMap<EntityId, EntityState>,
    ) -> Delta {
        let mut created = Vec::new();
        let mut updated = Vec::new();
        let mut deleted = Vec::new();

        for (id, after) in current {
            match baseline.get(id) {
                None => created.push((*id, after.clone())),
                Some(before) => {
                    let change = EntityDelta::between(before, after);
                    if !change.is_empty() {
                        updated.push((*id, change));
                    }
                }
            }
        }
        for id in baseline.keys() {
            if !current.contains_key(id) {
                deleted.push(*id);
            }
        }

        created.sort_by_key(|(id, _)| *id);
        updated.sort_by_key(|(id, _)| *id);
        deleted.sort();

        Delta {
            baseline_seq,
            seq,
            created,
            updated,
            deleted,
        }
    }

    /// Full-state delta for a subscriber with no acknowledged baseline.
    pub fn keyframe(seq: SnapshotSeq, current: &HashMap<EntityId, EntityState>) -> Delta {
        Delta::compute(SnapshotSeq::ZERO, &HashMap::new(), seq, current)
    }

    pub fn is_keyframe(&self) -> bool {
        self.baseline_seq == SnapshotSeq::ZERO
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Replay this delta onto a world reconstructed from its baseline.
    ///
    /// A keyframe replaces the world wholesale. An update naming an entity
    /// the world does not hold means the baseline does not match what the
    /// delta was computed against.
    pub fn apply(&self, world: &mut HashMap<EntityId, EntityState>) -> StrafeResult<()> {
        if self.is_keyframe() {
            world.clear();
        }
        for id in &self.deleted {
            world.remove(id);
        }
        for (id, state) in &self.created {
            world.insert(*id, state.clone());
        }
        for (id, change) in &self.updated {
            match world.get_mut(id) {
                Some(state) => change.apply_to(state),
                None => {
                    return Err(StrafeError::MalformedPayload(format!(
                        "delta update for unknown entity {id}"
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(n: u64) -> EntityId {
        EntityId::new(n)
    }

    fn world(entries: &[(u64, EntityState)]) -> HashMap<EntityId, EntityState> {
        entries
            .iter()
            .map(|(n, state)| (id(*n), state.clone()))
            .collect()
    }

    fn at(x: f32) -> EntityState {
        EntityState::new(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_created_updated_deleted_partition() {
        let baseline = world(&[(1, at(0.0)), (2, at(5.0))]);
        let current = world(&[(2, at(6.0)), (3, at(9.0))]);

        let delta = Delta::compute(
            SnapshotSeq::new(10),
            &baseline,
            SnapshotSeq::new(11),
            &current,
        );

        assert_eq!(delta.created.len(), 1);
        assert_eq!(delta.created[0].0, id(3));
        assert_eq!(delta.updated.len(), 1);
        assert_eq!(delta.updated[0].0, id(2));
        assert_eq!(delta.deleted, vec![id(1)]);
    }

    #[test]
    fn test_idle_entities_cost_nothing() {
        let state = world(&[(1, at(1.0)), (2, at(2.0))]);
        let delta = Delta::compute(
            SnapshotSeq::new(1),
            &state,
            SnapshotSeq::new(2),
            &state.clone(),
        );

        assert!(delta.is_empty());
        assert_eq!(delta.change_count(), 0);
    }

    #[test]
    fn test_update_carries_only_changed_fields() {
        let before = at(1.0).with_velocity(Vec3::new(3.0, 0.0, 0.0));
        let mut after = before.clone();
        after.position = Vec3::new(2.0, 0.0, 0.0);

        let change = EntityDelta::between(&before, &after);
        assert_eq!(change.position, Some(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(change.velocity, None);
        assert_eq!(change.orientation, None);
        assert_eq!(change.scalars, None);

        let mask = change.mask();
        assert!(mask.has_position());
        assert!(!mask.has_velocity());
    }

    #[test]
    fn test_scalar_removal_replicates() {
        let before = at(0.0).with_scalar(0, 100.0).with_scalar(1, 50.0);
        let mut after = before.clone();
        after.scalars.remove(&1);

        let change = EntityDelta::between(&before, &after);
        assert!(change.scalars.is_some());

        let mut rebuilt = before.clone();
        change.apply_to(&mut rebuilt);
        assert_eq!(rebuilt, after);
    }

    #[test]
    fn test_round_trip_reproduces_current() {
        let baseline = world(&[
            (1, at(0.0).with_scalar(0, 100.0)),
            (2, at(5.0)),
            (3, at(8.0)),
        ]);
        let current = world(&[
            (1, at(0.5).with_scalar(0, 80.0)),
            (3, at(8.0)),
            (4, at(2.0).with_orientation(1.5)),
        ]);

        let delta = Delta::compute(
            SnapshotSeq::new(4),
            &baseline,
            SnapshotSeq::new(7),
            &current,
        );

        let mut rebuilt = baseline.clone();
        delta.apply(&mut rebuilt).unwrap();
        assert_eq!(rebuilt, current);
    }

    #[test]
    fn test_keyframe_replaces_stale_world() {
        let current = world(&[(1, at(1.0)), (2, at(2.0))]);
        let keyframe = Delta::keyframe(SnapshotSeq::new(9), &current);
        assert!(keyframe.is_keyframe());

        let mut stale = world(&[(7, at(70.0)), (8, at(80.0))]);
        keyframe.apply(&mut stale).unwrap();
        assert_eq!(stale, current);
    }

    #[test]
    fn test_apply_update_for_missing_entity_errors() {
        let baseline = world(&[(1, at(0.0))]);
        let current = world(&[(1, at(2.0))]);
        let delta = Delta::compute(
            SnapshotSeq::new(1),
            &baseline,
            SnapshotSeq::new(2),
            &current,
        );

        let mut wrong_world = HashMap::new();
        assert!(matches!(
            delta.apply(&mut wrong_world),
            Err(StrafeError::MalformedPayload(_))
        ));
    }

    fn arb_state() -> impl Strategy<Value = EntityState> {
        (
            -100.0f32..100.0,
            -100.0f32..100.0,
            -10.0f32..10.0,
            -3.2f32..3.2,
            proptest::collection::btree_map(0u8..4, -50.0f32..50.0, 0..3),
        )
            .prop_map(|(x, y, vx, orientation, scalars)| EntityState {
                position: Vec3::new(x, y, 0.0),
                velocity: Vec3::new(vx, 0.0, 0.0),
                orientation,
                scalars,
            })
    }

    fn arb_world() -> impl Strategy<Value = HashMap<EntityId, EntityState>> {
        proptest::collection::hash_map(1u64..16, arb_state(), 0..10)
            .prop_map(|m| m.into_iter().map(|(n, s)| (id(n), s)).collect())
    }

    proptest! {
        /// Applying a delta to its own baseline always lands exactly on the
        /// state it was computed from, whatever the two worlds look like.
        #[test]
        fn prop_delta_round_trip(baseline in arb_world(), current in arb_world()) {
            let delta = Delta::compute(
                SnapshotSeq::new(1),
                &baseline,
                SnapshotSeq::new(2),
                &current,
            );

            let mut rebuilt = baseline.clone();
            delta.apply(&mut rebuilt).unwrap();
            prop_assert_eq!(rebuilt, current);
        }
    }
}
