//! Conflict resolution for competing entity updates
//!
//! Several sources may propose updates to the same entity in one tick. The
//! resolver picks what survives, driven by a policy fixed at configuration
//! time. It is a pure function of the proposals; it keeps no state between
//! calls, so resolution is reproducible from the inputs alone.

use std::collections::HashMap;

use strafe_core::{ClientId, EntityId, SimTime};
use strafe_replication::EntityDelta;

/// How competing proposals for one entity collapse into one update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// A declared authoritative source overrides everyone else. The policy
    /// for gameplay-critical fields.
    #[default]
    AuthoritativeWins,
    /// Newest timestamp wins wholesale. Cosmetic fields.
    LastWriteWins,
    /// Disjoint field sets combine; overlapping fields go to the newest
    /// writer.
    FieldMerge,
}

/// One source's proposed update to one entity.
#[derive(Clone, Debug)]
pub struct UpdateProposal {
    pub source: ClientId,
    /// Set for the simulation's own writes; client echoes never carry it.
    pub authoritative: bool,
    pub timestamp: SimTime,
    pub change: EntityDelta,
}

impl UpdateProposal {
    pub fn new(source: ClientId, timestamp: SimTime, change: EntityDelta) -> Self {
        UpdateProposal {
            source,
            authoritative: false,
            timestamp,
            change,
        }
    }

    pub fn authoritative(mut self) -> Self {
        self.authoritative = true;
        self
    }
}

/// Policy table: a configured default plus per-entity overrides.
#[derive(Clone, Debug, Default)]
pub struct ConflictResolver {
    default_policy: ResolutionPolicy,
    overrides: HashMap<EntityId, ResolutionPolicy>,
}

impl ConflictResolver {
    pub fn new(default_policy: ResolutionPolicy) -> Self {
        ConflictResolver {
            default_policy,
            overrides: HashMap::new(),
        }
    }

    /// Pin a policy for one entity, overriding the default.
    pub fn set_policy(&mut self, entity: EntityId, policy: ResolutionPolicy) {
        self.overrides.insert(entity, policy);
    }

    pub fn policy_for(&self, entity: EntityId) -> ResolutionPolicy {
        self.overrides
            .get(&entity)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Collapse competing proposals for `entity` into the surviving update.
    /// Empty input resolves to nothing.
    pub fn resolve(&self, entity: EntityId, proposals: &[UpdateProposal]) -> Option<EntityDelta> {
        if proposals.is_empty() {
            return None;
        }
        match self.policy_for(entity) {
            ResolutionPolicy::AuthoritativeWins => {
                let authoritative: Vec<&UpdateProposal> =
                    proposals.iter().filter(|p| p.authoritative).collect();
                if authoritative.is_empty() {
                    // Nobody claimed authority: degrade to timestamps.
                    last_write(proposals.iter())
                } else {
                    last_write(authoritative.into_iter())
                }
            }
            ResolutionPolicy::LastWriteWins => last_write(proposals.iter()),
            ResolutionPolicy::FieldMerge => {
                let mut ordered: Vec<&UpdateProposal> = proposals.iter().collect();
                ordered.sort_by_key(|p| (p.timestamp, p.source));

                // Later writers overwrite whatever fields they share with
                // earlier ones; disjoint fields just accumulate.
                let mut merged = EntityDelta::default();
                for proposal in ordered {
                    overlay(&mut merged, &proposal.change);
                }
                Some(merged)
            }
        }
    }
}

fn last_write<'a>(proposals: impl Iterator<Item = &'a UpdateProposal>) -> Option<EntityDelta> {
    proposals
        .max_by_key(|p| (p.timestamp, p.source))
        .map(|p| p.change.clone())
}

fn overlay(base: &mut EntityDelta, over: &EntityDelta) {
    if over.position.is_some() {
        base.position = over.position;
    }
    if over.velocity.is_some() {
        base.velocity = over.velocity;
    }
    if over.orientation.is_some() {
        base.orientation = over.orientation;
    }
    if over.scalars.is_some() {
        base.scalars = over.scalars.clone();
    }
}
