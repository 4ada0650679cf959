//! Queue participants
//!
//! A participant is what the platform hands the queue on enqueue: identity,
//! current skill belief, and the two matching constraints (team size
//! preference and region affinity). The queue owns everything else.

use strafe_core::PlayerId;
use strafe_rating::SkillEstimate;

/// Region affinity. Participants only match within their region; `Global`
/// is its own pool for deployments that do not shard by geography.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Region {
    #[default]
    Global,
    NorthAmerica,
    SouthAmerica,
    Europe,
    Asia,
    Oceania,
}

impl Region {
    pub fn name(&self) -> &'static str {
        match self {
            Region::Global => "global",
            Region::NorthAmerica => "na",
            Region::SouthAmerica => "sa",
            Region::Europe => "eu",
            Region::Asia => "as",
            Region::Oceania => "oc",
        }
    }
}

/// A participant waiting to be matched.
#[derive(Clone, Debug, PartialEq)]
pub struct Participant {
    pub player: PlayerId,
    pub skill: SkillEstimate,
    /// Players per team this participant wants to play in.
    pub team_size: u8,
    pub region: Region,
}

impl Participant {
    pub fn new(player: PlayerId, skill: SkillEstimate) -> Self {
        Participant {
            player,
            skill,
            team_size: 1,
            region: Region::default(),
        }
    }

    pub fn with_team_size(mut self, team_size: u8) -> Self {
        self.team_size = team_size;
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    /// The pool this participant queues in.
    #[inline]
    pub fn pool(&self) -> PoolKey {
        PoolKey {
            team_size: self.team_size,
            region: self.region,
        }
    }
}

/// Pool partition key: entries only ever match inside their pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub team_size: u8,
    pub region: Region,
}
