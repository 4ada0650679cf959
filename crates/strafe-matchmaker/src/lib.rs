//! Strafe matchmaking
//!
//! Skill-based matchmaking for the Strafe engine:
//!
//! - [`Participant`]: who is queueing, with skill, team size, and region
//! - [`MatchQueue`]: the waiting pool, expanding search ranges, and the
//!   tick that forms matches, flags low quality, and reports timeouts
//! - [`MatchmakerHandle`]: async front door that drives the queue from a
//!   background tokio task and streams [`QueueEvent`]s out
//!
//! The queue itself is synchronous and takes explicit timestamps; all wall
//! time enters through the injected clock in the scheduler.

pub mod participant;
pub mod queue;
pub mod scheduler;

pub use participant::{Participant, PoolKey, Region};
pub use queue::{
    Match, MatchQueue, QueueConfig, QueueEntry, QueueStats, QueueTimeout, Team, TickOutcome,
    MAX_TEAM_SIZE,
};
pub use scheduler::{EventReceiver, MatchmakerHandle, QueueEvent, SchedulerConfig};
