//! Strafe test harness
//!
//! Deterministic simulation drivers for validating the engine end to end:
//!
//! - [`SessionSim`]: a full sync session on simulated time, with seeded ack
//!   loss, induced client corruption, and checksum verification every tick
//! - [`QueueSim`] and [`LadderSim`]: matchmaking scenarios from a single
//!   pairing to whole-population rating convergence
//!
//! Everything here runs on a [`strafe_core::ManualClock`] and seeded RNGs,
//! so any failure replays exactly.

pub mod queue_sim;
pub mod session_sim;

pub use queue_sim::*;
pub use session_sim::*;
