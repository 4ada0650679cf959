//! Strafe sync
//!
//! Per-subscriber orchestration on top of the replication path:
//!
//! - [`SyncCoordinator`]: scopes each tick's snapshot per subscriber,
//!   diffs it against their acknowledged baseline, encodes, and folds
//!   acks, update proposals, and checksum reports back in
//! - [`ConflictResolver`]: picks one winning change per entity from
//!   competing proposals under a per-entity policy
//! - [`checksum`]: quantized, order-independent world hashing for desync
//!   detection
//!
//! Recovery from anything here is a keyframe. A client whose baseline
//! expired or whose checksum diverged gets full state on the next fan-out
//! and carries on.

pub mod checksum;
pub mod conflict;
pub mod coordinator;

pub use checksum::{entity_checksum, world_checksum, SyncVerdict, QUANT_SCALE};
pub use conflict::{ConflictResolver, ResolutionPolicy, UpdateProposal};
pub use coordinator::{SubscriberPacket, SyncConfig, SyncCoordinator, SyncStats};
