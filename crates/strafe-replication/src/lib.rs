//! Strafe replication
//!
//! The server-side state distribution path:
//!
//! - [`SnapshotStore`]: bounded world history with interpolated and
//!   extrapolated time-shifted sampling
//! - [`InterestGrid`]: spatial index scoping replication to what each
//!   observer can see
//! - [`Delta`]: field-granular changesets against a subscriber's last
//!   acknowledged baseline
//! - [`codec`]: the wire form of a delta
//!
//! Everything here is synchronous and lock-light; the sync layer owns the
//! per-subscriber orchestration on top.

pub mod codec;
pub mod delta;
pub mod interest;
pub mod snapshot;

pub use codec::{encoded_len, DELTA_HEADER_SIZE, MAX_DELTA_ENTRIES};
pub use delta::{Delta, EntityDelta};
pub use interest::{CellCoord, InterestGrid, DEFAULT_CELL_SIZE};
pub use snapshot::{SnapshotConfig, SnapshotStore, WorldSnapshot, WorldView};
