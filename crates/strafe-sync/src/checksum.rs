//! Desync detection checksums
//!
//! Server and client each hash their view of the world and compare. The
//! per-entity hash is FNV-1a over the entity id and its quantized fields.
//! Quantizing to fixed-point first keeps the sum stable across float
//! representations; raw bit patterns would flag harmless rounding noise.
//! Entity hashes combine by wrapping addition, so the map's iteration
//! order can never affect the result.
//!
//! A mismatch means the divergence window is unknown, so recovery is
//! always a full keyframe, never a patch.

use std::collections::HashMap;

use strafe_core::{EntityId, EntityState};

/// Fixed-point steps per world unit. About a millimeter of position slack
/// at typical scales.
pub const QUANT_SCALE: f32 = 1024.0;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[inline]
fn quantize(value: f32) -> i64 {
    (value * QUANT_SCALE).round() as i64
}

fn mix(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(FNV_PRIME);
    }
}

/// Hash one entity: id, quantized position, orientation, and scalars.
///
/// Velocity stays out deliberately; it is derived motion, and hashing it
/// would flag clients that reconstruct it locally.
pub fn entity_checksum(id: EntityId, state: &EntityState) -> u64 {
    let mut hash = FNV_OFFSET;
    mix(&mut hash, &id.to_bytes());
    mix(&mut hash, &quantize(state.position.x).to_le_bytes());
    mix(&mut hash, &quantize(state.position.y).to_le_bytes());
    mix(&mut hash, &quantize(state.position.z).to_le_bytes());
    mix(&mut hash, &quantize(state.orientation).to_le_bytes());
    for (slot, value) in &state.scalars {
        mix(&mut hash, &[*slot]);
        mix(&mut hash, &quantize(*value).to_le_bytes());
    }
    hash
}

/// Order-independent checksum of a whole entity map.
pub fn world_checksum(entities: &HashMap<EntityId, EntityState>) -> u64 {
    entities.iter().fold(0u64, |acc, (id, state)| {
        acc.wrapping_add(entity_checksum(*id, state))
    })
}

/// Outcome of comparing a client-reported checksum against the server's.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncVerdict {
    InSync,
    /// The client's reconstruction diverged; it needs a full keyframe.
    Desynced,
}

#[inline]
pub fn verify(client_checksum: u64, server_checksum: u64) -> SyncVerdict {
    if client_checksum == server_checksum {
        SyncVerdict::InSync
    } else {
        SyncVerdict::Desynced
    }
}
