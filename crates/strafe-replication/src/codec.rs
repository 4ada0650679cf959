//! Wire encoding for replication deltas
//!
//! Delta payload layout (all integers little-endian):
//! - Bytes 0-7:   baseline seq (0 = keyframe)
//! - Bytes 8-15:  delta seq
//! - Bytes 16-17: created count
//! - Bytes 18-19: updated count
//! - Bytes 20-21: deleted count
//! - Created records: entity id (8) + position (12) + velocity (12) +
//!   orientation (4) + scalar count (1) + scalar entries (5 each)
//! - Updated records: entity id (8) + field mask (1) + fields named by the
//!   mask, in mask bit order
//! - Deleted records: entity id (8)
//!
//! Decoding is strict: short buffers, unknown mask bits, and trailing bytes
//! are all errors. The encoded form of one delta is deterministic because
//! record lists are id-sorted at compute time.

use bytes::Bytes;

use strafe_core::{
    EntityId, EntityState, FieldMask, SnapshotSeq, StrafeError, StrafeResult, Vec3,
};

use crate::delta::{Delta, EntityDelta};

/// Fixed prefix before the record lists.
pub const DELTA_HEADER_SIZE: usize = 22;

/// Per-list record cap imposed by the u16 counts.
pub const MAX_DELTA_ENTRIES: usize = u16::MAX as usize;

const VEC3_SIZE: usize = 12;
const SCALAR_ENTRY_SIZE: usize = 5;

fn state_size(state: &EntityState) -> usize {
    2 * VEC3_SIZE + 4 + 1 + state.scalars.len() * SCALAR_ENTRY_SIZE
}

fn entity_delta_size(change: &EntityDelta) -> usize {
    let mut size = 1;
    if change.position.is_some() {
        size += VEC3_SIZE;
    }
    if change.velocity.is_some() {
        size += VEC3_SIZE;
    }
    if change.orientation.is_some() {
        size += 4;
    }
    if let Some(scalars) = &change.scalars {
        size += 1 + scalars.len() * SCALAR_ENTRY_SIZE;
    }
    size
}

/// Exact size [`encode`] will produce for this delta.
pub fn encoded_len(delta: &Delta) -> usize {
    let created: usize = delta
        .created
        .iter()
        .map(|(_, state)| 8 + state_size(state))
        .sum();
    let updated: usize = delta
        .updated
        .iter()
        .map(|(_, change)| 8 + entity_delta_size(change))
        .sum();
    DELTA_HEADER_SIZE + created + updated + delta.deleted.len() * 8
}

/// Serialize a delta to its wire form.
pub fn encode(delta: &Delta) -> StrafeResult<Bytes> {
    if delta.created.len() > MAX_DELTA_ENTRIES
        || delta.updated.len() > MAX_DELTA_ENTRIES
        || delta.deleted.len() > MAX_DELTA_ENTRIES
    {
        return Err(StrafeError::MalformedPayload(format!(
            "delta record list exceeds {} entries",
            MAX_DELTA_ENTRIES
        )));
    }
    for (id, state) in &delta.created {
        if state.scalars.len() > u8::MAX as usize {
            return Err(StrafeError::MalformedPayload(format!(
                "entity {id} carries more than {} scalars",
                u8::MAX
            )));
        }
    }
    for (id, change) in &delta.updated {
        if let Some(scalars) = &change.scalars {
            if scalars.len() > u8::MAX as usize {
                return Err(StrafeError::MalformedPayload(format!(
                    "entity {id} carries more than {} scalars",
                    u8::MAX
                )));
            }
        }
    }

    let mut buf = vec![0u8; encoded_len(delta)];
    let mut offset = 0;

    put_u64(&mut buf, &mut offset, delta.baseline_seq.0);
    put_u64(&mut buf, &mut offset, delta.seq.0);
    put_u16(&mut buf, &mut offset, delta.created.len() as u16);
    put_u16(&mut buf, &mut offset, delta.updated.len() as u16);
    put_u16(&mut buf, &mut offset, delta.deleted.len() as u16);

    for (id, state) in &delta.created {
        put_u64(&mut buf, &mut offset, id.0);
        put_state(&mut buf, &mut offset, state);
    }
    for (id, change) in &delta.updated {
        put_u64(&mut buf, &mut offset, id.0);
        buf[offset] = change.mask().0;
        offset += 1;
        if let Some(position) = change.position {
            put_vec3(&mut buf, &mut offset, position);
        }
        if let Some(velocity) = change.velocity {
            put_vec3(&mut buf, &mut offset, velocity);
        }
        if let Some(orientation) = change.orientation {
            put_f32(&mut buf, &mut offset, orientation);
        }
        if let Some(scalars) = &change.scalars {
            buf[offset] = scalars.len() as u8;
            offset += 1;
            for (slot, value) in scalars {
                buf[offset] = *slot;
                offset += 1;
                put_f32(&mut buf, &mut offset, *value);
            }
        }
    }
    for id in &delta.deleted {
        put_u64(&mut buf, &mut offset, id.0);
    }

    debug_assert_eq!(offset, buf.len());
    Ok(Bytes::from(buf))
}

/// Parse a delta from its wire form.
pub fn decode(buf: &[u8]) -> StrafeResult<Delta> {
    if buf.is_empty() {
        return Err(StrafeError::EmptyBuffer);
    }

    let mut offset = 0;
    need(buf, offset, DELTA_HEADER_SIZE)?;

    let baseline_seq = SnapshotSeq::new(get_u64(buf, &mut offset));
    let seq = SnapshotSeq::new(get_u64(buf, &mut offset));
    let created_count = get_u16(buf, &mut offset) as usize;
    let updated_count = get_u16(buf, &mut offset) as usize;
    let deleted_count = get_u16(buf, &mut offset) as usize;

    let mut created = Vec::with_capacity(created_count);
    for _ in 0..created_count {
        need(buf, offset, 8)?;
        let id = EntityId::new(get_u64(buf, &mut offset));
        let state = get_state(buf, &mut offset)?;
        created.push((id, state));
    }

    let mut updated = Vec::with_capacity(updated_count);
    for _ in 0..updated_count {
        need(buf, offset, 9)?;
        let id = EntityId::new(get_u64(buf, &mut offset));
        let mask = FieldMask::new(buf[offset]);
        offset += 1;

        let known =
            FieldMask::POSITION | FieldMask::VELOCITY | FieldMask::ORIENTATION | FieldMask::SCALARS;
        if mask.0 & !known != 0 {
            return Err(StrafeError::MalformedPayload(format!(
                "unknown field mask bits {:#04x}",
                mask.0 & !known
            )));
        }

        let mut change = EntityDelta::default();
        if mask.has_position() {
            need(buf, offset, VEC3_SIZE)?;
            change.position = Some(get_vec3(buf, &mut offset));
        }
        if mask.has_velocity() {
            need(buf, offset, VEC3_SIZE)?;
            change.velocity = Some(get_vec3(buf, &mut offset));
        }
        if mask.has_orientation() {
            need(buf, offset, 4)?;
            change.orientation = Some(get_f32(buf, &mut offset));
        }
        if mask.has_scalars() {
            change.scalars = Some(get_scalars(buf, &mut offset)?);
        }
        updated.push((id, change));
    }

    let mut deleted = Vec::with_capacity(deleted_count);
    for _ in 0..deleted_count {
        need(buf, offset, 8)?;
        deleted.push(EntityId::new(get_u64(buf, &mut offset)));
    }

    if offset != buf.len() {
        return Err(StrafeError::MalformedPayload(format!(
            "{} trailing bytes after delta",
            buf.len() - offset
        )));
    }

    Ok(Delta {
        baseline_seq,
        seq,
        created,
        updated,
        deleted,
    })
}

fn need(buf: &[u8], offset: usize, len: usize) -> StrafeResult<()> {
    if offset + len > buf.len() {
        return Err(StrafeError::BufferTooShort {
            expected: offset + len,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn put_u16(buf: &mut [u8], offset: &mut usize, value: u16) {
    buf[*offset..*offset + 2].copy_from_slice(&value.to_le_bytes());
    *offset += 2;
}

fn put_u64(buf: &mut [u8], offset: &mut usize, value: u64) {
    buf[*offset..*offset + 8].copy_from_slice(&value.to_le_bytes());
    *offset += 8;
}

fn put_f32(buf: &mut [u8], offset: &mut usize, value: f32) {
    buf[*offset..*offset + 4].copy_from_slice(&value.to_le_bytes());
    *offset += 4;
}

fn put_vec3(buf: &mut [u8], offset: &mut usize, value: Vec3) {
    put_f32(buf, offset, value.x);
    put_f32(buf, offset, value.y);
    put_f32(buf, offset, value.z);
}

fn put_state(buf: &mut [u8], offset: &mut usize, state: &EntityState) {
    put_vec3(buf, offset, state.position);
    put_vec3(buf, offset, state.velocity);
    put_f32(buf, offset, state.orientation);
    buf[*offset] = state.scalars.len() as u8;
    *offset += 1;
    for (slot, value) in &state.scalars {
        buf[*offset] = *slot;
        *offset += 1;
        put_f32(buf, offset, *value);
    }
}

fn get_u16(buf: &[u8], offset: &mut usize) -> u16 {
    let value = u16::from_le_bytes(buf[*offset..*offset + 2].try_into().unwrap());
    *offset += 2;
    value
}

fn get_u64(buf: &[u8], offset: &mut usize) -> u64 {
    let value = u64::from_le_bytes(buf[*offset..*offset + 8].try_into().unwrap());
    *offset += 8;
    value
}

fn get_f32(buf: &[u8], offset: &mut usize) -> f32 {
    let value = f32::from_le_bytes(buf[*offset..*offset + 4].try_into().unwrap());
    *offset += 4;
    value
}

fn get_vec3(buf: &[u8], offset: &mut usize) -> Vec3 {
    let x = get_f32(buf, offset);
    let y = get_f32(buf, offset);
    let z = get_f32(buf, offset);
    Vec3::new(x, y, z)
}

fn get_scalars(
    buf: &[u8],
    offset: &mut usize,
) -> StrafeResult<std::collections::BTreeMap<u8, f32>> {
    need(buf, *offset, 1)?;
    let count = buf[*offset] as usize;
    *offset += 1;
    need(buf, *offset, count * SCALAR_ENTRY_SIZE)?;

    let mut scalars = std::collections::BTreeMap::new();
    for _ in 0..count {
        let slot = buf[*offset];
        *offset += 1;
        scalars.insert(slot, get_f32(buf, offset));
    }
    Ok(scalars)
}

fn get_state(buf: &[u8], offset: &mut usize) -> StrafeResult<EntityState> {
    need(buf, *offset, 2 * VEC3_SIZE + 4)?;
    let position = get_vec3(buf, offset);
    let velocity = get_vec3(buf, offset);
    let orientation = get_f32(buf, offset);
    let scalars = get_scalars(buf, offset)?;

    Ok(EntityState {
        position,
        velocity,
        orientation,
        scalars,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn id(n: u64) -> EntityId {
        EntityId::new(n)
    }

    fn sample_delta() -> Delta {
        let baseline: HashMap<_, _> = [
            (id(1), EntityState::new(Vec3::new(0.0, 0.0, 0.0)).with_scalar(0, 100.0)),
            (id(2), EntityState::new(Vec3::new(5.0, 1.0, 0.0))),
        ]
        .into_iter()
        .collect();
        let current: HashMap<_, _> = [
            (
                id(1),
                EntityState::new(Vec3::new(2.0, 0.0, 0.0)).with_scalar(0, 85.0),
            ),
            (
                id(3),
                EntityState::new(Vec3::new(-4.0, 2.0, 1.0))
                    .with_velocity(Vec3::new(1.0, 0.0, 0.0))
                    .with_orientation(0.7)
                    .with_scalar(2, 40.0),
            ),
        ]
        .into_iter()
        .collect();

        Delta::compute(
            SnapshotSeq::new(10),
            &baseline,
            SnapshotSeq::new(12),
            &current,
        )
    }

    #[test]
    fn test_roundtrip_mixed_delta() {
        let delta = sample_delta();
        let bytes = encode(&delta).unwrap();
        assert_eq!(bytes.len(), encoded_len(&delta));

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, delta);
    }

    #[test]
    fn test_empty_delta_is_header_only() {
        let delta = Delta {
            baseline_seq: SnapshotSeq::new(4),
            seq: SnapshotSeq::new(5),
            ..Delta::default()
        };

        let bytes = encode(&delta).unwrap();
        assert_eq!(bytes.len(), DELTA_HEADER_SIZE);
        assert_eq!(decode(&bytes).unwrap(), delta);
    }

    #[test]
    fn test_keyframe_marker_survives() {
        let current: HashMap<_, _> = [(id(1), EntityState::new(Vec3::ZERO))].into_iter().collect();
        let keyframe = Delta::keyframe(SnapshotSeq::new(3), &current);

        let decoded = decode(&encode(&keyframe).unwrap()).unwrap();
        assert!(decoded.is_keyframe());
        assert_eq!(decoded, keyframe);
    }

    #[test]
    fn test_decode_empty_buffer() {
        assert!(matches!(decode(&[]), Err(StrafeError::EmptyBuffer)));
    }

    #[test]
    fn test_every_truncation_is_rejected() {
        let bytes = encode(&sample_delta()).unwrap();
        for len in 1..bytes.len() {
            assert!(
                matches!(
                    decode(&bytes[..len]),
                    Err(StrafeError::BufferTooShort { .. })
                ),
                "prefix of {len} bytes must be too short"
            );
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&sample_delta()).unwrap().to_vec();
        bytes.push(0);

        assert!(matches!(
            decode(&bytes),
            Err(StrafeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_unknown_mask_bits_rejected() {
        // Header claiming one updated record, then an id and a mask with a
        // bit outside the known field set.
        let mut bytes = vec![0u8; DELTA_HEADER_SIZE + 9];
        bytes[8] = 1; // seq = 1
        bytes[18] = 1; // updated count = 1
        bytes[DELTA_HEADER_SIZE + 8] = 0b0001_0000;

        assert!(matches!(
            decode(&bytes),
            Err(StrafeError::MalformedPayload(_))
        ));
    }
}
