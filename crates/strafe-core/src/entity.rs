//! World entity state
//!
//! The engine treats entity payloads opaquely: position/velocity/orientation
//! plus a small set of named scalar slots (health, energy, whatever the game
//! defines). Replication, conflict resolution, and checksumming all operate
//! on this shape without knowing what the slots mean.

use std::collections::BTreeMap;
use std::ops::{Add, Mul, Sub};
use std::time::Duration;

/// Three-component vector, f32 like the wire format.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }

    /// Linear interpolation, `t` clamped to [0, 1].
    pub fn lerp(self, other: Vec3, t: f32) -> Vec3 {
        let t = t.clamp(0.0, 1.0);
        Vec3 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    #[inline]
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    #[inline]
    pub fn distance(self, other: Vec3) -> f32 {
        (other - self).length()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    #[inline]
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    #[inline]
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Wrap an angle into (-PI, PI].
#[inline]
fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let wrapped = angle % TAU;
    if wrapped > PI {
        wrapped - TAU
    } else if wrapped < -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Blend between two angles in radians along the shortest arc, so a pair
/// straddling the -PI/PI seam never swings the long way round.
#[inline]
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    wrap_angle(from + wrap_angle(to - from) * t.clamp(0.0, 1.0))
}

/// Scalar slot index. The game layer assigns meanings; the engine only
/// guarantees stable identity and ordering.
pub type ScalarSlot = u8;

/// Replicated state of one entity.
///
/// `scalars` is a BTreeMap so iteration order is stable for the wire
/// encoder; the checksum path is order-independent anyway.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityState {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Yaw in radians. Full orientation is a game-layer concern.
    pub orientation: f32,
    pub scalars: BTreeMap<ScalarSlot, f32>,
}

impl EntityState {
    pub fn new(position: Vec3) -> Self {
        EntityState {
            position,
            ..EntityState::default()
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_orientation(mut self, orientation: f32) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_scalar(mut self, slot: ScalarSlot, value: f32) -> Self {
        self.scalars.insert(slot, value);
        self
    }

    #[inline]
    pub fn scalar(&self, slot: ScalarSlot) -> Option<f32> {
        self.scalars.get(&slot).copied()
    }

    pub fn set_scalar(&mut self, slot: ScalarSlot, value: f32) {
        self.scalars.insert(slot, value);
    }

    /// Interpolate toward `other` by `t` in [0, 1].
    ///
    /// Position and orientation blend; velocity and scalars snap to the
    /// newer sample once past the midpoint (they are not continuous
    /// quantities on the wire).
    pub fn lerp(&self, other: &EntityState, t: f32) -> EntityState {
        let t = t.clamp(0.0, 1.0);
        let newer = if t < 0.5 { self } else { other };
        EntityState {
            position: self.position.lerp(other.position, t),
            velocity: newer.velocity,
            orientation: lerp_angle(self.orientation, other.orientation, t),
            scalars: newer.scalars.clone(),
        }
    }

    /// Project the state forward along its velocity.
    pub fn extrapolate(&self, ahead: Duration) -> EntityState {
        let dt = ahead.as_secs_f64() as f32;
        EntityState {
            position: self.position + self.velocity * dt,
            ..self.clone()
        }
    }
}

/// Bit set naming the replicated fields of an entity (1 byte on the wire).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldMask(pub u8);

impl FieldMask {
    pub const NONE: FieldMask = FieldMask(0);

    // Field bits
    pub const POSITION: u8 = 0b0000_0001;
    pub const VELOCITY: u8 = 0b0000_0010;
    pub const ORIENTATION: u8 = 0b0000_0100;
    pub const SCALARS: u8 = 0b0000_1000;

    #[inline]
    pub fn new(bits: u8) -> Self {
        FieldMask(bits)
    }

    #[inline]
    pub fn has_position(self) -> bool {
        self.0 & Self::POSITION != 0
    }

    #[inline]
    pub fn has_velocity(self) -> bool {
        self.0 & Self::VELOCITY != 0
    }

    #[inline]
    pub fn has_orientation(self) -> bool {
        self.0 & Self::ORIENTATION != 0
    }

    #[inline]
    pub fn has_scalars(self) -> bool {
        self.0 & Self::SCALARS != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn with(self, bit: u8) -> Self {
        FieldMask(self.0 | bit)
    }

    #[inline]
    pub fn union(self, other: FieldMask) -> Self {
        FieldMask(self.0 | other.0)
    }

    #[inline]
    pub fn overlaps(self, other: FieldMask) -> bool {
        self.0 & other.0 != 0
    }
}
