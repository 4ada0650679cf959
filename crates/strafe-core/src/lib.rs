//! Strafe Core - Fundamental types and primitives
//!
//! This crate defines the types shared across the engine:
//! - Identifiers (PlayerId, TicketId, EntityId, ClientId, SnapshotSeq)
//! - Time primitives (SimTime) and injectable clocks
//! - Entity state payloads and field masks
//! - The engine-wide error taxonomy

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod time;

pub use clock::*;
pub use entity::*;
pub use error::*;
pub use id::*;
pub use time::*;
