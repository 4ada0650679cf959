//! Identity types for the Strafe engine
//!
//! All identifiers are 64-bit for wire efficiency. Sequential identifiers
//! (tickets, snapshot sequences) are allocated from monotonic counters by
//! their owning component; the rest are opaque handles supplied by the
//! platform layer.

use std::fmt;

/// Participant identity - supplied by the account system
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

impl PlayerId {
    pub const ZERO: PlayerId = PlayerId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        PlayerId(id)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        PlayerId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player({:016x})", self.0)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Queue ticket - handed out on enqueue, monotonic per queue instance.
/// Ticket order is the insertion order used for deterministic tie-breaks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct TicketId(pub u64);

impl TicketId {
    pub const ZERO: TicketId = TicketId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        TicketId(id)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        TicketId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ticket({})", self.0)
    }
}

/// Match identity - unique per formed match
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MatchId(pub u64);

impl MatchId {
    pub const ZERO: MatchId = MatchId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        MatchId(id)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        MatchId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Match({:016x})", self.0)
    }
}

/// World entity identity - unique within a session
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl EntityId {
    pub const ZERO: EntityId = EntityId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        EntityId(id)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        EntityId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({:016x})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Subscriber identity - one per connected observer of a session
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl ClientId {
    pub const ZERO: ClientId = ClientId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        ClientId(id)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        ClientId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client({:016x})", self.0)
    }
}

/// Snapshot sequence number - monotonic per session, one per simulation tick
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct SnapshotSeq(pub u64);

impl SnapshotSeq {
    pub const ZERO: SnapshotSeq = SnapshotSeq(0);

    #[inline]
    pub fn new(seq: u64) -> Self {
        SnapshotSeq(seq)
    }

    /// Next sequence number
    #[inline]
    pub fn next(self) -> Self {
        SnapshotSeq(self.0 + 1)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        SnapshotSeq(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for SnapshotSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for SnapshotSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_roundtrip() {
        let id = PlayerId::new(0xDEADBEEF_CAFEBABE);
        let bytes = id.to_bytes();
        let recovered = PlayerId::from_bytes(bytes);
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_ticket_order_follows_allocation() {
        let a = TicketId::new(1);
        let b = TicketId::new(2);
        assert!(a < b);
    }

    #[test]
    fn test_snapshot_seq_next() {
        let seq = SnapshotSeq::ZERO;
        assert_eq!(seq.next(), SnapshotSeq::new(1));
        assert_eq!(seq.next().next(), SnapshotSeq::new(2));
    }
}
