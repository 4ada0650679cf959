//! Error types for the Strafe engine

use thiserror::Error;

use crate::{ClientId, SnapshotSeq, TicketId};

/// Engine errors. Everything here is recoverable; nothing in the core is a
/// process-fatal condition.
#[derive(Error, Debug)]
pub enum StrafeError {
    // Matchmaking errors
    #[error("Queue timeout: {ticket:?} not matchable within the wait budget")]
    QueueTimeout { ticket: TicketId },

    #[error("Cancellation lost the race: {ticket:?} already in a finalized match")]
    AlreadyMatched { ticket: TicketId },

    #[error("Unknown ticket: {ticket:?}")]
    UnknownTicket { ticket: TicketId },

    #[error("Invalid enqueue: {0}")]
    InvalidEnqueue(String),

    // Replication errors
    #[error("Empty payload buffer")]
    EmptyBuffer,

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Baseline {baseline:?} expired, oldest retained is {oldest:?}")]
    BaselineExpired {
        baseline: SnapshotSeq,
        oldest: SnapshotSeq,
    },

    // Sync errors
    #[error("Sync worker failed: {0}")]
    SyncWorkerFailed(String),

    #[error("Desync detected for {client:?} at {seq:?}")]
    DesyncDetected { client: ClientId, seq: SnapshotSeq },

    #[error("Unknown subscriber: {0:?}")]
    UnknownSubscriber(ClientId),
}

/// Result type for Strafe operations
pub type StrafeResult<T> = Result<T, StrafeError>;
