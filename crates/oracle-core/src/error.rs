//! Error types for DKG oracle operations

use crate::session::SessionState;
use crate::types::{ParticipantId, ParticipantIndex, SessionId};
use thiserror::Error;

/// Result type alias for oracle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported synchronously to the caller of a session or factory operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Session parameters rejected at creation
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// No session with this id was ever created
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Caller is not registered in the session, or has been excluded
    #[error("Participant {participant} is not authorized in session {session}")]
    UnauthorizedParticipant {
        session: SessionId,
        participant: ParticipantId,
    },

    /// Operation is not valid in the session's current state
    #[error("Cannot {operation} in session {session} while {state}")]
    InvalidStateTransition {
        session: SessionId,
        state: SessionState,
        operation: &'static str,
    },

    /// Participant already submitted for this round
    #[error("Duplicate submission from {participant} in session {session}")]
    DuplicateSubmission {
        session: SessionId,
        participant: ParticipantId,
    },

    /// Registration attempted after the roster reached its size
    #[error("Roster of session {session} is full ({size} participants)")]
    RosterFull { session: SessionId, size: usize },

    /// A share failed verification against its sender's commitment
    #[error("Invalid share from {participant} for recipient {recipient} in session {session}")]
    InvalidShare {
        session: SessionId,
        participant: ParticipantId,
        recipient: ParticipantIndex,
    },

    /// Too few participants remain to satisfy the threshold
    #[error("Insufficient participants: required {required}, got {actual}")]
    InsufficientParticipants { required: usize, actual: usize },

    /// Malformed field element, group element, proof or ciphertext
    #[error("Invalid cryptographic input: {0}")]
    InvalidCryptoInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
