//! Protocol Messages
//!
//! Wire format for client-relay communication over WebSocket.
//! Every message is one JSON text frame tagged by `type`.

use serde::{Serialize, Deserialize};

use crate::online::arbiter::RejectReason;
use crate::online::record::RecordDocument;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identify this connection. Must come first.
    Hello {
        /// Stable id from an earlier session; the relay assigns one if absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant_id: Option<String>,
    },

    /// Host a new match.
    CreateMatch,

    /// Join a waiting match by code.
    JoinMatch { code: String },

    /// Play a cell in the current match.
    SubmitMove { index: usize },

    /// Resend the current record (after a reconnect).
    SyncRequest,

    /// Stop following the current match.
    Leave,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from relay to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Identity accepted.
    Welcome {
        participant_id: String,
        server_version: String,
    },

    /// Match hosted; share the code.
    MatchCreated { game_id: String, code: String },

    /// Joined a match as guest.
    Joined { game_id: String },

    /// No waiting match with that code.
    NotFound,

    /// Current value of the followed record. Sent on every change.
    Record {
        game_id: String,
        record: RecordDocument,
    },

    /// Move refused; the record is unchanged.
    MoveRejected { reason: RejectReason },

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Relay is shutting down.
    Shutdown { reason: String },
}

/// Relay error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame is not a known message.
    InvalidMessage,
    /// Sent something before `hello`.
    NotIdentified,
    /// Sent `hello` twice.
    AlreadyIdentified,
    /// Participant id is empty or reserved.
    InvalidParticipant,
    /// Match action without a current match.
    NotInMatch,
    /// Tried to join a match this participant hosts.
    OwnMatch,
    /// Record store cannot be reached.
    StoreUnavailable,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Shorthand for an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}
