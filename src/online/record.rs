//! Shared Game Record
//!
//! The authoritative state of one online match, as held by the record store
//! and mirrored by both participants.
//!
//! Two representations exist:
//!
//! - [`RecordDocument`]: the loosely typed stored/wire form (strings
//!   everywhere, `""` for "absent"), field-compatible with the documents
//!   earlier clients wrote.
//! - [`RemoteGameRecord`]: the validated form used by all game code. Status
//!   is a closed enum, cells are [`Cell`]s and absent participants are
//!   `None`.
//!
//! Conversion from document to record is strict: anything malformed is a
//! [`RecordError`], never a silent default.

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::code::JoinCode;
use crate::game::board::{Board, Cell, Mark, BOARD_SIZE};
use crate::game::winner::{evaluate_cells, WinResult};

/// Sentinel stored in `winner` for a drawn game.
pub const DRAW_SENTINEL: &str = "draw";

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque participant identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Wrap an identifier. Returns `None` for an empty string, which the
    /// record format reserves for "nobody", and for the draw sentinel.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() || id == DRAW_SENTINEL {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Fresh random identifier (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque store identifier of a record.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// STATUS / WINNER
// =============================================================================

/// Lifecycle of a record. Only moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Created, waiting for a guest.
    Waiting,
    /// Both participants present, moves accepted.
    Playing,
    /// Won or drawn. Terminal.
    Finished,
}

impl RecordStatus {
    /// Stored form.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Waiting => "waiting",
            RecordStatus::Playing => "playing",
            RecordStatus::Finished => "finished",
        }
    }

    /// Parse the stored form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(RecordStatus::Waiting),
            "playing" => Some(RecordStatus::Playing),
            "finished" => Some(RecordStatus::Finished),
            _ => None,
        }
    }
}

/// Outcome field of a record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Winner {
    /// Game not decided.
    #[default]
    None,
    /// This participant won.
    Participant(ParticipantId),
    /// Board filled without a line.
    Draw,
}

impl Winner {
    /// Stored form: `""`, the participant id, or `"draw"`.
    pub fn to_stored(&self) -> String {
        match self {
            Winner::None => String::new(),
            Winner::Participant(id) => id.as_str().to_string(),
            Winner::Draw => DRAW_SENTINEL.to_string(),
        }
    }

    /// Parse the stored form.
    pub fn from_stored(s: &str) -> Self {
        match s {
            "" => Winner::None,
            DRAW_SENTINEL => Winner::Draw,
            other => Winner::Participant(ParticipantId(other.to_string())),
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Why a document is not a valid record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Document is not shaped like a record at all.
    #[error("document does not match the record schema: {0}")]
    Schema(String),

    /// Board does not have nine cells.
    #[error("board has {0} cells, expected 9")]
    BoardLength(usize),

    /// Cell holds something other than "", "X" or "O".
    #[error("cell {index} holds unknown symbol {symbol:?}")]
    UnknownSymbol {
        /// Cell index.
        index: usize,
        /// Offending value.
        symbol: String,
    },

    /// Status string is not waiting/playing/finished.
    #[error("unknown status {0:?}")]
    UnknownStatus(String),

    /// Host id is empty.
    #[error("record has no host")]
    MissingHost,

    /// A participant field holds a value no participant can have.
    #[error("{field} holds reserved value {value:?}")]
    ReservedId {
        /// Document field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// A cross-field invariant does not hold.
    #[error("invariant violated: {0}")]
    Invariant(&'static str),
}

// =============================================================================
// RECORD
// =============================================================================

/// Validated state of one online match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteGameRecord {
    /// Board cells.
    pub board: [Cell; BOARD_SIZE],
    /// Participant who created the match; plays X.
    pub host_id: ParticipantId,
    /// Participant who joined; plays O.
    pub guest_id: Option<ParticipantId>,
    /// Participant allowed to move, `None` once finished.
    pub current_turn: Option<ParticipantId>,
    /// Lifecycle status.
    pub status: RecordStatus,
    /// Outcome.
    pub winner: Winner,
    /// Join code.
    pub code: JoinCode,
    /// Set by the store on create.
    pub created_at: DateTime<Utc>,
    /// Set by the store on every write.
    pub updated_at: DateTime<Utc>,
}

impl RemoteGameRecord {
    /// Fresh waiting record: empty board, host to move once a guest joins.
    pub fn new_waiting(host_id: ParticipantId, code: JoinCode) -> Self {
        let now = Utc::now();
        Self {
            board: [Cell::Empty; BOARD_SIZE],
            current_turn: Some(host_id.clone()),
            host_id,
            guest_id: None,
            status: RecordStatus::Waiting,
            winner: Winner::None,
            code,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark played by `participant`: host is X, anyone else O.
    pub fn mark_of(&self, participant: &ParticipantId) -> Mark {
        if *participant == self.host_id {
            Mark::X
        } else {
            Mark::O
        }
    }

    /// Participant playing `mark`.
    pub fn participant_for(&self, mark: Mark) -> Option<&ParticipantId> {
        match mark {
            Mark::X => Some(&self.host_id),
            Mark::O => self.guest_id.as_ref(),
        }
    }

    /// The other participant, if `participant` is one of the two.
    pub fn other_participant(&self, participant: &ParticipantId) -> Option<&ParticipantId> {
        if *participant == self.host_id {
            self.guest_id.as_ref()
        } else if self.guest_id.as_ref() == Some(participant) {
            Some(&self.host_id)
        } else {
            None
        }
    }

    /// True if `participant` is host or guest.
    pub fn is_participant(&self, participant: &ParticipantId) -> bool {
        *participant == self.host_id || self.guest_id.as_ref() == Some(participant)
    }

    /// Read-model board replayed from the record cells.
    pub fn to_board(&self) -> Board {
        Board::from_snapshot(&self.board)
    }

    /// Check the cross-field invariants.
    pub fn validate(&self) -> Result<(), RecordError> {
        let x = self.board.iter().filter(|c| **c == Cell::X).count();
        let o = self.board.iter().filter(|c| **c == Cell::O).count();
        if x < o || x - o > 1 {
            return Err(RecordError::Invariant("X count must equal O count or exceed it by one"));
        }

        if (self.status == RecordStatus::Waiting) != self.guest_id.is_none() {
            return Err(RecordError::Invariant("waiting iff no guest"));
        }
        if (self.status == RecordStatus::Finished) != self.current_turn.is_none() {
            return Err(RecordError::Invariant("finished iff no current turn"));
        }
        if self.guest_id.as_ref() == Some(&self.host_id) {
            return Err(RecordError::Invariant("guest must differ from host"));
        }

        match self.status {
            RecordStatus::Waiting => {
                if self.current_turn.as_ref() != Some(&self.host_id) {
                    return Err(RecordError::Invariant("waiting record must give the host the first turn"));
                }
                if x + o != 0 {
                    return Err(RecordError::Invariant("waiting record must have an empty board"));
                }
            }
            RecordStatus::Playing => {
                if !self.current_turn.as_ref().is_some_and(|p| self.is_participant(p)) {
                    return Err(RecordError::Invariant("current turn must belong to a participant"));
                }
                if evaluate_cells(&self.board) != WinResult::None {
                    return Err(RecordError::Invariant("playing record must have an undecided board"));
                }
            }
            RecordStatus::Finished => {}
        }

        match (&self.winner, self.status) {
            (Winner::None, RecordStatus::Finished) => {
                Err(RecordError::Invariant("finished record must name a winner or a draw"))
            }
            (Winner::None, _) => Ok(()),
            (_, RecordStatus::Waiting | RecordStatus::Playing) => {
                Err(RecordError::Invariant("undecided record cannot have a winner"))
            }
            (Winner::Participant(p), RecordStatus::Finished) if !self.is_participant(p) => {
                Err(RecordError::Invariant("winner must be a participant"))
            }
            _ => Ok(()),
        }
    }

    /// Stored form.
    pub fn to_document(&self) -> RecordDocument {
        RecordDocument::from(self)
    }
}

// =============================================================================
// DOCUMENT
// =============================================================================

/// Loosely typed stored form of a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDocument {
    /// Nine symbols, each "", "X" or "O".
    pub board: Vec<String>,
    /// Host participant id.
    pub host_id: String,
    /// Guest participant id, "" until joined.
    #[serde(default)]
    pub guest_id: String,
    /// Participant to move, "" once finished.
    #[serde(default)]
    pub current_turn: String,
    /// "waiting", "playing" or "finished".
    pub status: String,
    /// "", a participant id, or "draw".
    #[serde(default)]
    pub winner: String,
    /// Join code.
    pub code: String,
    /// Creation time; missing on documents from older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last write time; missing on documents from older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&RemoteGameRecord> for RecordDocument {
    fn from(record: &RemoteGameRecord) -> Self {
        Self {
            board: record.board.iter().map(|c| c.as_symbol().to_string()).collect(),
            host_id: record.host_id.as_str().to_string(),
            guest_id: record.guest_id.as_ref().map(|g| g.as_str().to_string()).unwrap_or_default(),
            current_turn: record
                .current_turn
                .as_ref()
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            status: record.status.as_str().to_string(),
            winner: record.winner.to_stored(),
            code: record.code.as_str().to_string(),
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
        }
    }
}

impl TryFrom<RecordDocument> for RemoteGameRecord {
    type Error = RecordError;

    fn try_from(doc: RecordDocument) -> Result<Self, Self::Error> {
        if doc.board.len() != BOARD_SIZE {
            return Err(RecordError::BoardLength(doc.board.len()));
        }
        let mut board = [Cell::Empty; BOARD_SIZE];
        for (index, symbol) in doc.board.iter().enumerate() {
            board[index] = Cell::from_symbol(symbol).ok_or_else(|| RecordError::UnknownSymbol {
                index,
                symbol: symbol.clone(),
            })?;
        }

        let status = RecordStatus::parse(&doc.status)
            .ok_or_else(|| RecordError::UnknownStatus(doc.status.clone()))?;
        if doc.host_id.is_empty() {
            return Err(RecordError::MissingHost);
        }
        let host_id = participant_field("hostId", doc.host_id)?
            .ok_or(RecordError::MissingHost)?;
        let guest_id = participant_field("guestId", doc.guest_id)?;
        let current_turn = participant_field("currentTurn", doc.current_turn)?;
        let created_at = doc.created_at.unwrap_or_else(Utc::now);

        let record = RemoteGameRecord {
            board,
            host_id,
            guest_id,
            current_turn,
            status,
            winner: Winner::from_stored(&doc.winner),
            code: JoinCode::from_stored(doc.code),
            created_at,
            updated_at: doc.updated_at.unwrap_or(created_at),
        };
        record.validate()?;
        Ok(record)
    }
}

/// `""` is absent; anything else must be a usable participant id.
fn participant_field(field: &'static str, value: String) -> Result<Option<ParticipantId>, RecordError> {
    if value.is_empty() {
        return Ok(None);
    }
    match ParticipantId::new(value.as_str()) {
        Some(id) => Ok(Some(id)),
        None => Err(RecordError::ReservedId { field, value }),
    }
}
