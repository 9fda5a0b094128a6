//! Move Arbitration
//!
//! Turns a move request into the next record state inside one store
//! transaction. The move, the winner check and the turn handoff are a single
//! write; there is no second step that could be lost or reordered.

use std::sync::Arc;
use serde::{Serialize, Deserialize};
use tracing::{debug, info, instrument};

use crate::game::board::{Cell, BOARD_SIZE};
use crate::game::winner::evaluate_cells;
use super::record::{GameId, ParticipantId, RecordStatus, RemoteGameRecord, Winner};
use super::store::{RecordStore, StoreError, TxDecision};

/// Why a move was refused. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No record with that id.
    #[error("game not found")]
    RecordNotFound,

    /// Game is waiting for a guest or already finished.
    #[error("game is not in progress")]
    NotPlaying,

    /// Index outside 0–8.
    #[error("cell index out of range")]
    InvalidIndex,

    /// Target cell already taken.
    #[error("cell already occupied")]
    CellOccupied,

    /// Someone else's turn.
    #[error("not your turn")]
    OutOfTurn,
}

/// Result of a submitted move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Move committed; this is the record as written.
    Applied(RemoteGameRecord),
    /// Move refused; the record is unchanged.
    Rejected(RejectReason),
}

impl MoveOutcome {
    /// True if the move was committed.
    pub fn is_applied(&self) -> bool {
        matches!(self, MoveOutcome::Applied(_))
    }
}

/// Compute the record that results from `participant` playing `index`.
///
/// Pure: the input record is not modified.
pub fn apply_move(
    record: &RemoteGameRecord,
    participant: &ParticipantId,
    index: usize,
) -> Result<RemoteGameRecord, RejectReason> {
    if record.status != RecordStatus::Playing {
        return Err(RejectReason::NotPlaying);
    }
    if index >= BOARD_SIZE {
        return Err(RejectReason::InvalidIndex);
    }
    if !record.board[index].is_empty() {
        return Err(RejectReason::CellOccupied);
    }
    if record.current_turn.as_ref() != Some(participant) {
        return Err(RejectReason::OutOfTurn);
    }

    let mark = record.mark_of(participant);
    let mut next = record.clone();
    next.board[index] = Cell::from(mark);

    let result = evaluate_cells(&next.board);
    if let Some(winning_mark) = result.winner() {
        next.status = RecordStatus::Finished;
        next.winner = match record.participant_for(winning_mark) {
            Some(id) => Winner::Participant(id.clone()),
            // Playing guarantees a guest; only reachable on a corrupt record.
            None => return Err(RejectReason::NotPlaying),
        };
        next.current_turn = None;
    } else if next.board.iter().all(|c| !c.is_empty()) {
        next.status = RecordStatus::Finished;
        next.winner = Winner::Draw;
        next.current_turn = None;
    } else {
        next.current_turn = record.other_participant(participant).cloned();
    }

    Ok(next)
}

/// Applies moves to shared records through the store's transaction.
#[derive(Clone)]
pub struct MoveArbiter {
    store: Arc<dyn RecordStore>,
}

impl MoveArbiter {
    /// Arbiter over `store`.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Submit a move.
    ///
    /// Game-rule violations come back as [`MoveOutcome::Rejected`]; only store
    /// failures are errors.
    #[instrument(skip(self, game_id, participant), fields(game_id = %game_id, participant = %participant))]
    pub async fn submit_move(
        &self,
        game_id: &GameId,
        participant: &ParticipantId,
        index: usize,
    ) -> Result<MoveOutcome, StoreError> {
        let mut rejection = None;

        let written = self
            .store
            .transact(
                game_id,
                Box::new(|current: Option<&RemoteGameRecord>| {
                    let Some(record) = current else {
                        rejection = Some(RejectReason::RecordNotFound);
                        return TxDecision::Abort;
                    };
                    match apply_move(record, participant, index) {
                        Ok(next) => {
                            rejection = None;
                            TxDecision::Write(next)
                        }
                        Err(reason) => {
                            rejection = Some(reason);
                            TxDecision::Abort
                        }
                    }
                }),
            )
            .await?;

        match written {
            Some(record) => {
                if record.status == RecordStatus::Finished {
                    info!(winner = %record.winner.to_stored(), "game finished");
                }
                Ok(MoveOutcome::Applied(record))
            }
            None => {
                let reason = rejection.unwrap_or(RejectReason::RecordNotFound);
                debug!(index, %reason, "move rejected");
                Ok(MoveOutcome::Rejected(reason))
            }
        }
    }
}
