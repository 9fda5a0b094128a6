//! Local Session
//!
//! Human (X) against the device opponent (O) on a locally owned board,
//! with save/restore of the fields a host application persists between
//! restarts.

use std::fmt;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::rng::{DeterministicRng, RandomSource};
use super::board::{Board, Cell, Mark, BOARD_SIZE};
use super::opponent::{DifficultyLevel, OpponentPolicy};
use super::winner::{evaluate, WinResult};

/// The human's mark in local play.
pub const HUMAN_MARK: Mark = Mark::X;

/// The device's mark in local play.
pub const DEVICE_MARK: Mark = Mark::O;

/// Status of a local game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalStatus {
    /// Fresh board, human to start.
    HumanFirst,
    /// Human to move.
    HumanTurn,
    /// Device is choosing a move.
    DeviceTurn,
    /// Board full, no winner.
    Tie,
    /// Human completed a line.
    HumanWins,
    /// Device completed a line.
    DeviceWins,
}

impl LocalStatus {
    fn from_result(result: WinResult) -> Option<Self> {
        match result {
            WinResult::None => None,
            WinResult::Draw => Some(LocalStatus::Tie),
            WinResult::WinsX => Some(LocalStatus::HumanWins),
            WinResult::WinsO => Some(LocalStatus::DeviceWins),
        }
    }
}

impl fmt::Display for LocalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LocalStatus::HumanFirst => "You go first.",
            LocalStatus::HumanTurn => "Your turn.",
            LocalStatus::DeviceTurn => "Device's turn.",
            LocalStatus::Tie => "It's a tie!",
            LocalStatus::HumanWins => "You won!",
            LocalStatus::DeviceWins => "Device won!",
        };
        f.write_str(text)
    }
}

/// Why a human move was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LocalMoveError {
    /// Index outside 0–8.
    #[error("cell index {0} is off the board")]
    InvalidIndex(usize),

    /// Cell already taken.
    #[error("cell {0} is already occupied")]
    CellOccupied(usize),

    /// The game has ended.
    #[error("game is over")]
    GameOver,
}

/// What happened during one human turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnReport {
    /// Cell the human played.
    pub human_move: usize,
    /// Cell the device answered with, if the game was still open.
    pub device_move: Option<usize>,
    /// Status after the turn.
    pub status: LocalStatus,
}

/// Fields persisted across a save/restore cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSession {
    /// Board cells as `' '`, `'X'` or `'O'`.
    pub board: [char; BOARD_SIZE],
    /// Whether the game had ended.
    pub game_over: bool,
    /// Status line shown at save time.
    pub status_text: String,
    /// [`DifficultyLevel::ordinal`].
    pub difficulty: u8,
}

impl SavedSession {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// A human-vs-device game.
#[derive(Debug, Clone)]
pub struct LocalSession<R = DeterministicRng> {
    board: Board,
    opponent: OpponentPolicy<R>,
    game_over: bool,
    status: LocalStatus,
    status_text: String,
}

impl LocalSession<DeterministicRng> {
    /// New game at `difficulty`, randomness from entropy.
    pub fn new(difficulty: DifficultyLevel) -> Self {
        Self::with_rng(difficulty, DeterministicRng::from_entropy())
    }
}

impl<R: RandomSource> LocalSession<R> {
    /// New game with an explicit randomness source.
    pub fn with_rng(difficulty: DifficultyLevel, rng: R) -> Self {
        Self {
            board: Board::new(),
            opponent: OpponentPolicy::with_rng(difficulty, DEVICE_MARK, rng),
            game_over: false,
            status: LocalStatus::HumanFirst,
            status_text: LocalStatus::HumanFirst.to_string(),
        }
    }

    /// Restore a saved game.
    ///
    /// Cells are replayed through [`Board::place`], so characters other than
    /// `'X'`/`'O'` are skipped. An unknown difficulty ordinal restores as
    /// Expert.
    pub fn restore(saved: &SavedSession, rng: R) -> Self {
        let difficulty = DifficultyLevel::from_ordinal(saved.difficulty).unwrap_or_default();
        let mut session = Self::with_rng(difficulty, rng);

        for (index, ch) in saved.board.iter().enumerate() {
            let mark = match ch {
                'X' => Mark::X,
                'O' => Mark::O,
                _ => continue,
            };
            if !session.board.place(index, mark) {
                debug!(index, "skipping unplaceable saved cell");
            }
        }

        session.game_over = saved.game_over;
        session.status = match LocalStatus::from_result(evaluate(&session.board)) {
            Some(end) => end,
            None if session.board.empty_cells().count() == BOARD_SIZE => LocalStatus::HumanFirst,
            None => LocalStatus::HumanTurn,
        };
        session.status_text = saved.status_text.clone();
        session
    }

    /// Capture the persisted fields.
    pub fn save(&self) -> SavedSession {
        let mut board = [' '; BOARD_SIZE];
        for (slot, cell) in board.iter_mut().zip(self.board.cells()) {
            if let Some(mark) = cell.mark() {
                *slot = mark.as_char();
            }
        }
        SavedSession {
            board,
            game_over: self.game_over,
            status_text: self.status_text.clone(),
            difficulty: self.opponent.difficulty().ordinal(),
        }
    }

    /// Clear the board and start over. Difficulty is kept.
    pub fn new_game(&mut self) {
        self.board.clear();
        self.game_over = false;
        self.set_status(LocalStatus::HumanFirst);
    }

    /// Play the human's move at `index`, then the device's reply.
    pub fn human_move(&mut self, index: usize) -> Result<TurnReport, LocalMoveError> {
        if self.game_over {
            return Err(LocalMoveError::GameOver);
        }
        if index >= BOARD_SIZE {
            return Err(LocalMoveError::InvalidIndex(index));
        }
        if !self.board.place(index, HUMAN_MARK) {
            return Err(LocalMoveError::CellOccupied(index));
        }

        if let Some(end) = LocalStatus::from_result(evaluate(&self.board)) {
            self.finish(end);
            return Ok(TurnReport { human_move: index, device_move: None, status: end });
        }

        self.set_status(LocalStatus::DeviceTurn);
        let device_move = self.device_move();

        let status = match LocalStatus::from_result(evaluate(&self.board)) {
            Some(end) => {
                self.finish(end);
                end
            }
            None => {
                self.set_status(LocalStatus::HumanTurn);
                LocalStatus::HumanTurn
            }
        };

        Ok(TurnReport { human_move: index, device_move, status })
    }

    fn device_move(&mut self) -> Option<usize> {
        let choice = self.opponent.select_move(&self.board)?;
        self.board.place(choice, DEVICE_MARK).then_some(choice)
    }

    fn finish(&mut self, status: LocalStatus) {
        self.game_over = true;
        self.set_status(status);
        debug!(%status, "local game finished");
    }

    fn set_status(&mut self, status: LocalStatus) {
        self.status = status;
        self.status_text = status.to_string();
    }

    /// Current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Current status.
    pub fn status(&self) -> LocalStatus {
        self.status
    }

    /// Status line (restored verbatim from a save).
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Whether the game has ended.
    pub fn is_over(&self) -> bool {
        self.game_over
    }

    /// Current difficulty.
    pub fn difficulty(&self) -> DifficultyLevel {
        self.opponent.difficulty()
    }

    /// Change difficulty mid-game.
    pub fn set_difficulty(&mut self, difficulty: DifficultyLevel) {
        self.opponent.set_difficulty(difficulty);
    }

    /// Cell contents, `Cell::Empty` for invalid indices.
    pub fn occupant(&self, index: usize) -> Cell {
        self.board.occupant(index)
    }
}
