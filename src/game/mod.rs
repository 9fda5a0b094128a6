//! Game Logic Module
//!
//! Pure game-state engine. No I/O.
//!
//! ## Module Structure
//!
//! - `board`: nine-cell grid, cells and marks
//! - `winner`: line evaluation
//! - `opponent`: difficulty-parameterized device opponent
//! - `local`: human-vs-device session with save/restore

pub mod board;
pub mod winner;
pub mod opponent;
pub mod local;

// Re-export key types
pub use board::{Board, Cell, Mark, BOARD_SIZE};
pub use winner::{evaluate, WinResult, LINES};
pub use opponent::{select_move, DifficultyLevel, OpponentPolicy};
pub use local::{LocalMoveError, LocalSession, LocalStatus, SavedSession, TurnReport};
