//! Winner Evaluation
//!
//! Pure function over a board snapshot. Never mutates the board.

use serde::{Serialize, Deserialize};

use super::board::{Board, Cell, Mark, BOARD_SIZE};

/// The eight winning lines: rows, then columns, then diagonals.
pub const LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Outcome of evaluating a board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WinResult {
    /// Game still open.
    None,
    /// Board full, no line.
    Draw,
    /// X completed a line.
    WinsX,
    /// O completed a line.
    WinsO,
}

impl WinResult {
    /// Result for a win by `mark`.
    pub fn win_for(mark: Mark) -> Self {
        match mark {
            Mark::X => WinResult::WinsX,
            Mark::O => WinResult::WinsO,
        }
    }

    /// The winning mark, if any.
    pub fn winner(self) -> Option<Mark> {
        match self {
            WinResult::WinsX => Some(Mark::X),
            WinResult::WinsO => Some(Mark::O),
            WinResult::None | WinResult::Draw => None,
        }
    }

    /// True for Draw or a win.
    pub fn is_terminal(self) -> bool {
        self != WinResult::None
    }
}

/// Evaluate a board.
pub fn evaluate(board: &Board) -> WinResult {
    evaluate_cells(board.cells())
}

/// Evaluate raw cells. The first complete line in [`LINES`] order decides.
pub fn evaluate_cells(cells: &[Cell; BOARD_SIZE]) -> WinResult {
    for [a, b, c] in LINES {
        if let Some(mark) = cells[a].mark() {
            if cells[a] == cells[b] && cells[b] == cells[c] {
                return WinResult::win_for(mark);
            }
        }
    }

    if cells.iter().all(|c| !c.is_empty()) {
        WinResult::Draw
    } else {
        WinResult::None
    }
}

/// Count the lines completed by `mark`.
pub fn completed_lines(cells: &[Cell; BOARD_SIZE], mark: Mark) -> usize {
    let cell = Cell::from(mark);
    LINES
        .iter()
        .filter(|line| line.iter().all(|&i| cells[i] == cell))
        .count()
}
