//! Board State
//!
//! The 3×3 grid, addressed by index 0–8 in row-major order
//! (row = index / 3, col = index % 3).

use std::fmt;
use serde::{Serialize, Deserialize};

/// Number of cells on the board.
pub const BOARD_SIZE: usize = 9;

// =============================================================================
// MARK / CELL
// =============================================================================

/// A player's symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// Moves first.
    X,
    /// Moves second.
    O,
}

impl Mark {
    /// The other player's mark.
    #[inline]
    pub fn opponent(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// Single-character symbol.
    pub fn as_char(self) -> char {
        match self {
            Mark::X => 'X',
            Mark::O => 'O',
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Contents of one board cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cell {
    /// Nobody has played here.
    #[default]
    Empty,
    /// Occupied by X.
    X,
    /// Occupied by O.
    O,
}

impl Cell {
    /// The mark in this cell, if any.
    #[inline]
    pub fn mark(self) -> Option<Mark> {
        match self {
            Cell::Empty => None,
            Cell::X => Some(Mark::X),
            Cell::O => Some(Mark::O),
        }
    }

    /// True if nobody has played here.
    #[inline]
    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }

    /// Wire symbol used by the shared record: `""`, `"X"` or `"O"`.
    pub fn as_symbol(self) -> &'static str {
        match self {
            Cell::Empty => "",
            Cell::X => "X",
            Cell::O => "O",
        }
    }

    /// Parse a wire symbol. Anything other than `""`, `"X"`, `"O"` is rejected.
    pub fn from_symbol(symbol: &str) -> Option<Cell> {
        match symbol {
            "" => Some(Cell::Empty),
            "X" => Some(Cell::X),
            "O" => Some(Cell::O),
            _ => None,
        }
    }
}

impl From<Mark> for Cell {
    fn from(mark: Mark) -> Self {
        match mark {
            Mark::X => Cell::X,
            Mark::O => Cell::O,
        }
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// The nine-cell grid.
///
/// `Board` is a plain value: callers own it, copy it for hypothetical
/// placements and pass it by reference to the evaluator and the opponent.
/// It does not enforce turn alternation; callers do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Board {
    cells: [Cell; BOARD_SIZE],
}

impl Board {
    /// Create an empty board.
    pub const fn new() -> Self {
        Self { cells: [Cell::Empty; BOARD_SIZE] }
    }

    /// Rebuild a board by replaying every occupied cell through [`Board::place`].
    pub fn from_snapshot(cells: &[Cell; BOARD_SIZE]) -> Self {
        let mut board = Self::new();
        for (index, cell) in cells.iter().enumerate() {
            if let Some(mark) = cell.mark() {
                board.place(index, mark);
            }
        }
        board
    }

    /// Reset every cell to empty.
    pub fn clear(&mut self) {
        self.cells = [Cell::Empty; BOARD_SIZE];
    }

    /// Put `mark` at `index`.
    ///
    /// Returns false without touching the board if `index` is outside 0–8 or
    /// the cell is already occupied.
    pub fn place(&mut self, index: usize, mark: Mark) -> bool {
        match self.cells.get_mut(index) {
            Some(cell) if cell.is_empty() => {
                *cell = mark.into();
                true
            }
            _ => false,
        }
    }

    /// Cell at `index`, or `Cell::Empty` for an out-of-range index.
    #[inline]
    pub fn occupant(&self, index: usize) -> Cell {
        self.cells.get(index).copied().unwrap_or(Cell::Empty)
    }

    /// Independent copy of the cells.
    #[inline]
    pub fn snapshot(&self) -> [Cell; BOARD_SIZE] {
        self.cells
    }

    /// Borrow the cells.
    #[inline]
    pub fn cells(&self) -> &[Cell; BOARD_SIZE] {
        &self.cells
    }

    /// Copy of this board with `mark` at `index`, or `None` if the placement
    /// would be rejected. The original is untouched.
    pub fn with_mark(&self, index: usize, mark: Mark) -> Option<Board> {
        let mut scratch = *self;
        scratch.place(index, mark).then_some(scratch)
    }

    /// Indices of all empty cells, ascending.
    pub fn empty_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_empty())
            .map(|(i, _)| i)
    }

    /// True if no cell is empty.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| !c.is_empty())
    }

    /// Number of cells holding `mark`.
    pub fn count(&self, mark: Mark) -> usize {
        let cell = Cell::from(mark);
        self.cells.iter().filter(|c| **c == cell).count()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            if row > 0 {
                writeln!(f, "---+---+---")?;
            }
            let line: Vec<String> = (0..3)
                .map(|col| {
                    let index = row * 3 + col;
                    match self.cells[index].mark() {
                        Some(mark) => format!(" {} ", mark),
                        None => format!(" {} ", index + 1),
                    }
                })
                .collect();
            writeln!(f, "{}", line.join("|"))?;
        }
        Ok(())
    }
}
