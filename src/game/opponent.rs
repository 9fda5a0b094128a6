//! Device Opponent
//!
//! Difficulty-parameterized move selection for the local mode. The search is
//! one ply deep on purpose: look for an immediate win, then an immediate block,
//! then fall back to a fixed preference order (Expert) or a random cell.

use serde::{Serialize, Deserialize};
use tracing::trace;

use crate::core::rng::{DeterministicRng, RandomSource};
use super::board::{Board, Mark};
use super::winner::evaluate;

/// Expert fallback order: center, corners, edges.
pub const PREFERENCE_ORDER: [usize; 9] = [4, 0, 2, 6, 8, 1, 3, 5, 7];

/// Opponent strength.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DifficultyLevel {
    /// Uniformly random empty cell.
    Easy = 0,
    /// Takes an immediate win, otherwise random.
    Harder = 1,
    /// Win, block, then center/corner/edge preference.
    #[default]
    Expert = 2,
}

impl DifficultyLevel {
    /// All levels in ordinal order.
    pub const ALL: [DifficultyLevel; 3] = [
        DifficultyLevel::Easy,
        DifficultyLevel::Harder,
        DifficultyLevel::Expert,
    ];

    /// Stable ordinal used for persistence.
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Level for an ordinal, `None` if out of range.
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Display name.
    pub fn label(self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "Easy",
            DifficultyLevel::Harder => "Harder",
            DifficultyLevel::Expert => "Expert",
        }
    }
}

/// Cell where `mark` would complete a line right now, lowest index first.
pub fn winning_move(board: &Board, mark: Mark) -> Option<usize> {
    board.empty_cells().find(|&index| {
        board
            .with_mark(index, mark)
            .map(|trial| evaluate(&trial).winner() == Some(mark))
            .unwrap_or(false)
    })
}

/// Uniformly random empty cell drawn from `rng`.
pub fn random_move(board: &Board, rng: &mut impl RandomSource) -> Option<usize> {
    let free: Vec<usize> = board.empty_cells().collect();
    if free.is_empty() {
        return None;
    }
    let pick = rng.next_int(free.len() as u32) as usize;
    free.get(pick).copied()
}

/// First empty cell in [`PREFERENCE_ORDER`].
pub fn preferred_move(board: &Board) -> Option<usize> {
    PREFERENCE_ORDER
        .iter()
        .copied()
        .find(|&index| board.occupant(index).is_empty())
}

/// Select a move for `mark` at `difficulty`.
///
/// Returns `None` only when the board has no empty cell.
pub fn select_move(
    board: &Board,
    difficulty: DifficultyLevel,
    mark: Mark,
    rng: &mut impl RandomSource,
) -> Option<usize> {
    match difficulty {
        DifficultyLevel::Easy => random_move(board, rng),
        DifficultyLevel::Harder => {
            winning_move(board, mark).or_else(|| random_move(board, rng))
        }
        DifficultyLevel::Expert => winning_move(board, mark)
            .or_else(|| winning_move(board, mark.opponent()))
            .or_else(|| preferred_move(board))
            .or_else(|| board.empty_cells().next()),
    }
}

/// A configured device opponent.
#[derive(Debug, Clone)]
pub struct OpponentPolicy<R = DeterministicRng> {
    difficulty: DifficultyLevel,
    mark: Mark,
    rng: R,
}

impl OpponentPolicy<DeterministicRng> {
    /// Expert opponent playing O, seeded from entropy.
    pub fn new() -> Self {
        Self::with_rng(DifficultyLevel::default(), Mark::O, DeterministicRng::from_entropy())
    }
}

impl Default for OpponentPolicy<DeterministicRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RandomSource> OpponentPolicy<R> {
    /// Opponent with an explicit randomness source.
    pub fn with_rng(difficulty: DifficultyLevel, mark: Mark, rng: R) -> Self {
        Self { difficulty, mark, rng }
    }

    /// Current difficulty.
    pub fn difficulty(&self) -> DifficultyLevel {
        self.difficulty
    }

    /// Change difficulty; takes effect on the next move.
    pub fn set_difficulty(&mut self, difficulty: DifficultyLevel) {
        self.difficulty = difficulty;
    }

    /// The mark this opponent plays.
    pub fn mark(&self) -> Mark {
        self.mark
    }

    /// Pick a cell on `board`. `None` means the board is full.
    pub fn select_move(&mut self, board: &Board) -> Option<usize> {
        let choice = select_move(board, self.difficulty, self.mark, &mut self.rng);
        trace!(difficulty = self.difficulty.label(), ?choice, "opponent move");
        choice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::ScriptedRandom;

    fn board_from(s: &str) -> Board {
        let mut board = Board::new();
        for (i, ch) in s.chars().enumerate() {
            match ch {
                'X' => { board.place(i, Mark::X); }
                'O' => { board.place(i, Mark::O); }
                _ => {}
            }
        }
        board
    }

    fn expert() -> OpponentPolicy<ScriptedRandom> {
        OpponentPolicy::with_rng(DifficultyLevel::Expert, Mark::O, ScriptedRandom::new(vec![0]))
    }

    #[test]
    fn test_expert_takes_center_after_corner() {
        let board = board_from("X........");
        assert_eq!(expert().select_move(&board), Some(4));
    }

    #[test]
    fn test_expert_blocks_row() {
        // X at 0,1; O at 3
        let board = board_from("XX.O.....");
        assert_eq!(expert().select_move(&board), Some(2));
    }

    #[test]
    fn test_expert_prefers_win_over_block() {
        // X threatens 2, O can win at 5
        let board = board_from("XX.OO.X..");
        assert_eq!(expert().select_move(&board), Some(5));
    }

    #[test]
    fn test_expert_preference_order() {
        let board = board_from("....X....");
        assert_eq!(expert().select_move(&board), Some(0));

        let board = board_from("X.X.O.X.X");
        // O has no win, X has wins at 1, 3, 5, 7: block lowest
        assert_eq!(expert().select_move(&board), Some(1));
    }

    #[test]
    fn test_expert_blocks_column() {
        // O has no open line; X threatens 3 (column) and 7 (bottom row).
        let board = board_from("X.O.O.X.X");
        assert_eq!(expert().select_move(&board), Some(3));
    }

    #[test]
    fn test_full_board_has_no_move() {
        let board = board_from("XOXXOOOXX");
        for level in DifficultyLevel::ALL {
            let mut policy = OpponentPolicy::with_rng(level, Mark::O, ScriptedRandom::new(vec![3]));
            assert_eq!(policy.select_move(&board), None);
        }
    }

    #[test]
    fn test_easy_uses_random_source() {
        let board = board_from("X...O....");
        // Empty cells: 1,2,3,5,6,7,8. Pick the third.
        let mut policy = OpponentPolicy::with_rng(
            DifficultyLevel::Easy,
            Mark::O,
            ScriptedRandom::new(vec![2]),
        );
        assert_eq!(policy.select_move(&board), Some(3));
    }

    #[test]
    fn test_easy_ignores_wins() {
        let board = board_from("XX.OO....");
        let mut policy = OpponentPolicy::with_rng(
            DifficultyLevel::Easy,
            Mark::O,
            ScriptedRandom::new(vec![0]),
        );
        assert_eq!(policy.select_move(&board), Some(2));
    }

    #[test]
    fn test_harder_takes_win_but_does_not_block() {
        let board = board_from("XX.OO....");
        let mut policy = OpponentPolicy::with_rng(
            DifficultyLevel::Harder,
            Mark::O,
            ScriptedRandom::new(vec![4]),
        );
        assert_eq!(policy.select_move(&board), Some(5));

        // No O win available: random, even though X threatens 2.
        let board = board_from("XX.O.....");
        let mut policy = OpponentPolicy::with_rng(
            DifficultyLevel::Harder,
            Mark::O,
            ScriptedRandom::new(vec![4]),
        );
        // Empty: 2,4,5,6,7,8 -> index 4 -> cell 7
        assert_eq!(policy.select_move(&board), Some(7));
    }

    #[test]
    fn test_select_move_does_not_mutate() {
        let board = board_from("XX.O.....");
        let before = board.snapshot();
        expert().select_move(&board);
        assert_eq!(board.snapshot(), before);
    }

    #[test]
    fn test_difficulty_ordinals() {
        for level in DifficultyLevel::ALL {
            assert_eq!(DifficultyLevel::from_ordinal(level.ordinal()), Some(level));
        }
        assert_eq!(DifficultyLevel::from_ordinal(3), None);
        assert_eq!(DifficultyLevel::default(), DifficultyLevel::Expert);
    }

    #[test]
    fn test_policy_can_play_x() {
        let board = board_from("OO.XX....");
        let mut policy = OpponentPolicy::with_rng(
            DifficultyLevel::Expert,
            Mark::X,
            ScriptedRandom::new(vec![0]),
        );
        assert_eq!(policy.select_move(&board), Some(5));
    }
}
