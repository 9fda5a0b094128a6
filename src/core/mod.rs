//! Core primitives shared by the local and online game modes.

pub mod code;
pub mod rng;

pub use code::{JoinCode, CODE_ALPHABET, CODE_LENGTH};
pub use rng::{DeterministicRng, RandomSource, ScriptedRandom};
