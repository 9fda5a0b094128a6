//! Join Codes
//!
//! Short human-entered tokens that let a second player find a waiting match.
//! The alphabet leaves out `I`, `O`, `0` and `1` so codes survive being read
//! aloud or copied off a phone screen.

use std::fmt;
use serde::{Serialize, Deserialize};

use super::rng::RandomSource;

/// Characters a join code may contain.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a generated join code.
pub const CODE_LENGTH: usize = 5;

/// A normalized join code.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JoinCode(String);

impl JoinCode {
    /// Draw a fresh code of [`CODE_LENGTH`] characters from [`CODE_ALPHABET`].
    pub fn generate(rng: &mut impl RandomSource) -> Self {
        let code = (0..CODE_LENGTH)
            .map(|_| {
                let idx = rng.next_int(CODE_ALPHABET.len() as u32) as usize;
                CODE_ALPHABET[idx] as char
            })
            .collect();
        Self(code)
    }

    /// Normalize user input: trim surrounding whitespace and upper-case.
    ///
    /// Returns `None` for blank input. No alphabet check is done here; a code
    /// containing excluded characters simply never matches a record.
    pub fn parse(input: &str) -> Option<Self> {
        let code = input.trim().to_uppercase();
        if code.is_empty() {
            None
        } else {
            Some(Self(code))
        }
    }

    /// Wrap a stored code without normalizing it.
    pub fn from_stored(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The code text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if every character belongs to [`CODE_ALPHABET`].
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| CODE_ALPHABET.contains(&b))
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
