//! # Tic-Tac-Toe Engine and Match Relay
//!
//! Game-state engine for tic-tac-toe with a local device opponent and a
//! transactional protocol for two remote participants sharing one record.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TIC-TAC-TOE RELAY                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── rng.rs      - Injectable randomness, Xorshift128+       │
//! │  └── code.rs     - Join codes                                │
//! │                                                              │
//! │  game/           - Game logic (pure, no I/O)                 │
//! │  ├── board.rs    - Cells, marks and the 3x3 board            │
//! │  ├── winner.rs   - Line evaluation                           │
//! │  ├── opponent.rs - Easy / Harder / Expert device opponent    │
//! │  └── local.rs    - Human-vs-device session, save/restore     │
//! │                                                              │
//! │  online/         - Two participants, one shared record       │
//! │  ├── record.rs   - Record and its document form              │
//! │  ├── store.rs    - Store contract, in-memory store           │
//! │  ├── coordinator.rs - Create / join by code                  │
//! │  ├── arbiter.rs  - Atomic move submission                    │
//! │  └── reconcile.rs - Per-client read model                    │
//! │                                                              │
//! │  network/        - WebSocket relay                           │
//! │  ├── protocol.rs - Message types                             │
//! │  └── server.rs   - Relay server                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! Every write to a record after it leaves `waiting` goes through one store
//! transaction. Two clients racing on the same record cannot both commit,
//! and a move's winner and turn handoff are written together with the move.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;
pub mod online;

// Re-export commonly used types
pub use crate::core::rng::{DeterministicRng, RandomSource};
pub use crate::game::board::{Board, Cell, Mark};
pub use crate::game::winner::{evaluate, WinResult};
pub use crate::game::opponent::{DifficultyLevel, OpponentPolicy};
pub use crate::online::arbiter::{MoveArbiter, MoveOutcome, RejectReason};
pub use crate::online::coordinator::{JoinOutcome, MatchCoordinator};
pub use crate::online::record::{GameId, ParticipantId, RemoteGameRecord};
pub use crate::online::store::{InMemoryStore, RecordStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
