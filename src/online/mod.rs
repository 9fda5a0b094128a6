//! Online Play
//!
//! Two participants share one authoritative record held by a [`RecordStore`].
//!
//! ## Module Structure
//!
//! - `record`: the shared record and its document form
//! - `store`: store contract and the in-memory store
//! - `coordinator`: create and join matches by code
//! - `arbiter`: atomic move submission
//! - `reconcile`: per-client read model

pub mod record;
pub mod store;
pub mod coordinator;
pub mod arbiter;
pub mod reconcile;

pub use record::{GameId, ParticipantId, RecordDocument, RecordError, RecordStatus, RemoteGameRecord, Winner};
pub use store::{InMemoryStore, RecordQuery, RecordStore, StoreError, Subscription, TxDecision};
pub use coordinator::{JoinOutcome, MatchCoordinator, MatchHandle, MAX_CODE_ATTEMPTS};
pub use arbiter::{apply_move, MoveArbiter, MoveOutcome, RejectReason};
pub use reconcile::{reconcile, MoveFeedback, Mover, OnlineSession, ReadModel, Reconciler, StatusLine};
