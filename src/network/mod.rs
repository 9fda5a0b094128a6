//! Network Layer
//!
//! WebSocket relay that exposes the online match operations to remote
//! clients. All rules live in `online/`; this layer only moves messages.

pub mod protocol;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ServerError, ErrorCode};
pub use server::{GameServer, RelayError};
