//! Transport layer (WebSocket).
//!
//! Exposes the acceptor (upgrade handler), the pre-upgrade origin check, and
//! the frame channel adapter sessions read from and write to.

pub mod channel;
pub mod handshake;
pub mod ws;

pub use channel::{FrameChannel, WsChannel};
