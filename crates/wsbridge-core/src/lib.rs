//! wsBridge core: transport-agnostic frame, envelope, and codec primitives.
//!
//! This crate defines the wire-level contracts and error surface shared by the
//! gateway, handlers, and test tooling. It carries no transport or runtime
//! dependencies so a handler crate can depend on it alone.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed peer input must surface as `BridgeError`/`Result`, never as a
//! crashed session task.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{BridgeError, ErrorCode, Result};
