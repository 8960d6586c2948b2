//! wsBridge gateway library entry.
//!
//! This crate wires the transport, sessions, handler contract, config, and
//! metrics into a WebSocket front for a stateful JSON-RPC handler. It is
//! consumed by the binary (`main.rs`), by embedders supplying their own
//! `HandlerFactory`, and by integration tests.

pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod editor;
pub mod logging;
pub mod obs;
pub mod router;
pub mod services;
pub mod session;
pub mod transport;
