//! Built-in handlers.
//!
//! The bridge is normally embedded with an external protocol handler; `ping`
//! is the one served by the `wsbridge` binary and used by tests.

pub mod ping;

pub use ping::PingHandler;
