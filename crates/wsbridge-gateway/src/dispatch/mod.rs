//! Handler contract consumed by sessions.
//!
//! Re-exports the handler traits so handler crates can depend on this module
//! directly.

pub mod handler;

pub use handler::{Handler, HandlerFactory};
