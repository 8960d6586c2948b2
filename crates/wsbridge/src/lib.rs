//! Top-level facade crate for wsBridge.
//!
//! Re-exports core types and the gateway library so users can depend on a single crate.

pub mod core {
    pub use wsbridge_core::*;
}

pub mod gateway {
    pub use wsbridge_gateway::*;
}
