//! Protocol modules.
//!
//! - `frame`: one discrete transport message (text or binary).
//! - `rpc`: JSON-RPC 2.0 style envelopes (request, response, notification).
//! - `codec`: frame <-> envelope conversion, with optional LSP-style
//!   `Content-Length` header framing.
//!
//! Parsers never index raw buffers or panic; malformed input is reported as
//! `BridgeError` so one bad message cannot take a session down.

pub mod codec;
pub mod frame;
pub mod rpc;

pub use codec::{decode_request, encode_notification, encode_response, Framing};
pub use frame::{Frame, FrameKind};
pub use rpc::{ErrorObject, Id, Notification, Outcome, Request, Response};
