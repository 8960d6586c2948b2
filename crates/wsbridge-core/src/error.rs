//! Shared error type across wsBridge crates.

use thiserror::Error;

use crate::protocol::rpc::ErrorObject;

/// JSON-RPC error codes surfaced to peers (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Payload is not valid JSON.
    ParseError,
    /// JSON is valid but not a request object.
    InvalidRequest,
    /// Handler does not know the method.
    MethodNotFound,
    /// Params rejected by the handler.
    InvalidParams,
    /// Internal error (handler failure, encode failure, panics).
    Internal,
    /// Request used before `initialize`.
    ServerNotInitialized,
    /// Request cancelled (teardown or dispatch timeout).
    RequestCancelled,
}

impl ErrorCode {
    /// Numeric value used in the `error.code` field.
    pub fn as_i64(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::Internal => -32603,
            ErrorCode::ServerNotInitialized => -32002,
            ErrorCode::RequestCancelled => -32800,
        }
    }

    /// Short label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::ServerNotInitialized => "SERVER_NOT_INITIALIZED",
            ErrorCode::RequestCancelled => "REQUEST_CANCELLED",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("server not initialized")]
    NotInitialized,
    #[error("request cancelled")]
    Cancelled,
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    /// Error object chosen by the handler, sent to the peer as-is.
    #[error("rpc error {}: {}", .0.code, .0.message)]
    Rpc(ErrorObject),
    /// Read/write failure on the frame channel. Never sent to the peer.
    #[error("transport: {0}")]
    Transport(String),
    /// Peer closed the frame channel. Never sent to the peer.
    #[error("connection closed")]
    Closed,
    #[error("internal: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Map the error to a JSON-RPC error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::Parse(_) => ErrorCode::ParseError,
            BridgeError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            BridgeError::MethodNotFound(_) => ErrorCode::MethodNotFound,
            BridgeError::InvalidParams(_) => ErrorCode::InvalidParams,
            BridgeError::NotInitialized => ErrorCode::ServerNotInitialized,
            BridgeError::Cancelled | BridgeError::Timeout(_) => ErrorCode::RequestCancelled,
            BridgeError::Rpc(_)
            | BridgeError::Transport(_)
            | BridgeError::Closed
            | BridgeError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Transport errors end the session; everything else is recoverable.
    pub fn is_transport(&self) -> bool {
        matches!(self, BridgeError::Transport(_) | BridgeError::Closed)
    }

    /// Build the error object delivered to the peer.
    pub fn to_error_object(&self) -> ErrorObject {
        match self {
            BridgeError::Rpc(obj) => obj.clone(),
            other => ErrorObject::new(other.code().as_i64(), other.to_string()),
        }
    }
}

impl From<ErrorObject> for BridgeError {
    fn from(obj: ErrorObject) -> Self {
        BridgeError::Rpc(obj)
    }
}
