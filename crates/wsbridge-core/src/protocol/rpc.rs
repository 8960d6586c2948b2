//! JSON-RPC 2.0 style envelopes.
//!
//! The `jsonrpc` tag is optional on input and is copied from a request to its
//! response when present; it is never interpreted. `params` stays a `RawValue`
//! so handlers parse it lazily into their own types.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Version tag written on server-originated notifications.
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation token, copied verbatim from request to response.
///
/// Numbers keep their source text (`1.10`, `1e2`, integers past `u64`) so the
/// reply carries exactly what the peer sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Id {
    Num(String),
    Str(String),
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Id::Num(n) => RawValue::from_string(n.clone())
                .map_err(<S::Error as ser::Error>::custom)?
                .serialize(s),
            Id::Str(v) => s.serialize_str(v),
        }
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(d)?;
        let text = raw.get();
        match text.as_bytes().first() {
            Some(b'"') => serde_json::from_str(text)
                .map(Id::Str)
                .map_err(de::Error::custom),
            Some(b'-' | b'0'..=b'9') => Ok(Id::Num(text.to_string())),
            _ => Err(de::Error::custom("id must be a string or a number")),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Num(n) => f.write_str(n),
            Id::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Num(n.to_string())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Num(n.to_string())
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Str(s.to_string())
    }
}

/// Inbound request. `id == None` (absent or `null`) marks a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Raw params text; `null` when params were absent.
    pub fn params_raw(&self) -> &str {
        self.params.as_deref().map(RawValue::get).unwrap_or("null")
    }

    /// Parse params into `T`. Absent params parse as JSON `null`.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(self.params_raw())
            .map_err(|e| BridgeError::InvalidParams(format!("{}: {e}", self.method)))
    }

    /// Build the response to this request. Returns `None` for notifications.
    pub fn reply(&self, outcome: Outcome) -> Option<Response> {
        let id = self.id.clone()?;
        Some(Response {
            jsonrpc: self.jsonrpc.clone(),
            id,
            outcome,
        })
    }
}

/// Outbound response: `{id, result}` or `{id, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    pub id: Id,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }
}

/// Exactly one of `result` / `error` is present on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ErrorObject),
}

impl From<Result<Value>> for Outcome {
    fn from(res: Result<Value>) -> Self {
        match res {
            Ok(v) => Outcome::Result(v),
            Err(e) => Outcome::Error(e.to_error_object()),
        }
    }
}

/// `error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Server-originated notification (no id, no response expected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}
