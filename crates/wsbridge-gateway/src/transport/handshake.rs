//! Pre-upgrade checks.
//!
//! Origin policy is applied before the WebSocket upgrade so a rejected
//! browser never gets a session or a handler instance.

use axum::http::{header, HeaderMap};
use thiserror::Error;

use crate::config::OriginPolicy;

/// Why a handshake was refused before upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeReject {
    #[error("origin not allowed: {0}")]
    OriginNotAllowed(String),
    #[error("origin header is not valid utf-8")]
    OriginNotUtf8,
}

/// Requests without an `Origin` header (native clients) always pass.
pub fn check_origin(policy: &OriginPolicy, headers: &HeaderMap) -> Result<(), HandshakeReject> {
    let OriginPolicy::Allow(allowed) = policy else {
        return Ok(());
    };
    let Some(raw) = headers.get(header::ORIGIN) else {
        return Ok(());
    };
    let origin = raw.to_str().map_err(|_| HandshakeReject::OriginNotUtf8)?;
    let origin = origin.trim_end_matches('/');

    if allowed
        .iter()
        .any(|a| a.trim_end_matches('/').eq_ignore_ascii_case(origin))
    {
        Ok(())
    } else {
        Err(HandshakeReject::OriginNotAllowed(origin.to_string()))
    }
}
