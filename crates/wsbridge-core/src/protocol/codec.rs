//! Frame <-> envelope codec.
//!
//! - `Framing::Plain`: payload is bare JSON.
//! - `Framing::ContentLength`: payload may start with an LSP base-protocol
//!   header block (`Content-Length: N\r\n\r\n`), validated and stripped on
//!   decode and always written on encode.
//!
//! Decode errors are classified: broken JSON is `Parse`, well-formed JSON of
//! the wrong shape is `InvalidRequest`.

use serde::Deserialize;
use serde::Serialize;
use serde_json::error::Category;

use crate::error::{BridgeError, Result};
use crate::protocol::frame::Frame;
use crate::protocol::rpc::{Notification, Request, Response};

const HEADER_END: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &str = "content-length";

/// Payload framing inside one transport frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    #[default]
    Plain,
    ContentLength,
}

/// Decode one inbound frame into a request. Text and binary frames are both
/// accepted; binary payloads must still be UTF-8 JSON.
pub fn decode_request(frame: &Frame, framing: Framing) -> Result<Request> {
    let body = match framing {
        Framing::Plain => frame.payload().as_ref(),
        Framing::ContentLength => strip_header(frame.payload())?,
    };

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(BridgeError::Parse("empty payload".into()));
    }

    serde_json::from_slice::<Request>(body).map_err(|e| match e.classify() {
        Category::Data => BridgeError::InvalidRequest(e.to_string()),
        Category::Syntax | Category::Eof | Category::Io => BridgeError::Parse(e.to_string()),
    })
}

/// Encode a response as a text frame.
pub fn encode_response(resp: &Response, framing: Framing) -> Result<Frame> {
    encode(resp, framing)
}

/// Encode a server-originated notification as a text frame.
pub fn encode_notification(note: &Notification, framing: Framing) -> Result<Frame> {
    encode(note, framing)
}

fn encode<T: Serialize>(msg: &T, framing: Framing) -> Result<Frame> {
    let body = serde_json::to_string(msg)
        .map_err(|e| BridgeError::Internal(format!("encode failed: {e}")))?;
    Ok(match framing {
        Framing::Plain => Frame::text(body),
        Framing::ContentLength => {
            Frame::text(format!("Content-Length: {}\r\n\r\n{body}", body.len()))
        }
    })
}

/// Strip an optional header block. Payloads that start with JSON pass through.
fn strip_header(payload: &[u8]) -> Result<&[u8]> {
    let first = payload.iter().find(|b| !b.is_ascii_whitespace());
    if matches!(first, None | Some(b'{') | Some(b'[')) {
        return Ok(payload);
    }

    let split = payload
        .windows(HEADER_END.len())
        .position(|w| w == HEADER_END)
        .ok_or_else(|| BridgeError::Parse("unterminated header block".into()))?;

    let (head, rest) = payload.split_at(split);
    let head = std::str::from_utf8(head)
        .map_err(|_| BridgeError::Parse("header block is not utf-8".into()))?;
    let body = rest.get(HEADER_END.len()..).unwrap_or_default();

    let mut declared: Option<usize> = None;
    for line in head.split("\r\n") {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| BridgeError::Parse(format!("malformed header line: {line:?}")))?;
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let n = value
                .trim()
                .parse::<usize>()
                .map_err(|_| BridgeError::Parse(format!("bad content-length: {value:?}")))?;
            declared = Some(n);
        }
    }

    let declared = declared.ok_or_else(|| BridgeError::Parse("missing content-length".into()))?;
    if declared != body.len() {
        return Err(BridgeError::Parse(format!(
            "content-length mismatch: declared {declared}, got {}",
            body.len()
        )));
    }
    Ok(body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::rpc::{Id, Outcome};
    use serde_json::json;

    #[test]
    fn ping_response_is_exact() {
        let resp = Response {
            jsonrpc: None,
            id: Id::from(1u64),
            outcome: Outcome::Result(json!("pong")),
        };
        let frame = encode_response(&resp, Framing::Plain).unwrap();
        assert_eq!(frame.as_str(), Some(r#"{"id":1,"result":"pong"}"#));
    }

    #[test]
    fn content_length_header_is_stripped() {
        let body = r#"{"id":3,"method":"ping"}"#;
        let frame = Frame::text(format!(
            "Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{body}",
            body.len()
        ));
        let req = decode_request(&frame, Framing::ContentLength).unwrap();
        assert_eq!(req.method, "ping");
        assert_eq!(req.id, Some(Id::from(3u64)));
    }

    #[test]
    fn content_length_mode_accepts_bare_json() {
        let frame = Frame::text(r#"{"method":"initialized"}"#);
        let req = decode_request(&frame, Framing::ContentLength).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn header_is_not_accepted_in_plain_mode() {
        let frame = Frame::text("Content-Length: 2\r\n\r\n{}");
        let err = decode_request(&frame, Framing::Plain).unwrap_err();
        assert_eq!(err.code().as_i64(), -32700);
    }

    #[test]
    fn encode_with_content_length_prefixes_header() {
        let note = Notification::new("window/logMessage", json!({"message": "hi"}));
        let frame = encode_notification(&note, Framing::ContentLength).unwrap();
        let s = frame.as_str().unwrap();
        let (head, body) = s.split_once("\r\n\r\n").unwrap();
        assert_eq!(head, format!("Content-Length: {}", body.len()));
    }
}
