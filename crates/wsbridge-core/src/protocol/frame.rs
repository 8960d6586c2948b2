//! Transport frame: an immutable payload plus its kind.

use bytes::Bytes;

/// Kind tag of a frame as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

impl FrameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Text => "text",
            FrameKind::Binary => "binary",
        }
    }
}

/// One discrete message read from or written to a frame channel.
///
/// Payload is reference-counted (`Bytes`), so cloning a frame is cheap and
/// never copies the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::new(FrameKind::Text, Bytes::from(s.into()))
    }

    pub fn binary(b: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Binary, b)
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload as UTF-8, if it is valid UTF-8 (regardless of kind).
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}
