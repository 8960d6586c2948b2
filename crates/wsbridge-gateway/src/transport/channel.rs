//! Frame channel: the duplex transport seen by a session.
//!
//! A channel reads and writes one whole frame at a time and can send a close
//! signal under a deadline. Control traffic (ping/pong) stays inside the
//! adapter; the dispatch loop only ever sees data frames.

use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use tokio::time::timeout;

use wsbridge_core::error::{BridgeError, Result};
use wsbridge_core::protocol::{Frame, FrameKind};

#[async_trait]
pub trait FrameChannel: Send {
    /// Next data frame. Any error is terminal for the session
    /// (`BridgeError::Closed` when the peer hung up). Must be cancel-safe: the
    /// dispatch loop polls it alongside a running handler call.
    async fn read_frame(&mut self) -> Result<Frame>;

    /// Write one whole frame. Any error is terminal for the session.
    async fn write_frame(&mut self, frame: Frame) -> Result<()>;

    /// Send a close signal if the channel is still writable, waiting at most
    /// `deadline`.
    async fn close(&mut self, deadline: Duration) -> Result<()>;
}

/// Adapter over an upgraded axum WebSocket.
pub struct WsChannel {
    socket: WebSocket,
    writable: bool,
}

impl WsChannel {
    pub fn new(socket: WebSocket) -> Self {
        Self {
            socket,
            writable: true,
        }
    }
}

#[async_trait]
impl FrameChannel for WsChannel {
    async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            let msg = match self.socket.recv().await {
                Some(Ok(m)) => m,
                Some(Err(e)) => {
                    self.writable = false;
                    return Err(BridgeError::Transport(e.to_string()));
                }
                None => {
                    self.writable = false;
                    return Err(BridgeError::Closed);
                }
            };

            match msg {
                Message::Text(s) => return Ok(Frame::text(s)),
                Message::Binary(b) => return Ok(Frame::binary(b)),
                // tungstenite queues the pong reply itself
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(cf) => {
                    // the close handshake reply is sent by tungstenite
                    self.writable = false;
                    if let Some(cf) = cf {
                        tracing::debug!(code = cf.code, reason = %cf.reason, "peer sent close");
                    }
                    return Err(BridgeError::Closed);
                }
            }
        }
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        let msg = match frame.kind() {
            FrameKind::Text => match String::from_utf8(frame.payload().to_vec()) {
                Ok(s) => Message::Text(s),
                Err(e) => Message::Binary(e.into_bytes()),
            },
            FrameKind::Binary => Message::Binary(frame.into_payload().to_vec()),
        };
        if let Err(e) = self.socket.send(msg).await {
            self.writable = false;
            return Err(BridgeError::Transport(e.to_string()));
        }
        Ok(())
    }

    async fn close(&mut self, deadline: Duration) -> Result<()> {
        if !self.writable {
            return Ok(());
        }
        self.writable = false;

        let close = Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        }));
        match timeout(deadline, self.socket.send(close)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BridgeError::Transport(format!("close: {e}"))),
            Err(_) => Err(BridgeError::Transport(format!(
                "close: no progress within {} ms",
                deadline.as_millis()
            ))),
        }
    }
}
