//! Session: one connection, one handler, one RPC context.
//!
//! `Session::run` drives the dispatch loop until a terminal condition, then
//! tears down in a fixed order:
//! 1. cancel the session token (in-flight and later handler work sees it)
//! 2. `Handler::stop`
//! 3. close signal on the frame channel (bounded by `close_timeout`)
//!
//! Teardown consumes the session, so each step runs exactly once, including
//! after a panic inside the loop.

mod context;
mod dispatch_loop;

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wsbridge_core::protocol::{Frame, Framing, Notification};

use crate::config::SessionSection;
use crate::dispatch::Handler;
use crate::obs::BridgeMetrics;
use crate::transport::channel::FrameChannel;

pub use context::RpcContext;

/// Runtime knobs for one session, resolved from `session:` config.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub close_timeout: Duration,
    pub dispatch_timeout: Option<Duration>,
    pub framing: Framing,
    pub max_frame_bytes: usize,
    pub outbound_queue: usize,
    pub trace: bool,
}

impl From<&SessionSection> for SessionSettings {
    fn from(s: &SessionSection) -> Self {
        Self {
            close_timeout: s.close_timeout(),
            dispatch_timeout: s.dispatch_timeout(),
            framing: s.framing,
            max_frame_bytes: s.max_frame_bytes,
            outbound_queue: s.outbound_queue,
            trace: s.trace,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SessionSection::default())
    }
}

/// Why the dispatch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    ReadFailed,
    WriteFailed,
    Shutdown,
    Panicked,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::ReadFailed => "read_failed",
            CloseReason::WriteFailed => "write_failed",
            CloseReason::Shutdown => "shutdown",
            CloseReason::Panicked => "panicked",
        }
    }
}

/// Per-session counters, reported when the session closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub requests: u64,
    pub notifications: u64,
    pub decode_errors: u64,
    pub handler_errors: u64,
    pub notes_sent: u64,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: u64,
    pub reason: CloseReason,
    pub stats: SessionStats,
}

pub struct Session<C: FrameChannel> {
    id: u64,
    channel: C,
    handler: Box<dyn Handler>,
    cx: RpcContext,
    cancel: CancellationToken,
    notes: mpsc::Receiver<Notification>,
    /// Frame read ahead while a handler call was running.
    pending: Option<Frame>,
    settings: SessionSettings,
    metrics: Arc<BridgeMetrics>,
    stats: SessionStats,
}

impl<C: FrameChannel> Session<C> {
    /// `shutdown` is the server-wide token; the session token is its child.
    pub fn new(
        id: u64,
        peer: Option<SocketAddr>,
        channel: C,
        handler: Box<dyn Handler>,
        settings: SessionSettings,
        metrics: Arc<BridgeMetrics>,
        shutdown: &CancellationToken,
    ) -> Self {
        let cancel = shutdown.child_token();
        let (notes_tx, notes) = mpsc::channel(settings.outbound_queue.max(1));
        let cx = RpcContext::new(id, peer, cancel.clone(), notes_tx);
        Self {
            id,
            channel,
            handler,
            cx,
            cancel,
            notes,
            pending: None,
            settings,
            metrics,
            stats: SessionStats::default(),
        }
    }

    /// Run the dispatch loop to completion, then tear down.
    pub async fn run(mut self) -> SessionSummary {
        self.metrics.session_opened();
        tracing::info!(session = self.id, peer = ?self.cx.peer(), "session opened");

        let reason = match AssertUnwindSafe(self.dispatch_loop()).catch_unwind().await {
            Ok(reason) => reason,
            Err(_) => {
                tracing::error!(session = self.id, "dispatch loop panicked");
                CloseReason::Panicked
            }
        };

        self.teardown(reason).await
    }

    async fn teardown(mut self, reason: CloseReason) -> SessionSummary {
        self.cx.cancel_session();

        match AssertUnwindSafe(self.handler.stop()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(session = self.id, error = %e, "handler stop failed"),
            Err(_) => tracing::error!(session = self.id, "handler stop panicked"),
        }

        if let Err(e) = self.channel.close(self.settings.close_timeout).await {
            tracing::debug!(session = self.id, error = %e, "close signal not delivered");
        }

        self.metrics.session_closed();
        tracing::info!(
            session = self.id,
            reason = reason.as_str(),
            requests = self.stats.requests,
            notifications = self.stats.notifications,
            decode_errors = self.stats.decode_errors,
            handler_errors = self.stats.handler_errors,
            notes_sent = self.stats.notes_sent,
            "session closed"
        );

        SessionSummary {
            id: self.id,
            reason,
            stats: self.stats,
        }
    }
}
