//! Per-session RPC connection context.
//!
//! Built once when the session starts and shared (cheap `Clone`) with every
//! handler call of that session. Carries the identity of the connection, the
//! session cancellation token, and the queue used for server-originated
//! notifications.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wsbridge_core::error::{BridgeError, Result};
use wsbridge_core::protocol::Notification;

#[derive(Clone)]
pub struct RpcContext {
    inner: Arc<ContextInner>,
    request: CancellationToken,
}

struct ContextInner {
    session_id: u64,
    peer: Option<SocketAddr>,
    cancel: CancellationToken,
    notes: mpsc::Sender<Notification>,
}

impl RpcContext {
    pub(crate) fn new(
        session_id: u64,
        peer: Option<SocketAddr>,
        cancel: CancellationToken,
        notes: mpsc::Sender<Notification>,
    ) -> Self {
        let request = cancel.child_token();
        Self {
            inner: Arc::new(ContextInner {
                session_id,
                peer,
                cancel,
                notes,
            }),
            request,
        }
    }

    /// Same session, fresh per-request token (child of the session token).
    pub(crate) fn for_request(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            request: self.inner.cancel.child_token(),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.inner.session_id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.inner.peer
    }

    /// Token cancelled when the current request times out or the session ends.
    pub fn request_token(&self) -> &CancellationToken {
        &self.request
    }

    pub fn is_cancelled(&self) -> bool {
        self.request.is_cancelled()
    }

    /// Resolves once the current request is cancelled.
    pub async fn cancelled(&self) {
        self.request.cancelled().await
    }

    /// Queue a notification for the peer. The dispatch loop writes it; during
    /// a request it goes out after that request's response.
    pub fn notify(&self, method: impl Into<String>, params: Value) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }
        self.inner
            .notes
            .try_send(Notification::new(method, params))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    BridgeError::Internal("notification queue full".into())
                }
                mpsc::error::TrySendError::Closed(_) => BridgeError::Cancelled,
            })
    }

    pub(crate) fn cancel_session(&self) {
        self.inner.cancel.cancel();
    }
}

impl std::fmt::Debug for RpcContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcContext")
            .field("session_id", &self.inner.session_id)
            .field("peer", &self.inner.peer)
            .field("cancelled", &self.request.is_cancelled())
            .finish()
    }
}
