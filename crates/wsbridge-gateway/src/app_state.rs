//! Shared application state for the bridge.
//!
//! Holds the validated config, the handler factory, the metrics registry, the
//! server-wide shutdown token, and the root logging span every session span
//! hangs off. Cheap to clone (everything behind `Arc`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use wsbridge_core::error::Result;

use crate::config::BridgeConfig;
use crate::dispatch::HandlerFactory;
use crate::obs::BridgeMetrics;
use crate::session::SessionSettings;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    factory: Arc<dyn HandlerFactory>,
    metrics: Arc<BridgeMetrics>,
}

struct AppStateInner {
    cfg: BridgeConfig,
    settings: SessionSettings,
    span: tracing::Span,
    shutdown: CancellationToken,
    sessions: TaskTracker,
    next_session: AtomicU64,
}

impl AppState {
    /// Build application state. `span` is the logging handle sessions are
    /// parented to.
    pub fn new(
        cfg: BridgeConfig,
        factory: Arc<dyn HandlerFactory>,
        span: tracing::Span,
    ) -> Result<Self> {
        cfg.validate()?;
        let settings = SessionSettings::from(&cfg.session);

        tracing::info!(
            parent: &span,
            path = %cfg.gateway.path,
            origin = ?cfg.gateway.origin,
            framing = ?settings.framing,
            dispatch_timeout = ?settings.dispatch_timeout,
            "bridge state ready"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                settings,
                span,
                shutdown: CancellationToken::new(),
                sessions: TaskTracker::new(),
                next_session: AtomicU64::new(1),
            }),
            factory,
            metrics: Arc::new(BridgeMetrics::new()),
        })
    }

    pub fn cfg(&self) -> &BridgeConfig {
        &self.inner.cfg
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn span(&self) -> &tracing::Span {
        &self.inner.span
    }

    pub fn factory(&self) -> &dyn HandlerFactory {
        self.factory.as_ref()
    }

    pub fn metrics(&self) -> Arc<BridgeMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Signal every session (and the listener) to stop.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub(crate) fn sessions(&self) -> &TaskTracker {
        &self.inner.sessions
    }

    pub(crate) fn next_session_id(&self) -> u64 {
        self.inner.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Wait for running sessions to finish teardown, at most `limit`.
    /// Returns false if some were still running.
    pub async fn drain(&self, limit: Duration) -> bool {
        self.inner.sessions.close();
        let done = tokio::time::timeout(limit, self.inner.sessions.wait())
            .await
            .is_ok();
        if !done {
            tracing::warn!(
                parent: &self.inner.span,
                remaining = self.inner.sessions.len(),
                "sessions still running after drain deadline"
            );
        }
        done
    }
}
