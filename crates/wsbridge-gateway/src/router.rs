//! Axum router wiring (HTTP -> WS upgrade) and the serve loop.
//!
//! Routes: the configured upgrade path (default `/sqls`) and, unless
//! disabled, the metrics path.

use std::net::SocketAddr;

use axum::{extract::State, routing::get, Router};
use tokio::net::TcpListener;

use crate::{app_state::AppState, transport};

pub fn build_router(state: AppState) -> Router {
    let gw = &state.cfg().gateway;
    let mut router = Router::new().route(&gw.path, get(transport::ws::ws_upgrade));
    if let Some(path) = &gw.metrics_path {
        router = router.route(path, get(metrics));
    }
    router.with_state(state)
}

async fn metrics(State(app): State<AppState>) -> String {
    app.metrics().render()
}

/// Serve until `state.shutdown()` is called, then give running sessions
/// time to send their close frames.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown_token().clone();
    let app = build_router(state.clone());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    let grace = state.settings().close_timeout * 2;
    state.drain(grace).await;
    tracing::info!(parent: state.span(), "listener stopped");
    Ok(())
}
