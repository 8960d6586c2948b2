//! Connection acceptor.
//!
//! Responsibilities:
//! - Apply the origin policy before upgrading
//! - Upgrade HTTP -> WS (frame size limit from `session.max_frame_bytes`)
//! - Start exactly one session per upgraded socket, in its own task
//!
//! A failed handshake is logged and answered with the rejection; no handler is
//! built for it.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use crate::app_state::AppState;
use crate::session::Session;
use crate::transport::channel::WsChannel;
use crate::transport::handshake::check_origin;

pub async fn ws_upgrade(
    State(app): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);

    let ws = match ws {
        Ok(ws) => ws,
        Err(rej) => {
            app.metrics().handshake_rejected();
            tracing::warn!(parent: app.span(), peer = ?peer, error = %rej, "websocket handshake failed");
            return rej.into_response();
        }
    };

    if let Err(rej) = check_origin(&app.cfg().gateway.origin, &headers) {
        app.metrics().handshake_rejected();
        tracing::warn!(parent: app.span(), peer = ?peer, reason = %rej, "handshake refused");
        return (StatusCode::FORBIDDEN, rej.to_string()).into_response();
    }

    let max = app.cfg().session.max_frame_bytes;
    let metrics = app.metrics();
    let span = app.span().clone();

    ws.max_message_size(max)
        .max_frame_size(max)
        .on_failed_upgrade(move |e| {
            metrics.handshake_rejected();
            tracing::warn!(parent: &span, peer = ?peer, error = %e, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| {
            let tracker = app.sessions().clone();
            tracker.track_future(start_session(app, socket, peer))
        })
}

async fn start_session(app: AppState, socket: WebSocket, peer: Option<SocketAddr>) {
    let id = app.next_session_id();
    let span = tracing::info_span!(parent: app.span(), "session", id, peer = ?peer);

    let session = Session::new(
        id,
        peer,
        WsChannel::new(socket),
        app.factory().new_handler(),
        app.settings().clone(),
        app.metrics(),
        app.shutdown_token(),
    );
    session.run().instrument(span).await;
}
