//! Dispatch loop.
//!
//! ```text
//! AWAITING_FRAME -> DECODING -> DISPATCHING -> ENCODING -> WRITING -> AWAITING_FRAME
//! ```
//!
//! - read failure / peer close / shutdown in `AWAITING_FRAME` is terminal
//! - decode failure goes back to `AWAITING_FRAME`
//! - handler errors become error responses
//! - notifications skip `ENCODING`/`WRITING`
//! - write failure is terminal
//!
//! Exactly one handler call is in flight. While it runs the loop reads at most
//! one frame ahead: a data frame is parked and becomes the next frame seen in
//! `AWAITING_FRAME`, a read failure cancels the request token and ends the
//! session once the handler returns (bounded by `close_timeout`).
//! Queued server notifications are written while idle in `AWAITING_FRAME` and
//! right after each response.

use std::time::Instant;

use tokio::time::timeout;

use wsbridge_core::error::{BridgeError, ErrorCode};
use wsbridge_core::protocol::{
    decode_request, encode_notification, encode_response, ErrorObject, Frame, Notification,
    Outcome, Request, Response,
};

use super::{CloseReason, Session};
use crate::transport::channel::FrameChannel;

enum Wake {
    Shutdown,
    Note(Notification),
    Frame(wsbridge_core::Result<Frame>),
}

fn read_end(e: &BridgeError) -> CloseReason {
    match e {
        BridgeError::Closed => CloseReason::PeerClosed,
        _ => CloseReason::ReadFailed,
    }
}

impl<C: FrameChannel> Session<C> {
    pub(super) async fn dispatch_loop(&mut self) -> CloseReason {
        let cancel = self.cancel.clone();

        loop {
            // AWAITING_FRAME
            let wake = match self.pending.take() {
                Some(_) if cancel.is_cancelled() => Wake::Shutdown,
                Some(frame) => Wake::Frame(Ok(frame)),
                None => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Wake::Shutdown,
                    Some(note) = self.notes.recv() => Wake::Note(note),
                    res = self.channel.read_frame() => Wake::Frame(res),
                },
            };

            let frame = match wake {
                Wake::Shutdown => return CloseReason::Shutdown,
                Wake::Note(note) => {
                    if self.write_note(note).await.is_err() {
                        return CloseReason::WriteFailed;
                    }
                    continue;
                }
                Wake::Frame(Ok(frame)) => frame,
                Wake::Frame(Err(e)) => {
                    tracing::debug!(session = self.id, error = %e, "read ended");
                    return read_end(&e);
                }
            };
            self.metrics.frame_in();

            if self.settings.trace {
                tracing::info!(
                    session = self.id,
                    kind = frame.kind().as_str(),
                    payload = %String::from_utf8_lossy(frame.payload()),
                    "<-"
                );
            }

            // DECODING
            let req = match decode_request(&frame, self.settings.framing) {
                Ok(req) => req,
                Err(e) => {
                    self.stats.decode_errors += 1;
                    self.metrics.decode_error();
                    tracing::warn!(
                        session = self.id,
                        kind = frame.kind().as_str(),
                        len = frame.len(),
                        error = %e,
                        "dropping undecodable frame"
                    );
                    continue;
                }
            };

            // DISPATCHING
            let outcome = match self.dispatch(&req).await {
                Ok(outcome) => outcome,
                Err(reason) => return reason,
            };

            let Some(resp) = req.reply(outcome) else {
                self.stats.notifications += 1;
                continue;
            };
            self.stats.requests += 1;

            // ENCODING
            let Some(out) = self.encode(resp) else {
                continue;
            };

            // WRITING
            if self.write(out).await.is_err() {
                return CloseReason::WriteFailed;
            }
            if self.flush_notes().await.is_err() {
                return CloseReason::WriteFailed;
            }
        }
    }

    /// Run one handler call. `Err` carries the close reason when the peer went
    /// away while the call was running; the outcome is then discarded.
    async fn dispatch(&mut self, req: &Request) -> Result<Outcome, CloseReason> {
        let cx = self.cx.for_request();
        let started = Instant::now();
        let limit = self.settings.dispatch_timeout;
        let grace = self.settings.close_timeout;

        let handler = &mut self.handler;
        let call = async {
            match limit {
                Some(limit) => timeout(limit, handler.handle(&cx, req))
                    .await
                    .map_err(|_| limit),
                None => Ok(handler.handle(&cx, req).await),
            }
        };
        tokio::pin!(call);

        let mut gone = None;
        let res = loop {
            if self.pending.is_some() {
                break call.as_mut().await;
            }
            tokio::select! {
                res = call.as_mut() => break res,
                read = self.channel.read_frame() => match read {
                    Ok(frame) => self.pending = Some(frame),
                    Err(e) => {
                        tracing::debug!(session = self.id, error = %e, "read ended during dispatch");
                        gone = Some(read_end(&e));
                        cx.request_token().cancel();
                        break match timeout(grace, call.as_mut()).await {
                            Ok(res) => res,
                            Err(_) => {
                                tracing::warn!(
                                    session = self.id,
                                    method = %req.method,
                                    "handler ignored cancellation, dropping call"
                                );
                                Ok(Err(BridgeError::Cancelled))
                            }
                        };
                    }
                },
            }
        };

        let res = match res {
            Ok(res) => res,
            Err(limit) => {
                cx.request_token().cancel();
                Err(BridgeError::Timeout(limit.as_millis() as u64))
            }
        };
        self.metrics.observe_dispatch(started.elapsed());

        if let Err(e) = &res {
            self.stats.handler_errors += 1;
            let obj = e.to_error_object();
            self.metrics.rpc_error(obj.code);
            tracing::debug!(
                session = self.id,
                method = %req.method,
                id = ?req.id,
                code = obj.code,
                error = %e,
                "handler returned error"
            );
        }
        match gone {
            Some(reason) => Err(reason),
            None => Ok(Outcome::from(res)),
        }
    }

    /// Encode a response; on failure fall back to an internal error carrying
    /// the same id. `None` means even the fallback failed and the response is
    /// dropped.
    fn encode(&self, resp: Response) -> Option<Frame> {
        let err = match encode_response(&resp, self.settings.framing).and_then(|f| self.fit(f)) {
            Ok(frame) => return Some(frame),
            Err(e) => e,
        };
        tracing::error!(session = self.id, id = %resp.id, error = %err, "response encode failed");

        let fallback = Response {
            jsonrpc: resp.jsonrpc,
            id: resp.id,
            outcome: Outcome::Error(ErrorObject::new(
                ErrorCode::Internal.as_i64(),
                format!("response encode failed: {err}"),
            )),
        };
        match encode_response(&fallback, self.settings.framing).and_then(|f| self.fit(f)) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!(session = self.id, id = %fallback.id, error = %e, "dropping response");
                None
            }
        }
    }

    /// Outbound frames obey the same size limit as inbound ones.
    fn fit(&self, frame: Frame) -> wsbridge_core::Result<Frame> {
        let max = self.settings.max_frame_bytes;
        if frame.len() > max {
            return Err(BridgeError::Internal(format!(
                "{} byte frame exceeds max_frame_bytes {max}",
                frame.len()
            )));
        }
        Ok(frame)
    }

    async fn write(&mut self, frame: Frame) -> wsbridge_core::Result<()> {
        if self.settings.trace {
            tracing::info!(
                session = self.id,
                payload = %String::from_utf8_lossy(frame.payload()),
                "->"
            );
        }
        match self.channel.write_frame(frame).await {
            Ok(()) => {
                self.metrics.frame_out();
                Ok(())
            }
            Err(e) => {
                tracing::debug!(session = self.id, error = %e, "write failed");
                Err(e)
            }
        }
    }

    async fn write_note(&mut self, note: Notification) -> wsbridge_core::Result<()> {
        let frame = match encode_notification(&note, self.settings.framing).and_then(|f| self.fit(f)) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(session = self.id, method = %note.method, error = %e, "dropping notification");
                return Ok(());
            }
        };
        self.write(frame).await?;
        self.stats.notes_sent += 1;
        self.metrics.notification();
        Ok(())
    }

    async fn flush_notes(&mut self) -> wsbridge_core::Result<()> {
        while let Ok(note) = self.notes.try_recv() {
            self.write_note(note).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use wsbridge_core::error::Result;
    use wsbridge_core::protocol::Id;

    use super::*;
    use crate::dispatch::Handler;
    use crate::obs::BridgeMetrics;
    use crate::services::PingHandler;
    use crate::session::{RpcContext, SessionSettings, SessionSummary};
    use crate::transport::channel::memory::{self, MemoryPeer};

    /// Counts calls and stops; `sleep` blocks for the given millis.
    struct Probe {
        calls: u64,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for Probe {
        async fn handle(&mut self, cx: &RpcContext, req: &Request) -> Result<Value> {
            self.calls += 1;
            match req.method.as_str() {
                "calls" => Ok(json!(self.calls)),
                "sleep" => {
                    let ms: u64 = req.params_as()?;
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(json!("slept")),
                        _ = cx.cancelled() => Err(BridgeError::Cancelled),
                    }
                }
                "wait" => {
                    cx.cancelled().await;
                    Err(BridgeError::Cancelled)
                }
                "stubborn" => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Value::Null)
                }
                "big" => {
                    let n: usize = req.params_as()?;
                    Ok(json!("x".repeat(n)))
                }
                "panic" => panic!("handler blew up"),
                "fail" => Err(BridgeError::InvalidParams("nope".into())),
                _ => Err(BridgeError::MethodNotFound(req.method.clone())),
            }
        }

        async fn stop(&mut self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn spawn_probe(
        settings: SessionSettings,
    ) -> (
        MemoryPeer,
        Arc<AtomicUsize>,
        tokio::task::JoinHandle<SessionSummary>,
    ) {
        let (chan, peer) = memory::pair();
        let stops = Arc::new(AtomicUsize::new(0));
        let handler = Box::new(Probe {
            calls: 0,
            stops: Arc::clone(&stops),
        });
        let session = Session::new(
            1,
            None,
            chan,
            handler,
            settings,
            Arc::new(BridgeMetrics::new()),
            &CancellationToken::new(),
        );
        (peer, stops, tokio::spawn(session.run()))
    }

    async fn next_json(peer: &mut MemoryPeer) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(2), peer.rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("channel closed");
        serde_json::from_slice(frame.payload()).expect("frame is json")
    }

    #[tokio::test]
    async fn ping_gets_exact_pong() {
        let (chan, mut peer) = memory::pair();
        let session = Session::new(
            7,
            None,
            chan,
            Box::new(PingHandler::new()),
            SessionSettings::default(),
            Arc::new(BridgeMetrics::new()),
            &CancellationToken::new(),
        );
        let task = tokio::spawn(session.run());

        peer.send_text(r#"{"id":1,"method":"ping","params":null}"#);
        let frame = peer.rx.recv().await.unwrap();
        assert_eq!(frame.as_str(), Some(r#"{"id":1,"result":"pong"}"#));

        drop(peer.tx);
        let summary = task.await.unwrap();
        assert_eq!(summary.reason, CloseReason::PeerClosed);
        assert_eq!(summary.stats.requests, 1);
    }

    #[tokio::test]
    async fn malformed_frame_does_not_end_session() {
        let (mut peer, _stops, task) = spawn_probe(SessionSettings::default());

        let _ = peer.tx.send(Frame::binary(vec![0xff, 0x00, 0x13]));
        peer.send_text(r#"{"id":2,"method":"calls"}"#);
        assert_eq!(next_json(&mut peer).await, json!({"id":2,"result":1}));
        assert!(peer.rx.try_recv().is_err());

        drop(peer.tx);
        let summary = task.await.unwrap();
        assert_eq!(summary.stats.decode_errors, 1);
    }

    #[tokio::test]
    async fn handler_state_survives_between_requests() {
        let (mut peer, _stops, task) = spawn_probe(SessionSettings::default());

        for n in 1..=3u64 {
            peer.send_text(&format!(r#"{{"id":{n},"method":"calls"}}"#));
            assert_eq!(next_json(&mut peer).await, json!({"id": n, "result": n}));
        }
        drop(peer.tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn notifications_are_dispatched_but_silent() {
        let (mut peer, _stops, task) = spawn_probe(SessionSettings::default());

        peer.send_text(r#"{"method":"calls"}"#);
        peer.send_text(r#"{"method":"fail"}"#);
        peer.send_text(r#"{"id":"q","method":"calls"}"#);
        assert_eq!(next_json(&mut peer).await, json!({"id":"q","result":3}));

        drop(peer.tx);
        let summary = task.await.unwrap();
        assert_eq!(summary.stats.notifications, 2);
        assert_eq!(summary.stats.requests, 1);
    }

    #[tokio::test]
    async fn handler_error_becomes_error_response() {
        let (mut peer, stops, task) = spawn_probe(SessionSettings::default());

        peer.send_text(r#"{"jsonrpc":"2.0","id":4,"method":"fail"}"#);
        let v = next_json(&mut peer).await;
        assert_eq!(v["jsonrpc"], json!("2.0"));
        assert_eq!(v["id"], json!(4));
        assert_eq!(v["error"]["code"], json!(-32602));
        assert!(v.get("result").is_none());

        drop(peer.tx);
        task.await.unwrap();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn write_failure_tears_down_once() {
        let (peer, stops, task) = spawn_probe(SessionSettings::default());

        peer.fail_writes.store(true, Ordering::SeqCst);
        peer.send_text(r#"{"id":1,"method":"calls"}"#);

        let summary = task.await.unwrap();
        assert_eq!(summary.reason, CloseReason::WriteFailed);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(peer.close_count(), 1);
    }

    #[tokio::test]
    async fn panic_in_handler_still_stops_and_closes() {
        let (peer, stops, task) = spawn_probe(SessionSettings::default());

        peer.send_text(r#"{"id":1,"method":"panic"}"#);

        let summary = task.await.unwrap();
        assert_eq!(summary.reason, CloseReason::Panicked);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(peer.close_count(), 1);
    }

    #[tokio::test]
    async fn peer_gone_mid_dispatch_stops_once() {
        let (peer, stops, task) = spawn_probe(SessionSettings::default());

        peer.send_text(r#"{"id":1,"method":"sleep","params":50}"#);
        drop(peer.tx);
        drop(peer.rx);

        let summary = task.await.unwrap();
        assert_eq!(summary.reason, CloseReason::PeerClosed);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(peer.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn peer_gone_cancels_waiting_handler() {
        let (peer, stops, task) = spawn_probe(SessionSettings::default());

        peer.send_text(r#"{"id":1,"method":"wait"}"#);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let closes = Arc::clone(&peer.closes);
        drop(peer);

        let summary = tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("session did not tear down")
            .unwrap();
        assert_eq!(summary.reason, CloseReason::PeerClosed);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_ignoring_cancel_is_dropped_after_close_timeout() {
        let settings = SessionSettings {
            close_timeout: Duration::from_millis(30),
            ..SessionSettings::default()
        };
        let (peer, stops, task) = spawn_probe(settings);

        peer.send_text(r#"{"id":1,"method":"stubborn"}"#);
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(peer);

        let summary = tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("session did not tear down")
            .unwrap();
        assert_eq!(summary.reason, CloseReason::PeerClosed);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn frame_read_ahead_waits_its_turn() {
        let (mut peer, _stops, task) = spawn_probe(SessionSettings::default());

        peer.send_text(r#"{"id":1,"method":"sleep","params":40}"#);
        peer.send_text(r#"{"id":2,"method":"calls"}"#);
        peer.send_text(r#"{"id":3,"method":"calls"}"#);
        assert_eq!(next_json(&mut peer).await, json!({"id":1,"result":"slept"}));
        assert_eq!(next_json(&mut peer).await, json!({"id":2,"result":2}));
        assert_eq!(next_json(&mut peer).await, json!({"id":3,"result":3}));

        drop(peer.tx);
        let summary = task.await.unwrap();
        assert_eq!(summary.reason, CloseReason::PeerClosed);
        assert_eq!(summary.stats.requests, 3);
    }

    #[tokio::test]
    async fn oversized_result_becomes_internal_error() {
        let settings = SessionSettings {
            max_frame_bytes: 256,
            ..SessionSettings::default()
        };
        let (mut peer, _stops, task) = spawn_probe(settings);

        peer.send_text(r#"{"jsonrpc":"2.0","id":5,"method":"big","params":1000}"#);
        let v = next_json(&mut peer).await;
        assert_eq!(v["jsonrpc"], json!("2.0"));
        assert_eq!(v["id"], json!(5));
        assert_eq!(v["error"]["code"], json!(-32603));
        assert!(v.get("result").is_none());

        peer.send_text(r#"{"id":6,"method":"big","params":3}"#);
        assert_eq!(next_json(&mut peer).await, json!({"id":6,"result":"xxx"}));

        drop(peer.tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn response_is_dropped_when_fallback_cannot_encode() {
        let (chan, _peer) = memory::pair();
        let session = Session::new(
            4,
            None,
            chan,
            Box::new(PingHandler::new()),
            SessionSettings::default(),
            Arc::new(BridgeMetrics::new()),
            &CancellationToken::new(),
        );

        let good = Response {
            jsonrpc: None,
            id: Id::from(1u64),
            outcome: Outcome::Result(json!("pong")),
        };
        assert!(session.encode(good).is_some());

        let unencodable = Response {
            jsonrpc: None,
            id: Id::Num("not a number".into()),
            outcome: Outcome::Result(json!("pong")),
        };
        assert!(session.encode(unencodable).is_none());
    }

    #[tokio::test]
    async fn dispatch_timeout_cancels_request() {
        let settings = SessionSettings {
            dispatch_timeout: Some(Duration::from_millis(20)),
            ..SessionSettings::default()
        };
        let (mut peer, _stops, task) = spawn_probe(settings);

        peer.send_text(r#"{"id":1,"method":"sleep","params":5000}"#);
        let v = next_json(&mut peer).await;
        assert_eq!(v["id"], json!(1));
        assert_eq!(v["error"]["code"], json!(-32800));

        peer.send_text(r#"{"id":2,"method":"calls"}"#);
        assert_eq!(next_json(&mut peer).await, json!({"id":2,"result":2}));

        drop(peer.tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_ends_idle_session() {
        let (chan, peer) = memory::pair();
        let shutdown = CancellationToken::new();
        let session = Session::new(
            3,
            None,
            chan,
            Box::new(PingHandler::new()),
            SessionSettings::default(),
            Arc::new(BridgeMetrics::new()),
            &shutdown,
        );
        let task = tokio::spawn(session.run());

        shutdown.cancel();
        let summary = task.await.unwrap();
        assert_eq!(summary.reason, CloseReason::Shutdown);
        assert_eq!(peer.close_count(), 1);
    }

    #[tokio::test]
    async fn notes_follow_the_response() {
        let (chan, mut peer) = memory::pair();
        let session = Session::new(
            9,
            None,
            chan,
            Box::new(PingHandler::new()),
            SessionSettings::default(),
            Arc::new(BridgeMetrics::new()),
            &CancellationToken::new(),
        );
        let task = tokio::spawn(session.run());

        peer.send_text(r#"{"id":1,"method":"notify/self","params":{"message":"hello"}}"#);
        assert_eq!(next_json(&mut peer).await, json!({"id":1,"result":null}));
        let note = next_json(&mut peer).await;
        assert_eq!(note["method"], json!("window/logMessage"));
        assert_eq!(note["params"]["message"], json!("hello"));
        assert!(note.get("id").is_none());

        drop(peer.tx);
        let summary = task.await.unwrap();
        assert_eq!(summary.stats.notes_sent, 1);
    }
}
