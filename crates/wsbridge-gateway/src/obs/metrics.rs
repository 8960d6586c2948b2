//! Minimal metrics registry for the bridge.
//!
//! No external metrics crate; counters are plain atomics, the only labelled
//! family (`rpc_errors_total{code}`) is backed by `DashMap`. Histogram buckets
//! are fixed in microseconds to avoid floating point accumulation.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

// 1ms, 5ms, 10ms, 50ms, 100ms, 500ms, 1s, 5s, 30s
const BUCKETS_MICROS: [u64; 9] = [
    1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000, 5_000_000, 30_000_000,
];

#[derive(Default)]
struct Histogram {
    count: AtomicU64,
    sum_micros: AtomicU64,
    buckets: [AtomicU64; BUCKETS_MICROS.len()],
}

impl Histogram {
    fn observe(&self, d: Duration) {
        let us = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(us, Ordering::Relaxed);
        for (i, le) in BUCKETS_MICROS.iter().enumerate() {
            if us <= *le {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} histogram");
        for (i, le) in BUCKETS_MICROS.iter().enumerate() {
            let secs = *le as f64 / 1_000_000.0;
            let v = self.buckets[i].load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}_bucket{{le=\"{secs}\"}} {v}");
        }
        let count = self.count.load(Ordering::Relaxed);
        let sum = self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {count}");
        let _ = writeln!(out, "{name}_sum {sum}");
        let _ = writeln!(out, "{name}_count {count}");
    }
}

/// Bridge-wide counters shared by the acceptor and every session.
#[derive(Default)]
pub struct BridgeMetrics {
    sessions_active: AtomicI64,
    sessions_total: AtomicU64,
    handshake_rejected: AtomicU64,
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    decode_errors: AtomicU64,
    notifications: AtomicU64,
    rpc_errors: DashMap<i64, AtomicU64>,
    dispatch: Histogram,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_opened(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn handshake_rejected(&self) {
        self.handshake_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_in(&self) {
        self.frames_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_out(&self) {
        self.frames_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rpc_error(&self, code: i64) {
        self.rpc_errors
            .entry(code)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_dispatch(&self, d: Duration) {
        self.dispatch.observe(d);
    }

    pub fn sessions_active(&self) -> i64 {
        self.sessions_active.load(Ordering::Relaxed)
    }

    pub fn sessions_total(&self) -> u64 {
        self.sessions_total.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(2048);
        gauge(&mut out, "wsbridge_sessions_active", self.sessions_active.load(Ordering::Relaxed));
        counter(&mut out, "wsbridge_sessions_total", &self.sessions_total);
        counter(&mut out, "wsbridge_handshake_rejected_total", &self.handshake_rejected);
        counter(&mut out, "wsbridge_frames_in_total", &self.frames_in);
        counter(&mut out, "wsbridge_frames_out_total", &self.frames_out);
        counter(&mut out, "wsbridge_decode_errors_total", &self.decode_errors);
        counter(&mut out, "wsbridge_notifications_total", &self.notifications);

        let _ = writeln!(out, "# TYPE wsbridge_rpc_errors_total counter");
        let mut codes: Vec<(i64, u64)> = self
            .rpc_errors
            .iter()
            .map(|r| (*r.key(), r.value().load(Ordering::Relaxed)))
            .collect();
        codes.sort_unstable();
        for (code, v) in codes {
            let _ = writeln!(out, "wsbridge_rpc_errors_total{{code=\"{code}\"}} {v}");
        }

        self.dispatch.render("wsbridge_dispatch_seconds", &mut out);
        out
    }
}

fn counter(out: &mut String, name: &str, v: &AtomicU64) {
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {}", v.load(Ordering::Relaxed));
}

fn gauge(out: &mut String, name: &str, v: i64) {
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {v}");
}
