//! Observability: process-wide bridge counters rendered for Prometheus.

pub mod metrics;

pub use metrics::BridgeMetrics;
