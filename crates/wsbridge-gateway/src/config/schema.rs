use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use wsbridge_core::error::{BridgeError, Result};
use wsbridge_core::protocol::Framing;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub session: SessionSection,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            gateway: GatewaySection::default(),
            session: SessionSection::default(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(bad(format!("unsupported config version {}", self.version)));
        }
        self.gateway.validate()?;
        self.session.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Upgrade endpoint served by the acceptor.
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_metrics_path")]
    pub metrics_path: Option<String>,

    #[serde(default)]
    pub origin: OriginPolicy,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            metrics_path: default_metrics_path(),
            origin: OriginPolicy::default(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if !self.path.starts_with('/') {
            return Err(bad("gateway.path must start with '/'"));
        }
        if let Some(m) = &self.metrics_path {
            if !m.starts_with('/') {
                return Err(bad("gateway.metrics_path must start with '/'"));
            }
            if *m == self.path {
                return Err(bad("gateway.metrics_path must differ from gateway.path"));
            }
        }
        if let OriginPolicy::Allow(list) = &self.origin {
            if list.is_empty() {
                return Err(bad("gateway.origin.allow must not be empty"));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|_| bad(format!("gateway.listen is not a socket address: {}", self.listen)))
    }
}

/// Which `Origin` headers may open a session.
///
/// Browsers always send `Origin`; native clients usually do not, and requests
/// without the header are accepted under both policies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginPolicy {
    #[default]
    Any,
    Allow(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,

    /// 0 disables the per-request bound.
    #[serde(default)]
    pub dispatch_timeout_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    #[serde(default)]
    pub framing: Framing,

    /// Log every request and response payload.
    #[serde(default)]
    pub trace: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            close_timeout_ms: default_close_timeout_ms(),
            dispatch_timeout_ms: 0,
            max_frame_bytes: default_max_frame_bytes(),
            outbound_queue: default_outbound_queue(),
            framing: Framing::default(),
            trace: false,
        }
    }
}

impl SessionSection {
    pub fn validate(&self) -> Result<()> {
        if !(10..=10_000).contains(&self.close_timeout_ms) {
            return Err(bad("session.close_timeout_ms must be between 10 and 10000"));
        }
        if self.dispatch_timeout_ms != 0 && !(10..=3_600_000).contains(&self.dispatch_timeout_ms) {
            return Err(bad(
                "session.dispatch_timeout_ms must be 0 or between 10 and 3600000",
            ));
        }
        if !(1024..=256 * 1024 * 1024).contains(&self.max_frame_bytes) {
            return Err(bad(
                "session.max_frame_bytes must be between 1024 and 268435456",
            ));
        }
        if !(1..=65_536).contains(&self.outbound_queue) {
            return Err(bad("session.outbound_queue must be between 1 and 65536"));
        }
        Ok(())
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        (self.dispatch_timeout_ms > 0).then(|| Duration::from_millis(self.dispatch_timeout_ms))
    }
}

fn bad(msg: impl Into<String>) -> BridgeError {
    BridgeError::InvalidRequest(format!("bad config: {}", msg.into()))
}

fn default_version() -> u32 {
    1
}
fn default_listen() -> String {
    "0.0.0.0:8091".into()
}
fn default_path() -> String {
    "/sqls".into()
}
fn default_metrics_path() -> Option<String> {
    Some("/metrics".into())
}
fn default_close_timeout_ms() -> u64 {
    1000
}
fn default_max_frame_bytes() -> usize {
    16 * 1024 * 1024
}
fn default_outbound_queue() -> usize {
    256
}
