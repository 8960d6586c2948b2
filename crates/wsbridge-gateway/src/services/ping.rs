use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use wsbridge_core::error::{BridgeError, Result};
use wsbridge_core::protocol::Request;

use crate::dispatch::Handler;
use crate::session::RpcContext;

/// LSP `MessageType::Log`.
const LOG_MESSAGE_TYPE: u8 = 4;

/// Reference handler. Keeps per-session state so clients can observe that the
/// same instance serves every request of a connection.
#[derive(Debug, Default)]
pub struct PingHandler {
    initialized: bool,
    capabilities: Value,
    requests: u64,
}

#[derive(Debug, Deserialize)]
struct InitializeParams {
    #[serde(default)]
    capabilities: Value,
}

#[derive(Debug, Deserialize)]
struct NotifySelfParams {
    message: String,
}

impl PingHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Handler for PingHandler {
    async fn handle(&mut self, cx: &RpcContext, req: &Request) -> Result<Value> {
        self.requests += 1;

        match req.method.as_str() {
            "ping" => Ok(json!("pong")),
            "echo" => req.params_as::<Value>(),
            "initialize" => {
                let p: Option<InitializeParams> = req.params_as()?;
                self.initialized = true;
                self.capabilities = p.map(|p| p.capabilities).unwrap_or_default();
                Ok(json!({ "capabilities": self.capabilities }))
            }
            "session/state" => Ok(json!({
                "session": cx.session_id(),
                "initialized": self.initialized,
                "capabilities": self.capabilities,
                "requests": self.requests,
            })),
            "notify/self" => {
                let p: NotifySelfParams = req.params_as()?;
                cx.notify(
                    "window/logMessage",
                    json!({ "type": LOG_MESSAGE_TYPE, "message": p.message }),
                )?;
                Ok(Value::Null)
            }
            "initialized" | "$/cancelRequest" => Ok(Value::Null),
            other => Err(BridgeError::MethodNotFound(other.to_string())),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        tracing::debug!(requests = self.requests, "ping handler stopped");
        Ok(())
    }
}
