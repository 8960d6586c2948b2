use async_trait::async_trait;
use serde_json::Value;

use wsbridge_core::error::Result;
use wsbridge_core::protocol::Request;

use crate::session::RpcContext;

/// Protocol handler. One instance per session, never rebuilt per message, so
/// state kept in `&mut self` is visible to every later request on the same
/// connection.
///
/// Returning `Err` produces an error response (or nothing, for
/// notifications); it never ends the session. Use `BridgeError::Rpc` to choose
/// the exact error object.
#[async_trait]
pub trait Handler: Send {
    async fn handle(&mut self, cx: &RpcContext, req: &Request) -> Result<Value>;

    /// Called exactly once when the session ends.
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Builds a fresh handler for each accepted connection.
pub trait HandlerFactory: Send + Sync {
    fn new_handler(&self) -> Box<dyn Handler>;
}

impl<F, H> HandlerFactory for F
where
    F: Fn() -> H + Send + Sync,
    H: Handler + 'static,
{
    fn new_handler(&self) -> Box<dyn Handler> {
        Box::new(self())
    }
}
