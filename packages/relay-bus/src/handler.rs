//! Message handler contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::MessageContext;

/// A unit of application logic bound to a message type.
///
/// Handlers are resolved fresh per delivery, read the inbound envelope from
/// the context, and emit outbound messages through
/// [`MessageContext::send`]/[`publish`](MessageContext::publish)/
/// [`reply`](MessageContext::reply). Nothing a handler emits reaches a
/// transport until the whole inbound chain has completed without fault.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, ctx: &mut MessageContext) -> anyhow::Result<()>;
}

/// Factory producing a fresh handler instance per delivery.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn MessageHandler> + Send + Sync>;
