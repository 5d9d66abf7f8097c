//! Built-in inbound-message tasks.
//!
//! Default wiring attaches [`DecodeEnvelopeTask`] to `Deserialize`,
//! [`MapHandlersTask`] then [`DispatchOutboundTask`] to `MapHandler`, and
//! [`InvokeHandlersTask`] to `ExecuteHandler`. The dispatch task sits before
//! handler execution in chain order but does its work after proceeding, so
//! the outbox flush observes everything the handlers and the
//! `PostHandlerExecution` stage recorded.

use async_trait::async_trait;
use relay_core::keys;
use tracing::debug;

use crate::context::MessageContext;
use crate::error::BusError;
use crate::pipeline::{InboundNext, InboundTask};

/// Validates the inbound envelope and resolves its message-type name.
pub struct DecodeEnvelopeTask;

#[async_trait]
impl InboundTask for DecodeEnvelopeTask {
    async fn invoke(
        &self,
        ctx: &mut MessageContext,
        next: InboundNext<'_>,
    ) -> Result<(), BusError> {
        let raw = ctx.raw();
        let message_id = raw.message_id.clone();
        for key in [
            keys::MESSAGE_TYPE,
            keys::CONTENT_TYPE,
            keys::MESSAGE_INTENT,
            keys::CORRELATION_ID,
        ] {
            if !raw.metadata.contains_key(key) {
                return Err(BusError::MissingMetadata {
                    message_id: message_id.clone(),
                    key: key.to_string(),
                });
            }
        }
        raw.intent().map_err(|source| BusError::InvalidIntent {
            message_id: message_id.clone(),
            source,
        })?;

        let type_name = raw
            .message_type()
            .ok_or_else(|| BusError::MissingMetadata {
                message_id: message_id.clone(),
                key: keys::MESSAGE_TYPE.to_string(),
            })?
            .to_string();
        ctx.set_message_type_name(type_name);
        next.run(ctx).await
    }
}

/// Resolves the handler set for the decoded message type.
///
/// A type with no bound handlers is not an error; the rest of the chain runs
/// and executes nothing.
pub struct MapHandlersTask;

#[async_trait]
impl InboundTask for MapHandlersTask {
    async fn invoke(
        &self,
        ctx: &mut MessageContext,
        next: InboundNext<'_>,
    ) -> Result<(), BusError> {
        if let Some(type_name) = ctx.message_type_name() {
            let matched = ctx.pipeline().handlers.resolve(type_name).to_vec();
            if matched.is_empty() {
                debug!(
                    message_id = %ctx.raw().message_id,
                    message_type = type_name,
                    "no handlers bound for inbound message type"
                );
            }
            ctx.set_matched_handlers(matched);
        }
        next.run(ctx).await
    }
}

/// Runs each matched handler in registration order, a fresh instance per
/// invocation. The first handler fault aborts the chain.
pub struct InvokeHandlersTask;

#[async_trait]
impl InboundTask for InvokeHandlersTask {
    async fn invoke(
        &self,
        ctx: &mut MessageContext,
        next: InboundNext<'_>,
    ) -> Result<(), BusError> {
        let matched = ctx.matched_handlers().to_vec();
        for registered in &matched {
            debug!(
                message_id = %ctx.raw().message_id,
                handler = %registered.name,
                "invoking handler"
            );
            registered
                .instantiate()
                .handle(ctx)
                .await
                .map_err(|source| BusError::Handler {
                    handler: registered.name.clone(),
                    message_id: ctx.raw().message_id.clone(),
                    source,
                })?;
        }
        next.run(ctx).await
    }
}

/// Flushes the outbox after everything downstream of it succeeded.
///
/// Proceeds first and only then dispatches, so a fault anywhere in handler
/// execution or post-handler work leaves every recorded message undispatched.
pub struct DispatchOutboundTask;

#[async_trait]
impl InboundTask for DispatchOutboundTask {
    async fn invoke(
        &self,
        ctx: &mut MessageContext,
        next: InboundNext<'_>,
    ) -> Result<(), BusError> {
        next.run(ctx).await?;

        let shared = ctx.shared();
        let correlation = ctx.correlation_id().to_string();
        let dispatched = shared
            .outbox
            .flush(&shared, &correlation, ctx.outbound_mut())
            .await?;
        if dispatched > 0 {
            debug!(
                message_id = %correlation,
                dispatched,
                "flushed outbound messages"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relay_core::RawMessage;

    use super::*;
    use crate::config::BusConfig;
    use crate::context::PipelineContext;
    use crate::handler::MessageHandler;
    use crate::registry::RegisteredHandler;

    fn envelope(message_id: &str, message_type: &str) -> RawMessage {
        RawMessage::new(message_id, b"{}".to_vec())
            .with_metadata(keys::MESSAGE_TYPE, message_type)
            .with_metadata(keys::CONTENT_TYPE, "application/json")
            .with_metadata(keys::MESSAGE_INTENT, "Send")
            .with_metadata(keys::CORRELATION_ID, message_id)
    }

    fn ctx_for(pipeline: PipelineContext, raw: RawMessage) -> MessageContext {
        MessageContext::new(Arc::new(pipeline), "relay", raw)
    }

    #[tokio::test]
    async fn decode_resolves_the_type_name() {
        let mut ctx = ctx_for(
            PipelineContext::new(BusConfig::default()),
            envelope("m-1", "orders.PlaceOrder"),
        );

        DecodeEnvelopeTask
            .invoke(&mut ctx, InboundNext::new(&[]))
            .await
            .unwrap();

        assert_eq!(ctx.message_type_name(), Some("orders.PlaceOrder"));
    }

    #[tokio::test]
    async fn decode_rejects_missing_metadata() {
        let raw = RawMessage::new("m-1", Vec::new())
            .with_metadata(keys::CONTENT_TYPE, "application/json");
        let mut ctx = ctx_for(PipelineContext::new(BusConfig::default()), raw);

        let err = DecodeEnvelopeTask
            .invoke(&mut ctx, InboundNext::new(&[]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BusError::MissingMetadata { key, .. } if key == keys::MESSAGE_TYPE
        ));
    }

    #[tokio::test]
    async fn decode_reports_absent_intent_as_missing_metadata() {
        let raw = RawMessage::new("m-1", b"{}".to_vec())
            .with_metadata(keys::MESSAGE_TYPE, "orders.PlaceOrder")
            .with_metadata(keys::CONTENT_TYPE, "application/json")
            .with_metadata(keys::CORRELATION_ID, "m-1");
        let mut ctx = ctx_for(PipelineContext::new(BusConfig::default()), raw);

        let err = DecodeEnvelopeTask
            .invoke(&mut ctx, InboundNext::new(&[]))
            .await
            .unwrap_err();
        // Absence names the key; InvalidIntent is reserved for present but
        // unparseable values.
        assert!(matches!(
            err,
            BusError::MissingMetadata { key, .. } if key == keys::MESSAGE_INTENT
        ));
    }

    #[tokio::test]
    async fn decode_rejects_unknown_intent() {
        let raw = envelope("m-1", "orders.PlaceOrder")
            .with_metadata(keys::MESSAGE_INTENT, "Broadcast");
        let mut ctx = ctx_for(PipelineContext::new(BusConfig::default()), raw);

        let err = DecodeEnvelopeTask
            .invoke(&mut ctx, InboundNext::new(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::InvalidIntent { message_id, .. } if message_id == "m-1"));
    }

    #[tokio::test]
    async fn map_resolves_handlers_in_registration_order() {
        struct Noop;
        #[async_trait]
        impl MessageHandler for Noop {
            async fn handle(&self, _ctx: &mut MessageContext) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let mut pipeline = PipelineContext::new(BusConfig::default());
        for name in ["First", "Second"] {
            pipeline.handlers.register(RegisteredHandler::new(
                "orders.PlaceOrder",
                name,
                || Box::new(Noop),
            ));
        }
        let mut ctx = ctx_for(pipeline, envelope("m-1", "orders.PlaceOrder"));
        ctx.set_message_type_name("orders.PlaceOrder");

        MapHandlersTask
            .invoke(&mut ctx, InboundNext::new(&[]))
            .await
            .unwrap();

        let names: Vec<&str> = ctx.matched_handlers().iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn map_with_no_handlers_is_a_no_op() {
        let mut ctx = ctx_for(
            PipelineContext::new(BusConfig::default()),
            envelope("m-1", "ghost.Type"),
        );
        ctx.set_message_type_name("ghost.Type");

        MapHandlersTask
            .invoke(&mut ctx, InboundNext::new(&[]))
            .await
            .unwrap();

        assert!(ctx.matched_handlers().is_empty());
    }

    #[tokio::test]
    async fn invoke_stops_at_the_first_faulting_handler() {
        use parking_lot::Mutex;

        struct Scripted {
            name: &'static str,
            fail: bool,
            log: Arc<Mutex<Vec<&'static str>>>,
        }
        #[async_trait]
        impl MessageHandler for Scripted {
            async fn handle(&self, _ctx: &mut MessageContext) -> anyhow::Result<()> {
                self.log.lock().push(self.name);
                if self.fail {
                    anyhow::bail!("handler failure");
                }
                Ok(())
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = ctx_for(
            PipelineContext::new(BusConfig::default()),
            envelope("m-1", "orders.PlaceOrder"),
        );
        let bindings: Vec<RegisteredHandler> = [("Good", false), ("Bad", true), ("Never", false)]
            .into_iter()
            .map(|(name, fail)| {
                let log = log.clone();
                RegisteredHandler::new("orders.PlaceOrder", name, move || {
                    Box::new(Scripted { name, fail, log: log.clone() })
                })
            })
            .collect();
        ctx.set_matched_handlers(bindings);

        let err = InvokeHandlersTask
            .invoke(&mut ctx, InboundNext::new(&[]))
            .await
            .unwrap_err();

        assert!(matches!(err, BusError::Handler { handler, .. } if handler == "Bad"));
        assert_eq!(*log.lock(), vec!["Good", "Bad"]);
    }

    #[tokio::test]
    async fn dispatch_with_empty_outbox_is_a_no_op() {
        let mut ctx = ctx_for(
            PipelineContext::new(BusConfig::default()),
            envelope("m-1", "orders.PlaceOrder"),
        );

        DispatchOutboundTask
            .invoke(&mut ctx, InboundNext::new(&[]))
            .await
            .unwrap();

        assert!(ctx.outbound().is_empty());
    }
}
