//! Transactional outbound-message dispatch.
//!
//! Messages a handler emits are buffered as [`OutboxEntry`] values tagged
//! with the inbound message id and become visible to transports only when
//! [`OutboundMessageManager::flush`] runs, which the dispatch task does
//! strictly after the rest of the inbound chain returned without fault.

pub mod tracking;

use relay_core::{keys, MessageIntent, RawMessage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::context::PipelineContext;
use crate::error::BusError;

pub use tracking::{InMemoryTransactionStore, TransactionStore};

/// One buffered outbound message awaiting dispatch.
///
/// The destination transport and endpoint are resolved at flush time from the
/// message-type registry, using the type name carried in the message's
/// metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Id of the inbound message whose processing produced this entry.
    pub correlation_id: String,
    pub message: RawMessage,
    /// Set once the entry has been handed to its destination transport.
    pub completed: bool,
}

impl OutboxEntry {
    #[must_use]
    pub fn new(correlation_id: impl Into<String>, message: RawMessage) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            message,
            completed: false,
        }
    }
}

/// Buffers handler-emitted messages and dispatches them after pipeline
/// success.
pub struct OutboundMessageManager {
    transactions_enabled: bool,
    tracking: Arc<dyn TransactionStore>,
}

impl OutboundMessageManager {
    #[must_use]
    pub fn new(transactions_enabled: bool, tracking: Arc<dyn TransactionStore>) -> Self {
        Self {
            transactions_enabled,
            tracking,
        }
    }

    #[must_use]
    pub fn transactions_enabled(&self) -> bool {
        self.transactions_enabled
    }

    /// Records a message a handler produced. Never dispatches.
    ///
    /// The entry lands in the invocation-local list; with transactions
    /// enabled it is also written through to the tracking store so the set
    /// survives a restart between record and flush.
    ///
    /// # Errors
    ///
    /// Propagates tracking-store failures.
    pub fn record(
        &self,
        local: &mut Vec<OutboxEntry>,
        correlation_id: &str,
        message: RawMessage,
    ) -> Result<(), BusError> {
        let entry = OutboxEntry::new(correlation_id, message);
        if self.transactions_enabled {
            self.tracking.append(entry.clone())?;
        }
        debug!(
            correlation_id,
            message_id = %entry.message.message_id,
            "recorded outbound message"
        );
        local.push(entry);
        Ok(())
    }

    /// Dispatches every incomplete entry for `correlation_id` to its
    /// destination transport, routing by message intent: `Send` and `Reply`
    /// through the transport's send path, `Publish` through its publish path.
    ///
    /// With transactions enabled the entry set comes from the tracking store;
    /// otherwise from the invocation-local list. Entries are marked completed
    /// one by one, so a failure never rolls back already-dispatched siblings
    /// and a retried flush skips what already went out. Returns the number of
    /// entries dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Dispatch`] naming the first entry that failed to
    /// reach its transport, or a resolution error when an entry's metadata
    /// does not map to a registered route.
    pub async fn flush(
        &self,
        pipeline: &PipelineContext,
        correlation_id: &str,
        local: &mut [OutboxEntry],
    ) -> Result<usize, BusError> {
        let entries: Vec<OutboxEntry> = if self.transactions_enabled {
            self.tracking.entries(correlation_id)?
        } else {
            local.to_vec()
        };

        let mut dispatched = 0;
        for entry in entries.into_iter().filter(|e| !e.completed) {
            let message_id = entry.message.message_id.clone();
            let type_name =
                entry
                    .message
                    .message_type()
                    .ok_or_else(|| BusError::MissingMetadata {
                        message_id: message_id.clone(),
                        key: keys::MESSAGE_TYPE.to_string(),
                    })?;
            let registered = pipeline.message_types.resolve(type_name)?;
            let transport = pipeline.transports.get(&registered.transport_name)?;
            let intent = entry.message.intent().map_err(|source| BusError::InvalidIntent {
                message_id: message_id.clone(),
                source,
            })?;

            let result = match intent {
                MessageIntent::Publish => {
                    transport.publish(&registered.endpoint, entry.message.clone()).await
                }
                MessageIntent::Send | MessageIntent::Reply => {
                    transport.send(&registered.endpoint, entry.message.clone()).await
                }
            };
            result.map_err(|source| BusError::Dispatch {
                message_id: message_id.clone(),
                source,
            })?;

            if self.transactions_enabled {
                self.tracking.mark_complete(correlation_id, &message_id)?;
            }
            if let Some(mirror) = local.iter_mut().find(|e| e.message.message_id == message_id) {
                mirror.completed = true;
            }
            dispatched += 1;
            debug!(
                correlation_id,
                message_id = %message_id,
                intent = %intent,
                endpoint = %registered.endpoint,
                "dispatched outbound message"
            );
        }

        if self.transactions_enabled {
            self.tracking.remove(correlation_id)?;
        }
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relay_core::{
        DeliverySink, FaultObserver, MessageTransport, QueueEndpoint, TransportDefinition,
        TransportError,
    };

    use super::*;
    use crate::config::BusConfig;
    use crate::registry::RegisteredMessageType;

    /// Transport double that records send/publish calls and can fail a
    /// specific message id.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<String>>,
        published: Mutex<Vec<String>>,
        fail_message_id: Option<String>,
    }

    impl RecordingTransport {
        fn failing(message_id: &str) -> Self {
            Self {
                fail_message_id: Some(message_id.to_string()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl MessageTransport for RecordingTransport {
        async fn configure_host(
            &self,
            _definition: &TransportDefinition,
        ) -> Result<(), TransportError> {
            Ok(())
        }
        async fn create_queue(&self, _endpoint: &QueueEndpoint) -> Result<(), TransportError> {
            Ok(())
        }
        async fn delete_queue(&self, _endpoint: &QueueEndpoint) -> Result<(), TransportError> {
            Ok(())
        }
        async fn queue_exists(&self, _endpoint: &QueueEndpoint) -> Result<bool, TransportError> {
            Ok(true)
        }
        async fn send(
            &self,
            endpoint: &QueueEndpoint,
            message: RawMessage,
        ) -> Result<(), TransportError> {
            if self.fail_message_id.as_deref() == Some(message.message_id.as_str()) {
                return Err(TransportError::Send {
                    endpoint: endpoint.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            self.sent.lock().push(message.message_id);
            Ok(())
        }
        async fn send_batch(
            &self,
            endpoint: &QueueEndpoint,
            messages: Vec<RawMessage>,
        ) -> Result<(), TransportError> {
            for message in messages {
                self.send(endpoint, message).await?;
            }
            Ok(())
        }
        async fn publish(
            &self,
            _endpoint: &QueueEndpoint,
            message: RawMessage,
        ) -> Result<(), TransportError> {
            self.published.lock().push(message.message_id);
            Ok(())
        }
        async fn subscribe(
            &self,
            _endpoint: &QueueEndpoint,
            _subscription: &str,
            _sink: Arc<dyn DeliverySink>,
            _faults: Arc<dyn FaultObserver>,
        ) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn pipeline_with(
        transport: Arc<RecordingTransport>,
        transactions_enabled: bool,
    ) -> PipelineContext {
        let mut ctx = PipelineContext::new(BusConfig {
            transactions_enabled,
            ..BusConfig::default()
        });
        ctx.transports
            .configure(&TransportDefinition::new("memory", "mem://local"), transport);
        ctx.message_types
            .register(RegisteredMessageType {
                full_name: "orders.OrderCreated".to_string(),
                transport_name: "memory".to_string(),
                endpoint: QueueEndpoint::new("mem://local", "orders"),
            })
            .unwrap();
        ctx
    }

    fn outbound(message_id: &str, intent: MessageIntent) -> RawMessage {
        RawMessage::new(message_id, b"{}".to_vec())
            .with_metadata(keys::MESSAGE_TYPE, "orders.OrderCreated")
            .with_metadata(keys::CONTENT_TYPE, "application/json")
            .with_metadata(keys::MESSAGE_INTENT, intent.as_str())
            .with_metadata(keys::CORRELATION_ID, "m-1")
    }

    #[tokio::test]
    async fn record_does_not_dispatch() {
        let transport = Arc::new(RecordingTransport::default());
        let ctx = pipeline_with(Arc::clone(&transport), false);

        let mut local = Vec::new();
        ctx.outbox
            .record(&mut local, "m-1", outbound("out-a", MessageIntent::Send))
            .unwrap();

        assert_eq!(local.len(), 1);
        assert!(transport.sent.lock().is_empty());
        assert!(transport.published.lock().is_empty());
    }

    #[tokio::test]
    async fn flush_routes_by_intent() {
        let transport = Arc::new(RecordingTransport::default());
        let ctx = pipeline_with(Arc::clone(&transport), false);

        let mut local = Vec::new();
        for (id, intent) in [
            ("out-send", MessageIntent::Send),
            ("out-pub", MessageIntent::Publish),
            ("out-reply", MessageIntent::Reply),
        ] {
            ctx.outbox.record(&mut local, "m-1", outbound(id, intent)).unwrap();
        }

        let dispatched = ctx.outbox.flush(&ctx, "m-1", &mut local).await.unwrap();

        assert_eq!(dispatched, 3);
        // Reply routes through the send path, same as Send.
        assert_eq!(*transport.sent.lock(), vec!["out-send", "out-reply"]);
        assert_eq!(*transport.published.lock(), vec!["out-pub"]);
        assert!(local.iter().all(|e| e.completed));
    }

    #[tokio::test]
    async fn flush_failure_keeps_dispatched_siblings_and_names_the_entry() {
        let transport = Arc::new(RecordingTransport::failing("out-b"));
        let ctx = pipeline_with(Arc::clone(&transport), false);

        let mut local = Vec::new();
        ctx.outbox.record(&mut local, "m-1", outbound("out-a", MessageIntent::Send)).unwrap();
        ctx.outbox.record(&mut local, "m-1", outbound("out-b", MessageIntent::Send)).unwrap();
        ctx.outbox.record(&mut local, "m-1", outbound("out-c", MessageIntent::Send)).unwrap();

        let err = ctx.outbox.flush(&ctx, "m-1", &mut local).await.unwrap_err();

        assert!(matches!(err, BusError::Dispatch { message_id, .. } if message_id == "out-b"));
        // No cross-entry rollback: out-a stays dispatched, out-c never went.
        assert_eq!(*transport.sent.lock(), vec!["out-a"]);
        assert!(local[0].completed);
        assert!(!local[1].completed);
        assert!(!local[2].completed);
    }

    #[tokio::test]
    async fn retried_flush_skips_completed_entries() {
        let transport = Arc::new(RecordingTransport::failing("out-b"));
        let ctx = pipeline_with(Arc::clone(&transport), false);

        let mut local = Vec::new();
        ctx.outbox.record(&mut local, "m-1", outbound("out-a", MessageIntent::Send)).unwrap();
        ctx.outbox.record(&mut local, "m-1", outbound("out-b", MessageIntent::Send)).unwrap();

        assert!(ctx.outbox.flush(&ctx, "m-1", &mut local).await.is_err());

        // Second attempt against a healthy transport: only out-b goes out.
        let healthy = Arc::new(RecordingTransport::default());
        let ctx2 = pipeline_with(Arc::clone(&healthy), false);
        let dispatched = ctx2.outbox.flush(&ctx2, "m-1", &mut local).await.unwrap();

        assert_eq!(dispatched, 1);
        assert_eq!(*healthy.sent.lock(), vec!["out-b"]);
    }

    #[tokio::test]
    async fn transactions_flush_reads_from_tracking_store() {
        let transport = Arc::new(RecordingTransport::default());
        let ctx = pipeline_with(Arc::clone(&transport), true);

        let mut local = Vec::new();
        ctx.outbox
            .record(&mut local, "m-1", outbound("out-a", MessageIntent::Send))
            .unwrap();

        // Simulate a restart between record and flush: the local list is gone
        // but the tracking store still has the entry.
        let mut empty_local = Vec::new();
        let dispatched = ctx.outbox.flush(&ctx, "m-1", &mut empty_local).await.unwrap();

        assert_eq!(dispatched, 1);
        assert_eq!(*transport.sent.lock(), vec!["out-a"]);
    }

    #[tokio::test]
    async fn unknown_type_fails_resolution_at_flush() {
        let transport = Arc::new(RecordingTransport::default());
        let ctx = pipeline_with(Arc::clone(&transport), false);

        let message = RawMessage::new("out-x", Vec::new())
            .with_metadata(keys::MESSAGE_TYPE, "ghost.Type")
            .with_metadata(keys::MESSAGE_INTENT, "Send");
        let mut local = Vec::new();
        ctx.outbox.record(&mut local, "m-1", message).unwrap();

        let err = ctx.outbox.flush(&ctx, "m-1", &mut local).await.unwrap_err();
        assert!(matches!(err, BusError::UnknownMessageType { name } if name == "ghost.Type"));
        assert!(transport.sent.lock().is_empty());
    }
}
