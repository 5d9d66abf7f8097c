//! Process-wide and per-invocation state carriers.
//!
//! [`PipelineContext`] is built mutably by the startup pipeline, then frozen
//! behind an `Arc` for steady state: after the freeze nothing writes to it,
//! which is the invariant that lets concurrent inbound chains read the
//! registries without locks. [`MessageContext`] is created fresh per arriving
//! message and owned exclusively by that one chain run.

use std::sync::Arc;

use relay_core::{
    keys, MessageIntent, MessageTransport, QueueEndpoint, RawMessage, TransportDefinition,
};
use uuid::Uuid;

use crate::config::BusConfig;
use crate::error::BusError;
use crate::faults::CompositeFaultObserver;
use crate::outbox::{InMemoryTransactionStore, OutboundMessageManager, OutboxEntry, TransactionStore};
use crate::registry::{HandlerRegistry, MessageTypeRegistry, RegisteredHandler, TransportRegistry};

/// A message type declared at build time, before its transport route is
/// resolved during startup.
#[derive(Debug, Clone)]
pub struct MessageTypeDeclaration {
    pub full_name: String,
    pub transport_name: String,
    pub queue_name: String,
}

/// Process-wide pipeline state.
///
/// Mutated only while the startup pipeline runs; read-only afterward.
pub struct PipelineContext {
    pub config: BusConfig,
    /// Discovery output consumed by startup tasks: declared transports.
    pub declared_transports: Vec<(TransportDefinition, Arc<dyn MessageTransport>)>,
    /// Discovery output: declared message types awaiting route assignment.
    pub declared_types: Vec<MessageTypeDeclaration>,
    /// Discovery output: handler bindings awaiting registration.
    pub declared_handlers: Vec<RegisteredHandler>,
    pub message_types: MessageTypeRegistry,
    pub handlers: HandlerRegistry,
    pub transports: TransportRegistry,
    pub outbox: OutboundMessageManager,
    pub faults: Arc<CompositeFaultObserver>,
}

impl PipelineContext {
    /// Creates a context with empty registries and an in-memory transaction
    /// store.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        let transactions_enabled = config.transactions_enabled;
        Self {
            config,
            declared_transports: Vec::new(),
            declared_types: Vec::new(),
            declared_handlers: Vec::new(),
            message_types: MessageTypeRegistry::new(),
            handlers: HandlerRegistry::new(),
            transports: TransportRegistry::new(),
            outbox: OutboundMessageManager::new(
                transactions_enabled,
                Arc::new(InMemoryTransactionStore::new()),
            ),
            faults: Arc::new(CompositeFaultObserver::default()),
        }
    }

    /// Replaces the transaction tracking store (e.g. with a durable one).
    pub fn set_transaction_store(&mut self, store: Arc<dyn TransactionStore>) {
        self.outbox = OutboundMessageManager::new(self.config.transactions_enabled, store);
    }

    /// Replaces the fault observer fan-out.
    pub fn set_fault_observers(&mut self, faults: CompositeFaultObserver) {
        self.faults = Arc::new(faults);
    }
}

/// Per-invocation state for one inbound message.
///
/// Wraps the shared read-only [`PipelineContext`] plus everything this one
/// chain run accumulates: the resolved message type, the matched handler set,
/// and the outbound messages recorded so far. Never shared across concurrent
/// deliveries.
pub struct MessageContext {
    shared: Arc<PipelineContext>,
    subscription: String,
    raw: RawMessage,
    message_type_name: Option<String>,
    matched_handlers: Vec<RegisteredHandler>,
    outbound: Vec<OutboxEntry>,
}

impl MessageContext {
    #[must_use]
    pub fn new(shared: Arc<PipelineContext>, subscription: impl Into<String>, raw: RawMessage) -> Self {
        Self {
            shared,
            subscription: subscription.into(),
            raw,
            message_type_name: None,
            matched_handlers: Vec::new(),
            outbound: Vec::new(),
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> &PipelineContext {
        &self.shared
    }

    /// Clones the shared context handle.
    #[must_use]
    pub fn shared(&self) -> Arc<PipelineContext> {
        Arc::clone(&self.shared)
    }

    #[must_use]
    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    #[must_use]
    pub fn raw(&self) -> &RawMessage {
        &self.raw
    }

    /// The inbound message id; doubles as the correlation id for every
    /// outbound message this invocation records.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.raw.message_id
    }

    #[must_use]
    pub fn message_type_name(&self) -> Option<&str> {
        self.message_type_name.as_deref()
    }

    pub fn set_message_type_name(&mut self, name: impl Into<String>) {
        self.message_type_name = Some(name.into());
    }

    #[must_use]
    pub fn matched_handlers(&self) -> &[RegisteredHandler] {
        &self.matched_handlers
    }

    pub fn set_matched_handlers(&mut self, handlers: Vec<RegisteredHandler>) {
        self.matched_handlers = handlers;
    }

    /// Outbound entries recorded so far.
    #[must_use]
    pub fn outbound(&self) -> &[OutboxEntry] {
        &self.outbound
    }

    #[must_use]
    pub fn outbound_mut(&mut self) -> &mut [OutboxEntry] {
        &mut self.outbound
    }

    /// Buffers a point-to-point message for dispatch after pipeline success.
    ///
    /// # Errors
    ///
    /// Propagates tracking-store failures when transactions are enabled.
    pub fn send(
        &mut self,
        message_type: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), BusError> {
        self.record(MessageIntent::Send, message_type, content_type, body)
    }

    /// Buffers a broadcast message for dispatch after pipeline success.
    ///
    /// # Errors
    ///
    /// Propagates tracking-store failures when transactions are enabled.
    pub fn publish(
        &mut self,
        message_type: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), BusError> {
        self.record(MessageIntent::Publish, message_type, content_type, body)
    }

    /// Buffers a reply to the inbound message. Replies resolve their
    /// destination through the same path as sends.
    ///
    /// # Errors
    ///
    /// Propagates tracking-store failures when transactions are enabled.
    pub fn reply(
        &mut self,
        message_type: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), BusError> {
        self.record(MessageIntent::Reply, message_type, content_type, body)
    }

    fn record(
        &mut self,
        intent: MessageIntent,
        message_type: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), BusError> {
        let message = outbound_message(
            intent,
            message_type,
            content_type,
            body,
            Some(self.raw.message_id.as_str()),
        );
        let correlation = self.raw.message_id.clone();
        let shared = Arc::clone(&self.shared);
        shared.outbox.record(&mut self.outbound, &correlation, message)
    }
}

/// Builds an outbound envelope with a fresh message id and the standard
/// metadata set.
#[must_use]
pub fn outbound_message(
    intent: MessageIntent,
    message_type: &str,
    content_type: &str,
    body: Vec<u8>,
    correlation_id: Option<&str>,
) -> RawMessage {
    let message_id = Uuid::new_v4().to_string();
    let correlation = correlation_id.unwrap_or(message_id.as_str()).to_string();
    RawMessage::new(message_id, body)
        .with_metadata(keys::MESSAGE_TYPE, message_type)
        .with_metadata(keys::CONTENT_TYPE, content_type)
        .with_metadata(keys::MESSAGE_INTENT, intent.as_str())
        .with_metadata(keys::CORRELATION_ID, correlation)
}

/// Builds the queue endpoint for a declared message type from its transport
/// definition.
#[must_use]
pub fn endpoint_for(definition: &TransportDefinition, queue_name: &str) -> QueueEndpoint {
    QueueEndpoint::new(definition.uri.clone(), queue_name)
}
