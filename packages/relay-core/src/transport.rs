//! Transport contracts: the interface the runtime calls, the delivery sink
//! transports call back into, and the fault-notification channel.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::endpoint::{QueueEndpoint, TransportDefinition};
use crate::message::RawMessage;

/// Errors raised by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport host '{uri}' has not been configured")]
    HostNotConfigured { uri: String },
    #[error("queue '{endpoint}' does not exist")]
    UnknownQueue { endpoint: String },
    #[error("failed to subscribe '{subscription}' on '{endpoint}': {reason}")]
    Subscribe {
        endpoint: String,
        subscription: String,
        reason: String,
    },
    #[error("failed to send to '{endpoint}': {reason}")]
    Send { endpoint: String, reason: String },
}

/// Where a fault originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSource {
    /// Transport-level failure (e.g. the receive pump), not tied to one
    /// in-flight message.
    Transport,
    /// An inbound chain run faulted while processing a message.
    Pipeline,
    /// An outbound entry failed to reach its destination transport.
    Dispatch,
}

/// An observable fault event.
///
/// Faults are never swallowed: everything that is not propagated as an error
/// return is raised through [`FaultObserver`] so monitoring can see it.
#[derive(Debug, Clone)]
pub struct Fault {
    pub source: FaultSource,
    /// What the fault relates to: a subscription, a message id, an endpoint.
    pub context: String,
    pub detail: String,
}

impl Fault {
    #[must_use]
    pub fn new(source: FaultSource, context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            source,
            context: context.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} fault ({}): {}", self.source, self.context, self.detail)
    }
}

/// Observer-style fault channel.
///
/// At most the registered observers are notified; notification order is
/// unspecified. Implementations must not block.
pub trait FaultObserver: Send + Sync {
    fn on_fault(&self, fault: &Fault);
}

/// Callback the runtime hands to a transport subscription.
///
/// The transport invokes [`deliver`](DeliverySink::deliver) once per received
/// message. `Ok(())` signals successful processing (complete the message);
/// `Err` signals a processing fault (abandon the message so the broker can
/// redeliver or dead-letter it).
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, subscription: &str, message: RawMessage) -> anyhow::Result<()>;
}

/// A broker-specific send/receive implementation.
///
/// The runtime only ever talks to brokers through this trait. Implementations
/// own their connection lifecycle and concurrency; the runtime guarantees it
/// never shares a delivery's processing state across concurrent deliveries.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Establishes (or reuses) the connection for a host definition.
    /// Idempotent per URI.
    async fn configure_host(&self, definition: &TransportDefinition)
        -> Result<(), TransportError>;

    async fn create_queue(&self, endpoint: &QueueEndpoint) -> Result<(), TransportError>;

    async fn delete_queue(&self, endpoint: &QueueEndpoint) -> Result<(), TransportError>;

    async fn queue_exists(&self, endpoint: &QueueEndpoint) -> Result<bool, TransportError>;

    /// Point-to-point delivery of a single message.
    async fn send(
        &self,
        endpoint: &QueueEndpoint,
        message: RawMessage,
    ) -> Result<(), TransportError>;

    /// Point-to-point delivery of a batch.
    async fn send_batch(
        &self,
        endpoint: &QueueEndpoint,
        messages: Vec<RawMessage>,
    ) -> Result<(), TransportError>;

    /// Broadcast to every subscription on the endpoint.
    async fn publish(
        &self,
        endpoint: &QueueEndpoint,
        message: RawMessage,
    ) -> Result<(), TransportError>;

    /// Registers a named subscription. The transport invokes `sink` once per
    /// received message and reports pump-level errors through `faults`.
    async fn subscribe(
        &self,
        endpoint: &QueueEndpoint,
        subscription: &str,
        sink: Arc<dyn DeliverySink>,
        faults: Arc<dyn FaultObserver>,
    ) -> Result<(), TransportError>;
}

impl fmt::Debug for dyn MessageTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn MessageTransport")
    }
}
