//! In-process transport backed by concurrent maps.
//!
//! Delivery is inline: `send` and `publish` invoke every subscription's sink
//! before returning, on the caller's task. A sink error abandons that one
//! delivery and raises a fault event; it never fails the send, matching how
//! a broker acknowledges a publish independently of consumer outcomes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use relay_core::{
    DeliverySink, Fault, FaultObserver, FaultSource, MessageTransport, QueueEndpoint, RawMessage,
    TransportDefinition, TransportError,
};
use tracing::{debug, warn};

#[derive(Clone)]
struct Subscription {
    name: String,
    sink: Arc<dyn DeliverySink>,
    faults: Arc<dyn FaultObserver>,
}

/// [`MessageTransport`] over process-local queues. Backs tests and
/// single-process deployments.
#[derive(Default)]
pub struct MemoryTransport {
    hosts: DashMap<String, TransportDefinition>,
    configure_calls: AtomicU32,
    queues: DashMap<String, Vec<Subscription>>,
    sent: Mutex<Vec<String>>,
    published: Mutex<Vec<String>>,
    abandoned: Mutex<Vec<String>>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times host configuration ran.
    #[must_use]
    pub fn configure_calls(&self) -> u32 {
        self.configure_calls.load(Ordering::SeqCst)
    }

    /// Ids of messages handed to the send path, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Ids of messages handed to the publish path, in order.
    #[must_use]
    pub fn published(&self) -> Vec<String> {
        self.published.lock().clone()
    }

    /// Ids of deliveries a sink rejected.
    #[must_use]
    pub fn abandoned(&self) -> Vec<String> {
        self.abandoned.lock().clone()
    }

    #[must_use]
    pub fn subscription_count(&self, endpoint: &QueueEndpoint) -> usize {
        self.queues
            .get(&endpoint.to_string())
            .map_or(0, |subs| subs.len())
    }

    fn subscribers_of(&self, endpoint: &QueueEndpoint) -> Result<Vec<Subscription>, TransportError> {
        // Clone out of the map so no shard lock is held across sink awaits.
        self.queues
            .get(&endpoint.to_string())
            .map(|subs| subs.clone())
            .ok_or_else(|| TransportError::UnknownQueue {
                endpoint: endpoint.to_string(),
            })
    }

    async fn deliver_all(&self, endpoint: &QueueEndpoint, message: &RawMessage) {
        let Ok(subscribers) = self.subscribers_of(endpoint) else {
            return;
        };
        for subscription in subscribers {
            let result = subscription
                .sink
                .deliver(&subscription.name, message.clone())
                .await;
            if let Err(err) = result {
                warn!(
                    message_id = %message.message_id,
                    subscription = %subscription.name,
                    error = %err,
                    "delivery abandoned"
                );
                self.abandoned.lock().push(message.message_id.clone());
                subscription.faults.on_fault(&Fault::new(
                    FaultSource::Transport,
                    message.message_id.clone(),
                    err.to_string(),
                ));
            }
        }
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    async fn configure_host(
        &self,
        definition: &TransportDefinition,
    ) -> Result<(), TransportError> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        self.hosts
            .insert(definition.uri.clone(), definition.clone());
        debug!(uri = %definition.uri, "memory host configured");
        Ok(())
    }

    async fn create_queue(&self, endpoint: &QueueEndpoint) -> Result<(), TransportError> {
        if !self.hosts.contains_key(&endpoint.host) {
            return Err(TransportError::HostNotConfigured {
                uri: endpoint.host.clone(),
            });
        }
        self.queues.entry(endpoint.to_string()).or_default();
        Ok(())
    }

    async fn delete_queue(&self, endpoint: &QueueEndpoint) -> Result<(), TransportError> {
        self.queues.remove(&endpoint.to_string());
        Ok(())
    }

    async fn queue_exists(&self, endpoint: &QueueEndpoint) -> Result<bool, TransportError> {
        Ok(self.queues.contains_key(&endpoint.to_string()))
    }

    async fn send(
        &self,
        endpoint: &QueueEndpoint,
        message: RawMessage,
    ) -> Result<(), TransportError> {
        if !self.queues.contains_key(&endpoint.to_string()) {
            return Err(TransportError::UnknownQueue {
                endpoint: endpoint.to_string(),
            });
        }
        self.sent.lock().push(message.message_id.clone());
        self.deliver_all(endpoint, &message).await;
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
        endpoint: &QueueEndpoint,
        message: RawMessage,
    ) -> Result<(), TransportError> {
        if !self.queues.contains_key(&endpoint.to_string()) {
            return Err(TransportError::UnknownQueue {
                endpoint: endpoint.to_string(),
            });
        }
        self.published.lock().push(message.message_id.clone());
        self.deliver_all(endpoint, &message).await;
        Ok(())
    }

    async fn subscribe(
        &self,
        endpoint: &QueueEndpoint,
        subscription: &str,
        sink: Arc<dyn DeliverySink>,
        faults: Arc<dyn FaultObserver>,
    ) -> Result<(), TransportError> {
        let Some(mut subs) = self.queues.get_mut(&endpoint.to_string()) else {
            return Err(TransportError::Subscribe {
                endpoint: endpoint.to_string(),
                subscription: subscription.to_string(),
                reason: "queue does not exist".to_string(),
            });
        };
        subs.push(Subscription {
            name: subscription.to_string(),
            sink,
            faults,
        });
        debug!(endpoint = %endpoint, subscription, "subscription attached");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectingSink {
        delivered: Mutex<Vec<String>>,
        reject: bool,
    }

    impl CollectingSink {
        fn new(reject: bool) -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                reject,
            }
        }
    }

    #[async_trait]
    impl DeliverySink for CollectingSink {
        async fn deliver(&self, _subscription: &str, message: RawMessage) -> anyhow::Result<()> {
            if self.reject {
                anyhow::bail!("sink rejected {}", message.message_id);
            }
            self.delivered.lock().push(message.message_id);
            Ok(())
        }
    }

    struct CountingFaults(AtomicU32);

    impl FaultObserver for CountingFaults {
        fn on_fault(&self, _fault: &Fault) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn transport_with_queue(endpoint: &QueueEndpoint) -> MemoryTransport {
        let transport = MemoryTransport::new();
        transport
            .configure_host(&TransportDefinition::new("memory", endpoint.host.clone()))
            .await
            .unwrap();
        transport.create_queue(endpoint).await.unwrap();
        transport
    }

    #[tokio::test]
    async fn send_delivers_to_every_subscription() {
        let endpoint = QueueEndpoint::new("mem://local", "orders");
        let transport = transport_with_queue(&endpoint).await;
        let (a, b) = (
            Arc::new(CollectingSink::new(false)),
            Arc::new(CollectingSink::new(false)),
        );
        let faults = Arc::new(CountingFaults(AtomicU32::new(0)));
        for sink in [&a, &b] {
            transport
                .subscribe(&endpoint, "relay", sink.clone(), faults.clone())
                .await
                .unwrap();
        }

        transport
            .send(&endpoint, RawMessage::new("m-1", Vec::new()))
            .await
            .unwrap();

        assert_eq!(*a.delivered.lock(), vec!["m-1"]);
        assert_eq!(*b.delivered.lock(), vec!["m-1"]);
        assert_eq!(transport.sent(), vec!["m-1"]);
    }

    #[tokio::test]
    async fn rejected_delivery_is_abandoned_and_faulted_but_send_succeeds() {
        let endpoint = QueueEndpoint::new("mem://local", "orders");
        let transport = transport_with_queue(&endpoint).await;
        let sink = Arc::new(CollectingSink::new(true));
        let faults = Arc::new(CountingFaults(AtomicU32::new(0)));
        transport
            .subscribe(&endpoint, "relay", sink, faults.clone())
            .await
            .unwrap();

        transport
            .send(&endpoint, RawMessage::new("m-1", Vec::new()))
            .await
            .unwrap();

        assert_eq!(transport.abandoned(), vec!["m-1"]);
        assert_eq!(faults.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_to_unknown_queue_fails() {
        let transport = MemoryTransport::new();
        let endpoint = QueueEndpoint::new("mem://local", "ghost");
        let err = transport
            .send(&endpoint, RawMessage::new("m-1", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownQueue { .. }));
    }

    #[tokio::test]
    async fn create_queue_requires_a_configured_host() {
        let transport = MemoryTransport::new();
        let endpoint = QueueEndpoint::new("mem://elsewhere", "orders");
        let err = transport.create_queue(&endpoint).await.unwrap_err();
        assert!(matches!(err, TransportError::HostNotConfigured { .. }));
    }

    #[tokio::test]
    async fn subscribe_requires_the_queue() {
        let transport = MemoryTransport::new();
        let endpoint = QueueEndpoint::new("mem://local", "ghost");
        let err = transport
            .subscribe(
                &endpoint,
                "relay",
                Arc::new(CollectingSink::new(false)),
                Arc::new(CountingFaults(AtomicU32::new(0))),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Subscribe { .. }));
    }

    #[tokio::test]
    async fn delete_queue_drops_subscriptions() {
        let endpoint = QueueEndpoint::new("mem://local", "orders");
        let transport = transport_with_queue(&endpoint).await;
        transport
            .subscribe(
                &endpoint,
                "relay",
                Arc::new(CollectingSink::new(false)),
                Arc::new(CountingFaults(AtomicU32::new(0))),
            )
            .await
            .unwrap();

        transport.delete_queue(&endpoint).await.unwrap();

        assert!(!transport.queue_exists(&endpoint).await.unwrap());
        assert_eq!(transport.subscription_count(&endpoint), 0);
    }
}
