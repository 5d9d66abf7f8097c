//! Bus configuration.

/// Top-level configuration for a bus endpoint.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Logical name of this endpoint; used as the subscription name on every
    /// queue the bus consumes from.
    pub endpoint_name: String,
    /// When enabled, outbox entries are tracked through the transaction store
    /// so the outbound set survives a restart between record and flush.
    pub transactions_enabled: bool,
    /// When enabled, startup creates queues that do not exist yet instead of
    /// failing validation.
    pub create_missing_queues: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            endpoint_name: "relay".to_string(),
            transactions_enabled: false,
            create_missing_queues: true,
        }
    }
}
