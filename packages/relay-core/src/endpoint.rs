//! Addressing types: queue endpoints and transport definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named queue (or topic) on a specific transport host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueEndpoint {
    /// Host identity, matching a configured transport URI.
    pub host: String,
    /// Queue name on that host.
    pub name: String,
}

impl QueueEndpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            name: name.into(),
        }
    }

    /// Fully-qualified key for a subscription on this endpoint.
    #[must_use]
    pub fn subscription_key(&self, subscription: &str) -> String {
        format!("{}:{subscription}", self.name)
    }
}

impl fmt::Display for QueueEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.name)
    }
}

/// Declaration of a broker host a transport should connect to.
///
/// Identity is the URI: configuring the same URI twice must reuse the
/// existing underlying connection rather than create a second one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportDefinition {
    /// Logical name message types refer to (e.g. `"memory"`, `"amqp-main"`).
    pub name: String,
    /// Broker URI; the idempotence key for host configuration.
    pub uri: String,
    /// Optional opaque credential string, interpreted by the transport.
    pub credentials: Option<String>,
}

impl TransportDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }
}
