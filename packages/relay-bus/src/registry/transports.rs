//! Transport registry: logical name to transport handle.
//!
//! The registry performs no I/O; it only tracks identity. Idempotence is
//! keyed by transport URI so configuring the same host twice never yields a
//! second underlying handle.

use std::collections::HashMap;
use std::sync::Arc;

use relay_core::{MessageTransport, TransportDefinition};
use tracing::debug;

use crate::error::BusError;

#[derive(Default)]
pub struct TransportRegistry {
    by_name: HashMap<String, Arc<dyn MessageTransport>>,
    /// URI -> name of the first registration for that host.
    by_uri: HashMap<String, String>,
}

impl TransportRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transport handle for a definition.
    ///
    /// If the URI was already configured, the existing handle is reused and
    /// the new name becomes an alias for it; `transport` is dropped. Returns
    /// `true` when the URI was new (the caller should then perform host
    /// configuration I/O exactly once).
    pub fn configure(
        &mut self,
        definition: &TransportDefinition,
        transport: Arc<dyn MessageTransport>,
    ) -> bool {
        if let Some(existing_name) = self.by_uri.get(&definition.uri) {
            debug!(
                uri = %definition.uri,
                existing = %existing_name,
                alias = %definition.name,
                "transport host already configured, reusing handle"
            );
            let existing = Arc::clone(&self.by_name[existing_name]);
            self.by_name.insert(definition.name.clone(), existing);
            return false;
        }
        self.by_uri
            .insert(definition.uri.clone(), definition.name.clone());
        self.by_name.insert(definition.name.clone(), transport);
        true
    }

    /// Looks up a transport handle by logical name.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownTransport`] if the name was never
    /// configured.
    pub fn get(&self, name: &str) -> Result<&Arc<dyn MessageTransport>, BusError> {
        self.by_name.get(name).ok_or_else(|| BusError::UnknownTransport {
            name: name.to_string(),
        })
    }

    /// Number of distinct underlying handles (one per configured URI).
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.by_uri.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
