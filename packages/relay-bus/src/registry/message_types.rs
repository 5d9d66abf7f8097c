//! Message-type registry: full type name to transport route.

use std::collections::HashMap;

use relay_core::QueueEndpoint;

use crate::error::BusError;

/// A message type the bus knows how to route.
///
/// Created during startup; immutable afterward.
#[derive(Debug, Clone)]
pub struct RegisteredMessageType {
    /// Unique full name (e.g. `"orders.OrderCreated"`).
    pub full_name: String,
    /// Name of the transport that owns the endpoint.
    pub transport_name: String,
    /// Destination queue for messages of this type.
    pub endpoint: QueueEndpoint,
}

/// Keyed collection of registered message types.
///
/// Written only by the startup pipeline; steady-state reads are lock-free
/// because nothing mutates after the pipeline context is frozen.
#[derive(Default)]
pub struct MessageTypeRegistry {
    types: HashMap<String, RegisteredMessageType>,
}

impl MessageTypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a message type.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DuplicateMessageType`] if the full name is already
    /// registered.
    pub fn register(&mut self, message_type: RegisteredMessageType) -> Result<(), BusError> {
        if self.types.contains_key(&message_type.full_name) {
            return Err(BusError::DuplicateMessageType {
                name: message_type.full_name,
            });
        }
        self.types
            .insert(message_type.full_name.clone(), message_type);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, full_name: &str) -> Option<&RegisteredMessageType> {
        self.types.get(full_name)
    }

    /// Like [`get`](Self::get) but failing with the bus taxonomy.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownMessageType`] when the name is unknown.
    pub fn resolve(&self, full_name: &str) -> Result<&RegisteredMessageType, BusError> {
        self.get(full_name).ok_or_else(|| BusError::UnknownMessageType {
            name: full_name.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredMessageType> {
        self.types.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_created() -> RegisteredMessageType {
        RegisteredMessageType {
            full_name: "orders.OrderCreated".to_string(),
            transport_name: "memory".to_string(),
            endpoint: QueueEndpoint::new("mem://local", "orders"),
        }
    }

    #[test]
    fn register_and_resolve() {
        let mut reg = MessageTypeRegistry::new();
        reg.register(order_created()).unwrap();

        let found = reg.resolve("orders.OrderCreated").unwrap();
        assert_eq!(found.transport_name, "memory");
        assert_eq!(found.endpoint.name, "orders");
    }

    #[test]
    fn resolve_is_repeatable() {
        let mut reg = MessageTypeRegistry::new();
        reg.register(order_created()).unwrap();

        for _ in 0..3 {
            assert!(reg.resolve("orders.OrderCreated").is_ok());
        }
    }

    #[test]
    fn duplicate_full_name_is_rejected() {
        let mut reg = MessageTypeRegistry::new();
        reg.register(order_created()).unwrap();
        let err = reg.register(order_created()).unwrap_err();
        assert!(matches!(
            err,
            BusError::DuplicateMessageType { name } if name == "orders.OrderCreated"
        ));
    }

    #[test]
    fn unknown_type_resolves_to_error() {
        let reg = MessageTypeRegistry::new();
        let err = reg.resolve("ghost.Type").unwrap_err();
        assert!(matches!(err, BusError::UnknownMessageType { name } if name == "ghost.Type"));
    }
}
