//! Handler registry: message type to ordered handler set.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::handler::{HandlerFactory, MessageHandler};

/// A handler binding produced by discovery (explicit builder registration).
#[derive(Clone)]
pub struct RegisteredHandler {
    /// Full name of the message type this handler consumes.
    pub message_type: String,
    /// Unique name of the handler implementation.
    pub name: String,
    factory: HandlerFactory,
}

impl RegisteredHandler {
    #[must_use]
    pub fn new<F>(message_type: impl Into<String>, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn MessageHandler> + Send + Sync + 'static,
    {
        Self {
            message_type: message_type.into(),
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Resolves a fresh handler instance.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn MessageHandler> {
        (self.factory)()
    }
}

impl std::fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("message_type", &self.message_type)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Message-type keyed handler collection.
///
/// Invocation order across handlers for one type is registration order.
/// Registration is idempotent per `(message type, handler name)` pair:
/// duplicates are silently ignored.
#[derive(Default)]
pub struct HandlerRegistry {
    by_type: HashMap<String, Vec<RegisteredHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler binding. Returns `true` if the binding was new.
    pub fn register(&mut self, handler: RegisteredHandler) -> bool {
        let slot = self.by_type.entry(handler.message_type.clone()).or_default();
        if slot.iter().any(|h| h.name == handler.name) {
            debug!(
                message_type = %handler.message_type,
                handler = %handler.name,
                "ignoring duplicate handler registration"
            );
            return false;
        }
        slot.push(handler);
        true
    }

    /// All handlers bound to `message_type_name`, in registration order.
    /// An empty result is not an error.
    #[must_use]
    pub fn resolve(&self, message_type_name: &str) -> &[RegisteredHandler] {
        self.by_type
            .get(message_type_name)
            .map_or(&[], Vec::as_slice)
    }

    /// Total number of registered bindings across all types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
