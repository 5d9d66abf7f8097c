//! Startup-populated registries: message types, handlers, transports.
//!
//! All three follow the same lifecycle: written by startup tasks while the
//! pipeline context is still exclusively owned, read-only once the context is
//! frozen behind an `Arc`. That split is what makes steady-state lookups
//! lock-free.

pub mod handlers;
pub mod message_types;
pub mod transports;

pub use handlers::{HandlerRegistry, RegisteredHandler};
pub use message_types::{MessageTypeRegistry, RegisteredMessageType};
pub use transports::TransportRegistry;
