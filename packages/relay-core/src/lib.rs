//! Relay core: message model, metadata conventions, and transport contracts.

pub mod endpoint;
pub mod message;
pub mod metadata;
pub mod transport;

pub use endpoint::{QueueEndpoint, TransportDefinition};
pub use message::{MetadataMap, RawMessage};
pub use metadata::{keys, MessageIntent, UnknownIntent};
pub use transport::{
    DeliverySink, Fault, FaultObserver, FaultSource, MessageTransport, TransportError,
};
