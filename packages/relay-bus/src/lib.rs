//! In-process service-bus runtime.
//!
//! Messages flow through two ordered pipelines of continuation-passing tasks:
//! a startup pipeline that configures transports, routes, and handlers, and
//! an inbound-message pipeline that decodes, maps, and executes handlers per
//! delivery. Messages handlers emit are buffered in a transactional outbox
//! and dispatched only after the whole inbound chain succeeded.
//!
//! Construction goes through [`BusBuilder`]; see [`transport::MemoryTransport`]
//! for an in-process broker suitable for tests.

pub mod bus;
pub mod config;
pub mod context;
pub mod error;
pub mod faults;
pub mod handler;
pub mod outbox;
pub mod pipeline;
pub mod registry;
pub mod tasks;
pub mod transport;

pub use bus::{Bus, BusBuilder};
pub use config::BusConfig;
pub use context::{MessageContext, PipelineContext};
pub use error::BusError;
pub use faults::CompositeFaultObserver;
pub use handler::MessageHandler;
pub use outbox::{InMemoryTransactionStore, OutboxEntry, TransactionStore};
pub use pipeline::{inbound_stages, startup_stages, InboundNext, InboundTask, StartupNext, StartupTask};
pub use registry::RegisteredHandler;
pub use transport::MemoryTransport;
