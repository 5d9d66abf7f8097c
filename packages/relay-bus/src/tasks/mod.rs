//! Built-in pipeline tasks wired by the bus builder.

pub mod inbound;
pub mod startup;

pub use inbound::{DecodeEnvelopeTask, DispatchOutboundTask, InvokeHandlersTask, MapHandlersTask};
pub use startup::{
    ConfigureTransportsTask, RegisterHandlersTask, RegisterMessageTypesTask, ValidateQueuesTask,
};
