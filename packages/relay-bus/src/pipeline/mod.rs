//! Two-pipeline execution model.
//!
//! The bus runs a startup pipeline once, then an inbound-message pipeline per
//! delivery. Both share the same machinery: named stages holding tasks in
//! registration order, flattened into a chain that executes via
//! continuation-passing.

pub mod engine;
pub mod stages;
pub mod task;

pub use stages::{StageRegistry, TaskChain, TaskDescriptor, TaskFactory};
pub use task::{InboundNext, InboundTask, StartupNext, StartupTask};

/// Stage names of the startup pipeline, in execution order.
pub mod startup_stages {
    pub const INITIALIZE: &str = "Initialize";
}

/// Stage names of the inbound-message pipeline, in execution order.
pub mod inbound_stages {
    pub const AUTHENTICATION: &str = "Authentication";
    pub const AUTHORIZE: &str = "Authorize";
    pub const DESERIALIZE: &str = "Deserialize";
    pub const MAP_HANDLER: &str = "MapHandler";
    pub const EXECUTE_HANDLER: &str = "ExecuteHandler";
    pub const POST_HANDLER_EXECUTION: &str = "PostHandlerExecution";
}
