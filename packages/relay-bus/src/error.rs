//! Error taxonomy for the bus runtime.

use relay_core::TransportError;

/// Errors raised by pipeline configuration, chain execution, and outbound
/// dispatch.
///
/// Configuration-time variants (`DuplicateStage`, `UnknownStage`,
/// `UnknownTransport`, `DuplicateMessageType`, `QueueMissing`) are fatal to
/// startup. Per-message variants propagate out of the inbound chain to the
/// transport boundary, where the delivery is abandoned.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("duplicate stage '{stage}' in {pipeline} pipeline")]
    DuplicateStage {
        pipeline: &'static str,
        stage: String,
    },

    #[error("no stage named '{stage}' in {pipeline} pipeline")]
    UnknownStage {
        pipeline: &'static str,
        stage: String,
    },

    #[error("no transport configured with name '{name}'")]
    UnknownTransport { name: String },

    #[error("message type '{name}' is not registered")]
    UnknownMessageType { name: String },

    #[error("message type '{name}' is already registered")]
    DuplicateMessageType { name: String },

    #[error("inbound message {message_id} is missing metadata key '{key}'")]
    MissingMetadata { message_id: String, key: String },

    #[error("inbound message {message_id} carries an invalid intent")]
    InvalidIntent {
        message_id: String,
        #[source]
        source: relay_core::UnknownIntent,
    },

    #[error("handler '{handler}' faulted while processing message {message_id}")]
    Handler {
        handler: String,
        message_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to dispatch outbound message {message_id}")]
    Dispatch {
        message_id: String,
        #[source]
        source: TransportError,
    },

    #[error("queue '{endpoint}' does not exist on transport '{transport}'")]
    QueueMissing { transport: String, endpoint: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}
