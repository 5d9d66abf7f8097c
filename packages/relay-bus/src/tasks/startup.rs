//! Built-in startup tasks.
//!
//! These run on the `Initialize` stage in registration order: configure
//! transports, register message-type routes, register handlers, validate
//! queues. Each consumes the discovery output the builder stashed on the
//! pipeline context and populates the corresponding registry.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::context::{endpoint_for, PipelineContext};
use crate::error::BusError;
use crate::pipeline::{StartupNext, StartupTask};
use crate::registry::RegisteredMessageType;

/// Registers every declared transport and performs host configuration I/O
/// once per distinct URI.
pub struct ConfigureTransportsTask;

#[async_trait]
impl StartupTask for ConfigureTransportsTask {
    async fn invoke(
        &self,
        ctx: &mut PipelineContext,
        next: StartupNext<'_>,
    ) -> Result<(), BusError> {
        let declared = ctx.declared_transports.clone();
        for (definition, transport) in &declared {
            if ctx.transports.configure(definition, transport.clone()) {
                transport.configure_host(definition).await?;
                info!(name = %definition.name, uri = %definition.uri, "configured transport host");
            }
        }
        next.run(ctx).await
    }
}

/// Resolves each declared message type against its transport definition and
/// registers the route.
pub struct RegisterMessageTypesTask;

#[async_trait]
impl StartupTask for RegisterMessageTypesTask {
    async fn invoke(
        &self,
        ctx: &mut PipelineContext,
        next: StartupNext<'_>,
    ) -> Result<(), BusError> {
        let declared = std::mem::take(&mut ctx.declared_types);
        for decl in declared {
            let definition = ctx
                .declared_transports
                .iter()
                .map(|(definition, _)| definition)
                .find(|definition| definition.name == decl.transport_name)
                .ok_or_else(|| BusError::UnknownTransport {
                    name: decl.transport_name.clone(),
                })?;
            let endpoint = endpoint_for(definition, &decl.queue_name);
            debug!(message_type = %decl.full_name, endpoint = %endpoint, "registering route");
            ctx.message_types.register(RegisteredMessageType {
                full_name: decl.full_name,
                transport_name: decl.transport_name,
                endpoint,
            })?;
        }
        next.run(ctx).await
    }
}

/// Moves discovered handler bindings into the handler registry.
pub struct RegisterHandlersTask;

#[async_trait]
impl StartupTask for RegisterHandlersTask {
    async fn invoke(
        &self,
        ctx: &mut PipelineContext,
        next: StartupNext<'_>,
    ) -> Result<(), BusError> {
        let declared = std::mem::take(&mut ctx.declared_handlers);
        for handler in declared {
            let (message_type, name) = (handler.message_type.clone(), handler.name.clone());
            if ctx.handlers.register(handler) {
                info!(message_type = %message_type, handler = %name, "registered handler");
            }
        }
        next.run(ctx).await
    }
}

/// Checks that every registered route's queue exists, creating missing queues
/// when the host configuration allows it.
pub struct ValidateQueuesTask;

#[async_trait]
impl StartupTask for ValidateQueuesTask {
    async fn invoke(
        &self,
        ctx: &mut PipelineContext,
        next: StartupNext<'_>,
    ) -> Result<(), BusError> {
        for registered in ctx.message_types.iter() {
            let transport = ctx.transports.get(&registered.transport_name)?;
            if transport.queue_exists(&registered.endpoint).await? {
                continue;
            }
            if !ctx.config.create_missing_queues {
                return Err(BusError::QueueMissing {
                    transport: registered.transport_name.clone(),
                    endpoint: registered.endpoint.to_string(),
                });
            }
            transport.create_queue(&registered.endpoint).await?;
            info!(endpoint = %registered.endpoint, "created missing queue");
        }
        next.run(ctx).await
    }
}
