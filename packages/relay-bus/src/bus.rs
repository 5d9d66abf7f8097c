//! Bus facade: builder, startup, and the transport-facing delivery sink.
//!
//! [`BusBuilder`] collects declarations (transports, message types, handlers,
//! extra pipeline tasks) without performing any I/O. [`BusBuilder::start`]
//! runs the startup pipeline once, freezes the pipeline context, and attaches
//! one subscription per consumed endpoint. After that the returned [`Bus`] is
//! cheap to clone and safe to share.

use std::collections::HashSet;
use std::sync::Arc;

use relay_core::{
    DeliverySink, FaultObserver, MessageIntent, MessageTransport, RawMessage, TransportDefinition,
};
use tracing::{debug, info};

use crate::config::BusConfig;
use crate::context::{outbound_message, MessageContext, MessageTypeDeclaration, PipelineContext};
use crate::error::BusError;
use crate::faults::CompositeFaultObserver;
use crate::handler::MessageHandler;
use crate::outbox::TransactionStore;
use crate::pipeline::{
    engine, inbound_stages, startup_stages, InboundTask, StageRegistry, StartupTask, TaskChain,
};
use crate::registry::RegisteredHandler;
use crate::tasks::{
    ConfigureTransportsTask, DecodeEnvelopeTask, DispatchOutboundTask, InvokeHandlersTask,
    MapHandlersTask, RegisterHandlersTask, RegisterMessageTypesTask, ValidateQueuesTask,
};

/// Declarative bus construction. No I/O happens until [`start`](Self::start).
pub struct BusBuilder {
    config: BusConfig,
    transports: Vec<(TransportDefinition, Arc<dyn MessageTransport>)>,
    types: Vec<MessageTypeDeclaration>,
    handlers: Vec<RegisteredHandler>,
    observers: Vec<Arc<dyn FaultObserver>>,
    transaction_store: Option<Arc<dyn TransactionStore>>,
    startup: StageRegistry<dyn StartupTask>,
    inbound: StageRegistry<dyn InboundTask>,
}

impl std::fmt::Debug for BusBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusBuilder").finish_non_exhaustive()
    }
}

impl BusBuilder {
    /// Creates a builder with the default stage layout and built-in tasks
    /// already attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: BusConfig::default(),
            transports: Vec::new(),
            types: Vec::new(),
            handlers: Vec::new(),
            observers: Vec::new(),
            transaction_store: None,
            startup: default_startup_registry(),
            inbound: default_inbound_registry(),
        }
    }

    /// Sets the endpoint name used as the subscription on every consumed
    /// queue.
    #[must_use]
    pub fn endpoint_name(mut self, name: impl Into<String>) -> Self {
        self.config.endpoint_name = name.into();
        self
    }

    /// Enables or disables transactional outbox tracking.
    #[must_use]
    pub fn transactions(mut self, enabled: bool) -> Self {
        self.config.transactions_enabled = enabled;
        self
    }

    /// Controls whether startup creates queues that do not exist yet.
    #[must_use]
    pub fn create_missing_queues(mut self, enabled: bool) -> Self {
        self.config.create_missing_queues = enabled;
        self
    }

    /// Declares a transport host. Declaring the same URI twice reuses the
    /// first handle.
    #[must_use]
    pub fn transport(
        mut self,
        definition: TransportDefinition,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        self.transports.push((definition, transport));
        self
    }

    /// Declares a message type routed over a named transport to a queue.
    #[must_use]
    pub fn message_type(
        mut self,
        full_name: impl Into<String>,
        transport_name: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> Self {
        self.types.push(MessageTypeDeclaration {
            full_name: full_name.into(),
            transport_name: transport_name.into(),
            queue_name: queue_name.into(),
        });
        self
    }

    /// Binds a handler to a message type. Duplicate `(type, name)` bindings
    /// are ignored at registration time.
    #[must_use]
    pub fn handler<F>(
        mut self,
        message_type: impl Into<String>,
        name: impl Into<String>,
        factory: F,
    ) -> Self
    where
        F: Fn() -> Box<dyn MessageHandler> + Send + Sync + 'static,
    {
        self.handlers
            .push(RegisteredHandler::new(message_type, name, factory));
        self
    }

    /// Registers a fault observer.
    #[must_use]
    pub fn on_fault(mut self, observer: Arc<dyn FaultObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replaces the in-memory transaction store with a custom one.
    #[must_use]
    pub fn transaction_store(mut self, store: Arc<dyn TransactionStore>) -> Self {
        self.transaction_store = Some(store);
        self
    }

    /// Attaches a custom task to a startup stage.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownStage`] if the stage does not exist.
    pub fn startup_task<F>(
        mut self,
        stage: &str,
        name: impl Into<String>,
        factory: F,
    ) -> Result<Self, BusError>
    where
        F: Fn() -> Box<dyn StartupTask> + Send + Sync + 'static,
    {
        self.startup.add_task(stage, name, factory)?;
        Ok(self)
    }

    /// Attaches a custom task to an inbound-message stage.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownStage`] if the stage does not exist.
    pub fn inbound_task<F>(
        mut self,
        stage: &str,
        name: impl Into<String>,
        factory: F,
    ) -> Result<Self, BusError>
    where
        F: Fn() -> Box<dyn InboundTask> + Send + Sync + 'static,
    {
        self.inbound.add_task(stage, name, factory)?;
        Ok(self)
    }

    /// Runs the startup pipeline, freezes the pipeline context, and attaches
    /// subscriptions for every consumed endpoint.
    ///
    /// # Errors
    ///
    /// Any startup-task or subscription failure is fatal; no partially
    /// started bus is returned.
    pub async fn start(self) -> Result<Bus, BusError> {
        let mut ctx = PipelineContext::new(self.config);
        ctx.declared_transports = self.transports;
        ctx.declared_types = self.types;
        ctx.declared_handlers = self.handlers;
        if let Some(store) = self.transaction_store {
            ctx.set_transaction_store(store);
        }
        ctx.set_fault_observers(CompositeFaultObserver::new(self.observers));

        let startup_chain = self.startup.build_chain();
        engine::run_startup(&startup_chain, &mut ctx).await?;

        // Freeze: nothing mutates the pipeline context past this point.
        let shared = Arc::new(ctx);
        let chain = Arc::new(self.inbound.build_chain());

        let sink: Arc<dyn DeliverySink> = Arc::new(BusSink {
            shared: Arc::clone(&shared),
            chain: Arc::clone(&chain),
        });
        let faults: Arc<dyn FaultObserver> = shared.faults.clone();

        let mut seen = HashSet::new();
        for registered in shared.message_types.iter() {
            if !seen.insert(registered.endpoint.to_string()) {
                continue;
            }
            let transport = shared.transports.get(&registered.transport_name)?;
            transport
                .subscribe(
                    &registered.endpoint,
                    &shared.config.endpoint_name,
                    Arc::clone(&sink),
                    Arc::clone(&faults),
                )
                .await?;
            debug!(
                endpoint = %registered.endpoint,
                subscription = %shared.config.endpoint_name,
                "subscription attached"
            );
        }

        info!(
            endpoint = %shared.config.endpoint_name,
            message_types = shared.message_types.len(),
            handlers = shared.handlers.len(),
            "bus started"
        );
        Ok(Bus { shared, chain })
    }
}

impl Default for BusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_startup_registry() -> StageRegistry<dyn StartupTask> {
    let mut reg: StageRegistry<dyn StartupTask> = StageRegistry::new("startup");
    // Fresh registry with a fixed stage set; registration cannot collide.
    let wired = (|| -> Result<(), BusError> {
        reg.add_stage(startup_stages::INITIALIZE)?;
        reg.add_task(startup_stages::INITIALIZE, "ConfigureTransports", || {
            Box::new(ConfigureTransportsTask)
        })?;
        reg.add_task(startup_stages::INITIALIZE, "RegisterMessageTypes", || {
            Box::new(RegisterMessageTypesTask)
        })?;
        reg.add_task(startup_stages::INITIALIZE, "RegisterHandlers", || {
            Box::new(RegisterHandlersTask)
        })?;
        reg.add_task(startup_stages::INITIALIZE, "ValidateQueues", || {
            Box::new(ValidateQueuesTask)
        })?;
        Ok(())
    })();
    debug_assert!(wired.is_ok());
    reg
}

fn default_inbound_registry() -> StageRegistry<dyn InboundTask> {
    let mut reg: StageRegistry<dyn InboundTask> = StageRegistry::new("inbound-message");
    let wired = (|| -> Result<(), BusError> {
        reg.add_stage(inbound_stages::AUTHENTICATION)?;
        reg.add_stage(inbound_stages::AUTHORIZE)?;
        reg.add_stage(inbound_stages::DESERIALIZE)?;
        reg.add_stage(inbound_stages::MAP_HANDLER)?;
        reg.add_stage(inbound_stages::EXECUTE_HANDLER)?;
        reg.add_stage(inbound_stages::POST_HANDLER_EXECUTION)?;
        reg.add_task(inbound_stages::DESERIALIZE, "DecodeEnvelope", || {
            Box::new(DecodeEnvelopeTask)
        })?;
        reg.add_task(inbound_stages::MAP_HANDLER, "MapHandlers", || {
            Box::new(MapHandlersTask)
        })?;
        // Sits after handler mapping but flushes only after everything
        // downstream (handler execution included) succeeded.
        reg.add_task(inbound_stages::MAP_HANDLER, "DispatchOutbound", || {
            Box::new(DispatchOutboundTask)
        })?;
        reg.add_task(inbound_stages::EXECUTE_HANDLER, "InvokeHandlers", || {
            Box::new(InvokeHandlersTask)
        })?;
        Ok(())
    })();
    debug_assert!(wired.is_ok());
    reg
}

/// A started bus endpoint. Clone-cheap handle over the frozen pipeline
/// context and the inbound chain.
#[derive(Clone)]
pub struct Bus {
    shared: Arc<PipelineContext>,
    chain: Arc<TaskChain<dyn InboundTask>>,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus").finish_non_exhaustive()
    }
}

impl Bus {
    /// Starts declarative construction of a bus endpoint.
    #[must_use]
    pub fn builder() -> BusBuilder {
        BusBuilder::new()
    }

    /// The frozen pipeline context.
    #[must_use]
    pub fn context(&self) -> &PipelineContext {
        &self.shared
    }

    /// Sends a point-to-point message from outside any handler. Dispatches
    /// immediately; the outbox only covers handler-emitted messages.
    ///
    /// # Errors
    ///
    /// Fails when the type has no registered route or the transport rejects
    /// the message. Returns the new message id on success.
    pub async fn send(
        &self,
        message_type: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<String, BusError> {
        self.dispatch(MessageIntent::Send, message_type, content_type, body)
            .await
    }

    /// Publishes a broadcast message from outside any handler.
    ///
    /// # Errors
    ///
    /// Fails when the type has no registered route or the transport rejects
    /// the message. Returns the new message id on success.
    pub async fn publish(
        &self,
        message_type: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<String, BusError> {
        self.dispatch(MessageIntent::Publish, message_type, content_type, body)
            .await
    }

    async fn dispatch(
        &self,
        intent: MessageIntent,
        message_type: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<String, BusError> {
        let registered = self.shared.message_types.resolve(message_type)?;
        let transport = self.shared.transports.get(&registered.transport_name)?;
        let message = outbound_message(intent, message_type, content_type, body, None);
        let message_id = message.message_id.clone();

        let result = match intent {
            MessageIntent::Publish => transport.publish(&registered.endpoint, message).await,
            MessageIntent::Send | MessageIntent::Reply => {
                transport.send(&registered.endpoint, message).await
            }
        };
        result.map_err(|source| BusError::Dispatch {
            message_id: message_id.clone(),
            source,
        })?;
        debug!(message_id = %message_id, intent = %intent, message_type, "dispatched");
        Ok(message_id)
    }
}

/// The delivery sink the bus hands to every subscription: one fresh
/// [`MessageContext`] and one inbound chain run per delivered message.
struct BusSink {
    shared: Arc<PipelineContext>,
    chain: Arc<TaskChain<dyn InboundTask>>,
}

#[async_trait::async_trait]
impl DeliverySink for BusSink {
    async fn deliver(&self, subscription: &str, message: RawMessage) -> anyhow::Result<()> {
        let mut ctx = MessageContext::new(Arc::clone(&self.shared), subscription, message);
        engine::run_inbound(&self.chain, &mut ctx).await?;
        Ok(())
    }
}
