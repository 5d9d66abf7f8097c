//! Chain execution.
//!
//! The engine drives continuation-passing invocation of a flattened task
//! chain: one task at a time, a fresh instance per position, no implicit
//! retry. It is synchronous per invocation; concurrency across different
//! inbound messages belongs to the transports driving it.

use relay_core::{Fault, FaultObserver, FaultSource};
use tracing::debug;

use crate::context::{MessageContext, PipelineContext};
use crate::error::BusError;
use crate::pipeline::stages::TaskChain;
use crate::pipeline::task::{InboundNext, InboundTask, StartupNext, StartupTask};

/// Runs the startup chain once against the still-mutable context.
///
/// # Errors
///
/// A startup fault is fatal: the first task error aborts the run and must
/// abort bus startup.
pub async fn run_startup(
    chain: &TaskChain<dyn StartupTask>,
    ctx: &mut PipelineContext,
) -> Result<(), BusError> {
    debug!(tasks = ?chain.task_names(), "running startup pipeline");
    StartupNext::new(chain.tasks()).run(ctx).await
}

/// Runs one inbound chain against a freshly constructed message context.
///
/// # Errors
///
/// A task error propagates to the caller (the transport boundary applies
/// negative acknowledgement) and is additionally raised as a fault event to
/// the registered observers, so faults are never swallowed. Outbound dispatch
/// failures are tagged [`FaultSource::Dispatch`]; everything else is a
/// [`FaultSource::Pipeline`] fault.
pub async fn run_inbound(
    chain: &TaskChain<dyn InboundTask>,
    ctx: &mut MessageContext,
) -> Result<(), BusError> {
    let result = InboundNext::new(chain.tasks()).run(ctx).await;
    if let Err(err) = &result {
        let source = match err {
            BusError::Dispatch { .. } => FaultSource::Dispatch,
            _ => FaultSource::Pipeline,
        };
        ctx.pipeline().faults.on_fault(&Fault::new(
            source,
            ctx.raw().message_id.clone(),
            err.to_string(),
        ));
    }
    result
}
