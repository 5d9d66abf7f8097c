//! Task traits and the single-use continuation.
//!
//! A task is invoked with its context and a [`StartupNext`]/[`InboundNext`]
//! continuation. Calling `run` proceeds to the rest of the chain; dropping
//! the continuation without calling it short-circuits every downstream task.
//! Because the continuation is consumed by value it can be called at most
//! once, and a task may do work both before and after it; the dispatch task
//! uses the after side to wrap handler execution.

use async_trait::async_trait;

use crate::context::{MessageContext, PipelineContext};
use crate::error::BusError;
use crate::pipeline::stages::TaskDescriptor;

/// A task on the startup pipeline. Runs exactly once, sequentially, against
/// the still-mutable pipeline context.
#[async_trait]
pub trait StartupTask: Send + Sync {
    async fn invoke(
        &self,
        ctx: &mut PipelineContext,
        next: StartupNext<'_>,
    ) -> Result<(), BusError>;
}

/// A task on the inbound-message pipeline. A fresh instance is resolved per
/// delivery, so implementations may keep per-call mutable state in fields.
#[async_trait]
pub trait InboundTask: Send + Sync {
    async fn invoke(&self, ctx: &mut MessageContext, next: InboundNext<'_>)
        -> Result<(), BusError>;
}

/// Continuation over the remaining startup chain.
pub struct StartupNext<'a> {
    chain: &'a [TaskDescriptor<dyn StartupTask>],
}

impl<'a> StartupNext<'a> {
    #[must_use]
    pub(crate) fn new(chain: &'a [TaskDescriptor<dyn StartupTask>]) -> Self {
        Self { chain }
    }

    /// Runs the rest of the chain, resolving a fresh instance per position.
    ///
    /// # Errors
    ///
    /// Propagates the first error a downstream task raises.
    pub async fn run(self, ctx: &mut PipelineContext) -> Result<(), BusError> {
        if let Some((head, rest)) = self.chain.split_first() {
            let task = head.instantiate();
            task.invoke(ctx, StartupNext { chain: rest }).await?;
        }
        Ok(())
    }
}

/// Continuation over the remaining inbound chain.
pub struct InboundNext<'a> {
    chain: &'a [TaskDescriptor<dyn InboundTask>],
}

impl<'a> InboundNext<'a> {
    #[must_use]
    pub(crate) fn new(chain: &'a [TaskDescriptor<dyn InboundTask>]) -> Self {
        Self { chain }
    }

    /// Runs the rest of the chain, resolving a fresh instance per position.
    ///
    /// # Errors
    ///
    /// Propagates the first error a downstream task raises.
    pub async fn run(self, ctx: &mut MessageContext) -> Result<(), BusError> {
        if let Some((head, rest)) = self.chain.split_first() {
            let task = head.instantiate();
            task.invoke(ctx, InboundNext { chain: rest }).await?;
        }
        Ok(())
    }
}
