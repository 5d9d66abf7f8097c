//! Stage registry and task chain builder.
//!
//! Stages are named ordered slots declared once per pipeline kind; tasks
//! attach to a stage in registration order. [`StageRegistry::build_chain`]
//! flattens everything into one linear [`TaskChain`] whose order is
//! (stage declaration order, then task registration order within a stage).
//! The registry is generic over the task trait so the startup and
//! inbound-message pipelines share one implementation.

use std::sync::Arc;

use crate::error::BusError;

/// Factory producing a fresh boxed task instance per chain invocation.
pub type TaskFactory<T> = Arc<dyn Fn() -> Box<T> + Send + Sync>;

/// A named task bound to a stage.
///
/// Only the factory is stored; instances are created per invocation by the
/// execution engine so concurrent chain runs never share task state.
pub struct TaskDescriptor<T: ?Sized> {
    name: String,
    stage: String,
    factory: TaskFactory<T>,
}

impl<T: ?Sized> TaskDescriptor<T> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Resolves a fresh instance. Never caches.
    #[must_use]
    pub fn instantiate(&self) -> Box<T> {
        (self.factory)()
    }
}

impl<T: ?Sized> Clone for TaskDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            stage: self.stage.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

struct Stage<T: ?Sized> {
    name: String,
    tasks: Vec<TaskDescriptor<T>>,
}

/// Ordered stages of one pipeline kind and the tasks attached to them.
pub struct StageRegistry<T: ?Sized> {
    pipeline: &'static str,
    stages: Vec<Stage<T>>,
}

impl<T: ?Sized> StageRegistry<T> {
    /// Creates an empty registry. `pipeline` names the pipeline kind in
    /// error messages (e.g. `"startup"`, `"inbound-message"`).
    #[must_use]
    pub fn new(pipeline: &'static str) -> Self {
        Self {
            pipeline,
            stages: Vec::new(),
        }
    }

    /// Declares a stage. Stage order is declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DuplicateStage`] if the name already exists for
    /// this pipeline.
    pub fn add_stage(&mut self, name: impl Into<String>) -> Result<(), BusError> {
        let name = name.into();
        if self.stages.iter().any(|s| s.name == name) {
            return Err(BusError::DuplicateStage {
                pipeline: self.pipeline,
                stage: name,
            });
        }
        self.stages.push(Stage {
            name,
            tasks: Vec::new(),
        });
        Ok(())
    }

    /// Attaches a task to a declared stage.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownStage`] if the stage was never declared.
    pub fn add_task<F>(
        &mut self,
        stage: &str,
        name: impl Into<String>,
        factory: F,
    ) -> Result<(), BusError>
    where
        F: Fn() -> Box<T> + Send + Sync + 'static,
    {
        let Some(slot) = self.stages.iter_mut().find(|s| s.name == stage) else {
            return Err(BusError::UnknownStage {
                pipeline: self.pipeline,
                stage: stage.to_string(),
            });
        };
        slot.tasks.push(TaskDescriptor {
            name: name.into(),
            stage: stage.to_string(),
            factory: Arc::new(factory),
        });
        Ok(())
    }

    /// Flattens all stages into one ordered chain.
    ///
    /// Deterministic and side-effect-free: repeated calls over the same
    /// registrations yield the same order. Empty stages contribute nothing.
    #[must_use]
    pub fn build_chain(&self) -> TaskChain<T> {
        let tasks = self
            .stages
            .iter()
            .flat_map(|s| s.tasks.iter().cloned())
            .collect();
        TaskChain {
            pipeline: self.pipeline,
            tasks,
        }
    }
}

/// The flattened, immutable, ordered task sequence of one pipeline kind.
pub struct TaskChain<T: ?Sized> {
    pipeline: &'static str,
    tasks: Vec<TaskDescriptor<T>>,
}

impl<T: ?Sized> TaskChain<T> {
    #[must_use]
    pub fn pipeline(&self) -> &'static str {
        self.pipeline
    }

    #[must_use]
    pub fn tasks(&self) -> &[TaskDescriptor<T>] {
        &self.tasks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task names in execution order. Intended for tests and startup logging.
    #[must_use]
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(TaskDescriptor::name).collect()
    }
}
