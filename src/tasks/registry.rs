use super::{
    CleanupHandler, EnvSetupHandler, JobSubmissionHandler, MonitorHandler, StagingHandler,
    TaskHandler,
};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::TaskType;
use std::collections::HashMap;
use std::sync::Arc;

/// Handlers keyed by task type
///
/// [`TaskRegistry::with_defaults`] covers every task type; embedders can
/// swap in their own handler for a type with [`TaskRegistry::register`].
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("TaskRegistry").field("types", &types).finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EnvSetupHandler));
        registry.register(Arc::new(StagingHandler::input()));
        registry.register(Arc::new(JobSubmissionHandler));
        registry.register(Arc::new(MonitorHandler));
        registry.register(Arc::new(StagingHandler::output()));
        registry.register(Arc::new(StagingHandler::intermediate()));
        registry.register(Arc::new(CleanupHandler));
        registry
    }

    /// Register a handler under its own task type, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        let task_type = handler.task_type();
        if self.handlers.insert(task_type, handler).is_some() {
            tracing::debug!(task_type = %task_type, "Replaced task handler");
        }
    }

    pub fn handler(&self, task_type: TaskType) -> OrchestratorResult<Arc<dyn TaskHandler>> {
        self.handlers.get(&task_type).cloned().ok_or_else(|| {
            OrchestratorError::invariant(format!("no handler registered for {task_type}"))
        })
    }

    pub fn task_types(&self) -> Vec<TaskType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_task_type() {
        let registry = TaskRegistry::with_defaults();
        assert_eq!(registry.task_types(), TaskType::all().to_vec());
        for task_type in TaskType::all() {
            assert_eq!(registry.handler(task_type).unwrap().task_type(), task_type);
        }
    }

    #[test]
    fn test_missing_handler_is_an_invariant_error() {
        let registry = TaskRegistry::new();
        assert!(matches!(
            registry.handler(TaskType::Monitor),
            Err(OrchestratorError::OrchestratorInvariant(_))
        ));
    }
}
