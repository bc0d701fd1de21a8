//! # Task handlers
//!
//! One handler per [`TaskType`], looked up through the [`TaskRegistry`].
//! Every handler implements the same contract:
//!
//! - `execute` runs on the first attempt of a task.
//! - `recover` runs on every later attempt, after a failure or a restart. It
//!   must inspect the remote side before redoing anything with side effects.
//! - `cancel` asks the remote side to stop whatever the task started and is
//!   a no-op when there is nothing to stop.
//!
//! Handlers report success as `Ok(())`; the worker turns the result into the
//! terminal [`TaskStatus`](crate::models::TaskStatus) of the attempt.

pub mod cleanup;
pub mod env_setup;
pub mod job_submission;
pub mod monitor;
pub mod registry;
pub mod staging;

use crate::adaptors::ExecutionAdaptor;
use crate::catalog::{Credential, ProcessCatalog};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::StatusPublisher;
use crate::models::{JobRecord, ProcessSpec, TaskSpec, TaskType};
use crate::parsing::{parser_for, OutputParser};
use crate::scheduler::SchedulerCommands;
use crate::state_machine::TaskState;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use cleanup::CleanupHandler;
pub use env_setup::EnvSetupHandler;
pub use job_submission::JobSubmissionHandler;
pub use monitor::MonitorHandler;
pub use registry::TaskRegistry;
pub use staging::StagingHandler;

/// Everything a handler needs for one attempt of one task
#[derive(Clone)]
pub struct TaskContext {
    pub process: ProcessSpec,
    pub task: TaskSpec,
    pub attempt: u32,
    pub credential: Credential,
    pub adaptor: Arc<dyn ExecutionAdaptor>,
    pub catalog: Arc<dyn ProcessCatalog>,
    pub publisher: StatusPublisher,
    pub config: Arc<OrchestratorConfig>,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("process_id", &self.process.process_id)
            .field("task_id", &self.task.task_id)
            .field("attempt", &self.attempt)
            .field("resource_id", &self.adaptor.resource_id())
            .finish()
    }
}

impl TaskContext {
    pub fn commands(&self) -> SchedulerCommands {
        SchedulerCommands::new(self.process.resource_manager())
    }

    pub fn parser(&self) -> &'static dyn OutputParser {
        parser_for(self.process.resource_manager())
    }

    pub fn command_timeout(&self) -> Duration {
        self.config.execution.command_timeout()
    }

    /// Persist a job record and tell observers about it
    pub async fn save_job(&self, job: &JobRecord) -> OrchestratorResult<()> {
        self.catalog.save_job_record(job).await?;
        self.publisher.publish_job_status(job.clone());
        Ok(())
    }

    /// Required task parameter
    pub fn parameter(&self, key: &str) -> OrchestratorResult<&str> {
        self.task.parameter(key).ok_or_else(|| {
            OrchestratorError::invariant(format!(
                "task {} is missing parameter {key}",
                self.task.task_id
            ))
        })
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn task_type(&self) -> TaskType;

    async fn execute(&self, ctx: &TaskContext) -> OrchestratorResult<()>;

    /// Re-attempt after a failure or restart; handlers without remote side
    /// effects simply run again
    async fn recover(&self, ctx: &TaskContext) -> OrchestratorResult<()> {
        self.execute(ctx).await
    }

    async fn cancel(&self, _ctx: &TaskContext) -> OrchestratorResult<()> {
        Ok(())
    }

    /// Upper bound on one attempt
    fn deadline(&self, _process: &ProcessSpec, config: &OrchestratorConfig) -> Duration {
        config.execution.task_timeout()
    }
}

/// How an attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed,
    Failed {
        retryable: bool,
        error: OrchestratorError,
    },
    Canceled,
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            Self::Completed => TaskState::Completed,
            Self::Failed { .. } => TaskState::Failed,
            Self::Canceled => TaskState::Canceled,
        }
    }
}

impl From<OrchestratorResult<()>> for TaskOutcome {
    fn from(result: OrchestratorResult<()>) -> Self {
        match result {
            Ok(()) => Self::Completed,
            Err(error) => Self::Failed {
                retryable: error.is_retryable(),
                error,
            },
        }
    }
}

/// Strip a `file://` scheme from a gateway-side location
pub(crate) fn local_path(location: &str) -> &str {
    location.strip_prefix("file://").unwrap_or(location)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_result() {
        assert_eq!(TaskOutcome::from(Ok(())), TaskOutcome::Completed);

        let transient = TaskOutcome::from(Err(OrchestratorError::CommandExecution {
            command: "mkdir".into(),
            exit_code: 1,
            stderr: "reset".into(),
        }));
        assert!(matches!(transient, TaskOutcome::Failed { retryable: true, .. }));

        let ambiguous = TaskOutcome::from(Err(OrchestratorError::AmbiguousRemoteState {
            task_id: "t".into(),
            reason: "no id".into(),
        }));
        assert_eq!(ambiguous.state(), TaskState::Failed);
        assert!(matches!(
            ambiguous,
            TaskOutcome::Failed { retryable: false, ref error } if error.to_string().contains("no id")
        ));
    }

    #[test]
    fn test_local_path_strips_scheme() {
        assert_eq!(local_path("file:///data/in.dat"), "/data/in.dat");
        assert_eq!(local_path("/data/in.dat"), "/data/in.dat");
    }
}
