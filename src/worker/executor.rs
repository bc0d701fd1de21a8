//! # Task executor
//!
//! Runs one dispatched task attempt end to end:
//!
//! 1. re-fetch the task and process descriptions from the catalog by id
//! 2. rebuild the task's state machine from its status history
//! 3. record EXECUTING (`Start` on the first attempt, `Recover` afterwards)
//! 4. resolve the credential and lease an adaptor from the pool
//! 5. run `execute` or `recover` under the handler's deadline, racing the
//!    task's cancellation flag
//! 6. record the terminal status and report the outcome to the orchestrator

use crate::adaptors::{AdaptorKey, AdaptorPool};
use crate::catalog::{CredentialResolver, ProcessCatalog};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::StatusPublisher;
use crate::logging::log_task_operation;
use crate::messaging::{
    CancellationRegistry, TaskCanceledEvent, TaskCompletedEvent, TaskDispatchMessage,
    TaskFailedEvent, TaskKey, TaskRef, TaskResultSenders,
};
use crate::models::{ProcessSpec, TaskSpec, TaskStatus, TaskType};
use crate::state_machine::{TaskEvent, TaskState, TaskStateMachine};
use crate::tasks::{TaskContext, TaskHandler, TaskOutcome, TaskRegistry};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct TaskExecutor {
    registry: Arc<TaskRegistry>,
    catalog: Arc<dyn ProcessCatalog>,
    credentials: Arc<dyn CredentialResolver>,
    adaptors: Arc<AdaptorPool>,
    publisher: StatusPublisher,
    cancellations: Arc<CancellationRegistry>,
    results: TaskResultSenders,
    config: Arc<OrchestratorConfig>,
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("registry", &self.registry)
            .field("adaptors", &self.adaptors)
            .finish()
    }
}

/// Resolves once cancellation of the task has been requested
async fn cancellation_requested(mut flag: watch::Receiver<bool>) {
    if flag.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl TaskExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<TaskRegistry>,
        catalog: Arc<dyn ProcessCatalog>,
        credentials: Arc<dyn CredentialResolver>,
        adaptors: Arc<AdaptorPool>,
        publisher: StatusPublisher,
        cancellations: Arc<CancellationRegistry>,
        results: TaskResultSenders,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            registry,
            catalog,
            credentials,
            adaptors,
            publisher,
            cancellations,
            results,
            config,
        }
    }

    /// Run one attempt and report its outcome
    pub async fn handle(&self, message: TaskDispatchMessage) -> TaskOutcome {
        let key = TaskKey::new(&message.process_id, &message.task_id);
        let flag = self.cancellations.register(key.clone());
        let outcome = self.run(&message, flag).await;
        self.cancellations.release(&key);
        outcome
    }

    async fn run(&self, message: &TaskDispatchMessage, flag: watch::Receiver<bool>) -> TaskOutcome {
        let task_ref = TaskRef::from(message);
        let attempt = message.attempt_number.max(1);

        let (process, task, history) = match self.load(message).await {
            Ok(loaded) => loaded,
            Err(error) => {
                tracing::error!(
                    process_id = %message.process_id,
                    task_id = %message.task_id,
                    error = %error,
                    "Cannot load task for execution"
                );
                let outcome = TaskOutcome::from(Err(error));
                self.report(&task_ref, &outcome).await;
                return outcome;
            }
        };

        let mut machine = TaskStateMachine::from_last_status(task.clone(), history.last());
        if machine.current_state() == TaskState::Completed {
            tracing::warn!(
                process_id = %process.process_id,
                task_id = %task.task_id,
                attempt = attempt,
                "Task already completed; duplicate dispatch acknowledged"
            );
            self.report(&task_ref, &TaskOutcome::Completed).await;
            return TaskOutcome::Completed;
        }

        if *flag.borrow() {
            return self
                .finish(&mut machine, &process, &task_ref, TaskOutcome::Canceled)
                .await;
        }

        let start = if message.is_first_attempt() {
            TaskEvent::Start
        } else {
            TaskEvent::Recover
        };
        match machine.transition(start, attempt) {
            Ok(status) => self.record(task.task_type, &status, "started").await,
            Err(error) => {
                let outcome = TaskOutcome::from(Err(OrchestratorError::from(error)));
                self.report(&task_ref, &outcome).await;
                return outcome;
            }
        }

        let outcome = match self.context(&process, &task, attempt).await {
            Ok(ctx) => self.execute(&ctx, message.is_first_attempt(), flag).await,
            Err(error) if *flag.borrow() => {
                tracing::debug!(error = %error, "Context unavailable for canceled task");
                TaskOutcome::Canceled
            }
            Err(error) => TaskOutcome::from(Err(error)),
        };

        self.finish(&mut machine, &process, &task_ref, outcome).await
    }

    async fn load(
        &self,
        message: &TaskDispatchMessage,
    ) -> OrchestratorResult<(ProcessSpec, TaskSpec, Vec<TaskStatus>)> {
        let process = self.catalog.load_process(&message.process_id).await?;
        let task = self
            .catalog
            .load_task_spec(&message.process_id, &message.task_id)
            .await?;
        if task.task_type != message.task_type || task.order_index != message.order_index {
            return Err(OrchestratorError::invariant(format!(
                "dispatch for {} does not match its catalog entry",
                message.task_id
            )));
        }
        let history = self
            .catalog
            .load_task_history(&message.process_id, &message.task_id)
            .await?;
        Ok((process, task, history))
    }

    async fn context(
        &self,
        process: &ProcessSpec,
        task: &TaskSpec,
        attempt: u32,
    ) -> OrchestratorResult<TaskContext> {
        let credential = self
            .credentials
            .resolve_token(
                &process.credential_token,
                &process.gateway_id,
                &process.compute_resource.resource_id,
            )
            .await?;
        let adaptor = self.adaptors.acquire(process, &credential).await?;
        Ok(TaskContext {
            process: process.clone(),
            task: task.clone(),
            attempt,
            credential,
            adaptor,
            catalog: Arc::clone(&self.catalog),
            publisher: self.publisher.clone(),
            config: Arc::clone(&self.config),
        })
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        first_attempt: bool,
        flag: watch::Receiver<bool>,
    ) -> TaskOutcome {
        let handler = match self.registry.handler(ctx.task.task_type) {
            Ok(handler) => handler,
            Err(error) => return TaskOutcome::from(Err(error)),
        };
        let deadline = handler.deadline(&ctx.process, &self.config);

        let work = async {
            if first_attempt {
                handler.execute(ctx).await
            } else {
                handler.recover(ctx).await
            }
        };

        let finished = tokio::select! {
            _ = cancellation_requested(flag) => None,
            result = tokio::time::timeout(deadline, work) => Some(result),
        };

        match finished {
            Some(Ok(result)) => TaskOutcome::from(result),
            Some(Err(_)) => TaskOutcome::from(Err(OrchestratorError::Timeout {
                operation: format!("{} {}", ctx.task.task_type, ctx.task.task_id),
                duration: deadline,
            })),
            None => {
                self.cancel_remote(handler.as_ref(), ctx).await;
                TaskOutcome::Canceled
            }
        }
    }

    async fn cancel_remote(&self, handler: &dyn TaskHandler, ctx: &TaskContext) {
        match tokio::time::timeout(ctx.command_timeout(), handler.cancel(ctx)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::warn!(
                process_id = %ctx.process.process_id,
                task_id = %ctx.task.task_id,
                error = %error,
                "Remote cancellation failed"
            ),
            Err(_) => tracing::warn!(
                process_id = %ctx.process.process_id,
                task_id = %ctx.task.task_id,
                "Remote cancellation timed out"
            ),
        }
    }

    async fn finish(
        &self,
        machine: &mut TaskStateMachine,
        process: &ProcessSpec,
        task_ref: &TaskRef,
        outcome: TaskOutcome,
    ) -> TaskOutcome {
        let attempt = task_ref.attempt_number.max(1);
        let event = match &outcome {
            TaskOutcome::Completed => TaskEvent::Complete,
            TaskOutcome::Failed { retryable, error } => {
                TaskEvent::fail_with_error(*retryable, error.to_string())
            }
            TaskOutcome::Canceled => TaskEvent::Cancel,
        };

        let task_type = machine.task().task_type;
        match machine.transition(event, attempt) {
            Ok(status) => self.record(task_type, &status, "finished").await,
            Err(error) => tracing::warn!(
                process_id = %task_ref.process_id,
                task_id = %task_ref.task_id,
                outcome = %outcome.state(),
                error = %error,
                "Terminal status not recorded"
            ),
        }

        if let TaskOutcome::Failed {
            error: OrchestratorError::AdaptorInit { .. },
            ..
        } = &outcome
        {
            self.adaptors.invalidate(&AdaptorKey::for_process(process)).await;
        }

        self.report(task_ref, &outcome).await;
        outcome
    }

    async fn record(&self, task_type: TaskType, status: &TaskStatus, operation: &str) {
        if let Err(error) = self.catalog.save_task_status(status).await {
            tracing::error!(
                process_id = %status.process_id,
                task_id = %status.task_id,
                error = %error,
                "Failed to persist task status"
            );
        }
        log_task_operation(
            operation,
            &status.process_id,
            &status.task_id,
            status.attempt,
            &status.state.to_string(),
            status.reason.as_deref(),
        );
        self.publisher.publish_task_status(task_type, status.clone());
    }

    async fn report(&self, task_ref: &TaskRef, outcome: &TaskOutcome) {
        let sent = match outcome {
            TaskOutcome::Completed => {
                self.results
                    .completed(TaskCompletedEvent {
                        task: task_ref.clone(),
                        completed_at: Utc::now(),
                    })
                    .await
            }
            TaskOutcome::Failed { retryable, error } => {
                self.results
                    .failed(TaskFailedEvent {
                        task: task_ref.clone(),
                        retryable: *retryable,
                        error: error.to_string(),
                        failed_at: Utc::now(),
                    })
                    .await
            }
            TaskOutcome::Canceled => {
                self.results
                    .canceled(TaskCanceledEvent {
                        task: task_ref.clone(),
                        canceled_at: Utc::now(),
                    })
                    .await
            }
        };
        if let Err(error) = sent {
            tracing::warn!(
                process_id = %task_ref.process_id,
                task_id = %task_ref.task_id,
                error = %error,
                "Task outcome not delivered"
            );
        }
    }
}
