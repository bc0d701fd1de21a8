mod common;

use async_trait::async_trait;
use common::*;
use hpcflow_core::adaptors::AdaptorPool;
use hpcflow_core::catalog::{InMemoryCatalog, ProcessCatalog, StaticCredentialResolver};
use hpcflow_core::error::{OrchestratorError, OrchestratorResult};
use hpcflow_core::events::StatusPublisher;
use hpcflow_core::messaging::{
    result_channels, CancellationRegistry, TaskDispatchMessage, TaskKey, TaskResultReceivers,
};
use hpcflow_core::models::{ProcessSpec, TaskSpec, TaskStatus, TaskType};
use hpcflow_core::orchestration::TaskFactory;
use hpcflow_core::state_machine::TaskState;
use hpcflow_core::tasks::{TaskContext, TaskHandler, TaskOutcome, TaskRegistry};
use hpcflow_core::worker::TaskExecutor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Environment setup that never finishes on its own
#[derive(Default)]
struct HangingSetup {
    started: Notify,
    cancels: AtomicUsize,
}

#[async_trait]
impl TaskHandler for HangingSetup {
    fn task_type(&self) -> TaskType {
        TaskType::EnvSetup
    }

    async fn execute(&self, _ctx: &TaskContext) -> OrchestratorResult<()> {
        self.started.notify_one();
        tokio::time::sleep(Duration::from_secs(24 * 3_600)).await;
        Ok(())
    }

    async fn cancel(&self, _ctx: &TaskContext) -> OrchestratorResult<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Worker {
    executor: TaskExecutor,
    handler: Arc<HangingSetup>,
    catalog: Arc<InMemoryCatalog>,
    cancellations: Arc<CancellationRegistry>,
    results: TaskResultReceivers,
    process: ProcessSpec,
    task: TaskSpec,
    _scripts: TempDir,
}

impl Worker {
    async fn new(process_id: &str, task_timeout_seconds: u64) -> Self {
        let scripts = TempDir::new().expect("temp dir");
        let mut config = test_config(scripts.path());
        config.execution.task_timeout_seconds = task_timeout_seconds;

        let process = process_spec(process_id, "local", "local");
        let tasks = TaskFactory::build_task_specs(&process);
        let task = tasks[0].clone();
        assert_eq!(task.task_type, TaskType::EnvSetup);

        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.save_process(&process).await.unwrap();
        catalog.save_task_specs(process_id, &tasks).await.unwrap();
        catalog
            .save_task_status(&TaskStatus::new(&task, TaskState::Scheduled, 1))
            .await
            .unwrap();

        let handler = Arc::new(HangingSetup::default());
        let mut registry = TaskRegistry::with_defaults();
        registry.register(Arc::clone(&handler) as Arc<dyn TaskHandler>);

        let adaptors = Arc::new(AdaptorPool::new(
            Arc::new(MockAdaptorFactory {
                adaptor: MockAdaptor::new(),
            }),
            4,
        ));
        let cancellations = Arc::new(CancellationRegistry::new());
        let (senders, results) = result_channels(8);

        let executor = TaskExecutor::new(
            Arc::new(registry),
            Arc::clone(&catalog) as Arc<dyn ProcessCatalog>,
            Arc::new(StaticCredentialResolver::new().with_credential(credential())),
            adaptors,
            StatusPublisher::new(64),
            Arc::clone(&cancellations),
            senders,
            Arc::new(config),
        );

        Self {
            executor,
            handler,
            catalog,
            cancellations,
            results,
            process,
            task,
            _scripts: scripts,
        }
    }

    fn message(&self) -> TaskDispatchMessage {
        TaskDispatchMessage::new(
            &self.process.process_id,
            &self.task.task_id,
            self.task.task_type,
            self.task.order_index,
            1,
        )
    }

    fn last_status(&self) -> TaskStatus {
        self.catalog
            .status_log(&self.process.process_id)
            .pop()
            .expect("a status was recorded")
    }
}

#[tokio::test(start_paused = true)]
async fn attempt_past_its_deadline_is_a_retryable_failure() {
    let mut worker = Worker::new("PROC_SLOW_SETUP", 60).await;

    let outcome = worker.executor.handle(worker.message()).await;

    assert!(matches!(
        outcome,
        TaskOutcome::Failed {
            retryable: true,
            error: OrchestratorError::Timeout { .. }
        }
    ));
    let status = worker.last_status();
    assert_eq!(status.state, TaskState::Failed);
    assert!(status.retryable);

    let event = worker.results.failed.recv().await.unwrap();
    assert_eq!(event.task.task_id, worker.task.task_id);
    assert!(event.retryable);
    assert!(event.error.contains("timed out"));
    // A timeout is not a cancellation
    assert_eq!(worker.handler.cancels.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_mid_attempt_stops_the_remote_side_and_reports_canceled() {
    let mut worker = Worker::new("PROC_CANCEL_SETUP", 3_600).await;
    let executor = worker.executor.clone();
    let message = worker.message();
    let attempt = tokio::spawn(async move { executor.handle(message).await });

    worker.handler.started.notified().await;
    worker.cancellations.request_cancel(TaskKey::new(
        &worker.process.process_id,
        &worker.task.task_id,
    ));

    let outcome = tokio::time::timeout(Duration::from_secs(5), attempt)
        .await
        .expect("attempt stopped")
        .unwrap();

    assert_eq!(outcome, TaskOutcome::Canceled);
    assert_eq!(worker.handler.cancels.load(Ordering::SeqCst), 1);
    assert_eq!(worker.last_status().state, TaskState::Canceled);

    let event = worker.results.canceled.recv().await.unwrap();
    assert_eq!(event.task.task_id, worker.task.task_id);
    assert!(worker.results.failed.try_recv().is_err());
    // The flag is released with the attempt
    assert!(worker.cancellations.is_empty());
}

#[tokio::test]
async fn cancel_requested_before_pickup_never_runs_the_handler() {
    let mut worker = Worker::new("PROC_CANCEL_EARLY", 3_600).await;
    worker.cancellations.request_cancel(TaskKey::new(
        &worker.process.process_id,
        &worker.task.task_id,
    ));

    let outcome = worker.executor.handle(worker.message()).await;

    assert_eq!(outcome, TaskOutcome::Canceled);
    assert_eq!(worker.handler.cancels.load(Ordering::SeqCst), 0);
    assert_eq!(worker.last_status().state, TaskState::Canceled);
    assert!(worker.results.canceled.recv().await.is_some());
}
