use super::executor::TaskExecutor;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::messaging::{ChannelDispatcher, TaskDispatchMessage};
use crate::models::TaskType;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

/// Consumes the per-type dispatch queues
///
/// Each task type gets its own loop and its own concurrency bound, so a
/// backlog of long MONITOR tasks never starves staging or submission.
pub struct TaskWorkerPool {
    executor: TaskExecutor,
    workers_per_task_type: usize,
    shutdown: watch::Sender<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for TaskWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskWorkerPool")
            .field("workers_per_task_type", &self.workers_per_task_type)
            .field("loops", &self.loops.lock().len())
            .finish()
    }
}

impl TaskWorkerPool {
    pub fn new(executor: TaskExecutor, workers_per_task_type: usize) -> Self {
        Self {
            executor,
            workers_per_task_type: workers_per_task_type.max(1),
            shutdown: watch::channel(false).0,
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Start one consumer loop per task type
    pub fn start(&self, dispatcher: &ChannelDispatcher) -> OrchestratorResult<()> {
        let mut loops = self.loops.lock();
        for task_type in TaskType::all() {
            let queue = dispatcher.take_receiver(task_type).ok_or_else(|| {
                OrchestratorError::Dispatch(format!("queue for {task_type} already consumed"))
            })?;
            loops.push(tokio::spawn(consume(
                task_type,
                queue,
                self.executor.clone(),
                Arc::new(Semaphore::new(self.workers_per_task_type)),
                self.shutdown.subscribe(),
            )));
        }
        tracing::info!(
            task_types = TaskType::all().len(),
            workers_per_task_type = self.workers_per_task_type,
            "Task worker pool started"
        );
        Ok(())
    }

    /// Stop consuming and abort running attempts; they are picked up again
    /// through `resume`
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let loops: Vec<JoinHandle<()>> = self.loops.lock().drain(..).collect();
        for result in futures::future::join_all(loops).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Worker loop ended abnormally");
            }
        }
        tracing::info!("Task worker pool stopped");
    }
}

async fn consume(
    task_type: TaskType,
    mut queue: mpsc::Receiver<TaskDispatchMessage>,
    executor: TaskExecutor,
    slots: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut running = JoinSet::new();

    loop {
        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let message = tokio::select! {
            _ = shutdown.changed() => break,
            message = queue.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        tracing::debug!(
            task_type = %task_type,
            process_id = %message.process_id,
            task_id = %message.task_id,
            attempt = message.attempt_number,
            "Worker picked up task"
        );

        let executor = executor.clone();
        running.spawn(async move {
            executor.handle(message).await;
            drop(permit);
        });

        // Reap finished attempts so the set does not grow unbounded
        while let Some(result) = running.try_join_next() {
            if let Err(e) = result {
                tracing::error!(task_type = %task_type, error = %e, "Task attempt panicked");
            }
        }
    }

    running.shutdown().await;
    tracing::debug!(task_type = %task_type, "Worker loop stopped");
}
