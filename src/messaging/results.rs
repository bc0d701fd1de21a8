//! Typed channels carrying task outcomes from workers to the orchestrator,
//! one channel per outcome kind.

use super::message::{TaskCanceledEvent, TaskCompletedEvent, TaskFailedEvent};
use crate::error::{OrchestratorError, OrchestratorResult};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct TaskResultSenders {
    completed: mpsc::Sender<TaskCompletedEvent>,
    failed: mpsc::Sender<TaskFailedEvent>,
    canceled: mpsc::Sender<TaskCanceledEvent>,
}

#[derive(Debug)]
pub struct TaskResultReceivers {
    pub completed: mpsc::Receiver<TaskCompletedEvent>,
    pub failed: mpsc::Receiver<TaskFailedEvent>,
    pub canceled: mpsc::Receiver<TaskCanceledEvent>,
}

pub fn result_channels(capacity: usize) -> (TaskResultSenders, TaskResultReceivers) {
    let capacity = capacity.max(1);
    let (completed_tx, completed_rx) = mpsc::channel(capacity);
    let (failed_tx, failed_rx) = mpsc::channel(capacity);
    let (canceled_tx, canceled_rx) = mpsc::channel(capacity);
    (
        TaskResultSenders {
            completed: completed_tx,
            failed: failed_tx,
            canceled: canceled_tx,
        },
        TaskResultReceivers {
            completed: completed_rx,
            failed: failed_rx,
            canceled: canceled_rx,
        },
    )
}

fn closed(kind: &str) -> OrchestratorError {
    OrchestratorError::Dispatch(format!("{kind} result channel closed"))
}

impl TaskResultSenders {
    pub async fn completed(&self, event: TaskCompletedEvent) -> OrchestratorResult<()> {
        self.completed.send(event).await.map_err(|_| closed("completed"))
    }

    pub async fn failed(&self, event: TaskFailedEvent) -> OrchestratorResult<()> {
        self.failed.send(event).await.map_err(|_| closed("failed"))
    }

    pub async fn canceled(&self, event: TaskCanceledEvent) -> OrchestratorResult<()> {
        self.canceled.send(event).await.map_err(|_| closed("canceled"))
    }
}
