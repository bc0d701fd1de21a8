//! # Task dispatch
//!
//! [`TaskDispatcher`] is the outbound seam between the orchestrator and
//! whatever transport carries work to the workers. [`ChannelDispatcher`] is
//! the in-process transport: one bounded queue per task type, with
//! cancellation requests delivered through a shared [`CancellationRegistry`].

use super::message::TaskDispatchMessage;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::TaskType;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Enqueue a task for the worker pool of its type
    async fn dispatch(&self, message: TaskDispatchMessage) -> OrchestratorResult<()>;

    /// Ask whichever worker holds the task to cancel it; returns whether the
    /// request was delivered
    async fn cancel(&self, process_id: &str, task_id: &str) -> OrchestratorResult<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub process_id: String,
    pub task_id: String,
}

impl TaskKey {
    pub fn new(process_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            task_id: task_id.into(),
        }
    }
}

/// Cancellation flags of queued and running tasks
///
/// A request that arrives before a worker picks the task up is kept, so the
/// worker sees it as soon as it registers.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    flags: DashMap<TaskKey, watch::Sender<bool>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by a worker when it starts on a task
    pub fn register(&self, key: TaskKey) -> watch::Receiver<bool> {
        self.flags
            .entry(key)
            .or_insert_with(|| watch::channel(false).0)
            .subscribe()
    }

    pub fn request_cancel(&self, key: TaskKey) {
        self.flags
            .entry(key)
            .or_insert_with(|| watch::channel(false).0)
            .send_replace(true);
    }

    /// Called by a worker once the task reached a terminal state
    pub fn release(&self, key: &TaskKey) {
        self.flags.remove(key);
    }

    pub fn is_cancel_requested(&self, key: &TaskKey) -> bool {
        self.flags.get(key).map(|f| *f.borrow()).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

/// In-process dispatcher with one queue per task type
pub struct ChannelDispatcher {
    senders: HashMap<TaskType, mpsc::Sender<TaskDispatchMessage>>,
    receivers: Mutex<HashMap<TaskType, mpsc::Receiver<TaskDispatchMessage>>>,
    cancellations: Arc<CancellationRegistry>,
}

impl std::fmt::Debug for ChannelDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelDispatcher")
            .field("queues", &self.senders.len())
            .field("pending_cancellations", &self.cancellations.len())
            .finish()
    }
}

impl ChannelDispatcher {
    pub fn new(queue_capacity: usize) -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for task_type in TaskType::all() {
            let (tx, rx) = mpsc::channel(queue_capacity.max(1));
            senders.insert(task_type, tx);
            receivers.insert(task_type, rx);
        }
        Self {
            senders,
            receivers: Mutex::new(receivers),
            cancellations: Arc::new(CancellationRegistry::new()),
        }
    }

    /// Hand the consuming end of a queue to a worker pool; each queue can be
    /// taken once
    pub fn take_receiver(&self, task_type: TaskType) -> Option<mpsc::Receiver<TaskDispatchMessage>> {
        self.receivers.lock().remove(&task_type)
    }

    pub fn cancellations(&self) -> Arc<CancellationRegistry> {
        Arc::clone(&self.cancellations)
    }
}

#[async_trait]
impl TaskDispatcher for ChannelDispatcher {
    async fn dispatch(&self, message: TaskDispatchMessage) -> OrchestratorResult<()> {
        let sender = self.senders.get(&message.task_type).ok_or_else(|| {
            OrchestratorError::Dispatch(format!("no queue for {}", message.task_type))
        })?;

        tracing::debug!(
            process_id = %message.process_id,
            task_id = %message.task_id,
            task_type = %message.task_type,
            attempt = message.attempt_number,
            queue = %message.queue_name(),
            "Dispatching task"
        );

        sender
            .send(message)
            .await
            .map_err(|e| OrchestratorError::Dispatch(format!("queue closed for {}", e.0.task_id)))
    }

    async fn cancel(&self, process_id: &str, task_id: &str) -> OrchestratorResult<bool> {
        self.cancellations
            .request_cancel(TaskKey::new(process_id, task_id));
        Ok(true)
    }
}
