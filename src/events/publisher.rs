use super::types::{
    new_event_id, JobNotificationEvent, JobStatusEvent, ProcessStatusEvent, TaskStatusEvent,
};
use crate::models::{JobNotification, JobRecord, ProcessStatus, TaskStatus, TaskType};
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// In-process status bus with one broadcast channel per event kind
///
/// Publishing never fails and never blocks: with no subscribers an event is
/// simply dropped, and a subscriber that falls behind loses the oldest
/// events rather than stalling the publisher.
///
/// ```rust
/// use hpcflow_core::events::StatusPublisher;
/// use hpcflow_core::models::{JobNotification, JobState};
///
/// # tokio_test::block_on(async {
/// let publisher = StatusPublisher::new(16);
/// let mut notifications = publisher.subscribe_job_notifications();
/// publisher.publish_job_notification(JobNotification::new("2477982", JobState::Complete));
///
/// let event = notifications.recv().await.unwrap();
/// assert_eq!(event.notification.state, JobState::Complete);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    task_status: broadcast::Sender<TaskStatusEvent>,
    job_status: broadcast::Sender<JobStatusEvent>,
    process_status: broadcast::Sender<ProcessStatusEvent>,
    job_notifications: broadcast::Sender<JobNotificationEvent>,
}

impl StatusPublisher {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            task_status: broadcast::channel(capacity).0,
            job_status: broadcast::channel(capacity).0,
            process_status: broadcast::channel(capacity).0,
            job_notifications: broadcast::channel(capacity).0,
        }
    }

    pub fn publish_task_status(&self, task_type: TaskType, status: TaskStatus) {
        // No subscribers is fine
        let _ = self.task_status.send(TaskStatusEvent {
            event_id: new_event_id(),
            task_type,
            status,
            published_at: Utc::now(),
        });
    }

    pub fn publish_job_status(&self, job: JobRecord) {
        let _ = self.job_status.send(JobStatusEvent {
            event_id: new_event_id(),
            job,
            published_at: Utc::now(),
        });
    }

    pub fn publish_process_status(&self, status: ProcessStatus) {
        let _ = self.process_status.send(ProcessStatusEvent {
            event_id: new_event_id(),
            status,
            published_at: Utc::now(),
        });
    }

    /// Relay a push notification (e.g. a parsed scheduler mail) to MONITOR tasks
    pub fn publish_job_notification(&self, notification: JobNotification) {
        let _ = self.job_notifications.send(JobNotificationEvent {
            event_id: new_event_id(),
            notification,
            published_at: Utc::now(),
        });
    }

    pub fn subscribe_task_status(&self) -> broadcast::Receiver<TaskStatusEvent> {
        self.task_status.subscribe()
    }

    pub fn subscribe_job_status(&self) -> broadcast::Receiver<JobStatusEvent> {
        self.job_status.subscribe()
    }

    pub fn subscribe_process_status(&self) -> broadcast::Receiver<ProcessStatusEvent> {
        self.process_status.subscribe()
    }

    pub fn subscribe_job_notifications(&self) -> broadcast::Receiver<JobNotificationEvent> {
        self.job_notifications.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.task_status.receiver_count()
            + self.job_status.receiver_count()
            + self.process_status.receiver_count()
            + self.job_notifications.receiver_count()
    }

    /// Mirror every status event into `tracing` until the publisher is dropped
    pub fn spawn_logging_subscriber(&self) -> JoinHandle<()> {
        let mut tasks = self.subscribe_task_status();
        let mut jobs = self.subscribe_job_status();
        let mut processes = self.subscribe_process_status();

        tokio::spawn(async move {
            let mut open = (true, true, true);
            while open.0 || open.1 || open.2 {
                tokio::select! {
                    event = tasks.recv(), if open.0 => match event {
                        Ok(e) => tracing::info!(
                            event_id = %e.event_id,
                            process_id = %e.status.process_id,
                            task_id = %e.status.task_id,
                            task_type = %e.task_type,
                            state = %e.status.state,
                            attempt = e.status.attempt,
                            reason = e.status.reason.as_deref().unwrap_or(""),
                            "Task status"
                        ),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "Status logger lagged behind task events")
                        }
                        Err(broadcast::error::RecvError::Closed) => open.0 = false,
                    },
                    event = jobs.recv(), if open.1 => match event {
                        Ok(e) => tracing::info!(
                            event_id = %e.event_id,
                            process_id = %e.job.process_id,
                            job_id = e.job.job_id.as_deref().unwrap_or(""),
                            job_name = %e.job.job_name,
                            state = %e.job.job_state,
                            "Job status"
                        ),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "Status logger lagged behind job events")
                        }
                        Err(broadcast::error::RecvError::Closed) => open.1 = false,
                    },
                    event = processes.recv(), if open.2 => match event {
                        Ok(e) => tracing::info!(
                            event_id = %e.event_id,
                            process_id = %e.status.process_id,
                            state = %e.status.state,
                            failed_task_id = e.status.failed_task_id.as_deref().unwrap_or(""),
                            reason = e.status.reason.as_deref().unwrap_or(""),
                            "Process status"
                        ),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "Status logger lagged behind process events")
                        }
                        Err(broadcast::error::RecvError::Closed) => open.2 = false,
                    },
                }
            }
        })
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}
