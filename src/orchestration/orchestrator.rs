//! # Process Orchestrator
//!
//! The central state machine of the engine. It owns the task pointer of every
//! live process and moves it forward as task outcomes arrive from workers.
//!
//! ## Concurrency
//!
//! Live processes sit in an arena keyed by process id; every entry has its
//! own async mutex, so all event handling for one process is serialized
//! while different processes proceed independently. Result events are each
//! handled on their own task. While an entry is locked, handlers only persist
//! status and publish; the dispatch of the next attempt is handed to the
//! worker queue after the entry is released.
//!
//! ## Terminal states
//!
//! An entry leaves the arena only once its terminal status is stored in the
//! catalog. When that write fails the entry stays, the error is returned,
//! and the write is retried in the background.
//!
//! ## Event gating
//!
//! An event is applied only when it refers to the in-flight attempt of the
//! task under the pointer. Events for tasks the pointer already passed (or
//! for superseded attempts) are ignored, and events for tasks the pointer has
//! not reached are rejected. Duplicate delivery is therefore harmless.

use super::backoff_calculator::BackoffCalculator;
use super::process_state::{EventGate, InFlight, ProcessExecutionState, TaskPointer};
use super::task_factory::TaskFactory;
use crate::catalog::ProcessCatalog;
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::StatusPublisher;
use crate::logging::{log_error, log_process_operation};
use crate::messaging::{
    TaskCanceledEvent, TaskCompletedEvent, TaskDispatchMessage, TaskDispatcher, TaskFailedEvent,
    TaskRef, TaskResultReceivers,
};
use crate::models::{ProcessSpec, ProcessStatus, TaskSpec, TaskStatus};
use crate::state_machine::{ProcessEvent, ProcessState, TaskState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

type ProcessEntry = Arc<Mutex<ProcessExecutionState>>;

/// Floor for the pause between attempts to store a terminal status
const STATUS_FLUSH_MIN_DELAY: Duration = Duration::from_millis(100);

/// What the orchestrator did with a task event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// The event moved the process forward (or ended it)
    Applied,
    /// Stale, duplicate, or for a process that is no longer live
    Ignored,
    /// Refers to a task the pointer has not reached yet
    Rejected,
}

/// Result of a `resume` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeOutcome {
    pub process_id: String,
    pub state: ProcessState,
    pub pointer: TaskPointer,
    /// The task attempt dispatched by this call, if any
    pub dispatched: Option<TaskDispatchMessage>,
}

#[derive(Clone)]
pub struct ProcessOrchestrator {
    arena: Arc<DashMap<String, ProcessEntry>>,
    catalog: Arc<dyn ProcessCatalog>,
    dispatcher: Arc<dyn TaskDispatcher>,
    publisher: StatusPublisher,
    backoff: BackoffCalculator,
    config: Arc<OrchestratorConfig>,
}

impl std::fmt::Debug for ProcessOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessOrchestrator")
            .field("live_processes", &self.arena.len())
            .field("max_task_retries", &self.config.orchestration.max_task_retries)
            .finish()
    }
}

impl ProcessOrchestrator {
    pub fn new(
        catalog: Arc<dyn ProcessCatalog>,
        dispatcher: Arc<dyn TaskDispatcher>,
        publisher: StatusPublisher,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            arena: Arc::new(DashMap::new()),
            catalog,
            dispatcher,
            publisher,
            backoff: BackoffCalculator::new(config.backoff.clone()),
            config,
        }
    }

    /// Start orchestrating a validated process with its task list
    pub async fn register_process(
        &self,
        spec: ProcessSpec,
        mut tasks: Vec<TaskSpec>,
    ) -> OrchestratorResult<()> {
        let process_id = spec.process_id.clone();
        TaskFactory::verify_task_order(&process_id, &tasks)?;
        tasks.sort_by_key(|t| t.order_index);

        if self.arena.contains_key(&process_id) {
            return Err(OrchestratorError::InvalidProcessState {
                process_id,
                state: "live".to_string(),
                operation: "register".to_string(),
            });
        }

        self.catalog.save_process(&spec).await?;
        self.catalog.save_task_specs(&process_id, &tasks).await?;

        let entry = match self.arena.entry(process_id.clone()) {
            Entry::Occupied(_) => {
                return Err(OrchestratorError::InvalidProcessState {
                    process_id,
                    state: "live".to_string(),
                    operation: "register".to_string(),
                })
            }
            Entry::Vacant(vacant) => {
                let entry = Arc::new(Mutex::new(ProcessExecutionState::new(spec, tasks)));
                vacant.insert(Arc::clone(&entry));
                entry
            }
        };

        let message = {
            let mut state = entry.lock().await;
            state.lifecycle.transition(ProcessEvent::Start)?;
            self.record_process_status(ProcessStatus::new(&process_id, ProcessState::Running))
                .await;
            log_process_operation(
                "register",
                &process_id,
                "RUNNING",
                Some(&format!("{} tasks", state.tasks.len())),
            );

            match self.prepare_dispatch(&mut state).await {
                Ok(message) => message,
                Err(error) => {
                    let _ = self.fail_process(&mut state, error.to_string()).await;
                    return Err(error);
                }
            }
        };

        self.deliver(message).await
    }

    /// A worker finished the current task successfully
    pub async fn on_task_completed(
        &self,
        event: TaskCompletedEvent,
    ) -> OrchestratorResult<EventDisposition> {
        let Some(entry) = self.entry(&event.task.process_id) else {
            return Ok(self.late_event(&event.task, "completed"));
        };
        let mut state = entry.lock().await;
        if let Some(disposition) = self.gate(&state, &event.task, "completed") {
            return Ok(disposition);
        }

        if state.state() == ProcessState::Canceling {
            self.confirm_cancel(&mut state, None).await?;
            return Ok(EventDisposition::Applied);
        }

        let next = match state.advance().cloned() {
            Some(next) => {
                tracing::debug!(
                    process_id = %event.task.process_id,
                    completed = %event.task.task_id,
                    next = %next.task_id,
                    "Advancing task pointer"
                );
                match self.prepare_dispatch(&mut state).await {
                    Ok(message) => Some(message),
                    Err(error) => {
                        self.fail_process(&mut state, error.to_string()).await?;
                        None
                    }
                }
            }
            None => {
                state.lifecycle.transition(ProcessEvent::Complete)?;
                let status = ProcessStatus::new(state.process_id(), ProcessState::Completed);
                self.finalize(&mut state, status).await?;
                None
            }
        };
        drop(state);

        if let Some(message) = next {
            self.deliver_logged(message).await;
        }
        Ok(EventDisposition::Applied)
    }

    /// A worker reported the current task failed
    pub async fn on_task_failed(
        &self,
        event: TaskFailedEvent,
    ) -> OrchestratorResult<EventDisposition> {
        let Some(entry) = self.entry(&event.task.process_id) else {
            return Ok(self.late_event(&event.task, "failed"));
        };
        let mut state = entry.lock().await;
        if let Some(disposition) = self.gate(&state, &event.task, "failed") {
            return Ok(disposition);
        }

        state.in_flight = None;
        state.last_error = Some((event.task.task_id.clone(), event.error.clone()));

        if state.state() == ProcessState::Canceling {
            self.confirm_cancel(&mut state, None).await?;
            return Ok(EventDisposition::Applied);
        }

        let attempt = event.task.attempt_number;
        let max_retries = self.config.orchestration.max_task_retries;
        if event.retryable && attempt <= max_retries {
            let immediate = self
                .schedule_retry(&mut state, event.task.order_index as usize, attempt)
                .await?;
            drop(state);
            if let Some(message) = immediate {
                self.deliver_logged(message).await;
            }
        } else {
            tracing::warn!(
                process_id = %event.task.process_id,
                task_id = %event.task.task_id,
                attempt = attempt,
                retryable = event.retryable,
                error = %event.error,
                "Task failed terminally"
            );
            self.fail_process(&mut state, event.error.clone()).await?;
        }
        Ok(EventDisposition::Applied)
    }

    /// A worker stopped the current task after a cancellation request
    pub async fn on_task_canceled(
        &self,
        event: TaskCanceledEvent,
    ) -> OrchestratorResult<EventDisposition> {
        let Some(entry) = self.entry(&event.task.process_id) else {
            return Ok(self.late_event(&event.task, "canceled"));
        };
        let mut state = entry.lock().await;
        if let Some(disposition) = self.gate(&state, &event.task, "canceled") {
            return Ok(disposition);
        }

        if state.state() == ProcessState::Running {
            // Canceled from outside the orchestrator; the process follows
            state.lifecycle.transition(ProcessEvent::RequestCancel)?;
        }
        self.confirm_cancel(&mut state, None).await?;
        Ok(EventDisposition::Applied)
    }

    /// Cancel a live process
    ///
    /// Only the in-flight task is asked to stop; completed tasks are not
    /// rolled back. The process stays CANCELING until the worker acknowledges
    /// or `orchestration.cancel_timeout_seconds` elapses.
    pub async fn cancel_process(&self, process_id: &str) -> OrchestratorResult<ProcessState> {
        let Some(entry) = self.entry(process_id) else {
            return match self.catalog.load_process_status(process_id).await? {
                Some(status) if status.state.is_terminal() => Ok(status.state),
                _ => Err(OrchestratorError::ProcessNotFound(process_id.to_string())),
            };
        };
        let mut state = entry.lock().await;

        match state.state() {
            ProcessState::Canceling => return Ok(ProcessState::Canceling),
            ProcessState::Pending => {
                self.confirm_cancel(&mut state, None).await?;
                return Ok(ProcessState::Canceled);
            }
            terminal if terminal.is_terminal() => return Ok(terminal),
            _ => {}
        }

        state.lifecycle.transition(ProcessEvent::RequestCancel)?;
        self.record_process_status(ProcessStatus::new(process_id, ProcessState::Canceling))
            .await;
        log_process_operation("cancel", process_id, "CANCELING", None);

        let Some(in_flight) = state.in_flight else {
            // Nothing running (e.g. waiting out a retry backoff)
            self.confirm_cancel(&mut state, None).await?;
            return Ok(ProcessState::Canceled);
        };

        let task_id = state.tasks[in_flight.order_index].task_id.clone();
        if let Err(error) = self.dispatcher.cancel(process_id, &task_id).await {
            log_error("orchestrator", "cancel_task", &error.to_string(), Some(task_id.as_str()));
        }
        self.spawn_cancel_timeout(process_id.to_string());
        Ok(ProcessState::Canceling)
    }

    /// Rebuild a process after a restart from its persisted status history
    pub async fn resume(&self, process_id: &str) -> OrchestratorResult<ResumeOutcome> {
        if let Some(entry) = self.entry(process_id) {
            let state = entry.lock().await;
            tracing::info!(
                process_id = %process_id,
                pointer = %state.pointer,
                "Process already live; resume suppressed"
            );
            return Ok(ResumeOutcome {
                process_id: process_id.to_string(),
                state: state.state(),
                pointer: state.pointer,
                dispatched: None,
            });
        }

        if let Some(status) = self.catalog.load_process_status(process_id).await? {
            if status.state.is_terminal() {
                return Ok(ResumeOutcome {
                    process_id: process_id.to_string(),
                    state: status.state,
                    pointer: match status.state {
                        ProcessState::Completed => TaskPointer::Complete,
                        _ => TaskPointer::Failed,
                    },
                    dispatched: None,
                });
            }
        }

        let spec = self.catalog.load_process(process_id).await?;
        let mut tasks = self.catalog.load_task_specs(process_id).await?;
        TaskFactory::verify_task_order(process_id, &tasks)?;
        tasks.sort_by_key(|t| t.order_index);
        let last = self.catalog.load_last_status(process_id).await?;

        let mut fresh = ProcessExecutionState::new(spec, tasks);
        fresh.lifecycle.transition(ProcessEvent::Start)?;
        let plan = self.resume_plan(&mut fresh, last.as_ref());

        let entry = match self.arena.entry(process_id.to_string()) {
            Entry::Occupied(occupied) => {
                // Lost a race with a concurrent resume
                let entry = Arc::clone(occupied.get());
                drop(occupied);
                let state = entry.lock().await;
                return Ok(ResumeOutcome {
                    process_id: process_id.to_string(),
                    state: state.state(),
                    pointer: state.pointer,
                    dispatched: None,
                });
            }
            Entry::Vacant(vacant) => {
                let entry = Arc::new(Mutex::new(fresh));
                vacant.insert(Arc::clone(&entry));
                entry
            }
        };

        let mut state = entry.lock().await;
        log_process_operation(
            "resume",
            process_id,
            &state.state().to_string(),
            Some(&format!("pointer {}", state.pointer)),
        );

        let dispatched = match plan {
            ResumePlan::Dispatch => {
                self.record_process_status(ProcessStatus::new(process_id, ProcessState::Running))
                    .await;
                match self.prepare_dispatch(&mut state).await {
                    Ok(message) => Some(message),
                    Err(error) => {
                        let _ = self.fail_process(&mut state, error.to_string()).await;
                        return Err(error);
                    }
                }
            }
            ResumePlan::Complete => {
                state.lifecycle.transition(ProcessEvent::Complete)?;
                let status = ProcessStatus::new(process_id, ProcessState::Completed);
                self.finalize(&mut state, status).await?;
                None
            }
            ResumePlan::Fail(reason) => {
                self.fail_process(&mut state, reason).await?;
                None
            }
            ResumePlan::Cancel => {
                state.lifecycle.transition(ProcessEvent::RequestCancel)?;
                self.confirm_cancel(&mut state, None).await?;
                None
            }
        };

        let outcome = ResumeOutcome {
            process_id: process_id.to_string(),
            state: state.state(),
            pointer: state.pointer,
            dispatched,
        };
        drop(state);

        if let Some(message) = &outcome.dispatched {
            self.deliver(message.clone()).await?;
        }
        Ok(outcome)
    }

    /// Pointer and attempt implied by the last persisted task status
    fn resume_plan(
        &self,
        state: &mut ProcessExecutionState,
        last: Option<&TaskStatus>,
    ) -> ResumePlan {
        let Some(last) = last else {
            state.pointer = TaskPointer::At(0);
            return ResumePlan::Dispatch;
        };
        let index = last.order_index as usize;
        if index >= state.tasks.len() {
            return ResumePlan::Fail(format!(
                "last status refers to unknown task {}",
                last.task_id
            ));
        }

        match last.state {
            TaskState::Completed if index + 1 == state.tasks.len() => {
                state.pointer = TaskPointer::Complete;
                ResumePlan::Complete
            }
            TaskState::Completed => {
                state.pointer = TaskPointer::At(index + 1);
                ResumePlan::Dispatch
            }
            TaskState::Failed
                if last.retryable && last.attempt <= self.config.orchestration.max_task_retries =>
            {
                state.pointer = TaskPointer::At(index);
                state.attempts[index] = last.attempt + 1;
                ResumePlan::Dispatch
            }
            TaskState::Failed => {
                state.last_error = Some((
                    last.task_id.clone(),
                    last.reason.clone().unwrap_or_default(),
                ));
                ResumePlan::Fail(last.reason.clone().unwrap_or_else(|| "task failed".into()))
            }
            TaskState::Created => {
                state.pointer = TaskPointer::At(index);
                state.attempts[index] = 1;
                ResumePlan::Dispatch
            }
            TaskState::Executing | TaskState::Scheduled => {
                state.pointer = TaskPointer::At(index);
                state.attempts[index] = last.attempt.max(1) + 1;
                ResumePlan::Dispatch
            }
            TaskState::Canceled => {
                state.pointer = TaskPointer::At(index);
                ResumePlan::Cancel
            }
        }
    }

    /// Drive all three result channels until their senders close
    ///
    /// Each event is handled on its own task, so a process whose handling
    /// stalls (slow catalog, full worker queue) never holds up the others
    /// and the result channels keep draining.
    pub fn spawn_result_listeners(&self, receivers: TaskResultReceivers) -> Vec<JoinHandle<()>> {
        let TaskResultReceivers {
            mut completed,
            mut failed,
            mut canceled,
        } = receivers;

        let this = self.clone();
        let completed_loop = tokio::spawn(async move {
            while let Some(event) = completed.recv().await {
                let this = this.clone();
                tokio::spawn(async move {
                    let task_id = event.task.task_id.clone();
                    if let Err(error) = this.on_task_completed(event).await {
                        log_error(
                            "orchestrator",
                            "on_task_completed",
                            &error.to_string(),
                            Some(task_id.as_str()),
                        );
                    }
                });
            }
        });

        let this = self.clone();
        let failed_loop = tokio::spawn(async move {
            while let Some(event) = failed.recv().await {
                let this = this.clone();
                tokio::spawn(async move {
                    let task_id = event.task.task_id.clone();
                    if let Err(error) = this.on_task_failed(event).await {
                        log_error(
                            "orchestrator",
                            "on_task_failed",
                            &error.to_string(),
                            Some(task_id.as_str()),
                        );
                    }
                });
            }
        });

        let this = self.clone();
        let canceled_loop = tokio::spawn(async move {
            while let Some(event) = canceled.recv().await {
                let this = this.clone();
                tokio::spawn(async move {
                    let task_id = event.task.task_id.clone();
                    if let Err(error) = this.on_task_canceled(event).await {
                        log_error(
                            "orchestrator",
                            "on_task_canceled",
                            &error.to_string(),
                            Some(task_id.as_str()),
                        );
                    }
                });
            }
        });

        vec![completed_loop, failed_loop, canceled_loop]
    }

    pub async fn process_state(&self, process_id: &str) -> Option<ProcessState> {
        let entry = self.entry(process_id)?;
        let state = entry.lock().await;
        Some(state.state())
    }

    pub async fn pointer(&self, process_id: &str) -> Option<TaskPointer> {
        let entry = self.entry(process_id)?;
        let state = entry.lock().await;
        Some(state.pointer)
    }

    pub fn live_processes(&self) -> usize {
        self.arena.len()
    }

    fn entry(&self, process_id: &str) -> Option<ProcessEntry> {
        self.arena.get(process_id).map(|e| Arc::clone(e.value()))
    }

    fn late_event(&self, task: &TaskRef, kind: &str) -> EventDisposition {
        tracing::debug!(
            process_id = %task.process_id,
            task_id = %task.task_id,
            event = kind,
            "Event for a process that is not live; ignored"
        );
        EventDisposition::Ignored
    }

    /// `None` when the event should be applied
    fn gate(
        &self,
        state: &ProcessExecutionState,
        task: &TaskRef,
        kind: &str,
    ) -> Option<EventDisposition> {
        match state.gate(task.order_index, task.attempt_number) {
            EventGate::Current => None,
            EventGate::Stale => {
                tracing::debug!(
                    process_id = %task.process_id,
                    task_id = %task.task_id,
                    attempt = task.attempt_number,
                    pointer = %state.pointer,
                    event = kind,
                    "Stale task event ignored"
                );
                Some(EventDisposition::Ignored)
            }
            EventGate::Ahead => {
                tracing::warn!(
                    process_id = %task.process_id,
                    task_id = %task.task_id,
                    pointer = %state.pointer,
                    event = kind,
                    "Out-of-order task event rejected"
                );
                Some(EventDisposition::Rejected)
            }
        }
    }

    /// Record the task under the pointer as in flight with its current
    /// attempt number; the caller hands the message to [`Self::deliver`] once
    /// the entry is unlocked
    async fn prepare_dispatch(
        &self,
        state: &mut ProcessExecutionState,
    ) -> OrchestratorResult<TaskDispatchMessage> {
        let TaskPointer::At(index) = state.pointer else {
            return Err(OrchestratorError::invariant(format!(
                "process {} has no task to dispatch",
                state.process_id()
            )));
        };
        let attempt = state.attempt_of(index).max(1);
        state.attempts[index] = attempt;
        let task = state.tasks[index].clone();

        if attempt == 1 {
            let scheduled = TaskStatus::new(&task, TaskState::Scheduled, 1);
            self.catalog.save_task_status(&scheduled).await?;
            self.publisher.publish_task_status(task.task_type, scheduled);
        }

        let message = TaskDispatchMessage::new(
            &task.process_id,
            &task.task_id,
            task.task_type,
            task.order_index,
            attempt,
        );
        state.in_flight = Some(InFlight {
            order_index: index,
            attempt,
        });
        Ok(message)
    }

    /// Hand a prepared attempt to the worker queue. A delivery failure fails
    /// the process, unless the attempt was superseded in the meantime.
    async fn deliver(&self, message: TaskDispatchMessage) -> OrchestratorResult<()> {
        let Err(error) = self.dispatcher.dispatch(message.clone()).await else {
            return Ok(());
        };

        if let Some(entry) = self.entry(&message.process_id) {
            let mut state = entry.lock().await;
            if state.gate(message.order_index, message.attempt_number) == EventGate::Current {
                let _ = self.fail_process(&mut state, error.to_string()).await;
            }
        }
        Err(error)
    }

    async fn deliver_logged(&self, message: TaskDispatchMessage) {
        let task_id = message.task_id.clone();
        if let Err(error) = self.deliver(message).await {
            log_error("orchestrator", "dispatch", &error.to_string(), Some(task_id.as_str()));
        }
    }

    /// Returns the message to deliver when the retry is due at once
    async fn schedule_retry(
        &self,
        state: &mut ProcessExecutionState,
        index: usize,
        attempt: u32,
    ) -> OrchestratorResult<Option<TaskDispatchMessage>> {
        let next_attempt = attempt + 1;
        state.attempts[index] = next_attempt;
        let backoff = self.backoff.calculate(attempt);

        tracing::info!(
            process_id = %state.process_id(),
            task_id = %state.tasks[index].task_id,
            next_attempt = next_attempt,
            delay_ms = backoff.delay_ms,
            "Retrying task"
        );

        if backoff.is_immediate() {
            return match self.prepare_dispatch(state).await {
                Ok(message) => Ok(Some(message)),
                Err(error) => {
                    self.fail_process(state, error.to_string()).await?;
                    Ok(None)
                }
            };
        }

        let this = self.clone();
        let process_id = state.process_id().to_string();
        tokio::spawn(async move {
            tokio::time::sleep(backoff.delay()).await;
            this.dispatch_retry(&process_id, index, next_attempt).await;
        });
        Ok(None)
    }

    async fn dispatch_retry(&self, process_id: &str, index: usize, attempt: u32) {
        let Some(entry) = self.entry(process_id) else {
            return;
        };
        let message = {
            let mut state = entry.lock().await;
            let still_due = state.state() == ProcessState::Running
                && state.pointer == TaskPointer::At(index)
                && state.in_flight.is_none()
                && state.attempt_of(index) == attempt;
            if !still_due {
                return;
            }
            match self.prepare_dispatch(&mut state).await {
                Ok(message) => message,
                Err(error) => {
                    let _ = self.fail_process(&mut state, error.to_string()).await;
                    return;
                }
            }
        };
        self.deliver_logged(message).await;
    }

    fn spawn_cancel_timeout(&self, process_id: String) {
        let this = self.clone();
        let timeout = self.config.orchestration.cancel_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(entry) = this.entry(&process_id) else {
                return;
            };
            let mut state = entry.lock().await;
            if state.state() == ProcessState::Canceling {
                tracing::warn!(
                    process_id = %process_id,
                    timeout_secs = timeout.as_secs(),
                    "In-flight task did not acknowledge cancellation"
                );
                let _ = this
                    .confirm_cancel(&mut state, Some("cancellation timed out".to_string()))
                    .await;
            }
        });
    }

    async fn confirm_cancel(
        &self,
        state: &mut ProcessExecutionState,
        reason: Option<String>,
    ) -> OrchestratorResult<()> {
        state.in_flight = None;
        if let Err(error) = state.lifecycle.transition(ProcessEvent::ConfirmCancel) {
            log_error("orchestrator", "confirm_cancel", &error.to_string(), None);
            return Ok(());
        }
        let mut status = ProcessStatus::new(state.process_id(), ProcessState::Canceled);
        status.reason = reason;
        self.finalize(state, status).await
    }

    async fn fail_process(
        &self,
        state: &mut ProcessExecutionState,
        reason: String,
    ) -> OrchestratorResult<()> {
        let failed_task = state
            .last_error
            .as_ref()
            .map(|(task_id, _)| task_id.clone())
            .or_else(|| state.current_task().map(|t| t.task_id.clone()))
            .unwrap_or_default();
        state.in_flight = None;
        state.pointer = TaskPointer::Failed;
        if let Err(error) = state.lifecycle.transition(ProcessEvent::Fail(reason.clone())) {
            log_error("orchestrator", "fail_process", &error.to_string(), None);
            return Ok(());
        }
        let status = ProcessStatus::failed(state.process_id(), failed_task, reason);
        self.finalize(state, status).await
    }

    /// Persist and publish a terminal status, then drop the arena entry
    ///
    /// The entry stays live until the status is stored; a failed write is
    /// retried in the background and reported to the caller.
    async fn finalize(
        &self,
        state: &mut ProcessExecutionState,
        status: ProcessStatus,
    ) -> OrchestratorResult<()> {
        log_process_operation(
            "finalize",
            state.process_id(),
            &status.state.to_string(),
            status.reason.as_deref(),
        );
        let saved = self.catalog.save_process_status(&status).await;
        self.publisher.publish_process_status(status.clone());

        match saved {
            Ok(()) => {
                self.arena.remove(state.process_id());
                Ok(())
            }
            Err(error) => {
                log_error(
                    "orchestrator",
                    "save_process_status",
                    &error.to_string(),
                    Some(status.process_id.as_str()),
                );
                self.spawn_status_flush(status);
                Err(error)
            }
        }
    }

    /// Keep retrying a terminal status write; the entry is dropped once it
    /// is stored
    fn spawn_status_flush(&self, status: ProcessStatus) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut attempt = 1;
            loop {
                let delay = this.backoff.calculate(attempt).delay().max(STATUS_FLUSH_MIN_DELAY);
                tokio::time::sleep(delay).await;
                if this.entry(&status.process_id).is_none() {
                    return;
                }
                match this.catalog.save_process_status(&status).await {
                    Ok(()) => {
                        tracing::info!(
                            process_id = %status.process_id,
                            state = %status.state,
                            attempts = attempt + 1,
                            "Terminal status stored"
                        );
                        this.arena.remove(&status.process_id);
                        return;
                    }
                    Err(error) => {
                        tracing::warn!(
                            process_id = %status.process_id,
                            attempt = attempt,
                            error = %error,
                            "Terminal status still not stored"
                        );
                        attempt = attempt.saturating_add(1);
                    }
                }
            }
        });
    }

    async fn record_process_status(&self, status: ProcessStatus) {
        if let Err(error) = self.catalog.save_process_status(&status).await {
            log_error(
                "orchestrator",
                "save_process_status",
                &error.to_string(),
                Some(status.process_id.as_str()),
            );
        }
        self.publisher.publish_process_status(status);
    }
}

enum ResumePlan {
    Dispatch,
    Complete,
    Fail(String),
    Cancel,
}
