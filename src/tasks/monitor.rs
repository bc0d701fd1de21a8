//! # Job monitoring
//!
//! Follows the job recorded by JOB_SUBMISSION until the resource manager
//! reports it finished. State arrives two ways: polling the scheduler's
//! status command every `monitor.poll_interval_seconds`, and push
//! notifications relayed through the [`StatusPublisher`](crate::events::StatusPublisher).
//!
//! Unparseable output means "state unknown" and is simply polled again. A
//! job missing from the output keeps its last known state. An explicit
//! query-failed answer is read as completion: at once for a job seen earlier,
//! and after `monitor.gone_confirmations` consecutive answers for a job that
//! finished before the first poll could see it.
//!
//! Queue time and run time are budgeted separately. A job may wait up to
//! `monitor.max_queue_wait_seconds` in the queue; once it is seen ACTIVE it
//! gets its requested wall time plus `monitor.wall_time_grace_seconds`.

use super::job_submission::cancel_job;
use super::{TaskContext, TaskHandler};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{JobRecord, JobState, ProcessSpec, TaskType};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

#[derive(Debug, Default, Clone, Copy)]
pub struct MonitorHandler;

/// What one poll learned about the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observation {
    State(JobState),
    Gone,
    Unknown,
}

/// Time limits of one monitoring attempt
#[derive(Debug)]
struct Budget {
    started: Instant,
    running_since: Option<Instant>,
    queue_wait: Duration,
    run_time: Duration,
}

impl Budget {
    fn new(process: &ProcessSpec, config: &OrchestratorConfig, last_known: JobState) -> Self {
        let started = Instant::now();
        Self {
            started,
            // Recovering a job already running: its clock starts now
            running_since: (last_known == JobState::Active).then_some(started),
            queue_wait: config.monitor.max_queue_wait(),
            run_time: run_time(process, config),
        }
    }

    fn observe(&mut self, state: JobState) {
        if state == JobState::Active && self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    fn check(&self, job_id: &str) -> OrchestratorResult<()> {
        let (since, limit, phase) = match self.running_since {
            Some(since) => (since, self.run_time, "running"),
            None => (self.started, self.queue_wait, "queued"),
        };
        if since.elapsed() > limit {
            return Err(OrchestratorError::Timeout {
                operation: format!("monitor job {job_id} ({phase})"),
                duration: limit,
            });
        }
        Ok(())
    }
}

/// Requested wall time plus grace
fn run_time(process: &ProcessSpec, config: &OrchestratorConfig) -> Duration {
    Duration::from_secs(u64::from(process.scheduling.wall_time_minutes) * 60)
        + config.monitor.wall_time_grace()
}

impl MonitorHandler {
    async fn poll(&self, ctx: &TaskContext, job_id: &str) -> OrchestratorResult<Observation> {
        let kind = ctx.process.resource_manager();
        let commands = ctx.commands();
        let parser = ctx.parser();
        let timeout = ctx.command_timeout();

        let output = ctx
            .adaptor
            .run_command(
                &commands.job_status_command(job_id, &ctx.credential.username),
                None,
                timeout,
            )
            .await?;

        let combined = format!("{}\n{}", output.stdout, output.stderr);
        if parser.is_job_gone_signal(&combined) {
            return Ok(Observation::Gone);
        }

        let known = [job_id.to_string()];
        match parser.parse_job_states(&output.stdout, &known) {
            Ok(states) => {
                if let Some(state) = states.get(job_id) {
                    return Ok(Observation::State(*state));
                }
            }
            Err(e) => {
                tracing::warn!(
                    process_id = %ctx.process.process_id,
                    job_id = %job_id,
                    resource_manager = %kind,
                    error = %e,
                    "Unreadable status output; state unknown"
                );
                return Ok(Observation::Unknown);
            }
        }

        // Listing-style status commands need an explicit per-job query
        // before absence can mean anything
        if let Some(query) = commands.existence_query_command(job_id) {
            let output = ctx.adaptor.run_command(&query, None, timeout).await?;
            if parser.is_job_gone_signal(&format!("{}\n{}", output.stdout, output.stderr)) {
                return Ok(Observation::Gone);
            }
        }

        Ok(Observation::Unknown)
    }

    /// Apply an observed state; returns the final outcome once the job is done
    async fn record(
        &self,
        ctx: &TaskContext,
        job: &mut JobRecord,
        state: JobState,
    ) -> OrchestratorResult<Option<OrchestratorResult<()>>> {
        if job.observe(state) {
            ctx.save_job(job).await?;
            tracing::info!(
                process_id = %ctx.process.process_id,
                job_id = job.job_id.as_deref().unwrap_or_default(),
                state = %state,
                "Job state changed"
            );
        }

        let outcome = match state {
            JobState::Complete => Some(Ok(())),
            JobState::Failed | JobState::Canceled => Some(Err(OrchestratorError::JobFailed {
                job_id: job.job_id.clone().unwrap_or_else(|| job.job_name.clone()),
                state: state.to_string(),
            })),
            _ => None,
        };
        Ok(outcome)
    }

    async fn follow(&self, ctx: &TaskContext) -> OrchestratorResult<()> {
        let mut job = ctx
            .catalog
            .load_job_record(&ctx.process.process_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::invariant(format!(
                    "process {} has no job record to monitor",
                    ctx.process.process_id
                ))
            })?;
        let job_id = job.job_id.clone().ok_or_else(|| {
            OrchestratorError::invariant(format!(
                "job record of process {} has no job id",
                ctx.process.process_id
            ))
        })?;

        let last_known = job.job_state;
        if last_known.is_terminal() {
            if let Some(outcome) = self.record(ctx, &mut job, last_known).await? {
                return outcome;
            }
        }

        let mut notifications = ctx.publisher.subscribe_job_notifications();
        let poll_interval = ctx.config.monitor.poll_interval();
        let confirmations = ctx.config.monitor.gone_confirmations.max(1);
        let mut budget = Budget::new(&ctx.process, &ctx.config, last_known);
        let mut seen = job.job_state != JobState::Submitted;
        let mut gone_answers = 0u32;

        loop {
            budget.check(&job_id)?;

            match self.poll(ctx, &job_id).await? {
                Observation::State(state) => {
                    seen = true;
                    gone_answers = 0;
                    budget.observe(state);
                    if let Some(outcome) = self.record(ctx, &mut job, state).await? {
                        return outcome;
                    }
                }
                Observation::Gone => {
                    gone_answers += 1;
                    if seen || gone_answers >= confirmations {
                        tracing::info!(
                            process_id = %ctx.process.process_id,
                            job_id = %job_id,
                            seen = seen,
                            answers = gone_answers,
                            "Job no longer known to the scheduler; treating as complete"
                        );
                        if let Some(outcome) =
                            self.record(ctx, &mut job, JobState::Complete).await?
                        {
                            return outcome;
                        }
                    }
                }
                Observation::Unknown => {}
            }

            if let Some(state) = wait_for_update(&mut notifications, &job_id, poll_interval).await {
                seen = true;
                gone_answers = 0;
                budget.observe(state);
                if let Some(outcome) = self.record(ctx, &mut job, state).await? {
                    return outcome;
                }
            }
        }
    }
}

/// Sleep until the next poll, returning early on a push notification for
/// the job
async fn wait_for_update(
    notifications: &mut broadcast::Receiver<crate::events::JobNotificationEvent>,
    job_id: &str,
    poll_interval: Duration,
) -> Option<JobState> {
    let sleep = tokio::time::sleep(poll_interval);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return None,
            received = notifications.recv() => match received {
                Ok(event) if event.notification.job_id == job_id => {
                    return Some(event.notification.state);
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    (&mut sleep).await;
                    return None;
                }
            }
        }
    }
}

#[async_trait]
impl TaskHandler for MonitorHandler {
    fn task_type(&self) -> TaskType {
        TaskType::Monitor
    }

    async fn execute(&self, ctx: &TaskContext) -> OrchestratorResult<()> {
        self.follow(ctx).await
    }

    async fn cancel(&self, ctx: &TaskContext) -> OrchestratorResult<()> {
        cancel_job(ctx).await
    }

    /// Outer bound for the whole attempt: the queue allowance plus the run
    /// allowance. The tighter per-phase limits are enforced while polling.
    fn deadline(&self, process: &ProcessSpec, config: &OrchestratorConfig) -> Duration {
        config.monitor.max_queue_wait() + run_time(process, config) + config.monitor.poll_interval()
    }
}
