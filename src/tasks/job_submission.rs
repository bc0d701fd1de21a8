//! # Job submission
//!
//! Renders the job script, copies it into the working directory and hands it
//! to the resource manager. Batch managers answer with a job id that is
//! extracted from the submission output and recorded as a [`JobRecord`];
//! direct (local) execution runs the script to completion instead.
//!
//! A refusal is retryable unless the resource manager names a problem that
//! resubmitting cannot fix, such as an unknown queue or an exceeded quota.
//!
//! Schedulers offer no deduplication token, so `recover` works by
//! inspection: a persisted job record or a queued job carrying this
//! process's deterministic job name means the submission already happened.

use super::{TaskContext, TaskHandler};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{JobRecord, JobState, ProcessSpec, ResourceManagerKind, TaskType};
use crate::parsing;
use crate::scheduler::JobScript;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Default, Clone, Copy)]
pub struct JobSubmissionHandler;

impl JobSubmissionHandler {
    /// Write the script locally and copy it next to the job's files
    async fn stage_script(&self, ctx: &TaskContext) -> OrchestratorResult<String> {
        let script = JobScript::render(&ctx.process);
        let directory = &ctx.config.execution.script_directory;
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|e| OrchestratorError::io(directory.display().to_string(), &e))?;

        let local = directory.join(script.file_name());
        tokio::fs::write(&local, script.contents())
            .await
            .map_err(|e| OrchestratorError::io(local.display().to_string(), &e))?;

        let remote = ctx.process.remote_path(&script.file_name());
        ctx.adaptor
            .copy_file_to(&local.display().to_string(), &remote, ctx.command_timeout())
            .await?;
        Ok(remote)
    }

    async fn submit(&self, ctx: &TaskContext) -> OrchestratorResult<()> {
        let kind = ctx.process.resource_manager();
        let script_path = self.stage_script(ctx).await?;
        let command = ctx.commands().submit_command(&script_path);

        if kind == ResourceManagerKind::Local {
            return self.run_synchronously(ctx, &command).await;
        }

        let output = ctx
            .adaptor
            .run_command(
                &command,
                Some(&ctx.process.working_directory),
                ctx.command_timeout(),
            )
            .await?;
        if !output.success()
            && ctx
                .parser()
                .is_permanent_rejection(&format!("{}\n{}", output.stdout, output.stderr))
        {
            let reason = match output.stderr.trim() {
                "" => output.stdout.trim().to_string(),
                stderr => stderr.to_string(),
            };
            tracing::warn!(
                process_id = %ctx.process.process_id,
                task_id = %ctx.task.task_id,
                resource_manager = %kind,
                reason = %reason,
                "Submission rejected"
            );
            return Err(OrchestratorError::SubmissionRejected {
                job_name: ctx.process.job_name(),
                reason,
            });
        }
        let output = output.into_result(&command)?;

        let job_id = parsing::parse_job_id(&output.stdout, kind).ok_or_else(|| {
            OrchestratorError::AmbiguousRemoteState {
                task_id: ctx.task.task_id.clone(),
                reason: format!(
                    "submission succeeded but no {kind} job id found in output: {}",
                    output.stdout.trim()
                ),
            }
        })?;

        let job = JobRecord::submitted(
            &ctx.process.process_id,
            &ctx.task.task_id,
            &job_id,
            ctx.process.job_name(),
        );
        ctx.save_job(&job).await?;

        tracing::info!(
            process_id = %ctx.process.process_id,
            task_id = %ctx.task.task_id,
            job_id = %job_id,
            resource_manager = %kind,
            "Job submitted"
        );
        Ok(())
    }

    /// Direct execution: the job is the script run itself. A record is written
    /// before the run so a restart can tell the script was started.
    async fn run_synchronously(&self, ctx: &TaskContext, command: &str) -> OrchestratorResult<()> {
        let job_name = ctx.process.job_name();
        let mut job = JobRecord::submitted(
            &ctx.process.process_id,
            &ctx.task.task_id,
            &job_name,
            &job_name,
        );
        job.observe(JobState::Active);
        ctx.save_job(&job).await?;

        let output = ctx
            .adaptor
            .run_command(
                command,
                Some(&ctx.process.working_directory),
                synchronous_run_timeout(&ctx.process, &ctx.config),
            )
            .await?;

        let state = if output.success() {
            JobState::Complete
        } else {
            JobState::Failed
        };
        job.observe(state);
        ctx.save_job(&job).await?;

        tracing::info!(
            process_id = %ctx.process.process_id,
            task_id = %ctx.task.task_id,
            job_name = %job_name,
            exit_code = output.exit_code,
            "Local job finished"
        );

        if output.success() {
            Ok(())
        } else {
            Err(OrchestratorError::JobFailed {
                job_id: job_name,
                state: format!("{state} (exit {})", output.exit_code),
            })
        }
    }

    /// Look for the job under its deterministic name
    async fn find_by_name(&self, ctx: &TaskContext) -> OrchestratorResult<Option<String>> {
        let job_name = ctx.process.job_name();
        let command = ctx
            .commands()
            .job_by_name_command(&job_name, &ctx.credential.username);
        let output = ctx
            .adaptor
            .run_command(&command, None, ctx.command_timeout())
            .await?;
        Ok(ctx.parser().parse_job_id_by_name(&output.stdout, &job_name))
    }
}

/// Direct execution runs the whole job inside the submission command
fn synchronous_run_timeout(process: &ProcessSpec, config: &OrchestratorConfig) -> Duration {
    Duration::from_secs(u64::from(process.scheduling.wall_time_minutes) * 60)
        + config.monitor.wall_time_grace()
}

#[async_trait]
impl TaskHandler for JobSubmissionHandler {
    fn task_type(&self) -> TaskType {
        TaskType::JobSubmission
    }

    async fn execute(&self, ctx: &TaskContext) -> OrchestratorResult<()> {
        self.submit(ctx).await
    }

    async fn recover(&self, ctx: &TaskContext) -> OrchestratorResult<()> {
        let kind = ctx.process.resource_manager();
        let existing = ctx.catalog.load_job_record(&ctx.process.process_id).await?;

        if let Some(job) = existing {
            match (kind, job.job_state) {
                (ResourceManagerKind::Local, JobState::Complete) => return Ok(()),
                (ResourceManagerKind::Local, JobState::Failed) => {
                    return Err(OrchestratorError::JobFailed {
                        job_id: job.job_name,
                        state: JobState::Failed.to_string(),
                    })
                }
                (ResourceManagerKind::Local, _) => {
                    // The script was started before the restart; only rerun it
                    // once no copy is left running
                    if let Some(pid) = self.find_by_name(ctx).await? {
                        return Err(OrchestratorError::AmbiguousRemoteState {
                            task_id: ctx.task.task_id.clone(),
                            reason: format!("job script still running as pid {pid}"),
                        });
                    }
                }
                (_, _) if job.job_id.is_some() => {
                    tracing::info!(
                        process_id = %ctx.process.process_id,
                        task_id = %ctx.task.task_id,
                        job_id = job.job_id.as_deref().unwrap_or_default(),
                        "Job already submitted; not resubmitting"
                    );
                    return Ok(());
                }
                _ => {}
            }
        }

        if kind.is_batch() {
            if let Some(job_id) = self.find_by_name(ctx).await? {
                let job = JobRecord::submitted(
                    &ctx.process.process_id,
                    &ctx.task.task_id,
                    &job_id,
                    ctx.process.job_name(),
                );
                ctx.save_job(&job).await?;
                tracing::info!(
                    process_id = %ctx.process.process_id,
                    task_id = %ctx.task.task_id,
                    job_id = %job_id,
                    "Found previously submitted job by name"
                );
                return Ok(());
            }
        }

        tracing::info!(
            process_id = %ctx.process.process_id,
            task_id = %ctx.task.task_id,
            attempt = ctx.attempt,
            "No earlier submission found; submitting"
        );
        self.submit(ctx).await
    }

    async fn cancel(&self, ctx: &TaskContext) -> OrchestratorResult<()> {
        cancel_job(ctx).await
    }

    fn deadline(&self, process: &ProcessSpec, config: &OrchestratorConfig) -> Duration {
        if process.resource_manager() == ResourceManagerKind::Local {
            synchronous_run_timeout(process, config) + config.execution.command_timeout()
        } else {
            config.execution.task_timeout()
        }
    }
}

/// Ask the resource manager to kill the process's job, if one is known and
/// still alive
pub(crate) async fn cancel_job(ctx: &TaskContext) -> OrchestratorResult<()> {
    let Some(mut job) = ctx.catalog.load_job_record(&ctx.process.process_id).await? else {
        return Ok(());
    };
    let Some(job_id) = job.job_id.clone() else {
        return Ok(());
    };
    if job.job_state.is_terminal() || ctx.process.resource_manager() == ResourceManagerKind::Local {
        // Local jobs die with the submission command
        return Ok(());
    }

    let command = ctx.commands().cancel_command(&job_id);
    ctx.adaptor
        .execute_command(&command, None, ctx.command_timeout())
        .await?;
    job.observe(JobState::Canceled);
    ctx.save_job(&job).await?;

    tracing::info!(
        process_id = %ctx.process.process_id,
        job_id = %job_id,
        "Job cancellation requested"
    );
    Ok(())
}
