use super::{TaskContext, TaskHandler};
use crate::error::OrchestratorResult;
use crate::models::TaskType;
use async_trait::async_trait;

/// Prepares the working directory on the compute resource
///
/// Also takes a look at the scheduler: an unavailable queue or the user's
/// current job count is reported but does not fail the task, since batch
/// schedulers accept submissions into closed queues.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSetupHandler;

impl EnvSetupHandler {
    async fn inspect_scheduler(&self, ctx: &TaskContext) {
        let kind = ctx.process.resource_manager();
        if !kind.is_batch() {
            return;
        }
        let commands = ctx.commands();
        let timeout = ctx.command_timeout();
        let queue = ctx.process.scheduling.queue_name.as_deref();

        match ctx
            .adaptor
            .run_command(&commands.availability_command(queue), None, timeout)
            .await
        {
            Ok(output) if !ctx.parser().is_resource_available(&output.stdout) => {
                tracing::warn!(
                    process_id = %ctx.process.process_id,
                    resource_id = %ctx.process.compute_resource.resource_id,
                    queue = queue.unwrap_or("default"),
                    "Resource reports no available queue"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Availability check skipped"),
        }

        if let Ok(output) = ctx
            .adaptor
            .run_command(&commands.job_count_command(&ctx.credential.username), None, timeout)
            .await
        {
            match ctx.parser().job_count(&output.stdout) {
                Ok(count) => tracing::debug!(
                    process_id = %ctx.process.process_id,
                    user = %ctx.credential.username,
                    jobs = count,
                    "Current job count"
                ),
                Err(e) => tracing::debug!(error = %e, "Job count unavailable"),
            }
        }
    }
}

#[async_trait]
impl TaskHandler for EnvSetupHandler {
    fn task_type(&self) -> TaskType {
        TaskType::EnvSetup
    }

    async fn execute(&self, ctx: &TaskContext) -> OrchestratorResult<()> {
        ctx.adaptor
            .create_directory(&ctx.process.working_directory, ctx.command_timeout())
            .await?;

        tracing::info!(
            process_id = %ctx.process.process_id,
            task_id = %ctx.task.task_id,
            working_directory = %ctx.process.working_directory,
            "Working directory ready"
        );

        self.inspect_scheduler(ctx).await;
        Ok(())
    }
}
