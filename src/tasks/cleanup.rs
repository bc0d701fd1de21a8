use super::{TaskContext, TaskHandler};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::TaskType;
use crate::scheduler::{shell_quote, JobScript};
use async_trait::async_trait;

/// Removes the local job script and, when requested, the remote working
/// directory. Running it twice is harmless.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupHandler;

#[async_trait]
impl TaskHandler for CleanupHandler {
    fn task_type(&self) -> TaskType {
        TaskType::Cleanup
    }

    async fn execute(&self, ctx: &TaskContext) -> OrchestratorResult<()> {
        let script = ctx
            .config
            .execution
            .script_directory
            .join(JobScript::render(&ctx.process).file_name());
        match tokio::fs::remove_file(&script).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(OrchestratorError::io(script.display().to_string(), &e)),
        }

        if ctx.process.cleanup_working_directory {
            let command = format!("rm -rf {}", shell_quote(&ctx.process.working_directory));
            ctx.adaptor
                .execute_command(&command, None, ctx.command_timeout())
                .await?;
            tracing::info!(
                process_id = %ctx.process.process_id,
                working_directory = %ctx.process.working_directory,
                "Working directory removed"
            );
        }

        Ok(())
    }
}
