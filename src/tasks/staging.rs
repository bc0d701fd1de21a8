//! File movement between gateway storage and the compute resource.
//!
//! Copies are idempotent: repeating one overwrites the destination with the
//! same bytes, so `recover` simply copies again.

use super::{local_path, TaskContext, TaskHandler};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{params, TaskType};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Gateway storage to working directory
    Inbound,
    /// Working directory to gateway storage, after the job
    Outbound,
    /// Working directory to gateway storage, while the job runs
    Intermediate,
}

#[derive(Debug, Clone, Copy)]
pub struct StagingHandler {
    direction: Direction,
}

impl StagingHandler {
    pub fn input() -> Self {
        Self {
            direction: Direction::Inbound,
        }
    }

    pub fn output() -> Self {
        Self {
            direction: Direction::Outbound,
        }
    }

    pub fn intermediate() -> Self {
        Self {
            direction: Direction::Intermediate,
        }
    }

    /// A missing remote file is tolerated for intermediate fetches and for
    /// outputs not marked required
    fn tolerates_missing_source(&self, ctx: &TaskContext, data_name: &str) -> bool {
        match self.direction {
            Direction::Inbound => false,
            Direction::Intermediate => ctx.task.parameter(params::OPTIONAL) == Some("true"),
            Direction::Outbound => !ctx
                .process
                .outputs
                .iter()
                .find(|o| o.name == data_name)
                .map(|o| o.required)
                .unwrap_or(false),
        }
    }
}

#[async_trait]
impl TaskHandler for StagingHandler {
    fn task_type(&self) -> TaskType {
        match self.direction {
            Direction::Inbound => TaskType::InputStaging,
            Direction::Outbound => TaskType::OutputStaging,
            Direction::Intermediate => TaskType::IntermediateStaging,
        }
    }

    async fn execute(&self, ctx: &TaskContext) -> OrchestratorResult<()> {
        let data_name = ctx.parameter(params::DATA_NAME)?;

        // Values that are not files have nothing to move
        let Some(source) = ctx.task.parameter(params::SOURCE) else {
            tracing::debug!(
                process_id = %ctx.process.process_id,
                task_id = %ctx.task.task_id,
                data_name = %data_name,
                "Nothing to stage"
            );
            return Ok(());
        };
        let destination = ctx.parameter(params::DESTINATION)?;
        let timeout = ctx.command_timeout();

        let result = match self.direction {
            Direction::Inbound => {
                ctx.adaptor
                    .copy_file_to(local_path(source), destination, timeout)
                    .await
            }
            Direction::Outbound | Direction::Intermediate => {
                ctx.adaptor
                    .copy_file_from(source, local_path(destination), timeout)
                    .await
            }
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    process_id = %ctx.process.process_id,
                    task_id = %ctx.task.task_id,
                    data_name = %data_name,
                    source = %source,
                    destination = %destination,
                    "Staged file"
                );
                Ok(())
            }
            Err(OrchestratorError::FileNotFound { path })
                if self.tolerates_missing_source(ctx, data_name) =>
            {
                tracing::warn!(
                    process_id = %ctx.process.process_id,
                    task_id = %ctx.task.task_id,
                    data_name = %data_name,
                    path = %path,
                    "Source not present; skipped"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
