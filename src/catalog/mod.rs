//! # Catalog and credential interfaces
//!
//! The orchestrator consults, but does not own, process descriptions and
//! status history. These traits are the seams to whatever store the
//! embedding service uses; [`InMemoryCatalog`] and
//! [`StaticCredentialResolver`] are reference implementations.

pub mod credentials;
pub mod memory;

use crate::error::OrchestratorResult;
use crate::models::{JobRecord, ProcessSpec, ProcessStatus, TaskSpec, TaskStatus};
use async_trait::async_trait;

pub use credentials::{Credential, CredentialResolver, StaticCredentialResolver};
pub use memory::InMemoryCatalog;

/// Read access to process descriptions and append-only status persistence
#[async_trait]
pub trait ProcessCatalog: Send + Sync {
    async fn load_process(&self, process_id: &str) -> OrchestratorResult<ProcessSpec>;

    async fn save_process(&self, spec: &ProcessSpec) -> OrchestratorResult<()>;

    /// Persist the task list of a process, replacing any previous list
    async fn save_task_specs(&self, process_id: &str, specs: &[TaskSpec])
        -> OrchestratorResult<()>;

    /// Task list ordered by order index
    async fn load_task_specs(&self, process_id: &str) -> OrchestratorResult<Vec<TaskSpec>>;

    async fn load_task_spec(&self, process_id: &str, task_id: &str)
        -> OrchestratorResult<TaskSpec>;

    /// Append a status record; history is never rewritten
    async fn save_task_status(&self, status: &TaskStatus) -> OrchestratorResult<()>;

    /// Most recently appended status record of any task of the process
    async fn load_last_status(&self, process_id: &str) -> OrchestratorResult<Option<TaskStatus>>;

    /// All records of one task, oldest first
    async fn load_task_history(
        &self,
        process_id: &str,
        task_id: &str,
    ) -> OrchestratorResult<Vec<TaskStatus>>;

    async fn save_job_record(&self, record: &JobRecord) -> OrchestratorResult<()>;

    async fn load_job_record(&self, process_id: &str) -> OrchestratorResult<Option<JobRecord>>;

    async fn save_process_status(&self, status: &ProcessStatus) -> OrchestratorResult<()>;

    async fn load_process_status(
        &self,
        process_id: &str,
    ) -> OrchestratorResult<Option<ProcessStatus>>;
}
