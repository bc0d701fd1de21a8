use super::ProcessCatalog;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{JobRecord, ProcessSpec, ProcessStatus, TaskSpec, TaskStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct CatalogState {
    processes: HashMap<String, ProcessSpec>,
    task_specs: HashMap<String, Vec<TaskSpec>>,
    /// Per process, in append order
    task_statuses: HashMap<String, Vec<TaskStatus>>,
    job_records: HashMap<String, JobRecord>,
    process_statuses: HashMap<String, ProcessStatus>,
}

/// Process catalog kept in memory
///
/// ```rust
/// use hpcflow_core::catalog::{InMemoryCatalog, ProcessCatalog};
/// use hpcflow_core::models::{JobRecord, JobState};
///
/// # tokio_test::block_on(async {
/// let catalog = InMemoryCatalog::new();
/// let job = JobRecord::submitted("P1", "P1.02.job_submission", "2477982", "hf_P1");
/// catalog.save_job_record(&job).await.unwrap();
///
/// let stored = catalog.load_job_record("P1").await.unwrap().unwrap();
/// assert_eq!(stored.job_state, JobState::Submitted);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status record of a process in append order
    pub fn status_log(&self, process_id: &str) -> Vec<TaskStatus> {
        self.state
            .read()
            .task_statuses
            .get(process_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProcessCatalog for InMemoryCatalog {
    async fn load_process(&self, process_id: &str) -> OrchestratorResult<ProcessSpec> {
        self.state
            .read()
            .processes
            .get(process_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::ProcessNotFound(process_id.to_string()))
    }

    async fn save_process(&self, spec: &ProcessSpec) -> OrchestratorResult<()> {
        self.state
            .write()
            .processes
            .insert(spec.process_id.clone(), spec.clone());
        Ok(())
    }

    async fn save_task_specs(
        &self,
        process_id: &str,
        specs: &[TaskSpec],
    ) -> OrchestratorResult<()> {
        let mut ordered = specs.to_vec();
        ordered.sort_by_key(|t| t.order_index);
        self.state
            .write()
            .task_specs
            .insert(process_id.to_string(), ordered);
        Ok(())
    }

    async fn load_task_specs(&self, process_id: &str) -> OrchestratorResult<Vec<TaskSpec>> {
        self.state
            .read()
            .task_specs
            .get(process_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::ProcessNotFound(process_id.to_string()))
    }

    async fn load_task_spec(&self, process_id: &str, task_id: &str) -> OrchestratorResult<TaskSpec> {
        self.state
            .read()
            .task_specs
            .get(process_id)
            .and_then(|specs| specs.iter().find(|t| t.task_id == task_id))
            .cloned()
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))
    }

    async fn save_task_status(&self, status: &TaskStatus) -> OrchestratorResult<()> {
        self.state
            .write()
            .task_statuses
            .entry(status.process_id.clone())
            .or_default()
            .push(status.clone());
        Ok(())
    }

    async fn load_last_status(&self, process_id: &str) -> OrchestratorResult<Option<TaskStatus>> {
        Ok(self
            .state
            .read()
            .task_statuses
            .get(process_id)
            .and_then(|log| log.last())
            .cloned())
    }

    async fn load_task_history(
        &self,
        process_id: &str,
        task_id: &str,
    ) -> OrchestratorResult<Vec<TaskStatus>> {
        Ok(self
            .state
            .read()
            .task_statuses
            .get(process_id)
            .map(|log| {
                log.iter()
                    .filter(|s| s.task_id == task_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save_job_record(&self, record: &JobRecord) -> OrchestratorResult<()> {
        self.state
            .write()
            .job_records
            .insert(record.process_id.clone(), record.clone());
        Ok(())
    }

    async fn load_job_record(&self, process_id: &str) -> OrchestratorResult<Option<JobRecord>> {
        Ok(self.state.read().job_records.get(process_id).cloned())
    }

    async fn save_process_status(&self, status: &ProcessStatus) -> OrchestratorResult<()> {
        self.state
            .write()
            .process_statuses
            .insert(status.process_id.clone(), status.clone());
        Ok(())
    }

    async fn load_process_status(
        &self,
        process_id: &str,
    ) -> OrchestratorResult<Option<ProcessStatus>> {
        Ok(self.state.read().process_statuses.get(process_id).cloned())
    }
}
