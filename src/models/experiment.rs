use super::process::DataObject;
use crate::state_machine::states::ProcessState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Experiment a process belongs to, as seen by pre-flight validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub experiment_id: String,
    pub gateway_id: String,
    pub name: String,
    pub user_id: String,
    #[serde(default)]
    pub inputs: Vec<DataObject>,
    #[serde(default)]
    pub outputs: Vec<DataObject>,
}

/// Timestamped process-level status, persisted through the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub process_id: String,
    pub state: ProcessState,
    pub timestamp: DateTime<Utc>,
    /// Task whose failure ended the process
    #[serde(default)]
    pub failed_task_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ProcessStatus {
    pub fn new(process_id: impl Into<String>, state: ProcessState) -> Self {
        Self {
            process_id: process_id.into(),
            state,
            timestamp: Utc::now(),
            failed_task_id: None,
            reason: None,
        }
    }

    pub fn failed(
        process_id: impl Into<String>,
        task_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            failed_task_id: Some(task_id.into()),
            reason: Some(reason.into()),
            ..Self::new(process_id, ProcessState::Failed)
        }
    }
}
