use crate::state_machine::states::TaskState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter keys understood by the task handlers
pub mod params {
    /// Name of the input/output the task moves
    pub const DATA_NAME: &str = "data_name";
    /// Path the file is read from
    pub const SOURCE: &str = "source";
    /// Path the file is written to
    pub const DESTINATION: &str = "destination";
    /// Intermediate staging tolerates a source that does not exist yet
    pub const OPTIONAL: &str = "optional";
}

/// Typed step of a process's execution DAG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    EnvSetup,
    InputStaging,
    JobSubmission,
    Monitor,
    OutputStaging,
    IntermediateStaging,
    Cleanup,
}

impl TaskType {
    pub fn all() -> [TaskType; 7] {
        [
            Self::EnvSetup,
            Self::InputStaging,
            Self::JobSubmission,
            Self::Monitor,
            Self::OutputStaging,
            Self::IntermediateStaging,
            Self::Cleanup,
        ]
    }

    /// Short form used when deriving task ids
    pub fn slug(&self) -> &'static str {
        match self {
            Self::EnvSetup => "env_setup",
            Self::InputStaging => "input_staging",
            Self::JobSubmission => "job_submission",
            Self::Monitor => "monitor",
            Self::OutputStaging => "output_staging",
            Self::IntermediateStaging => "intermediate_staging",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvSetup => write!(f, "ENV_SETUP"),
            Self::InputStaging => write!(f, "INPUT_STAGING"),
            Self::JobSubmission => write!(f, "JOB_SUBMISSION"),
            Self::Monitor => write!(f, "MONITOR"),
            Self::OutputStaging => write!(f, "OUTPUT_STAGING"),
            Self::IntermediateStaging => write!(f, "INTERMEDIATE_STAGING"),
            Self::Cleanup => write!(f, "CLEANUP"),
        }
    }
}

/// One step in the DAG of a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    /// Owning process
    pub process_id: String,
    pub task_type: TaskType,
    /// Position in the total order of the process, starting at 0
    pub order_index: u32,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl TaskSpec {
    pub fn new(process_id: &str, task_type: TaskType, order_index: u32) -> Self {
        Self {
            task_id: format!("{process_id}.{order_index:02}.{}", task_type.slug()),
            process_id: process_id.to_string(),
            task_type,
            order_index,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

/// Timestamped state record of a task; the history of a task is an
/// append-only list of these
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub process_id: String,
    pub order_index: u32,
    pub state: TaskState,
    pub timestamp: DateTime<Utc>,
    /// 1-based attempt number the record belongs to
    pub attempt: u32,
    /// Only meaningful on FAILED records
    #[serde(default)]
    pub retryable: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl TaskStatus {
    pub fn new(task: &TaskSpec, state: TaskState, attempt: u32) -> Self {
        Self {
            task_id: task.task_id.clone(),
            process_id: task.process_id.clone(),
            order_index: task.order_index,
            state,
            timestamp: Utc::now(),
            attempt,
            retryable: false,
            reason: None,
        }
    }

    pub fn failed(task: &TaskSpec, attempt: u32, retryable: bool, reason: impl Into<String>) -> Self {
        Self {
            retryable,
            reason: Some(reason.into()),
            ..Self::new(task, TaskState::Failed, attempt)
        }
    }

    /// Retries consumed before this record was written
    pub fn retry_count(&self) -> u32 {
        self.attempt.saturating_sub(1)
    }
}
