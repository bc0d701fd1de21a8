//! # Data model
//!
//! Process, task and job records exchanged between the orchestrator, the
//! workers and the external catalog.

pub mod experiment;
pub mod job;
pub mod process;
pub mod task;

pub use experiment::{ExperimentSpec, ProcessStatus};
pub use job::{JobNotification, JobRecord, JobState};
pub use process::{
    ApplicationSpec, ComputeResource, DataObject, DataType, JobSubmissionProtocol, ProcessSpec,
    ResourceManagerKind, ResourceScheduling,
};
pub use task::{params, TaskSpec, TaskStatus, TaskType};
