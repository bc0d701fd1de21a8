//! # Status events
//!
//! Typed fan-out of task, job and process status changes to in-process
//! observers (logging, MONITOR push updates, embedding services).

pub mod publisher;
pub mod types;

pub use publisher::StatusPublisher;
pub use types::{JobNotificationEvent, JobStatusEvent, ProcessStatusEvent, TaskStatusEvent};
