//! # Orchestration Engine
//!
//! Drives each process through its ordered task list.
//!
//! ## Core Components
//!
//! - **TaskFactory**: derives the ordered task list from a process description
//! - **ProcessOrchestrator**: owns the task pointer of every live process,
//!   applies worker outcomes, retries with backoff, cancels and resumes
//! - **BackoffCalculator**: exponential retry delays with jitter
//! - **OrchestrationSystem**: bootstraps publisher, dispatcher, worker pool and
//!   orchestrator into one running engine

pub mod backoff_calculator;
pub mod bootstrap;
pub mod orchestrator;
pub mod process_state;
pub mod task_factory;

pub use backoff_calculator::{BackoffCalculator, BackoffResult};
pub use bootstrap::{BootstrapConfig, OrchestrationSystem};
pub use orchestrator::{EventDisposition, ProcessOrchestrator, ResumeOutcome};
pub use process_state::{EventGate, InFlight, ProcessExecutionState, TaskPointer};
pub use task_factory::{build_task_specs, TaskFactory};
