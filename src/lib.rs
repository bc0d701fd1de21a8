#![allow(clippy::doc_markdown)] // Allow technical terms like SLURM, SSH in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # HPCFlow Core
//!
//! Task-DAG orchestration core for launching and supervising scientific jobs
//! on remote compute resources.
//!
//! ## Overview
//!
//! A process (one execution of an application on one compute resource) is
//! turned into a strictly ordered list of tasks: environment setup, input
//! staging, job submission, monitoring, output staging and cleanup. The
//! orchestrator dispatches them one at a time to type-specific worker
//! queues, retries transient failures with backoff, and can resume a process
//! after a restart from its persisted status history.
//!
//! ## Module Organization
//!
//! - [`models`] - Process, task and job records
//! - [`orchestration`] - Task factory, process orchestrator and bootstrap
//! - [`tasks`] - Handlers for each task type
//! - [`worker`] - Worker pool consuming the dispatch queues
//! - [`adaptors`] - Command execution and file transfer against a resource
//! - [`scheduler`] - Resource-manager command catalogue and job scripts
//! - [`parsing`] - Resource-manager output parsers
//! - [`messaging`] - Dispatch messages, queues and result channels
//! - [`events`] - Status event publisher
//! - [`catalog`] - Process catalog and credential resolution interfaces
//! - [`state_machine`] - Task and process lifecycles
//! - [`validation`] - Pre-flight checks
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hpcflow_core::catalog::{InMemoryCatalog, StaticCredentialResolver};
//! use hpcflow_core::config::ConfigLoader;
//! use hpcflow_core::orchestration::{BootstrapConfig, OrchestrationSystem};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().load()?;
//! hpcflow_core::logging::init_structured_logging(&config.logging);
//!
//! let system = OrchestrationSystem::bootstrap(BootstrapConfig::new(
//!     config,
//!     Arc::new(InMemoryCatalog::new()),
//!     Arc::new(StaticCredentialResolver::new()),
//! ))
//! .await?;
//!
//! // system.launch(&experiment, process).await?;
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod adaptors;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod parsing;
pub mod scheduler;
pub mod state_machine;
pub mod tasks;
pub mod validation;
pub mod worker;

pub use config::{ConfigLoader, OrchestratorConfig};
pub use error::{ErrorCategory, OrchestratorError, OrchestratorResult};
pub use models::{
    ExperimentSpec, JobRecord, JobState, ProcessSpec, ProcessStatus, ResourceManagerKind,
    TaskSpec, TaskStatus, TaskType,
};
pub use orchestration::{
    BootstrapConfig, OrchestrationSystem, ProcessOrchestrator, TaskFactory, TaskPointer,
};
pub use state_machine::{ProcessState, TaskState};
pub use validation::{DefaultValidationService, ValidationResult, ValidationService};
