//! # Orchestration bootstrap
//!
//! Wires the engine together from an [`OrchestratorConfig`] and the injected
//! outbound collaborators (catalog, credential resolver, optionally an
//! adaptor factory, handler registry and validation service):
//!
//! ```text
//! launch ─► validate ─► TaskFactory ─► ProcessOrchestrator ─► ChannelDispatcher
//!                                           ▲                        │
//!                                           │ result channels        ▼
//!                                           └──────────────── TaskWorkerPool
//! ```
//!
//! The returned [`OrchestrationSystem`] is the handle embedders use to launch,
//! resume and cancel processes and to shut the engine down.

use super::orchestrator::{ProcessOrchestrator, ResumeOutcome};
use super::task_factory::TaskFactory;
use crate::adaptors::{AdaptorFactory, AdaptorPool, DefaultAdaptorFactory};
use crate::catalog::{CredentialResolver, ProcessCatalog};
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorResult;
use crate::events::StatusPublisher;
use crate::logging::log_process_operation;
use crate::messaging::{result_channels, ChannelDispatcher, TaskDispatcher};
use crate::models::{ExperimentSpec, ProcessSpec, TaskSpec};
use crate::state_machine::ProcessState;
use crate::tasks::TaskRegistry;
use crate::validation::{DefaultValidationService, ValidationService};
use crate::worker::{TaskExecutor, TaskWorkerPool};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Collaborators and overrides for [`OrchestrationSystem::bootstrap`]
pub struct BootstrapConfig {
    pub config: OrchestratorConfig,
    pub catalog: Arc<dyn ProcessCatalog>,
    pub credentials: Arc<dyn CredentialResolver>,
    /// Defaults to [`DefaultAdaptorFactory`] over `config.adaptors`
    pub adaptor_factory: Option<Arc<dyn AdaptorFactory>>,
    /// Defaults to [`TaskRegistry::with_defaults`]
    pub registry: Option<TaskRegistry>,
    /// Defaults to [`DefaultValidationService::new`]
    pub validation: Option<Arc<dyn ValidationService>>,
}

impl BootstrapConfig {
    pub fn new(
        config: OrchestratorConfig,
        catalog: Arc<dyn ProcessCatalog>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            config,
            catalog,
            credentials,
            adaptor_factory: None,
            registry: None,
            validation: None,
        }
    }

    pub fn with_adaptor_factory(mut self, factory: Arc<dyn AdaptorFactory>) -> Self {
        self.adaptor_factory = Some(factory);
        self
    }

    pub fn with_registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_validation(mut self, validation: Arc<dyn ValidationService>) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// Running engine handle
pub struct OrchestrationSystem {
    orchestrator: ProcessOrchestrator,
    catalog: Arc<dyn ProcessCatalog>,
    validation: Arc<dyn ValidationService>,
    publisher: StatusPublisher,
    workers: TaskWorkerPool,
    adaptors: Arc<AdaptorPool>,
    background: Mutex<Vec<JoinHandle<()>>>,
    config: Arc<OrchestratorConfig>,
}

impl std::fmt::Debug for OrchestrationSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationSystem")
            .field("orchestrator", &self.orchestrator)
            .field("workers", &self.workers)
            .finish()
    }
}

impl OrchestrationSystem {
    /// Build and start every component
    ///
    /// Must be called inside a tokio runtime; worker loops and result
    /// listeners are spawned immediately.
    pub async fn bootstrap(bootstrap: BootstrapConfig) -> OrchestratorResult<Self> {
        let BootstrapConfig {
            config,
            catalog,
            credentials,
            adaptor_factory,
            registry,
            validation,
        } = bootstrap;

        config.validate()?;
        let config = Arc::new(config);
        info!(
            max_task_retries = config.orchestration.max_task_retries,
            workers_per_task_type = config.execution.workers_per_task_type,
            "Bootstrapping orchestration system"
        );

        let publisher = StatusPublisher::new(config.events.channel_capacity);
        let mut background = Vec::new();
        if config.events.log_status_events {
            background.push(publisher.spawn_logging_subscriber());
        }

        let dispatcher = Arc::new(ChannelDispatcher::new(
            config.execution.dispatch_queue_capacity,
        ));
        let factory = adaptor_factory
            .unwrap_or_else(|| Arc::new(DefaultAdaptorFactory::new(config.adaptors.clone())));
        let adaptors = Arc::new(AdaptorPool::new(
            factory,
            config.adaptors.max_concurrent_commands_per_resource,
        ));
        let registry = Arc::new(registry.unwrap_or_else(TaskRegistry::with_defaults));
        let (senders, receivers) = result_channels(config.orchestration.result_channel_capacity);

        let executor = TaskExecutor::new(
            registry,
            Arc::clone(&catalog),
            credentials,
            Arc::clone(&adaptors),
            publisher.clone(),
            dispatcher.cancellations(),
            senders,
            Arc::clone(&config),
        );
        let workers = TaskWorkerPool::new(executor, config.execution.workers_per_task_type);
        workers.start(&dispatcher)?;

        let orchestrator = ProcessOrchestrator::new(
            Arc::clone(&catalog),
            dispatcher as Arc<dyn TaskDispatcher>,
            publisher.clone(),
            Arc::clone(&config),
        );
        background.extend(orchestrator.spawn_result_listeners(receivers));

        info!("Orchestration system started");
        Ok(Self {
            orchestrator,
            catalog,
            validation: validation.unwrap_or_else(|| Arc::new(DefaultValidationService::new())),
            publisher,
            workers,
            adaptors,
            background: Mutex::new(background),
            config,
        })
    }

    /// Validate a process, derive its tasks and start orchestrating it
    ///
    /// A validation failure is returned as-is; nothing is persisted.
    pub async fn launch(
        &self,
        experiment: &ExperimentSpec,
        process: ProcessSpec,
    ) -> OrchestratorResult<Vec<TaskSpec>> {
        self.validation
            .validate(experiment, &process)
            .await
            .into_result(&process.process_id)
            .inspect_err(|e| {
                log_process_operation("launch", &process.process_id, "REJECTED", Some(&e.to_string()))
            })?;

        let tasks = TaskFactory::build_task_specs(&process);
        self.orchestrator
            .register_process(process, tasks.clone())
            .await?;
        Ok(tasks)
    }

    pub async fn resume(&self, process_id: &str) -> OrchestratorResult<ResumeOutcome> {
        self.orchestrator.resume(process_id).await
    }

    pub async fn cancel_process(&self, process_id: &str) -> OrchestratorResult<ProcessState> {
        self.orchestrator.cancel_process(process_id).await
    }

    /// Last persisted process state, live or finished
    pub async fn process_state(&self, process_id: &str) -> OrchestratorResult<Option<ProcessState>> {
        if let Some(state) = self.orchestrator.process_state(process_id).await {
            return Ok(Some(state));
        }
        Ok(self
            .catalog
            .load_process_status(process_id)
            .await?
            .map(|status| status.state))
    }

    pub fn orchestrator(&self) -> &ProcessOrchestrator {
        &self.orchestrator
    }

    pub fn publisher(&self) -> &StatusPublisher {
        &self.publisher
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Stop workers, release adaptors and end the background loops
    ///
    /// Live processes are left as persisted; `resume` picks them up on the
    /// next start.
    pub async fn shutdown(&self) {
        info!(
            live_processes = self.orchestrator.live_processes(),
            "Shutting down orchestration system"
        );
        self.workers.shutdown().await;
        self.adaptors.shutdown().await;
        for handle in self.background.lock().drain(..) {
            handle.abort();
        }
        info!("Orchestration system stopped");
    }
}
