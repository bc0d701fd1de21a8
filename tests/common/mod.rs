//! Shared fixtures for the integration suites: process builders, a scripted
//! execution adaptor and a dispatcher that only records what it is handed.

#![allow(dead_code)]

use async_trait::async_trait;
use hpcflow_core::adaptors::{AdaptorFactory, CommandOutput, ExecutionAdaptor};
use hpcflow_core::catalog::{Credential, InMemoryCatalog, ProcessCatalog};
use hpcflow_core::config::{Environment, OrchestratorConfig};
use hpcflow_core::error::{OrchestratorError, OrchestratorResult};
use hpcflow_core::events::StatusPublisher;
use hpcflow_core::messaging::{TaskDispatchMessage, TaskDispatcher};
use hpcflow_core::models::{
    ComputeResource, DataObject, DataType, ExperimentSpec, JobRecord, ProcessSpec, ProcessStatus,
    TaskSpec, TaskStatus,
};
use hpcflow_core::tasks::TaskContext;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Process on `manager` reached through `protocol`, no inputs or outputs
pub fn process_spec(process_id: &str, manager: &str, protocol: &str) -> ProcessSpec {
    serde_json::from_value(json!({
        "process_id": process_id,
        "experiment_id": "EXP_1",
        "gateway_id": "gw",
        "user_id": "alice",
        "compute_resource": {
            "resource_id": "cluster",
            "host": "login.cluster",
            "resource_manager": manager,
            "protocol": protocol
        },
        "credential_token": "tok",
        "working_directory": format!("/scratch/alice/{process_id}"),
        "storage_directory": "/data/alice/EXP_1",
        "scheduling": {
            "node_count": 1,
            "cpu_count": 4,
            "queue_name": "normal",
            "wall_time_minutes": 30
        },
        "application": {"executable": "/opt/app/bin/run", "arguments": ["--steps", "10"]}
    }))
    .expect("valid process spec")
}

/// Local process with one staged input and a stdout capture
pub fn local_process_with_input(process_id: &str) -> ProcessSpec {
    let mut spec = process_spec(process_id, "local", "local");
    spec.inputs.push(DataObject::input(
        "mesh",
        "file:///data/alice/mesh.dat",
        DataType::Uri,
    ));
    spec.outputs
        .push(DataObject::output("log", None, DataType::Stdout));
    spec
}

pub fn experiment_for(spec: &ProcessSpec) -> ExperimentSpec {
    ExperimentSpec {
        experiment_id: spec.experiment_id.clone(),
        gateway_id: spec.gateway_id.clone(),
        name: "test experiment".to_string(),
        user_id: spec.user_id.clone(),
        inputs: Vec::new(),
        outputs: Vec::new(),
    }
}

/// Test profile with immediate retries and a private script directory
pub fn test_config(script_directory: &Path) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::for_environment(Environment::Test);
    config.execution.script_directory = script_directory.to_path_buf();
    config.execution.command_timeout_seconds = 5;
    config.execution.task_timeout_seconds = 10;
    config.events.log_status_events = false;
    config
}

pub fn credential() -> Credential {
    Credential::new("tok", "alice")
}

pub fn context(
    process: ProcessSpec,
    task: TaskSpec,
    attempt: u32,
    adaptor: Arc<MockAdaptor>,
    catalog: Arc<InMemoryCatalog>,
    config: OrchestratorConfig,
) -> TaskContext {
    TaskContext {
        process,
        task,
        attempt,
        credential: credential(),
        adaptor,
        catalog: catalog as Arc<dyn ProcessCatalog>,
        publisher: StatusPublisher::new(64),
        config: Arc::new(config),
    }
}

pub fn ok_output(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: 0,
    }
}

pub fn failed_output(exit_code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code,
    }
}

// ---------------------------------------------------------------------------
// MockAdaptor
// ---------------------------------------------------------------------------

struct Script {
    fragment: String,
    responses: VecDeque<OrchestratorResult<CommandOutput>>,
}

/// Execution adaptor answering commands from a script
///
/// A command is matched against registered fragments in registration order;
/// each fragment replays its responses in sequence and repeats the last one.
/// Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct MockAdaptor {
    scripts: Mutex<Vec<Script>>,
    commands: Mutex<Vec<String>>,
    uploads: Mutex<Vec<(String, String)>>,
    downloads: Mutex<Vec<(String, String)>>,
    directories: Mutex<Vec<String>>,
    missing_remote_files: Mutex<Vec<String>>,
    fail_create_directory: Mutex<VecDeque<OrchestratorError>>,
}

impl MockAdaptor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, fragment: &str, output: CommandOutput) -> &Self {
        self.respond_with(fragment, Ok(output))
    }

    pub fn respond_with(
        &self,
        fragment: &str,
        response: OrchestratorResult<CommandOutput>,
    ) -> &Self {
        let mut scripts = self.scripts.lock();
        match scripts.iter_mut().find(|s| s.fragment == fragment) {
            Some(script) => script.responses.push_back(response),
            None => scripts.push(Script {
                fragment: fragment.to_string(),
                responses: VecDeque::from([response]),
            }),
        }
        self
    }

    /// `copy_file_from` on this remote path fails with `FileNotFound`
    pub fn missing_remote_file(&self, path: &str) {
        self.missing_remote_files.lock().push(path.to_string());
    }

    pub fn fail_next_create_directory(&self, error: OrchestratorError) {
        self.fail_create_directory.lock().push_back(error);
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn commands_matching(&self, fragment: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.contains(fragment))
            .collect()
    }

    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().clone()
    }

    pub fn downloads(&self) -> Vec<(String, String)> {
        self.downloads.lock().clone()
    }

    pub fn directories(&self) -> Vec<String> {
        self.directories.lock().clone()
    }
}

#[async_trait]
impl ExecutionAdaptor for MockAdaptor {
    fn resource_id(&self) -> &str {
        "cluster"
    }

    async fn run_command(
        &self,
        command: &str,
        _working_dir: Option<&str>,
        _timeout: Duration,
    ) -> OrchestratorResult<CommandOutput> {
        self.commands.lock().push(command.to_string());
        let mut scripts = self.scripts.lock();
        let Some(script) = scripts.iter_mut().find(|s| command.contains(&s.fragment)) else {
            return Ok(CommandOutput::default());
        };
        if script.responses.len() > 1 {
            script
                .responses
                .pop_front()
                .unwrap_or_else(|| Ok(CommandOutput::default()))
        } else {
            script
                .responses
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(CommandOutput::default()))
        }
    }

    async fn create_directory(&self, path: &str, _timeout: Duration) -> OrchestratorResult<()> {
        if let Some(error) = self.fail_create_directory.lock().pop_front() {
            return Err(error);
        }
        self.directories.lock().push(path.to_string());
        Ok(())
    }

    async fn copy_file_to(
        &self,
        local_path: &str,
        remote_path: &str,
        _timeout: Duration,
    ) -> OrchestratorResult<()> {
        self.uploads
            .lock()
            .push((local_path.to_string(), remote_path.to_string()));
        Ok(())
    }

    async fn copy_file_from(
        &self,
        remote_path: &str,
        local_path: &str,
        _timeout: Duration,
    ) -> OrchestratorResult<()> {
        if self
            .missing_remote_files
            .lock()
            .iter()
            .any(|p| p == remote_path)
        {
            return Err(OrchestratorError::FileNotFound {
                path: remote_path.to_string(),
            });
        }
        self.downloads
            .lock()
            .push((remote_path.to_string(), local_path.to_string()));
        Ok(())
    }

    async fn list_directory(
        &self,
        _path: &str,
        _timeout: Duration,
    ) -> OrchestratorResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Factory handing out one shared mock
pub struct MockAdaptorFactory {
    pub adaptor: Arc<MockAdaptor>,
}

#[async_trait]
impl AdaptorFactory for MockAdaptorFactory {
    async fn create(
        &self,
        _resource: &ComputeResource,
        _gateway_id: &str,
        _user_id: &str,
        _credential: &Credential,
    ) -> OrchestratorResult<Arc<dyn ExecutionAdaptor>> {
        Ok(Arc::clone(&self.adaptor) as Arc<dyn ExecutionAdaptor>)
    }
}

// ---------------------------------------------------------------------------
// RecordingDispatcher
// ---------------------------------------------------------------------------

/// Dispatcher that records messages instead of delivering them
#[derive(Default)]
pub struct RecordingDispatcher {
    dispatched: Mutex<Vec<TaskDispatchMessage>>,
    cancels: Mutex<Vec<(String, String)>>,
    fail_dispatch: Mutex<bool>,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn dispatched(&self) -> Vec<TaskDispatchMessage> {
        self.dispatched.lock().clone()
    }

    pub fn last(&self) -> Option<TaskDispatchMessage> {
        self.dispatched.lock().last().cloned()
    }

    pub fn cancels(&self) -> Vec<(String, String)> {
        self.cancels.lock().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail_dispatch.lock() = failing;
    }
}

#[async_trait]
impl TaskDispatcher for RecordingDispatcher {
    async fn dispatch(&self, message: TaskDispatchMessage) -> OrchestratorResult<()> {
        if *self.fail_dispatch.lock() {
            return Err(OrchestratorError::Dispatch("queue unavailable".to_string()));
        }
        self.dispatched.lock().push(message);
        Ok(())
    }

    async fn cancel(&self, process_id: &str, task_id: &str) -> OrchestratorResult<bool> {
        self.cancels
            .lock()
            .push((process_id.to_string(), task_id.to_string()));
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// StallingDispatcher
// ---------------------------------------------------------------------------

/// Dispatcher whose hand-off never returns for the later tasks of one process
pub struct StallingDispatcher {
    stalled_process: String,
    dispatched: Mutex<Vec<TaskDispatchMessage>>,
}

impl StallingDispatcher {
    pub fn stalling(process_id: &str) -> Arc<Self> {
        Arc::new(Self {
            stalled_process: process_id.to_string(),
            dispatched: Mutex::new(Vec::new()),
        })
    }

    pub fn first_for(&self, process_id: &str) -> TaskDispatchMessage {
        self.dispatched
            .lock()
            .iter()
            .find(|m| m.process_id == process_id)
            .cloned()
            .expect("process had a task dispatched")
    }
}

#[async_trait]
impl TaskDispatcher for StallingDispatcher {
    async fn dispatch(&self, message: TaskDispatchMessage) -> OrchestratorResult<()> {
        let stall = message.process_id == self.stalled_process && message.order_index > 0;
        self.dispatched.lock().push(message);
        if stall {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn cancel(&self, _process_id: &str, _task_id: &str) -> OrchestratorResult<bool> {
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// UnreliableStatusCatalog
// ---------------------------------------------------------------------------

/// Catalog whose terminal process-status writes fail a set number of times
pub struct UnreliableStatusCatalog {
    pub inner: Arc<InMemoryCatalog>,
    failures_left: AtomicUsize,
}

impl UnreliableStatusCatalog {
    pub fn new(inner: Arc<InMemoryCatalog>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures_left: AtomicUsize::new(failures),
        })
    }
}

#[async_trait]
impl ProcessCatalog for UnreliableStatusCatalog {
    async fn load_process(&self, process_id: &str) -> OrchestratorResult<ProcessSpec> {
        self.inner.load_process(process_id).await
    }

    async fn save_process(&self, spec: &ProcessSpec) -> OrchestratorResult<()> {
        self.inner.save_process(spec).await
    }

    async fn save_task_specs(
        &self,
        process_id: &str,
        specs: &[TaskSpec],
    ) -> OrchestratorResult<()> {
        self.inner.save_task_specs(process_id, specs).await
    }

    async fn load_task_specs(&self, process_id: &str) -> OrchestratorResult<Vec<TaskSpec>> {
        self.inner.load_task_specs(process_id).await
    }

    async fn load_task_spec(
        &self,
        process_id: &str,
        task_id: &str,
    ) -> OrchestratorResult<TaskSpec> {
        self.inner.load_task_spec(process_id, task_id).await
    }

    async fn save_task_status(&self, status: &TaskStatus) -> OrchestratorResult<()> {
        self.inner.save_task_status(status).await
    }

    async fn load_last_status(&self, process_id: &str) -> OrchestratorResult<Option<TaskStatus>> {
        self.inner.load_last_status(process_id).await
    }

    async fn load_task_history(
        &self,
        process_id: &str,
        task_id: &str,
    ) -> OrchestratorResult<Vec<TaskStatus>> {
        self.inner.load_task_history(process_id, task_id).await
    }

    async fn save_job_record(&self, record: &JobRecord) -> OrchestratorResult<()> {
        self.inner.save_job_record(record).await
    }

    async fn load_job_record(&self, process_id: &str) -> OrchestratorResult<Option<JobRecord>> {
        self.inner.load_job_record(process_id).await
    }

    async fn save_process_status(&self, status: &ProcessStatus) -> OrchestratorResult<()> {
        let refused = status.state.is_terminal()
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if refused {
            return Err(OrchestratorError::catalog("status store unavailable"));
        }
        self.inner.save_process_status(status).await
    }

    async fn load_process_status(
        &self,
        process_id: &str,
    ) -> OrchestratorResult<Option<ProcessStatus>> {
        self.inner.load_process_status(process_id).await
    }
}
