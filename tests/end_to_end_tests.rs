mod common;

use common::*;
use hpcflow_core::catalog::{InMemoryCatalog, ProcessCatalog, StaticCredentialResolver};
use hpcflow_core::error::OrchestratorError;
use hpcflow_core::events::ProcessStatusEvent;
use hpcflow_core::models::TaskType;
use hpcflow_core::orchestration::{BootstrapConfig, OrchestrationSystem};
use hpcflow_core::state_machine::{ProcessState, TaskState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

struct Engine {
    system: OrchestrationSystem,
    adaptor: Arc<MockAdaptor>,
    catalog: Arc<InMemoryCatalog>,
    _scripts: TempDir,
}

impl Engine {
    async fn start() -> Self {
        let scripts = TempDir::new().expect("temp dir");
        let adaptor = MockAdaptor::new();
        let catalog = Arc::new(InMemoryCatalog::new());
        let credentials = Arc::new(StaticCredentialResolver::new().with_credential(credential()));

        let bootstrap = BootstrapConfig::new(
            test_config(scripts.path()),
            Arc::clone(&catalog) as Arc<dyn ProcessCatalog>,
            credentials,
        )
        .with_adaptor_factory(Arc::new(MockAdaptorFactory {
            adaptor: Arc::clone(&adaptor),
        }));
        let system = OrchestrationSystem::bootstrap(bootstrap)
            .await
            .expect("bootstrap");

        Self {
            system,
            adaptor,
            catalog,
            _scripts: scripts,
        }
    }
}

async fn wait_for_terminal(
    events: &mut broadcast::Receiver<ProcessStatusEvent>,
    process_id: &str,
) -> ProcessStatusEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(event) if event.status.process_id == process_id && event.is_terminal() => {
                    return event;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("publisher closed"),
            }
        }
    })
    .await
    .expect("process reached a terminal state")
}

#[tokio::test]
async fn local_process_runs_to_completion() {
    let engine = Engine::start().await;
    let process = local_process_with_input("PROC_E2E_LOCAL");
    let experiment = experiment_for(&process);
    let mut events = engine.system.publisher().subscribe_process_status();

    let tasks = engine
        .system
        .launch(&experiment, process)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 5);

    let terminal = wait_for_terminal(&mut events, "PROC_E2E_LOCAL").await;
    assert_eq!(terminal.status.state, ProcessState::Completed);
    assert_eq!(
        engine.system.process_state("PROC_E2E_LOCAL").await.unwrap(),
        Some(ProcessState::Completed)
    );

    assert_eq!(engine.adaptor.directories(), vec!["/scratch/alice/PROC_E2E_LOCAL"]);
    assert_eq!(engine.adaptor.commands_matching("/bin/sh").len(), 1);
    // Script upload plus the staged input
    assert_eq!(engine.adaptor.uploads().len(), 2);
    assert_eq!(engine.adaptor.downloads().len(), 1);

    // Every task ran exactly once, in order
    let completed: Vec<String> = engine
        .catalog
        .status_log("PROC_E2E_LOCAL")
        .into_iter()
        .filter(|s| s.state == TaskState::Completed)
        .map(|s| s.task_id)
        .collect();
    let expected: Vec<String> = tasks.iter().map(|t| t.task_id.clone()).collect();
    assert_eq!(completed, expected);

    engine.system.shutdown().await;
}

#[tokio::test]
async fn batch_process_is_submitted_and_monitored() {
    let engine = Engine::start().await;
    let process = process_spec("PROC_E2E_SLURM", "slurm", "ssh");
    let experiment = experiment_for(&process);
    engine
        .adaptor
        .respond("sbatch", ok_output("Submitted batch job 2477982\n"));
    engine
        .adaptor
        .respond("squeue -j", ok_output("2477982 COMPLETED\n"));
    let mut events = engine.system.publisher().subscribe_process_status();

    let tasks = engine
        .system
        .launch(&experiment, process)
        .await
        .unwrap();
    assert!(tasks.iter().any(|t| t.task_type == TaskType::Monitor));

    let terminal = wait_for_terminal(&mut events, "PROC_E2E_SLURM").await;
    assert_eq!(terminal.status.state, ProcessState::Completed);

    let job = engine
        .catalog
        .load_job_record("PROC_E2E_SLURM")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.job_id.as_deref(), Some("2477982"));
    assert_eq!(engine.adaptor.commands_matching("sbatch").len(), 1);
    assert!(!engine.adaptor.commands_matching("squeue -j 2477982").is_empty());

    engine.system.shutdown().await;
}

#[tokio::test]
async fn failing_job_fails_the_process_at_submission() {
    let engine = Engine::start().await;
    let process = process_spec("PROC_E2E_FAIL", "local", "local");
    let experiment = experiment_for(&process);
    engine
        .adaptor
        .respond("/bin/sh", failed_output(2, "application crashed"));
    let mut events = engine.system.publisher().subscribe_process_status();

    let tasks = engine
        .system
        .launch(&experiment, process)
        .await
        .unwrap();

    let terminal = wait_for_terminal(&mut events, "PROC_E2E_FAIL").await;
    assert_eq!(terminal.status.state, ProcessState::Failed);
    let submission = tasks
        .iter()
        .find(|t| t.task_type == TaskType::JobSubmission)
        .unwrap();
    assert_eq!(
        terminal.status.failed_task_id.as_deref(),
        Some(submission.task_id.as_str())
    );
    // Non-retryable: one attempt only, and nothing ran after it
    assert_eq!(engine.adaptor.commands_matching("/bin/sh").len(), 1);
    assert!(engine.adaptor.downloads().is_empty());

    engine.system.shutdown().await;
}

#[tokio::test]
async fn invalid_process_is_rejected_before_anything_runs() {
    let engine = Engine::start().await;
    let mut process = local_process_with_input("PROC_E2E_INVALID");
    process.working_directory = "relative/dir".to_string();
    let experiment = experiment_for(&process);

    let err = engine
        .system
        .launch(&experiment, process)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Validation { .. }));
    assert_eq!(
        engine.system.process_state("PROC_E2E_INVALID").await.unwrap(),
        None
    );
    assert!(engine.adaptor.commands().is_empty());
    assert!(engine.adaptor.directories().is_empty());

    engine.system.shutdown().await;
}

#[tokio::test]
async fn duplicate_launch_is_refused() {
    let engine = Engine::start().await;
    let process = process_spec("PROC_E2E_DUP", "slurm", "ssh");
    let experiment = experiment_for(&process);
    // Keep the job queued so the process stays live
    engine
        .adaptor
        .respond("sbatch", ok_output("Submitted batch job 9\n"));
    engine
        .adaptor
        .respond("squeue -j", ok_output("9 PENDING\n"));

    engine
        .system
        .launch(&experiment, process.clone())
        .await
        .unwrap();
    assert!(engine.system.launch(&experiment, process).await.is_err());

    let state = engine.system.cancel_process("PROC_E2E_DUP").await.unwrap();
    assert!(matches!(
        state,
        ProcessState::Canceling | ProcessState::Canceled
    ));

    engine.system.shutdown().await;
}
