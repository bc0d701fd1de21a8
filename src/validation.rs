//! Pre-flight validation of experiment and process descriptions
//!
//! Runs once before a process is registered. Every rule runs and all messages
//! are collected, so a caller sees every problem with a submission at once.
//! A failing result never produces task history; it surfaces as
//! [`OrchestratorError::Validation`].

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{
    ExperimentSpec, JobSubmissionProtocol, ProcessSpec, ResourceManagerKind,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Longest queue or account name accepted by the scheduling rule
const MAX_SCHEDULER_NAME_LENGTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub pass: bool,
    pub messages: Vec<String>,
}

impl ValidationResult {
    pub fn passed() -> Self {
        Self {
            pass: true,
            messages: Vec::new(),
        }
    }

    pub fn from_messages(messages: Vec<String>) -> Self {
        Self {
            pass: messages.is_empty(),
            messages,
        }
    }

    /// Turn a failing result into the error reported to the caller
    pub fn into_result(self, process_id: &str) -> OrchestratorResult<()> {
        if self.pass {
            Ok(())
        } else {
            Err(OrchestratorError::Validation {
                process_id: process_id.to_string(),
                messages: self.messages,
            })
        }
    }
}

#[async_trait]
pub trait ValidationService: Send + Sync {
    async fn validate(&self, experiment: &ExperimentSpec, process: &ProcessSpec)
        -> ValidationResult;
}

/// One independent rule; returns zero or more messages
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, experiment: &ExperimentSpec, process: &ProcessSpec) -> Vec<String>;
}

/// Runs every registered rule and merges their messages
#[derive(Clone)]
pub struct DefaultValidationService {
    validators: Vec<Arc<dyn Validator>>,
}

impl std::fmt::Debug for DefaultValidationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.validators.iter().map(|v| v.name()).collect();
        f.debug_struct("DefaultValidationService")
            .field("validators", &names)
            .finish()
    }
}

impl Default for DefaultValidationService {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultValidationService {
    pub fn new() -> Self {
        Self {
            validators: vec![
                Arc::new(IdentityValidator),
                Arc::new(RequiredInputsValidator),
                Arc::new(SchedulingValidator),
                Arc::new(ProtocolValidator),
                Arc::new(WorkingDirectoryValidator),
                Arc::new(ApplicationValidator),
            ],
        }
    }

    /// Service with no rules; everything passes until rules are added
    pub fn empty() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }
}

#[async_trait]
impl ValidationService for DefaultValidationService {
    async fn validate(
        &self,
        experiment: &ExperimentSpec,
        process: &ProcessSpec,
    ) -> ValidationResult {
        let mut messages = Vec::new();
        for validator in &self.validators {
            let found = validator.check(experiment, process);
            if !found.is_empty() {
                tracing::debug!(
                    process_id = %process.process_id,
                    validator = validator.name(),
                    problems = found.len(),
                    "Validation rule failed"
                );
            }
            messages.extend(found);
        }
        ValidationResult::from_messages(messages)
    }
}

/// The process must belong to the experiment it is launched under
pub struct IdentityValidator;

impl Validator for IdentityValidator {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn check(&self, experiment: &ExperimentSpec, process: &ProcessSpec) -> Vec<String> {
        let mut messages = Vec::new();
        if process.process_id.trim().is_empty() {
            messages.push("process id is empty".to_string());
        }
        if process.experiment_id != experiment.experiment_id {
            messages.push(format!(
                "process belongs to experiment {}, not {}",
                process.experiment_id, experiment.experiment_id
            ));
        }
        if process.gateway_id != experiment.gateway_id {
            messages.push(format!(
                "process gateway {} does not match experiment gateway {}",
                process.gateway_id, experiment.gateway_id
            ));
        }
        messages
    }
}

/// Required inputs need a value on the process, falling back to the
/// experiment's declaration
pub struct RequiredInputsValidator;

impl Validator for RequiredInputsValidator {
    fn name(&self) -> &'static str {
        "required_inputs"
    }

    fn check(&self, experiment: &ExperimentSpec, process: &ProcessSpec) -> Vec<String> {
        let has_value = |value: &Option<String>| {
            value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
        };

        let mut messages = Vec::new();
        for input in process.inputs.iter().filter(|i| i.required) {
            if !has_value(&input.value) {
                messages.push(format!("required input {} has no value", input.name));
            }
        }
        for declared in experiment.inputs.iter().filter(|i| i.required) {
            match process.inputs.iter().find(|i| i.name == declared.name) {
                Some(_) => {}
                None if has_value(&declared.value) => {}
                None => messages.push(format!(
                    "required experiment input {} is missing from the process",
                    declared.name
                )),
            }
        }
        messages
    }
}

pub struct SchedulingValidator;

impl Validator for SchedulingValidator {
    fn name(&self) -> &'static str {
        "scheduling"
    }

    fn check(&self, _experiment: &ExperimentSpec, process: &ProcessSpec) -> Vec<String> {
        let scheduling = &process.scheduling;
        let mut messages = Vec::new();

        if scheduling.node_count < 1 {
            messages.push("node count must be at least 1".to_string());
        }
        if scheduling.cpu_count < scheduling.node_count {
            messages.push(format!(
                "cpu count {} is smaller than node count {}",
                scheduling.cpu_count, scheduling.node_count
            ));
        }
        if scheduling.wall_time_minutes == 0 {
            messages.push("wall time must be greater than zero".to_string());
        }
        if let Some(limit) = process.compute_resource.max_wall_time_minutes {
            if scheduling.wall_time_minutes > limit {
                messages.push(format!(
                    "wall time {} minutes exceeds the resource limit of {limit}",
                    scheduling.wall_time_minutes
                ));
            }
        }

        let queue = scheduling.queue_name.as_deref().unwrap_or("").trim();
        if process.resource_manager().is_batch() && queue.is_empty() {
            messages.push(format!(
                "a queue is required for {} submissions",
                process.resource_manager()
            ));
        }
        for (field, value) in [
            ("queue", scheduling.queue_name.as_deref()),
            ("account", scheduling.account.as_deref()),
        ] {
            let Some(value) = value else { continue };
            if value.chars().any(char::is_control) {
                messages.push(format!("{field} name contains control characters"));
            }
            if value.len() > MAX_SCHEDULER_NAME_LENGTH {
                messages.push(format!(
                    "{field} name too long: {} chars (max: {MAX_SCHEDULER_NAME_LENGTH})",
                    value.len()
                ));
            }
        }
        messages
    }
}

/// Access protocol and resource manager must be usable together
pub struct ProtocolValidator;

impl Validator for ProtocolValidator {
    fn name(&self) -> &'static str {
        "protocol"
    }

    fn check(&self, _experiment: &ExperimentSpec, process: &ProcessSpec) -> Vec<String> {
        let manager = process.resource_manager();
        let protocol = process.protocol();
        let compatible = match protocol {
            JobSubmissionProtocol::Local | JobSubmissionProtocol::Ssh => true,
            JobSubmissionProtocol::SshFork | JobSubmissionProtocol::Cloud => {
                manager == ResourceManagerKind::Local
            }
        };

        let mut messages = Vec::new();
        if !compatible {
            messages.push(format!(
                "protocol {protocol} cannot submit to resource manager {manager}"
            ));
        }
        if protocol == JobSubmissionProtocol::Ssh && process.compute_resource.host.trim().is_empty()
        {
            messages.push("ssh protocol requires a host".to_string());
        }
        messages
    }
}

pub struct WorkingDirectoryValidator;

impl Validator for WorkingDirectoryValidator {
    fn name(&self) -> &'static str {
        "working_directory"
    }

    fn check(&self, _experiment: &ExperimentSpec, process: &ProcessSpec) -> Vec<String> {
        let mut messages = Vec::new();
        for (field, path) in [
            ("working directory", process.working_directory.as_str()),
            ("storage directory", process.storage_directory.as_str()),
        ] {
            if !path.starts_with('/') {
                messages.push(format!("{field} {path:?} is not absolute"));
            }
            if path.split('/').any(|segment| segment == "..") {
                messages.push(format!("{field} {path:?} contains '..'"));
            }
            if path.trim_end_matches('/').is_empty() {
                messages.push(format!("{field} cannot be the filesystem root"));
            }
        }
        messages
    }
}

pub struct ApplicationValidator;

impl Validator for ApplicationValidator {
    fn name(&self) -> &'static str {
        "application"
    }

    fn check(&self, _experiment: &ExperimentSpec, process: &ProcessSpec) -> Vec<String> {
        if process.application.executable.trim().is_empty() {
            vec!["application executable is empty".to_string()]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataObject, DataType};
    use serde_json::json;

    fn process(manager: &str, protocol: &str) -> ProcessSpec {
        serde_json::from_value(json!({
            "process_id": "PROC_1",
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
            "working_directory": "/scratch/alice/PROC_1",
            "storage_directory": "/data/alice/EXP_1",
            "scheduling": {
                "node_count": 1,
                "cpu_count": 4,
                "queue_name": "normal",
                "wall_time_minutes": 30
            },
            "application": {"executable": "/opt/app/bin/run"}
        }))
        .unwrap()
    }

    fn experiment() -> ExperimentSpec {
        serde_json::from_value(json!({
            "experiment_id": "EXP_1",
            "gateway_id": "gw",
            "name": "demo",
            "user_id": "alice"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_process_passes() {
        let result = DefaultValidationService::new()
            .validate(&experiment(), &process("slurm", "ssh"))
            .await;
        assert!(result.pass, "{:?}", result.messages);
    }

    #[tokio::test]
    async fn test_all_rules_report() {
        let mut spec = process("slurm", "ssh_fork");
        spec.experiment_id = "OTHER".to_string();
        spec.scheduling.node_count = 0;
        spec.scheduling.wall_time_minutes = 0;
        spec.working_directory = "/".to_string();
        spec.application.executable = String::new();

        let result = DefaultValidationService::new()
            .validate(&experiment(), &spec)
            .await;
        assert!(!result.pass);
        assert!(result.messages.iter().any(|m| m.contains("experiment OTHER")));
        assert!(result.messages.iter().any(|m| m.contains("node count")));
        assert!(result.messages.iter().any(|m| m.contains("wall time")));
        assert!(result.messages.iter().any(|m| m.contains("ssh_fork")));
        assert!(result.messages.iter().any(|m| m.contains("filesystem root")));
        assert!(result.messages.iter().any(|m| m.contains("executable")));

        let error = result.into_result("PROC_1").unwrap_err();
        assert!(matches!(error, OrchestratorError::Validation { .. }));
    }

    #[test]
    fn test_batch_requires_queue_but_local_does_not() {
        let mut batch = process("pbs", "ssh");
        batch.scheduling.queue_name = None;
        assert_eq!(SchedulingValidator.check(&experiment(), &batch).len(), 1);

        let mut local = process("local", "local");
        local.scheduling.queue_name = None;
        assert!(SchedulingValidator.check(&experiment(), &local).is_empty());
    }

    #[test]
    fn test_required_input_without_value() {
        let mut spec = process("local", "local");
        let mut input = DataObject::input("mesh", "", DataType::Uri);
        input.required = true;
        spec.inputs.push(input);
        let messages = RequiredInputsValidator.check(&experiment(), &spec);
        assert_eq!(messages, vec!["required input mesh has no value".to_string()]);
    }

    #[test]
    fn test_working_directory_traversal_rejected() {
        let mut spec = process("local", "local");
        spec.working_directory = "/scratch/../etc".to_string();
        let messages = WorkingDirectoryValidator.check(&experiment(), &spec);
        assert!(messages[0].contains("'..'"));
    }
}
