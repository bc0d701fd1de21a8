//! # Execution adaptors
//!
//! Uniform access to a compute resource regardless of protocol: run a
//! command, create a directory, move files, list a directory. Every call
//! carries a caller-supplied timeout; expiry yields a retryable
//! [`OrchestratorError::Timeout`] instead of a hang.
//!
//! Adaptors are created by an [`AdaptorFactory`] and cached by the
//! [`AdaptorPool`], which also bounds concurrent commands per resource.

pub mod local;
pub mod pool;
pub mod ssh;

use crate::catalog::Credential;
use crate::config::AdaptorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{ComputeResource, JobSubmissionProtocol};
use async_trait::async_trait;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

pub use local::LocalAdaptor;
pub use pool::{AdaptorKey, AdaptorPool};
pub use ssh::SshAdaptor;

/// Captured result of a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a nonzero exit into a `CommandExecution` error
    pub fn into_result(self, command: &str) -> OrchestratorResult<CommandOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(OrchestratorError::CommandExecution {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

#[async_trait]
pub trait ExecutionAdaptor: Send + Sync {
    fn resource_id(&self) -> &str;

    /// Run a command and return its output whatever the exit code
    async fn run_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
        timeout: Duration,
    ) -> OrchestratorResult<CommandOutput>;

    /// Run a command; a nonzero exit fails with `CommandExecution`
    async fn execute_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
        timeout: Duration,
    ) -> OrchestratorResult<CommandOutput> {
        self.run_command(command, working_dir, timeout)
            .await?
            .into_result(command)
    }

    /// Create a directory and its parents; an existing directory is fine
    async fn create_directory(&self, path: &str, timeout: Duration) -> OrchestratorResult<()>;

    async fn copy_file_to(
        &self,
        local_path: &str,
        remote_path: &str,
        timeout: Duration,
    ) -> OrchestratorResult<()>;

    async fn copy_file_from(
        &self,
        remote_path: &str,
        local_path: &str,
        timeout: Duration,
    ) -> OrchestratorResult<()>;

    /// Entry names, sorted
    async fn list_directory(&self, path: &str, timeout: Duration)
        -> OrchestratorResult<Vec<String>>;

    /// Release the session; later calls may reconnect
    async fn close(&self) {}
}

/// Creates adaptors for a (resource, protocol, credential) tuple
#[async_trait]
pub trait AdaptorFactory: Send + Sync {
    async fn create(
        &self,
        resource: &ComputeResource,
        gateway_id: &str,
        user_id: &str,
        credential: &Credential,
    ) -> OrchestratorResult<Arc<dyn ExecutionAdaptor>>;
}

/// Serves local and SSH protocols
#[derive(Debug, Clone)]
pub struct DefaultAdaptorFactory {
    config: AdaptorConfig,
}

impl DefaultAdaptorFactory {
    pub fn new(config: AdaptorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AdaptorFactory for DefaultAdaptorFactory {
    async fn create(
        &self,
        resource: &ComputeResource,
        gateway_id: &str,
        user_id: &str,
        credential: &Credential,
    ) -> OrchestratorResult<Arc<dyn ExecutionAdaptor>> {
        tracing::debug!(
            resource_id = %resource.resource_id,
            protocol = %resource.protocol,
            gateway_id = %gateway_id,
            user_id = %user_id,
            "Creating execution adaptor"
        );

        match resource.protocol {
            JobSubmissionProtocol::Local => {
                Ok(Arc::new(LocalAdaptor::new(resource.resource_id.clone())))
            }
            JobSubmissionProtocol::Ssh | JobSubmissionProtocol::SshFork => {
                let adaptor = SshAdaptor::connect(resource, credential, &self.config).await?;
                Ok(Arc::new(adaptor))
            }
            JobSubmissionProtocol::Cloud => Err(OrchestratorError::AdaptorInit {
                resource_id: resource.resource_id.clone(),
                reason: "no cloud agent adaptor is registered".to_string(),
            }),
        }
    }
}

/// Await `fut` for at most `duration`
pub(crate) async fn with_timeout<T>(
    operation: &str,
    duration: Duration,
    fut: impl Future<Output = OrchestratorResult<T>>,
) -> OrchestratorResult<T> {
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| OrchestratorError::Timeout {
            operation: operation.to_string(),
            duration,
        })?
}

/// Spawn a prepared command, capture its output, and kill it on timeout
pub(crate) async fn run_process(
    mut command: Command,
    operation: &str,
    timeout: Duration,
) -> OrchestratorResult<CommandOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    with_timeout(operation, timeout, async {
        let output = command
            .output()
            .await
            .map_err(|e| OrchestratorError::Io {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonzero_exit_becomes_command_error() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "permission denied\n".into(),
            exit_code: 2,
        };
        let err = output.into_result("mkdir /root/x").unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::CommandExecution {
                command: "mkdir /root/x".into(),
                exit_code: 2,
                stderr: "permission denied".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_cloud_protocol_is_not_served_by_default() {
        let factory = DefaultAdaptorFactory::new(AdaptorConfig::default());
        let resource = ComputeResource {
            resource_id: "cloud-1".into(),
            host: "agent".into(),
            port: 22,
            resource_manager: crate::models::ResourceManagerKind::Local,
            protocol: JobSubmissionProtocol::Cloud,
            max_wall_time_minutes: None,
        };
        let err = factory
            .create(&resource, "gw", "alice", &Credential::new("t", "alice"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, OrchestratorError::AdaptorInit { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let err = with_timeout("sleep", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::Timeout { .. }));
        assert!(err.is_retryable());
    }
}
