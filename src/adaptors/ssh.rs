//! SSH backend built on the OpenSSH client binaries.
//!
//! One control-master socket per (user, host, port) keeps a single
//! authenticated connection alive across commands and file copies. All
//! invocations run in batch mode so a missing key fails fast instead of
//! prompting.

use super::{run_process, CommandOutput, ExecutionAdaptor};
use crate::catalog::Credential;
use crate::config::AdaptorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::ComputeResource;
use crate::scheduler::shell_quote;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// ssh reserves this exit status for its own connection failures
const SSH_CONNECTION_FAILURE: i32 = 255;

#[derive(Debug, Clone)]
pub struct SshAdaptor {
    resource_id: String,
    host: String,
    port: u16,
    username: String,
    identity_file: Option<PathBuf>,
    control_path: PathBuf,
    config: AdaptorConfig,
}

impl SshAdaptor {
    /// Build the adaptor and verify that a session can be opened
    pub async fn connect(
        resource: &ComputeResource,
        credential: &Credential,
        config: &AdaptorConfig,
    ) -> OrchestratorResult<Self> {
        let adaptor = Self::new(resource, credential, config);

        tokio::fs::create_dir_all(&config.control_directory)
            .await
            .map_err(|e| OrchestratorError::AdaptorInit {
                resource_id: resource.resource_id.clone(),
                reason: format!("cannot create control directory: {e}"),
            })?;

        let reachable = adaptor
            .run_command("true", None, config.connect_timeout())
            .await
            .map_err(|e| OrchestratorError::AdaptorInit {
                resource_id: resource.resource_id.clone(),
                reason: e.to_string(),
            })?;
        if !reachable.success() {
            return Err(OrchestratorError::AdaptorInit {
                resource_id: resource.resource_id.clone(),
                reason: reachable.stderr.trim().to_string(),
            });
        }

        tracing::info!(
            resource_id = %adaptor.resource_id,
            host = %adaptor.host,
            user = %adaptor.username,
            "SSH session established"
        );
        Ok(adaptor)
    }

    pub fn new(resource: &ComputeResource, credential: &Credential, config: &AdaptorConfig) -> Self {
        let control_path = config.control_directory.join(format!(
            "{}@{}-{}",
            credential.username, resource.host, resource.port
        ));
        Self {
            resource_id: resource.resource_id.clone(),
            host: resource.host.clone(),
            port: resource.port,
            username: credential.username.clone(),
            identity_file: credential.private_key_path.clone(),
            control_path,
            config: config.clone(),
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    /// Options shared by ssh and scp
    fn common_options(&self) -> Vec<String> {
        let mut options = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ControlMaster=auto".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path.display()),
            "-o".to_string(),
            format!("ControlPersist={}", self.config.control_persist_seconds),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_seconds),
        ];
        if let Some(identity) = &self.identity_file {
            options.push("-i".to_string());
            options.push(identity.display().to_string());
        }
        options
    }

    fn ssh_command(&self) -> Command {
        let mut cmd = Command::new(&self.config.ssh_binary);
        cmd.args(self.common_options())
            .arg("-p")
            .arg(self.port.to_string());
        cmd
    }

    fn scp_command(&self) -> Command {
        let mut cmd = Command::new(&self.config.scp_binary);
        cmd.args(self.common_options())
            .arg("-P")
            .arg(self.port.to_string());
        cmd
    }

    /// Remote shell line, changing directory first when asked
    pub fn remote_command_line(command: &str, working_dir: Option<&str>) -> String {
        match working_dir {
            Some(dir) => format!("cd {} && {command}", shell_quote(dir)),
            None => command.to_string(),
        }
    }

    async fn scp(&self, from: String, to: String, timeout: Duration) -> OrchestratorResult<()> {
        let mut cmd = self.scp_command();
        cmd.arg(&from).arg(&to);
        let operation = format!("scp {from} {to}");
        let output = run_process(cmd, &operation, timeout).await?;
        if output.success() {
            return Ok(());
        }
        if output.stderr.contains("No such file or directory") {
            return Err(OrchestratorError::FileNotFound { path: from });
        }
        Err(self.classify_failure(&operation, output))
    }

    fn classify_failure(&self, operation: &str, output: CommandOutput) -> OrchestratorError {
        if output.exit_code == SSH_CONNECTION_FAILURE {
            OrchestratorError::AdaptorInit {
                resource_id: self.resource_id.clone(),
                reason: output.stderr.trim().to_string(),
            }
        } else {
            OrchestratorError::CommandExecution {
                command: operation.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            }
        }
    }
}

#[async_trait]
impl ExecutionAdaptor for SshAdaptor {
    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    async fn run_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
        timeout: Duration,
    ) -> OrchestratorResult<CommandOutput> {
        let remote = Self::remote_command_line(command, working_dir);
        let mut cmd = self.ssh_command();
        cmd.arg(self.destination()).arg(&remote);
        tracing::debug!(resource_id = %self.resource_id, command = %remote, "Running remote command");
        run_process(cmd, command, timeout).await
    }

    async fn execute_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
        timeout: Duration,
    ) -> OrchestratorResult<CommandOutput> {
        let output = self.run_command(command, working_dir, timeout).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(self.classify_failure(command, output))
        }
    }

    async fn create_directory(&self, path: &str, timeout: Duration) -> OrchestratorResult<()> {
        self.execute_command(&format!("mkdir -p {}", shell_quote(path)), None, timeout)
            .await
            .map(|_| ())
    }

    async fn copy_file_to(
        &self,
        local_path: &str,
        remote_path: &str,
        timeout: Duration,
    ) -> OrchestratorResult<()> {
        let to = format!("{}:{}", self.destination(), remote_path);
        self.scp(local_path.to_string(), to, timeout).await
    }

    async fn copy_file_from(
        &self,
        remote_path: &str,
        local_path: &str,
        timeout: Duration,
    ) -> OrchestratorResult<()> {
        if let Some(parent) = std::path::Path::new(local_path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OrchestratorError::io(parent.display().to_string(), &e))?;
        }
        let from = format!("{}:{}", self.destination(), remote_path);
        self.scp(from, local_path.to_string(), timeout).await
    }

    async fn list_directory(
        &self,
        path: &str,
        timeout: Duration,
    ) -> OrchestratorResult<Vec<String>> {
        let output = self
            .execute_command(&format!("ls -1A {}", shell_quote(path)), None, timeout)
            .await?;
        let mut names: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn close(&self) {
        let mut cmd = self.ssh_command();
        cmd.arg("-O").arg("exit").arg(self.destination());
        if let Err(e) = run_process(cmd, "ssh -O exit", self.config.connect_timeout()).await {
            tracing::debug!(resource_id = %self.resource_id, error = %e, "Control master already gone");
        }
    }
}
