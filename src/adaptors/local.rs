use super::{run_process, with_timeout, CommandOutput, ExecutionAdaptor};
use crate::error::{OrchestratorError, OrchestratorResult};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Runs commands and file operations on the orchestrator host
#[derive(Debug, Clone)]
pub struct LocalAdaptor {
    resource_id: String,
}

impl LocalAdaptor {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
        }
    }
}

async fn copy_file(from: &str, to: &str) -> OrchestratorResult<()> {
    if let Some(parent) = Path::new(to).parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| OrchestratorError::io(parent.display().to_string(), &e))?;
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| OrchestratorError::io(from, &e))?;
    Ok(())
}

#[async_trait]
impl ExecutionAdaptor for LocalAdaptor {
    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    async fn run_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
        timeout: Duration,
    ) -> OrchestratorResult<CommandOutput> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        tracing::debug!(resource_id = %self.resource_id, command = %command, "Running local command");
        run_process(cmd, command, timeout).await
    }

    async fn create_directory(&self, path: &str, timeout: Duration) -> OrchestratorResult<()> {
        with_timeout("create_directory", timeout, async {
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| OrchestratorError::io(path, &e))
        })
        .await
    }

    async fn copy_file_to(
        &self,
        local_path: &str,
        remote_path: &str,
        timeout: Duration,
    ) -> OrchestratorResult<()> {
        with_timeout("copy_file_to", timeout, copy_file(local_path, remote_path)).await
    }

    async fn copy_file_from(
        &self,
        remote_path: &str,
        local_path: &str,
        timeout: Duration,
    ) -> OrchestratorResult<()> {
        with_timeout("copy_file_from", timeout, copy_file(remote_path, local_path)).await
    }

    async fn list_directory(
        &self,
        path: &str,
        timeout: Duration,
    ) -> OrchestratorResult<Vec<String>> {
        with_timeout("list_directory", timeout, async {
            let mut entries = tokio::fs::read_dir(path)
                .await
                .map_err(|e| OrchestratorError::io(path, &e))?;
            let mut names = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| OrchestratorError::io(path, &e))?
            {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            names.sort();
            Ok(names)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_command_and_exit_codes() {
        let adaptor = LocalAdaptor::new("localhost");
        let output = adaptor
            .execute_command("echo hello", None, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");

        let err = adaptor
            .execute_command("echo oops >&2; exit 3", None, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::CommandExecution { exit_code: 3, ref stderr, .. } if stderr == "oops"
        ));
    }

    #[tokio::test]
    async fn test_file_operations() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();
        let adaptor = LocalAdaptor::new("localhost");

        let work = format!("{root}/work/nested");
        adaptor.create_directory(&work, TIMEOUT).await.unwrap();
        adaptor.create_directory(&work, TIMEOUT).await.unwrap();

        let source = format!("{root}/input.txt");
        tokio::fs::write(&source, "data").await.unwrap();
        adaptor
            .copy_file_to(&source, &format!("{work}/input.txt"), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(
            adaptor.list_directory(&work, TIMEOUT).await.unwrap(),
            vec!["input.txt".to_string()]
        );

        let missing = adaptor
            .copy_file_from(&format!("{work}/absent.txt"), &source, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(missing, OrchestratorError::FileNotFound { .. }));
        assert!(!missing.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout() {
        let adaptor = LocalAdaptor::new("localhost");
        let err = adaptor
            .run_command("sleep 5", None, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Timeout { .. }));
    }
}
