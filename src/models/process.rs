//! # Process model
//!
//! Read-only description of one execution attempt of an experiment on a
//! compute resource. The catalog owns these records; the orchestrator and
//! workers only ever hold copies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Batch scheduler (or direct execution backend) fronting a compute resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceManagerKind {
    Slurm,
    Pbs,
    Lsf,
    Uge,
    /// Direct execution on the target host, no scheduler involved
    Local,
}

impl ResourceManagerKind {
    /// Batch schedulers accept a job and return immediately; the job runs later
    pub fn is_batch(&self) -> bool {
        !matches!(self, Self::Local)
    }

    pub fn all() -> [ResourceManagerKind; 5] {
        [Self::Slurm, Self::Pbs, Self::Lsf, Self::Uge, Self::Local]
    }
}

impl fmt::Display for ResourceManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slurm => write!(f, "slurm"),
            Self::Pbs => write!(f, "pbs"),
            Self::Lsf => write!(f, "lsf"),
            Self::Uge => write!(f, "uge"),
            Self::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for ResourceManagerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slurm" => Ok(Self::Slurm),
            "pbs" | "torque" => Ok(Self::Pbs),
            "lsf" => Ok(Self::Lsf),
            "uge" | "sge" => Ok(Self::Uge),
            "local" | "fork" => Ok(Self::Local),
            _ => Err(format!("Invalid resource manager kind: {s}")),
        }
    }
}

/// Access protocol used to reach the compute resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSubmissionProtocol {
    /// Commands run on the orchestrator host itself
    Local,
    /// Commands run over an SSH session against a login node
    Ssh,
    /// Direct (fork) execution over SSH, no scheduler
    SshFork,
    /// Commands relayed through a cloud agent
    Cloud,
}

impl fmt::Display for JobSubmissionProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Ssh => write!(f, "ssh"),
            Self::SshFork => write!(f, "ssh_fork"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

/// Compute resource targeted by a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeResource {
    /// Catalog identifier of the resource
    pub resource_id: String,
    /// Login host name
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub resource_manager: ResourceManagerKind,
    pub protocol: JobSubmissionProtocol,
    /// Upper bound on wall time accepted by the resource, in minutes
    #[serde(default)]
    pub max_wall_time_minutes: Option<u32>,
}

fn default_ssh_port() -> u16 {
    22
}

/// Resource-scheduling parameters requested for the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceScheduling {
    pub node_count: u32,
    pub cpu_count: u32,
    #[serde(default)]
    pub queue_name: Option<String>,
    pub wall_time_minutes: u32,
    #[serde(default)]
    pub total_memory_mb: Option<u32>,
    #[serde(default)]
    pub account: Option<String>,
}

/// Kind of value carried by an input or output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Integer,
    Float,
    Uri,
    UriCollection,
    Stdout,
    Stderr,
}

impl DataType {
    /// Whether a value of this type is a file that must be moved between
    /// gateway storage and the compute resource
    pub fn requires_movement(&self) -> bool {
        matches!(
            self,
            Self::Uri | Self::UriCollection | Self::Stdout | Self::Stderr
        )
    }
}

/// Declared application input or output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObject {
    pub name: String,
    /// Literal value, or a path/URI for file-typed objects. Collections are
    /// comma separated.
    #[serde(default)]
    pub value: Option<String>,
    pub data_type: DataType,
    #[serde(default)]
    pub required: bool,
    /// Outputs only: the file grows while the job runs and is fetched
    /// intermediately
    #[serde(default)]
    pub streaming: bool,
    /// Position on the command line, when the value is passed as an argument
    #[serde(default)]
    pub command_line_order: Option<u32>,
}

impl DataObject {
    pub fn input(name: impl Into<String>, value: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            data_type,
            required: true,
            streaming: false,
            command_line_order: None,
        }
    }

    pub fn output(name: impl Into<String>, value: Option<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            value,
            data_type,
            required: false,
            streaming: false,
            command_line_order: None,
        }
    }

    /// Individual values; collections are split on commas
    pub fn values(&self) -> Vec<String> {
        match (&self.value, self.data_type) {
            (Some(v), DataType::UriCollection) => v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            (Some(v), _) => vec![v.clone()],
            (None, _) => Vec::new(),
        }
    }
}

/// Application launched by the job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub executable: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub module_loads: Vec<String>,
    #[serde(default)]
    pub pre_job_commands: Vec<String>,
    #[serde(default)]
    pub post_job_commands: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// One execution attempt of an experiment, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub process_id: String,
    pub experiment_id: String,
    pub gateway_id: String,
    pub user_id: String,
    pub compute_resource: ComputeResource,
    /// Token handed to the credential resolver; never the secret itself
    pub credential_token: String,
    /// Working directory on the compute resource
    pub working_directory: String,
    /// Gateway-side directory outputs are staged back into
    pub storage_directory: String,
    pub scheduling: ResourceScheduling,
    pub application: ApplicationSpec,
    #[serde(default)]
    pub inputs: Vec<DataObject>,
    #[serde(default)]
    pub outputs: Vec<DataObject>,
    #[serde(default)]
    pub notification_email: Option<String>,
    /// Remove the working directory during CLEANUP
    #[serde(default)]
    pub cleanup_working_directory: bool,
}

impl ProcessSpec {
    pub fn resource_manager(&self) -> ResourceManagerKind {
        self.compute_resource.resource_manager
    }

    pub fn protocol(&self) -> JobSubmissionProtocol {
        self.compute_resource.protocol
    }

    /// Batch submissions return before the job runs and need a MONITOR step
    pub fn is_asynchronous_submission(&self) -> bool {
        self.resource_manager().is_batch()
    }

    /// Deterministic scheduler job name, recoverable after a restart
    pub fn job_name(&self) -> String {
        crate::scheduler::job_name_for(&self.process_id)
    }

    /// Join a relative path onto the working directory
    pub fn remote_path(&self, relative: &str) -> String {
        if relative.starts_with('/') {
            relative.to_string()
        } else {
            format!(
                "{}/{}",
                self.working_directory.trim_end_matches('/'),
                relative
            )
        }
    }

    /// Location an input file lands in once staged into the working directory
    pub fn staged_path(&self, source: &str) -> String {
        let trimmed = source.trim_end_matches('/');
        let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
        self.remote_path(name)
    }

    pub fn stdout_path(&self) -> String {
        self.remote_path(&format!("{}.stdout", self.job_name()))
    }

    pub fn stderr_path(&self) -> String {
        self.remote_path(&format!("{}.stderr", self.job_name()))
    }
}
