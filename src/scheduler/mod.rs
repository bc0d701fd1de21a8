//! # Resource-manager command catalogue
//!
//! Builds the shell command lines the task handlers send through an
//! execution adaptor. Each command has a matching grammar in
//! [`crate::parsing`].

pub mod script;

use crate::models::ResourceManagerKind;

pub use script::JobScript;

/// Prefix of every generated job name
pub const JOB_NAME_PREFIX: &str = "hf";

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Deterministic scheduler job name for a process: `hf` followed by ten hex
/// digits of the FNV-1a hash of the process id. Short enough to survive UGE
/// and PBS name truncation and stable across orchestrator restarts.
pub fn job_name_for(process_id: &str) -> String {
    let hash = process_id
        .bytes()
        .fold(FNV_OFFSET_BASIS, |h, b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME));
    format!("{JOB_NAME_PREFIX}{:010x}", hash & 0xff_ffff_ffff)
}

/// Single-quote a value for POSIX shells
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Command lines for one resource-manager kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerCommands {
    kind: ResourceManagerKind,
}

impl SchedulerCommands {
    pub fn new(kind: ResourceManagerKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ResourceManagerKind {
        self.kind
    }

    /// Submit a job script. For `Local` this runs the script to completion.
    pub fn submit_command(&self, script_path: &str) -> String {
        let path = shell_quote(script_path);
        match self.kind {
            ResourceManagerKind::Slurm => format!("sbatch {path}"),
            ResourceManagerKind::Pbs | ResourceManagerKind::Uge => format!("qsub {path}"),
            ResourceManagerKind::Lsf => format!("bsub < {path}"),
            ResourceManagerKind::Local => format!("/bin/sh {path}"),
        }
    }

    pub fn job_status_command(&self, job_id: &str, user: &str) -> String {
        let id = shell_quote(job_id);
        match self.kind {
            ResourceManagerKind::Slurm => format!("squeue -j {id}"),
            ResourceManagerKind::Pbs => format!("qstat {id}"),
            ResourceManagerKind::Lsf => format!("bjobs {id}"),
            ResourceManagerKind::Uge => format!("qstat -u {}", shell_quote(user)),
            ResourceManagerKind::Local => format!("ps -o pid=,stat= -p {id}"),
        }
    }

    /// Explicit per-job query for managers whose status command is a listing.
    /// Used only for its "job does not exist" answer.
    pub fn existence_query_command(&self, job_id: &str) -> Option<String> {
        match self.kind {
            ResourceManagerKind::Uge => Some(format!("qstat -j {}", shell_quote(job_id))),
            _ => None,
        }
    }

    pub fn cancel_command(&self, job_id: &str) -> String {
        let id = shell_quote(job_id);
        match self.kind {
            ResourceManagerKind::Slurm => format!("scancel {id}"),
            ResourceManagerKind::Pbs | ResourceManagerKind::Uge => format!("qdel {id}"),
            ResourceManagerKind::Lsf => format!("bkill {id}"),
            ResourceManagerKind::Local => format!("kill {id}"),
        }
    }

    pub fn job_by_name_command(&self, job_name: &str, user: &str) -> String {
        let name = shell_quote(job_name);
        let user = shell_quote(user);
        match self.kind {
            ResourceManagerKind::Slurm => format!("squeue -h -u {user} -n {name} -o \"%i %j\""),
            ResourceManagerKind::Pbs => format!("qselect -u {user} -N {name}"),
            ResourceManagerKind::Lsf => {
                format!("bjobs -noheader -u {user} -o \"jobid job_name\" -J {name}")
            }
            ResourceManagerKind::Uge => format!("qstat -u {user}"),
            ResourceManagerKind::Local => "ps -eo pid=,args=".to_string(),
        }
    }

    pub fn job_count_command(&self, user: &str) -> String {
        let user = shell_quote(user);
        match self.kind {
            ResourceManagerKind::Slurm => format!("squeue -h -u {user} | wc -l"),
            ResourceManagerKind::Pbs => format!("qselect -u {user} | wc -l"),
            ResourceManagerKind::Lsf => format!("bjobs -noheader -u {user} 2>/dev/null | wc -l"),
            ResourceManagerKind::Uge => format!("qstat -u {user} | tail -n +3 | wc -l"),
            ResourceManagerKind::Local => format!("ps -u {user} -o pid= | wc -l"),
        }
    }

    pub fn availability_command(&self, queue: Option<&str>) -> String {
        let queue = queue.map(shell_quote);
        match (self.kind, queue) {
            (ResourceManagerKind::Slurm, Some(q)) => format!("sinfo -p {q}"),
            (ResourceManagerKind::Slurm, None) => "sinfo".to_string(),
            (ResourceManagerKind::Pbs, Some(q)) => format!("qstat -Q {q}"),
            (ResourceManagerKind::Pbs, None) => "qstat -Q".to_string(),
            (ResourceManagerKind::Lsf, Some(q)) => format!("bqueues {q}"),
            (ResourceManagerKind::Lsf, None) => "bqueues".to_string(),
            (ResourceManagerKind::Uge, _) => "qstat -g c".to_string(),
            (ResourceManagerKind::Local, _) => "true".to_string(),
        }
    }
}
