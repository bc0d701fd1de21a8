//! SLURM grammars: `squeue` listings, `sinfo` partition tables and `sbatch`
//! submission output.

use super::{content_lines, OutputParser, ParseError, ParseResult};
use crate::models::{JobState, ResourceManagerKind};
use once_cell::sync::Lazy;
use regex::Regex;

static SUBMITTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Submitted batch job (\d+)").expect("valid sbatch regex"));

// `sbatch --parsable` prints `<id>` or `<id>;<cluster>`
static PARSABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(;\S+)?$").expect("valid parsable regex"));

// Plain, array (`123_4`, `123_[1-5%2]`) and heterogeneous (`123+0`) ids
static JOB_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+(_(\d+|\[[0-9,\-%]+\]))?(\+\d+)?$").expect("valid job id regex")
});

// sbatch refusals that resubmitting cannot fix
static REJECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)invalid (partition|account|qos)|violates accounting/qos policy|MaxSubmitJob",
        r"|requested node configuration is not available",
        r"|more processors requested than permitted|requested time limit is invalid",
    ))
    .expect("valid sbatch rejection regex")
});

#[derive(Debug, Default, Clone, Copy)]
pub struct SlurmParser;

/// Map both compact (`%t`) and long (`%T`) state codes
pub fn map_slurm_state(code: &str) -> Option<JobState> {
    let state = match code.to_ascii_uppercase().as_str() {
        "PD" | "PENDING" | "CF" | "CONFIGURING" | "RQ" | "REQUEUED" | "RH" | "REQUEUE_HOLD"
        | "RF" | "REQUEUE_FED" | "RD" | "RESV_DEL_HOLD" => JobState::Queued,
        "R" | "RUNNING" | "CG" | "COMPLETING" | "SI" | "SIGNALING" | "SO" | "STAGE_OUT" => {
            JobState::Active
        }
        "CD" | "COMPLETED" => JobState::Complete,
        "CA" | "CANCELLED" => JobState::Canceled,
        "F" | "FAILED" | "TO" | "TIMEOUT" | "NF" | "NODE_FAIL" | "OOM" | "OUT_OF_MEMORY"
        | "BF" | "BOOT_FAIL" | "DL" | "DEADLINE" => JobState::Failed,
        "S" | "SUSPENDED" | "ST" | "STOPPED" => JobState::Suspended,
        "PR" | "PREEMPTED" | "RV" | "REVOKED" | "SE" | "SPECIAL_EXIT" => {
            JobState::NonCriticalFail
        }
        _ => return None,
    };
    Some(state)
}

impl OutputParser for SlurmParser {
    fn kind(&self) -> ResourceManagerKind {
        ResourceManagerKind::Slurm
    }

    /// `sinfo` default table (`PARTITION AVAIL ...`) or `sinfo -h -o %a`
    fn is_resource_available(&self, raw: &str) -> bool {
        content_lines(raw)
            .filter(|line| !line.starts_with("PARTITION"))
            .any(|line| {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                match tokens.as_slice() {
                    [avail] => avail.eq_ignore_ascii_case("up"),
                    [_, avail, ..] => avail.eq_ignore_ascii_case("up"),
                    [] => false,
                }
            })
    }

    /// Default `squeue` layout (`JOBID PARTITION NAME USER ST ...`) or the
    /// two-column `squeue -o "%i %T"` layout
    fn observed_states(&self, raw: &str) -> ParseResult<Vec<(String, JobState)>> {
        let mut observed = Vec::new();

        for line in content_lines(raw) {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.first() == Some(&"JOBID") {
                continue;
            }
            let (id, code) = match tokens.len() {
                2 => (tokens[0], tokens[1]),
                n if n >= 5 => (tokens[0], tokens[4]),
                _ => continue,
            };
            let Some(state) = map_slurm_state(code) else {
                continue;
            };
            if !JOB_ID_RE.is_match(id) {
                return Err(ParseError::MalformedJobId {
                    kind: self.kind(),
                    value: id.to_string(),
                });
            }
            observed.push((id.to_string(), state));
        }

        Ok(observed)
    }

    fn parse_job_id(&self, raw: &str) -> Option<String> {
        if let Some(caps) = SUBMITTED_RE.captures(raw) {
            return Some(caps[1].to_string());
        }
        content_lines(raw)
            .find_map(|line| PARSABLE_RE.captures(line).map(|caps| caps[1].to_string()))
    }

    /// Output of `squeue -h -n <name> -o "%i %j"`
    fn parse_job_id_by_name(&self, raw: &str, job_name: &str) -> Option<String> {
        content_lines(raw).find_map(|line| {
            let mut tokens = line.split_whitespace();
            let id = tokens.next()?;
            let name = tokens.next()?;
            (name == job_name && JOB_ID_RE.is_match(id)).then(|| id.to_string())
        })
    }

    fn is_job_gone_signal(&self, raw: &str) -> bool {
        raw.contains("Invalid job id specified")
    }

    fn is_permanent_rejection(&self, raw: &str) -> bool {
        REJECTION_RE.is_match(raw)
    }
}
