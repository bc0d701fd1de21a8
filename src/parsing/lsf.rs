//! LSF grammars: `bjobs`, `bqueues` and `bsub` output.

use super::{content_lines, OutputParser, ParseError, ParseResult};
use crate::models::{JobState, ResourceManagerKind};
use once_cell::sync::Lazy;
use regex::Regex;

static SUBMITTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Job <(\d+)> is submitted").expect("valid bsub regex"));

static JOB_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\[\d+\])?$").expect("valid LSF job id regex"));

static REJECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)no such queue|cannot use the queue|bad resource requirement syntax",
        r"|exceeds the (job|user) limit",
    ))
    .expect("valid bsub rejection regex")
});

#[derive(Debug, Default, Clone, Copy)]
pub struct LsfParser;

pub fn map_lsf_state(code: &str) -> Option<JobState> {
    let state = match code {
        "PEND" | "WAIT" => JobState::Queued,
        "RUN" | "PROV" => JobState::Active,
        "DONE" => JobState::Complete,
        "EXIT" | "ZOMBI" => JobState::Failed,
        "PSUSP" | "USUSP" | "SSUSP" => JobState::Suspended,
        "UNKWN" => JobState::Unknown,
        _ => return None,
    };
    Some(state)
}

impl OutputParser for LsfParser {
    fn kind(&self) -> ResourceManagerKind {
        ResourceManagerKind::Lsf
    }

    /// `bqueues`: `QUEUE_NAME PRIO STATUS ...`
    fn is_resource_available(&self, raw: &str) -> bool {
        content_lines(raw)
            .filter(|line| !line.starts_with("QUEUE_NAME"))
            .any(|line| line.split_whitespace().nth(2) == Some("Open:Active"))
    }

    /// `bjobs`: `JOBID USER STAT QUEUE FROM_HOST EXEC_HOST JOB_NAME SUBMIT_TIME`
    fn observed_states(&self, raw: &str) -> ParseResult<Vec<(String, JobState)>> {
        let mut observed = Vec::new();
        for line in content_lines(raw) {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 3 || tokens[0] == "JOBID" {
                continue;
            }
            let Some(state) = map_lsf_state(tokens[2]) else {
                continue;
            };
            if !JOB_ID_RE.is_match(tokens[0]) {
                return Err(ParseError::MalformedJobId {
                    kind: self.kind(),
                    value: tokens[0].to_string(),
                });
            }
            observed.push((tokens[0].to_string(), state));
        }
        Ok(observed)
    }

    fn parse_job_id(&self, raw: &str) -> Option<String> {
        SUBMITTED_RE
            .captures(raw)
            .map(|caps| caps[1].to_string())
    }

    /// `bjobs -noheader -o "jobid job_name" -J <name>`
    fn parse_job_id_by_name(&self, raw: &str, job_name: &str) -> Option<String> {
        content_lines(raw).find_map(|line| {
            let mut tokens = line.split_whitespace();
            let id = tokens.next()?;
            let name = tokens.next()?;
            (name == job_name && JOB_ID_RE.is_match(id)).then(|| id.to_string())
        })
    }

    fn is_job_gone_signal(&self, raw: &str) -> bool {
        raw.contains("is not found")
    }

    fn is_permanent_rejection(&self, raw: &str) -> bool {
        REJECTION_RE.is_match(raw)
    }
}
