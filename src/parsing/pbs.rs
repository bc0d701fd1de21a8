//! PBS / Torque grammars: `qstat` listings (short and `-f` forms), `qstat -Q`
//! queue tables and `qsub` submission output.

use super::{content_lines, OutputParser, ParseError, ParseResult};
use crate::models::{JobState, ResourceManagerKind};
use once_cell::sync::Lazy;
use regex::Regex;

// `12345.server`, array jobs `12345[].server`, `12345[7].server`
static JOB_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\[\d*\])?(\.[\w.\-]+)?$").expect("valid PBS job id regex"));

static FULL_JOB_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Job Id:\s*(\S+)").expect("valid PBS full id regex"));

static FULL_STATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^job_state\s*=\s*(\S+)").expect("valid PBS job_state regex"));

static REJECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)unknown queue|exceeds queue resource limits|would exceed .*limit",
        r"|illegal attribute or resource value|unauthorized request",
    ))
    .expect("valid qsub rejection regex")
});

#[derive(Debug, Default, Clone, Copy)]
pub struct PbsParser;

pub fn map_pbs_state(code: &str) -> Option<JobState> {
    let state = match code {
        "Q" | "W" | "T" | "M" => JobState::Queued,
        "R" | "E" | "B" => JobState::Active,
        "C" | "F" | "X" => JobState::Complete,
        "H" | "S" | "U" => JobState::Suspended,
        _ => return None,
    };
    Some(state)
}

/// Numeric part of a PBS id, before the server suffix
fn sequence_number(id: &str) -> &str {
    id.split('.').next().unwrap_or(id)
}

impl PbsParser {
    fn observed_full_format(&self, raw: &str) -> Vec<(String, JobState)> {
        let mut observed = Vec::new();
        let mut current: Option<String> = None;

        for line in content_lines(raw) {
            if let Some(caps) = FULL_JOB_ID_RE.captures(line) {
                current = Some(caps[1].to_string());
            } else if let Some(caps) = FULL_STATE_RE.captures(line) {
                if let (Some(id), Some(state)) = (current.take(), map_pbs_state(&caps[1])) {
                    observed.push((id, state));
                }
            }
        }

        observed
    }
}

impl OutputParser for PbsParser {
    fn kind(&self) -> ResourceManagerKind {
        ResourceManagerKind::Pbs
    }

    /// `qstat -Q`: a queue is usable when both enabled and started
    fn is_resource_available(&self, raw: &str) -> bool {
        content_lines(raw)
            .filter(|line| !line.starts_with("Queue"))
            .any(|line| {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                tokens.len() >= 5
                    && tokens[3].eq_ignore_ascii_case("yes")
                    && tokens[4].eq_ignore_ascii_case("yes")
            })
    }

    fn observed_states(&self, raw: &str) -> ParseResult<Vec<(String, JobState)>> {
        if raw.contains("Job Id:") {
            return Ok(self.observed_full_format(raw));
        }

        let mut observed = Vec::new();
        for line in content_lines(raw) {
            if line.starts_with("Job id") || line.starts_with("Job ID") {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 5 {
                continue;
            }
            let Some(state) = map_pbs_state(tokens[4]) else {
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

    /// qstat truncates or appends server names; compare sequence numbers
    fn same_job(&self, observed: &str, known: &str) -> bool {
        sequence_number(observed) == sequence_number(known)
    }

    /// `qsub` prints the full id (`12345.server`) on success
    fn parse_job_id(&self, raw: &str) -> Option<String> {
        content_lines(raw)
            .find(|line| JOB_ID_RE.is_match(line))
            .map(str::to_string)
    }

    /// `qselect -N <name>` prints matching ids, one per line
    fn parse_job_id_by_name(&self, raw: &str, _job_name: &str) -> Option<String> {
        self.parse_job_id(raw)
    }

    fn is_job_gone_signal(&self, raw: &str) -> bool {
        raw.contains("Unknown Job Id")
    }

    fn is_permanent_rejection(&self, raw: &str) -> bool {
        REJECTION_RE.is_match(raw)
    }
}
