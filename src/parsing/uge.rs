//! Univa / Sun Grid Engine grammars: `qstat` listings, `qstat -g c` cluster
//! queue summaries and `qsub` submission output.

use super::{content_lines, OutputParser, ParseError, ParseResult};
use crate::models::{JobState, ResourceManagerKind};
use once_cell::sync::Lazy;
use regex::Regex;

static SUBMITTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Your job(?:-array)? (\d+)").expect("valid UGE qsub regex"));

static JOB_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+$").expect("valid UGE job id regex"));

/// qstat truncates the name column to this width
const NAME_COLUMN_WIDTH: usize = 10;

static REJECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)job requests unknown queue|job rejected|unknown resource|exceeds (the )?limit")
        .expect("valid qsub rejection regex")
});

#[derive(Debug, Default, Clone, Copy)]
pub struct UgeParser;

/// Map a combined state string such as `qw`, `Eqw`, `dr` or `hqw`.
/// Letters are checked from most to least significant.
pub fn map_uge_state(letters: &str) -> Option<JobState> {
    let has = |set: &[char]| letters.chars().any(|c| set.contains(&c));

    if has(&['E']) {
        Some(JobState::NonCriticalFail)
    } else if has(&['d']) {
        Some(JobState::Canceled)
    } else if has(&['s', 'S', 'T']) {
        Some(JobState::Suspended)
    } else if has(&['r', 't', 'R']) {
        Some(JobState::Active)
    } else if has(&['q', 'w', 'h']) {
        Some(JobState::Queued)
    } else {
        None
    }
}

impl OutputParser for UgeParser {
    fn kind(&self) -> ResourceManagerKind {
        ResourceManagerKind::Uge
    }

    /// `qstat -g c`: `CLUSTER QUEUE CQLOAD USED RES AVAIL TOTAL ...`
    fn is_resource_available(&self, raw: &str) -> bool {
        content_lines(raw)
            .filter(|line| !line.starts_with("CLUSTER"))
            .any(|line| {
                line.split_whitespace()
                    .nth(4)
                    .and_then(|avail| avail.parse::<u64>().ok())
                    .is_some_and(|avail| avail > 0)
            })
    }

    /// `qstat`: `job-ID prior name user state submit/start at queue slots`
    fn observed_states(&self, raw: &str) -> ParseResult<Vec<(String, JobState)>> {
        let mut observed = Vec::new();
        for line in content_lines(raw) {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 5 || tokens[0] == "job-ID" {
                continue;
            }
            let Some(state) = map_uge_state(tokens[4]) else {
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

    /// `qstat -u <user>` listing; the name column may be truncated
    fn parse_job_id_by_name(&self, raw: &str, job_name: &str) -> Option<String> {
        content_lines(raw).find_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 3 || !JOB_ID_RE.is_match(tokens[0]) {
                return None;
            }
            let name = tokens[2];
            let matches = name == job_name
                || (name.len() == NAME_COLUMN_WIDTH && job_name.starts_with(name));
            matches.then(|| tokens[0].to_string())
        })
    }

    /// `qstat -j <id>` answers "Following jobs do not exist" once a job has left
    fn is_job_gone_signal(&self, raw: &str) -> bool {
        raw.contains("do not exist")
    }

    fn is_permanent_rejection(&self, raw: &str) -> bool {
        REJECTION_RE.is_match(raw)
    }
}
