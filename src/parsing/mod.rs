//! # Resource-manager output parsing
//!
//! Turns the free-text output of scheduler commands (`squeue`, `qstat`,
//! `bjobs`, `sinfo`, ...) into normalized facts: resource availability, job
//! counts, job states and submitted job ids.
//!
//! Every grammar is best effort. Lines that do not match a grammar are
//! ignored rather than treated as errors, and a job that is absent from the
//! output keeps whatever state the caller already had for it; absence alone is
//! never read as "the job is gone". Only numeric failures (a job count that is
//! not a number, a job line whose id is malformed) produce a [`ParseError`],
//! which callers treat as "state unknown".
//!
//! ```rust
//! use hpcflow_core::models::{JobState, ResourceManagerKind};
//! use hpcflow_core::parsing;
//!
//! let out = "JOBID PARTITION NAME USER ST TIME NODES NODELIST(REASON)\n\
//!            2477982 compute hf01 alice R 0:42 1 node07\n";
//! let states = parsing::parse_job_states(out, ResourceManagerKind::Slurm, &["2477982".to_string()]).unwrap();
//! assert_eq!(states["2477982"], JobState::Active);
//! ```

pub mod email;
pub mod local;
pub mod lsf;
pub mod pbs;
pub mod slurm;
pub mod uge;

use crate::models::{JobState, ResourceManagerKind};
use std::collections::HashMap;
use thiserror::Error;

pub use email::parse_email_subject;

/// Numeric parsing failures in resource-manager output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid job count in {kind} output: {value:?}")]
    InvalidJobCount {
        kind: ResourceManagerKind,
        value: String,
    },

    #[error("Malformed job id {value:?} in {kind} output")]
    MalformedJobId {
        kind: ResourceManagerKind,
        value: String,
    },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Grammar for one resource-manager kind
pub trait OutputParser: Send + Sync {
    fn kind(&self) -> ResourceManagerKind;

    /// Whether the availability listing shows at least one usable queue
    fn is_resource_available(&self, raw: &str) -> bool;

    /// Parse a job count produced by the kind's count command
    fn job_count(&self, raw: &str) -> ParseResult<usize> {
        parse_count(self.kind(), raw)
    }

    /// Every (job id, state) pair the output mentions
    fn observed_states(&self, raw: &str) -> ParseResult<Vec<(String, JobState)>>;

    /// Whether an id printed by the scheduler refers to the caller's job id
    fn same_job(&self, observed: &str, known: &str) -> bool {
        observed == known
    }

    /// States for the known job ids found in the output, keyed by the
    /// caller's id. With no known ids every observed job is returned.
    fn parse_job_states(
        &self,
        raw: &str,
        known_job_ids: &[String],
    ) -> ParseResult<HashMap<String, JobState>> {
        let observed = self.observed_states(raw)?;
        if known_job_ids.is_empty() {
            return Ok(observed.into_iter().collect());
        }

        let mut states = HashMap::new();
        for known in known_job_ids {
            if let Some((_, state)) = observed.iter().find(|(id, _)| self.same_job(id, known)) {
                states.insert(known.clone(), *state);
            }
        }
        Ok(states)
    }

    /// Extract the job id from the output of the submit command
    fn parse_job_id(&self, raw: &str) -> Option<String>;

    /// Extract the id of a job with the given name from a by-name query
    fn parse_job_id_by_name(&self, raw: &str, job_name: &str) -> Option<String>;

    /// Whether the output is an explicit "no such job" answer
    fn is_job_gone_signal(&self, raw: &str) -> bool;

    /// Whether a refused submission names a problem resubmitting cannot fix
    /// (unknown queue, bad account, exceeded quota)
    fn is_permanent_rejection(&self, _raw: &str) -> bool {
        false
    }
}

static SLURM_PARSER: slurm::SlurmParser = slurm::SlurmParser;
static PBS_PARSER: pbs::PbsParser = pbs::PbsParser;
static LSF_PARSER: lsf::LsfParser = lsf::LsfParser;
static UGE_PARSER: uge::UgeParser = uge::UgeParser;
static LOCAL_PARSER: local::LocalParser = local::LocalParser;

/// Parser registered for a resource-manager kind
pub fn parser_for(kind: ResourceManagerKind) -> &'static dyn OutputParser {
    match kind {
        ResourceManagerKind::Slurm => &SLURM_PARSER,
        ResourceManagerKind::Pbs => &PBS_PARSER,
        ResourceManagerKind::Lsf => &LSF_PARSER,
        ResourceManagerKind::Uge => &UGE_PARSER,
        ResourceManagerKind::Local => &LOCAL_PARSER,
    }
}

pub fn is_resource_available(raw: &str, kind: ResourceManagerKind) -> bool {
    parser_for(kind).is_resource_available(raw)
}

pub fn job_count(raw: &str, kind: ResourceManagerKind) -> ParseResult<usize> {
    parser_for(kind).job_count(raw)
}

pub fn parse_job_states(
    raw: &str,
    kind: ResourceManagerKind,
    known_job_ids: &[String],
) -> ParseResult<HashMap<String, JobState>> {
    parser_for(kind).parse_job_states(raw, known_job_ids)
}

pub fn parse_job_id(raw: &str, kind: ResourceManagerKind) -> Option<String> {
    parser_for(kind).parse_job_id(raw)
}

pub fn is_job_gone_signal(raw: &str, kind: ResourceManagerKind) -> bool {
    parser_for(kind).is_job_gone_signal(raw)
}

/// Count commands pipe through `wc -l`; the last non-empty line carries the number
fn parse_count(kind: ResourceManagerKind, raw: &str) -> ParseResult<usize> {
    let token = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");

    token.parse::<usize>().map_err(|_| ParseError::InvalidJobCount {
        kind,
        value: token.to_string(),
    })
}

/// Non-empty lines that are not table rulers (`-----`)
fn content_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !l.chars().all(|c| c == '-' || c.is_whitespace()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_count_accepts_wc_output() {
        assert_eq!(job_count("      3\n", ResourceManagerKind::Slurm).unwrap(), 3);
        assert_eq!(
            job_count("warning: something\n12\n", ResourceManagerKind::Pbs).unwrap(),
            12
        );
    }

    #[test]
    fn test_job_count_rejects_non_numeric_output() {
        let err = job_count("squeue: command not found", ResourceManagerKind::Slurm).unwrap_err();
        assert!(matches!(err, ParseError::InvalidJobCount { .. }));
        assert!(job_count("", ResourceManagerKind::Lsf).is_err());
    }

    #[test]
    fn test_parser_registry_matches_kind() {
        for kind in ResourceManagerKind::all() {
            assert_eq!(parser_for(kind).kind(), kind);
        }
    }
}
