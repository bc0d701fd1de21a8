//! Scheduler notification mail subjects, consumed as push-style job updates.

use crate::models::{JobNotification, JobState, ResourceManagerKind};
use once_cell::sync::Lazy;
use regex::Regex;

// `Job 12345 (hf0011223344) Complete`
static UGE_SUBJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Job (\d+)(?:\.\d+)? \(([^)]*)\) (Started|Complete|Aborted|Suspended)")
        .expect("valid UGE subject regex")
});

// `Slurm Job_id=12345 Name=hf0011223344 Ended, Run time 00:01:02, COMPLETED, ExitCode 0`
static SLURM_SUBJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Slurm(?: Array)? Job_id=(\d+)\S* Name=\S+ (Began|Ended|Failed)(.*)$")
        .expect("valid SLURM subject regex")
});

// `Job 4401: <hf0011223344> in cluster <c1> Done`
static LSF_SUBJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Job (\d+): <[^>]*>.*\b(Done|Exited)\s*$").expect("valid LSF subject regex")
});

/// Translate a notification mail subject into a job notification
pub fn parse_email_subject(subject: &str, kind: ResourceManagerKind) -> Option<JobNotification> {
    let subject = subject.trim();
    match kind {
        ResourceManagerKind::Uge => parse_uge(subject),
        ResourceManagerKind::Slurm => parse_slurm(subject),
        ResourceManagerKind::Lsf => parse_lsf(subject),
        ResourceManagerKind::Pbs | ResourceManagerKind::Local => None,
    }
}

fn parse_uge(subject: &str) -> Option<JobNotification> {
    let caps = UGE_SUBJECT_RE.captures(subject)?;
    let state = match &caps[3] {
        "Started" => JobState::Active,
        "Complete" => JobState::Complete,
        "Aborted" => JobState::Failed,
        "Suspended" => JobState::Suspended,
        _ => return None,
    };
    Some(JobNotification::new(&caps[1], state))
}

fn parse_slurm(subject: &str) -> Option<JobNotification> {
    let caps = SLURM_SUBJECT_RE.captures(subject)?;
    let detail = &caps[3];
    let state = match &caps[2] {
        "Began" => JobState::Active,
        "Failed" => JobState::Failed,
        _ if detail.contains("CANCELLED") => JobState::Canceled,
        _ if detail.contains("FAILED") || detail.contains("TIMEOUT") => JobState::Failed,
        _ => JobState::Complete,
    };
    Some(JobNotification::new(&caps[1], state))
}

fn parse_lsf(subject: &str) -> Option<JobNotification> {
    let caps = LSF_SUBJECT_RE.captures(subject)?;
    let state = if &caps[2] == "Done" {
        JobState::Complete
    } else {
        JobState::Failed
    };
    Some(JobNotification::new(&caps[1], state))
}
