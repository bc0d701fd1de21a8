//! Direct execution: processes are observed through `ps`.

use super::{content_lines, OutputParser, ParseResult};
use crate::models::{JobState, ResourceManagerKind};

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalParser;

/// First letter of a `ps` STAT column
pub fn map_process_stat(stat: &str) -> Option<JobState> {
    let state = match stat.chars().next()? {
        'R' | 'S' | 'D' | 'I' => JobState::Active,
        'T' | 't' => JobState::Suspended,
        'Z' | 'X' => JobState::Complete,
        _ => return None,
    };
    Some(state)
}

fn is_pid(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

impl OutputParser for LocalParser {
    fn kind(&self) -> ResourceManagerKind {
        ResourceManagerKind::Local
    }

    fn is_resource_available(&self, _raw: &str) -> bool {
        true
    }

    /// `ps -o pid=,stat= -p <pid>`
    fn observed_states(&self, raw: &str) -> ParseResult<Vec<(String, JobState)>> {
        Ok(content_lines(raw)
            .filter_map(|line| {
                let mut tokens = line.split_whitespace();
                let pid = tokens.next().filter(|t| is_pid(t))?;
                let state = map_process_stat(tokens.next()?)?;
                Some((pid.to_string(), state))
            })
            .collect())
    }

    /// A background launch echoes the pid
    fn parse_job_id(&self, raw: &str) -> Option<String> {
        content_lines(raw).find(|line| is_pid(line)).map(str::to_string)
    }

    /// `ps -eo pid=,args=`
    fn parse_job_id_by_name(&self, raw: &str, job_name: &str) -> Option<String> {
        content_lines(raw).find_map(|line| {
            let (pid, args) = line.split_once(char::is_whitespace)?;
            (is_pid(pid) && args.contains(job_name)).then(|| pid.to_string())
        })
    }

    fn is_job_gone_signal(&self, raw: &str) -> bool {
        raw.trim().is_empty() || raw.contains("No such process")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ps_states() {
        let states = LocalParser
            .parse_job_states("  PID STAT\n 4242 Ss\n 4243 Z+\n", &[])
            .unwrap();
        assert_eq!(states["4242"], JobState::Active);
        assert_eq!(states["4243"], JobState::Complete);
    }

    #[test]
    fn test_empty_ps_output_is_gone() {
        assert!(LocalParser.is_job_gone_signal(""));
        assert!(LocalParser.is_job_gone_signal("kill: (4242) - No such process"));
        assert!(!LocalParser.is_job_gone_signal("4242 S"));
    }

    #[test]
    fn test_lookup_by_name() {
        let raw = "  101 /bin/sh /scratch/p1/hf0123456789.sh\n  102 sleep 10\n";
        assert_eq!(
            LocalParser.parse_job_id_by_name(raw, "hf0123456789"),
            Some("101".to_string())
        );
        assert!(LocalParser.is_resource_available(""));
    }
}
