//! # Process execution state
//!
//! Orchestrator-internal view of one running process: where its task
//! pointer stands, which attempt of which task is in flight, and the process
//! lifecycle. Entries live in the orchestrator's arena from registration (or
//! resume) until the process reaches a terminal state.

use crate::models::{ProcessSpec, TaskSpec};
use crate::state_machine::{ProcessState, ProcessStateMachine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Next task to run, or a terminal sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPointer {
    At(usize),
    Complete,
    Failed,
}

impl fmt::Display for TaskPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(index) => write!(f, "{index}"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Attempt currently handed to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub order_index: usize,
    pub attempt: u32,
}

/// How an incoming task event relates to the pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventGate {
    /// Refers to the in-flight attempt of the current task
    Current,
    /// Refers to a task the pointer already moved past, or to an older attempt
    Stale,
    /// Refers to a task the pointer has not reached
    Ahead,
}

#[derive(Debug)]
pub struct ProcessExecutionState {
    pub spec: ProcessSpec,
    pub tasks: Vec<TaskSpec>,
    pub lifecycle: ProcessStateMachine,
    pub pointer: TaskPointer,
    /// Current attempt number per task, 0 before its first dispatch
    pub attempts: Vec<u32>,
    pub in_flight: Option<InFlight>,
    /// Task and message of the most recent failure of the current task
    pub last_error: Option<(String, String)>,
}

impl ProcessExecutionState {
    pub fn new(spec: ProcessSpec, tasks: Vec<TaskSpec>) -> Self {
        let attempts = vec![0; tasks.len()];
        Self {
            spec,
            tasks,
            lifecycle: ProcessStateMachine::new(),
            pointer: TaskPointer::At(0),
            attempts,
            in_flight: None,
            last_error: None,
        }
    }

    pub fn process_id(&self) -> &str {
        &self.spec.process_id
    }

    pub fn state(&self) -> ProcessState {
        self.lifecycle.current_state()
    }

    pub fn current_task(&self) -> Option<&TaskSpec> {
        match self.pointer {
            TaskPointer::At(index) => self.tasks.get(index),
            _ => None,
        }
    }

    pub fn gate(&self, order_index: u32, attempt: u32) -> EventGate {
        let order = order_index as usize;
        match self.pointer {
            TaskPointer::At(current) if order > current => EventGate::Ahead,
            TaskPointer::At(current) if order < current => EventGate::Stale,
            TaskPointer::At(_) => match self.in_flight {
                Some(in_flight) if in_flight.order_index == order && in_flight.attempt == attempt => {
                    EventGate::Current
                }
                _ => EventGate::Stale,
            },
            TaskPointer::Complete | TaskPointer::Failed => EventGate::Stale,
        }
    }

    /// Move past the current task; returns the next one, if any
    pub fn advance(&mut self) -> Option<&TaskSpec> {
        self.in_flight = None;
        self.last_error = None;
        self.pointer = match self.pointer {
            TaskPointer::At(index) if index + 1 < self.tasks.len() => TaskPointer::At(index + 1),
            TaskPointer::At(_) => TaskPointer::Complete,
            other => other,
        };
        self.current_task()
    }

    pub fn attempt_of(&self, index: usize) -> u32 {
        self.attempts.get(index).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskType;

    fn state() -> ProcessExecutionState {
        let tasks = vec![
            TaskSpec::new("P", TaskType::EnvSetup, 0),
            TaskSpec::new("P", TaskType::JobSubmission, 1),
            TaskSpec::new("P", TaskType::Cleanup, 2),
        ];
        let spec: ProcessSpec = serde_json::from_value(serde_json::json!({
            "process_id": "P",
            "experiment_id": "E",
            "gateway_id": "gw",
            "user_id": "alice",
            "compute_resource": {
                "resource_id": "localhost",
                "host": "localhost",
                "resource_manager": "local",
                "protocol": "local"
            },
            "credential_token": "tok",
            "working_directory": "/tmp/p",
            "storage_directory": "/tmp/s",
            "scheduling": {"node_count": 1, "cpu_count": 1, "wall_time_minutes": 5},
            "application": {"executable": "/bin/true"}
        }))
        .unwrap();
        ProcessExecutionState::new(spec, tasks)
    }

    #[test]
    fn test_gate_against_pointer_and_attempt() {
        let mut s = state();
        s.pointer = TaskPointer::At(1);
        s.in_flight = Some(InFlight {
            order_index: 1,
            attempt: 2,
        });

        assert_eq!(s.gate(0, 1), EventGate::Stale);
        assert_eq!(s.gate(2, 1), EventGate::Ahead);
        assert_eq!(s.gate(1, 1), EventGate::Stale);
        assert_eq!(s.gate(1, 2), EventGate::Current);
    }

    #[test]
    fn test_advance_reaches_complete() {
        let mut s = state();
        assert_eq!(s.advance().unwrap().order_index, 1);
        assert_eq!(s.advance().unwrap().order_index, 2);
        assert!(s.advance().is_none());
        assert_eq!(s.pointer, TaskPointer::Complete);
        assert_eq!(s.gate(2, 1), EventGate::Stale);
    }
}
