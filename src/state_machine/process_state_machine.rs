use super::{
    errors::{StateMachineError, StateMachineResult},
    events::ProcessEvent,
    states::ProcessState,
};

/// Process-level lifecycle: PENDING → RUNNING → {COMPLETED | FAILED | CANCELED}
#[derive(Debug, Clone, Default)]
pub struct ProcessStateMachine {
    current: ProcessState,
}

impl ProcessStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> ProcessState {
        self.current
    }

    pub fn transition(&mut self, event: ProcessEvent) -> StateMachineResult<ProcessState> {
        let target = Self::determine_target_state(self.current, &event)?;
        self.current = target;
        Ok(target)
    }

    pub fn determine_target_state(
        current_state: ProcessState,
        event: &ProcessEvent,
    ) -> StateMachineResult<ProcessState> {
        let target = match (current_state, event) {
            (ProcessState::Pending, ProcessEvent::Start) => ProcessState::Running,
            (ProcessState::Pending | ProcessState::Running, ProcessEvent::Complete) => {
                ProcessState::Completed
            }
            (ProcessState::Pending | ProcessState::Running, ProcessEvent::Fail(_)) => {
                ProcessState::Failed
            }
            (ProcessState::Running, ProcessEvent::RequestCancel) => ProcessState::Canceling,
            (ProcessState::Pending | ProcessState::Canceling, ProcessEvent::ConfirmCancel) => {
                ProcessState::Canceled
            }
            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_goes_through_canceling() {
        let mut sm = ProcessStateMachine::new();
        sm.transition(ProcessEvent::Start).unwrap();
        assert_eq!(
            sm.transition(ProcessEvent::RequestCancel).unwrap(),
            ProcessState::Canceling
        );
        assert!(sm.clone().transition(ProcessEvent::Complete).is_err());
        assert_eq!(
            sm.transition(ProcessEvent::ConfirmCancel).unwrap(),
            ProcessState::Canceled
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut sm = ProcessStateMachine::new();
        sm.transition(ProcessEvent::Start).unwrap();
        sm.transition(ProcessEvent::Fail("boom".into())).unwrap();
        assert!(sm.transition(ProcessEvent::Start).is_err());
        assert!(sm.current_state().is_terminal());
    }
}
