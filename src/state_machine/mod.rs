// State machine module for process and task lifecycles
//
// Both machines are pure: they validate a transition and hand back the new
// state (or the status record to append); persistence belongs to the caller.

pub mod errors;
pub mod events;
pub mod process_state_machine;
pub mod states;
pub mod task_state_machine;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use events::{ProcessEvent, TaskEvent};
pub use process_state_machine::ProcessStateMachine;
pub use states::{ProcessState, TaskState};
pub use task_state_machine::TaskStateMachine;
