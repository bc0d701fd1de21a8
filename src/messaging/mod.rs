//! # Messaging Module
//!
//! Dispatch of tasks to the worker queues and the typed result events that
//! flow back to the orchestrator.

pub mod dispatcher;
pub mod message;
pub mod results;

pub use dispatcher::{CancellationRegistry, ChannelDispatcher, TaskDispatcher, TaskKey};
pub use message::{
    TaskCanceledEvent, TaskCompletedEvent, TaskDispatchMessage, TaskFailedEvent, TaskRef,
};
pub use results::{result_channels, TaskResultReceivers, TaskResultSenders};
