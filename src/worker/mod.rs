//! # Task workers
//!
//! The execution side of the engine: pulls dispatch messages off the
//! per-type queues and runs the matching handler off the orchestrator's
//! event path.

pub mod executor;
pub mod pool;

pub use executor::TaskExecutor;
pub use pool::TaskWorkerPool;
