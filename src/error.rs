use thiserror::Error;

/// Errors that can occur within the `thread_orchestra` pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Failed to spawn pool worker {index}: {reason}")]
  WorkerSpawnFailed { index: usize, reason: String },

  #[error("Submitted task panicked: {0}")]
  TaskPanicked(String),

  #[error("Task was discarded before it produced a result (pool dropped or job lost)")]
  BrokenResult,

  #[error("Task result already taken from this handle")]
  ResultUnavailable,
}
