use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

lazy_static::lazy_static! {
  static ref NEXT_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Process-unique identifier of a submitted task.
pub type TaskId = u64;

pub(crate) fn next_task_id() -> TaskId {
  NEXT_TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A type-erased unit of work as stored in the pool queue.
///
/// The closure already carries its arguments and the promise it writes its
/// outcome into, so running it needs nothing from the worker.
pub(crate) struct Job {
  pub(crate) task_id: TaskId,
  run: Box<dyn FnOnce() + Send + 'static>,
}

impl Job {
  pub(crate) fn new(task_id: TaskId, run: impl FnOnce() + Send + 'static) -> Self {
    Self {
      task_id,
      run: Box::new(run),
    }
  }

  pub(crate) fn run(self) {
    (self.run)()
  }
}

impl fmt::Debug for Job {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Job").field("task_id", &self.task_id).finish_non_exhaustive()
  }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&'static str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
