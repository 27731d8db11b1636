//! Single-value result channel between a worker and the submitting caller.
//!
//! The write side ([`Promise`]) lives inside the queued job; the read side
//! ([`TaskFuture`]) is handed to the caller at submission. Dropping the
//! promise without completing it breaks the channel, which wakes any reader
//! with [`PoolError::BrokenResult`].

use crate::error::PoolError;
use crate::shared::Shared;
use crate::task::TaskId;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

enum SlotState<R> {
  Pending,
  Ready(Result<R, PoolError>),
  Broken,
  Taken,
}

impl<R> SlotState<R> {
  fn is_pending(&self) -> bool {
    matches!(self, SlotState::Pending)
  }
}

type Slot<R> = Arc<Shared<SlotState<R>>>;

/// Outcome of a bounded wait on a task handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
  /// The result (or a broken-result outcome) is available.
  Ready,
  /// The deadline passed before the task produced anything.
  Timeout,
}

pub(crate) fn channel<R>(task_id: TaskId) -> (Promise<R>, TaskFuture<R>) {
  let slot: Slot<R> = Arc::new(Shared::new(SlotState::Pending));
  (
    Promise {
      task_id,
      slot: Some(slot.clone()),
    },
    TaskFuture {
      task_id,
      slot: Some(slot),
    },
  )
}

/// Write side of the result channel. Written at most once.
pub(crate) struct Promise<R> {
  task_id: TaskId,
  slot: Option<Slot<R>>,
}

impl<R> Promise<R> {
  pub(crate) fn complete(mut self, outcome: Result<R, PoolError>) {
    let Some(slot) = self.slot.take() else {
      return;
    };
    if Arc::strong_count(&slot) == 1 {
      tracing::warn!(task_id = %self.task_id, "Result receiver for task was dropped. Task outcome is discarded.");
    }
    slot.with(|state| *state = SlotState::Ready(outcome));
    slot.notify_all();
  }
}

impl<R> Drop for Promise<R> {
  fn drop(&mut self) {
    if let Some(slot) = self.slot.take() {
      slot.with(|state| {
        if state.is_pending() {
          *state = SlotState::Broken;
        }
      });
      slot.notify_all();
    }
  }
}

/// A handle to the eventual result of a task submitted to a
/// [`ThreadPool`](crate::ThreadPool).
pub struct TaskFuture<R> {
  task_id: TaskId,
  slot: Option<Slot<R>>,
}

impl<R> TaskFuture<R> {
  /// Returns the unique ID of the task behind this handle.
  pub fn id(&self) -> TaskId {
    self.task_id
  }

  /// Returns `true` while the result has not been taken with [`get`](Self::get).
  pub fn valid(&self) -> bool {
    self.slot.is_some()
  }

  /// Returns `true` if [`get`](Self::get) would not block.
  pub fn is_ready(&self) -> bool {
    self
      .slot
      .as_ref()
      .is_some_and(|slot| slot.with(|state| !state.is_pending()))
  }

  /// Blocks until the task has finished and takes its result.
  ///
  /// # Errors
  /// Returns `PoolError::TaskPanicked` if the task panicked.
  /// Returns `PoolError::BrokenResult` if the task was discarded before running.
  /// Returns `PoolError::ResultUnavailable` if the result was already taken.
  pub fn get(&mut self) -> Result<R, PoolError> {
    let slot = self.slot.take().ok_or(PoolError::ResultUnavailable)?;
    let state = slot.wait_while(SlotState::is_pending, |state| std::mem::replace(state, SlotState::Taken));
    match state {
      SlotState::Ready(outcome) => outcome,
      SlotState::Broken => {
        tracing::debug!(task_id = %self.task_id, "Task result channel is broken; task never ran.");
        Err(PoolError::BrokenResult)
      }
      SlotState::Pending | SlotState::Taken => Err(PoolError::ResultUnavailable),
    }
  }

  /// Blocks until the result is available without taking it.
  pub fn wait(&self) -> Result<(), PoolError> {
    self.slot()?.wait_while(SlotState::is_pending, |_| ());
    Ok(())
  }

  /// Blocks for at most `timeout` waiting for the result. Does not cancel the task.
  pub fn wait_for(&self, timeout: Duration) -> Result<FutureStatus, PoolError> {
    match Instant::now().checked_add(timeout) {
      Some(deadline) => self.wait_until(deadline),
      None => self.wait().map(|()| FutureStatus::Ready),
    }
  }

  /// Blocks until `deadline` at the latest waiting for the result.
  pub fn wait_until(&self, deadline: Instant) -> Result<FutureStatus, PoolError> {
    let timed_out = self
      .slot()?
      .wait_while_until(deadline, SlotState::is_pending, |_, timed_out| timed_out);
    Ok(if timed_out { FutureStatus::Timeout } else { FutureStatus::Ready })
  }

  fn slot(&self) -> Result<&Slot<R>, PoolError> {
    self.slot.as_ref().ok_or(PoolError::ResultUnavailable)
  }
}

impl<R> fmt::Debug for TaskFuture<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskFuture")
      .field("task_id", &self.task_id)
      .field("valid", &self.valid())
      .field("ready", &self.is_ready())
      .finish()
  }
}
