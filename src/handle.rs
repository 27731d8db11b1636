use crate::error::PoolError;
use crate::promise::{FutureStatus, TaskFuture};
use crate::task::TaskId;
use crate::token::CancellationToken;

use std::time::{Duration, Instant};

/// A handle to a task submitted with
/// [`ThreadPool::submit_cancellable`](crate::ThreadPool::submit_cancellable).
///
/// Allows for requesting cancellation of the task and retrieving its result.
#[derive(Debug)]
pub struct CancellableFuture<R> {
  future: TaskFuture<R>,
  token: CancellationToken,
}

impl<R> CancellableFuture<R> {
  pub(crate) fn new(future: TaskFuture<R>, token: CancellationToken) -> Self {
    Self { future, token }
  }

  /// Returns the unique ID of this task.
  pub fn id(&self) -> TaskId {
    self.future.id()
  }

  /// Blocks until the task finishes and takes its result.
  ///
  /// A cancelled task still produces whatever its body returned after noticing
  /// the cancellation.
  ///
  /// # Errors
  /// See [`TaskFuture::get`].
  pub fn get(&mut self) -> Result<R, PoolError> {
    self.future.get()
  }

  pub fn wait(&self) -> Result<(), PoolError> {
    self.future.wait()
  }

  pub fn wait_for(&self, timeout: Duration) -> Result<FutureStatus, PoolError> {
    self.future.wait_for(timeout)
  }

  pub fn wait_until(&self, deadline: Instant) -> Result<FutureStatus, PoolError> {
    self.future.wait_until(deadline)
  }

  pub fn valid(&self) -> bool {
    self.future.valid()
  }

  pub fn is_ready(&self) -> bool {
    self.future.is_ready()
  }

  /// Requests cancellation of this task by signalling its `CancellationToken`.
  /// The task must cooperatively check the token; nothing is stopped by force.
  pub fn cancel(&self) {
    tracing::debug!(task_id = %self.id(), "CancellableFuture: Cancellation requested.");
    self.token.cancel();
  }

  /// Checks if cancellation has been requested for this task via its token.
  pub fn is_cancellation_requested(&self) -> bool {
    self.token.is_cancelled()
  }

  /// Returns a clone of the token shared with the task body.
  pub fn token(&self) -> CancellationToken {
    self.token.clone()
  }
}
