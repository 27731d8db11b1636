use crate::shared::Shared;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cooperative cancellation signal shared between a task body and its handle.
///
/// Cancellation is monotonic: once [`cancel`](CancellationToken::cancel) has
/// been called the token stays cancelled. Nothing is interrupted by force; a
/// task notices cancellation only where it calls
/// [`is_cancelled`](CancellationToken::is_cancelled) or sleeps through
/// [`sleep_for`](CancellationToken::sleep_for).
///
/// Clones share the same flag.
#[derive(Clone, Default)]
pub struct CancellationToken {
  state: Arc<Shared<bool>>,
}

impl CancellationToken {
  pub fn new() -> Self {
    Self::default()
  }

  /// Marks the token cancelled and wakes every thread sleeping through it.
  /// Calling this more than once has no further effect.
  pub fn cancel(&self) {
    let newly_cancelled = self.state.with(|cancelled| !std::mem::replace(cancelled, true));
    if newly_cancelled {
      tracing::trace!("Cancellation token signalled.");
    }
    self.state.notify_all();
  }

  /// Returns whether cancellation has been requested. Never waits for it.
  pub fn is_cancelled(&self) -> bool {
    self.state.with(|cancelled| *cancelled)
  }

  /// Sleeps for up to `duration`, returning early if the token is cancelled.
  ///
  /// Returns nothing either way; call [`is_cancelled`](Self::is_cancelled)
  /// afterwards to decide how to proceed.
  pub fn sleep_for(&self, duration: Duration) {
    match Instant::now().checked_add(duration) {
      Some(deadline) => self.sleep_until(deadline),
      // Too far out to represent: only cancellation can end this sleep.
      None => self.state.wait_while(|cancelled| !*cancelled, |_| ()),
    }
  }

  /// Sleeps until `deadline`, returning early if the token is cancelled.
  pub fn sleep_until(&self, deadline: Instant) {
    // Spurious wakeups re-enter the predicate check inside `wait_while_until`.
    self.state.wait_while_until(deadline, |cancelled| !*cancelled, |_, _| ());
  }
}

impl fmt::Debug for CancellationToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CancellationToken")
      .field("is_cancelled", &self.is_cancelled())
      .finish()
  }
}
