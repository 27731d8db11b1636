use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// A value guarded by a mutex and a condition variable.
///
/// All access goes through locked transactions ([`Shared::with`]) or through one
/// of the predicate waits. Every change made through `with` that can flip a
/// waiter's predicate must be followed by [`Shared::notify_one`] or
/// [`Shared::notify_all`]; skipping the notify is a lost wakeup.
///
/// Exit signals passed to [`Shared::wait`] must be raised while the lock is held
/// (for example inside `with`) and followed by `notify_all`. A waiter reads the
/// signal under the lock, so raising it under the lock guarantees the waiter
/// either sees it before sleeping or is already parked when the notify arrives.
pub struct Shared<T> {
  value: Mutex<T>,
  cv: Condvar,
}

impl<T> Shared<T> {
  pub fn new(value: T) -> Self {
    Self {
      value: Mutex::new(value),
      cv: Condvar::new(),
    }
  }

  /// Runs `f` on the protected value while holding the lock.
  pub fn with<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
    let mut guard = self.value.lock();
    f(&mut guard)
  }

  /// Wakes one waiter. Returns whether a thread was woken.
  pub fn notify_one(&self) -> bool {
    self.cv.notify_one()
  }

  /// Wakes every waiter. Returns the number of threads woken.
  pub fn notify_all(&self) -> usize {
    self.cv.notify_all()
  }

  /// Blocks while `continue_while` holds and `exit_signal` is clear.
  ///
  /// Returns `None` without calling `on_ready` if the exit signal was observed,
  /// otherwise `Some(on_ready(value))` evaluated under the still-held lock.
  pub fn wait<U>(
    &self,
    on_ready: impl FnOnce(&mut T) -> U,
    mut continue_while: impl FnMut(&T) -> bool,
    exit_signal: &AtomicBool,
  ) -> Option<U> {
    let mut guard = self.value.lock();
    loop {
      if exit_signal.load(Ordering::Acquire) {
        return None;
      }
      if !continue_while(&guard) {
        return Some(on_ready(&mut guard));
      }
      self.cv.wait(&mut guard);
    }
  }

  /// Blocks while `continue_while` holds, then runs `on_ready` under the lock.
  pub fn wait_while<U>(&self, mut continue_while: impl FnMut(&T) -> bool, on_ready: impl FnOnce(&mut T) -> U) -> U {
    let mut guard = self.value.lock();
    while continue_while(&guard) {
      self.cv.wait(&mut guard);
    }
    on_ready(&mut guard)
  }

  /// Like [`Shared::wait_while`], bounded by `deadline`.
  ///
  /// `on_ready` receives `true` as its second argument when the deadline passed
  /// with `continue_while` still holding.
  pub fn wait_while_until<U>(
    &self,
    deadline: Instant,
    mut continue_while: impl FnMut(&T) -> bool,
    on_ready: impl FnOnce(&mut T, bool) -> U,
  ) -> U {
    let mut guard = self.value.lock();
    while continue_while(&guard) {
      if self.cv.wait_until(&mut guard, deadline).timed_out() {
        let timed_out = continue_while(&guard);
        return on_ready(&mut guard, timed_out);
      }
    }
    on_ready(&mut guard, false)
  }
}

impl<T: Default> Default for Shared<T> {
  fn default() -> Self {
    Self::new(T::default())
  }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.value.try_lock() {
      Some(guard) => f.debug_struct("Shared").field("value", &*guard).finish(),
      None => f.debug_struct("Shared").field("value", &"<locked>").finish(),
    }
  }
}
