use crate::error::PoolError;
use crate::handle::CancellableFuture;
use crate::promise::{self, Promise, TaskFuture};
use crate::shared::Shared;
use crate::task::{self, Job, TaskId};
use crate::token::CancellationToken;

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, info_span, trace, trace_span, warn};

const DEFAULT_POOL_NAME: &str = "thread_orchestra";

type WorkerRun = Box<dyn FnOnce() + Send + 'static>;

/// Configuration for a [`ThreadPool`].
#[derive(Debug, Clone, Default)]
pub struct ThreadPoolBuilder {
  worker_count: Option<usize>,
  name: Option<String>,
  stack_size: Option<usize>,
}

impl ThreadPoolBuilder {
  /// Sets the number of worker threads. Defaults to the number of logical CPUs.
  /// Zero is treated as one.
  pub fn worker_count(mut self, count: usize) -> Self {
    self.worker_count = Some(count);
    self
  }

  /// Sets the pool name used in worker thread names and log fields.
  ///
  /// The name must not contain null bytes (`\0`).
  pub fn name<T: Into<String>>(mut self, name: T) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Sets the stack size (in bytes) of every worker thread.
  pub fn stack_size(mut self, size: usize) -> Self {
    self.stack_size = Some(size);
    self
  }

  /// Spawns the workers and returns the running pool.
  ///
  /// # Errors
  /// Returns `PoolError::WorkerSpawnFailed` if a worker thread could not be
  /// started. Workers started before the failure are stopped and joined first.
  pub fn build(self) -> Result<ThreadPool, PoolError> {
    ThreadPool::start(self, |builder, run| builder.spawn(run))
  }
}

struct PoolInner {
  name: String,
  queue: Shared<VecDeque<Job>>,
  stopping: AtomicBool,
  active: AtomicUsize,
}

/// A fixed-size pool of worker threads fed from one FIFO queue.
///
/// Dropping the pool stops it: workers finish the job they are running, every
/// worker is joined, and jobs still queued are discarded. Handles of discarded
/// jobs report [`PoolError::BrokenResult`].
pub struct ThreadPool {
  inner: Arc<PoolInner>,
  workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
  /// Creates a pool with `worker_count` workers and the default name.
  pub fn new(worker_count: usize) -> Result<Self, PoolError> {
    Self::builder().worker_count(worker_count).build()
  }

  /// Creates a pool with one worker per logical CPU and a custom name.
  pub fn with_name<T: Into<String>>(name: T) -> Result<Self, PoolError> {
    Self::builder().name(name).build()
  }

  pub fn builder() -> ThreadPoolBuilder {
    ThreadPoolBuilder::default()
  }

  fn start<S>(config: ThreadPoolBuilder, mut spawn: S) -> Result<Self, PoolError>
  where
    S: FnMut(thread::Builder, WorkerRun) -> io::Result<JoinHandle<()>>,
  {
    let worker_count = config.worker_count.unwrap_or_else(num_cpus::get).max(1);
    let name = config.name.unwrap_or_else(|| DEFAULT_POOL_NAME.to_string());

    // Workers are pushed one at a time so that an early return drops a
    // partially built pool, and its Drop stops and joins whatever started.
    let mut pool = ThreadPool {
      inner: Arc::new(PoolInner {
        name,
        queue: Shared::new(VecDeque::new()),
        stopping: AtomicBool::new(false),
        active: AtomicUsize::new(0),
      }),
      workers: Vec::with_capacity(worker_count),
    };

    for index in 0..worker_count {
      let mut builder = thread::Builder::new().name(format!("{}-worker-{}", pool.inner.name, index));
      if let Some(size) = config.stack_size {
        builder = builder.stack_size(size);
      }

      let worker_inner = pool.inner.clone();
      let run: WorkerRun = Box::new(move || run_worker_loop(worker_inner, index));

      match spawn(builder, run) {
        Ok(handle) => pool.workers.push(handle),
        Err(spawn_error) => {
          error!(
            pool_name = %pool.inner.name,
            worker = index,
            "Failed to spawn worker thread: {}. Rolling back started workers.",
            spawn_error
          );
          return Err(PoolError::WorkerSpawnFailed {
            index,
            reason: spawn_error.to_string(),
          });
        }
      }
    }

    info!(pool_name = %pool.inner.name, workers = worker_count, "Thread pool started.");
    Ok(pool)
  }

  pub fn name(&self) -> &str {
    &self.inner.name
  }

  pub fn worker_count(&self) -> usize {
    self.workers.len()
  }

  /// Returns the current number of tasks waiting in the queue.
  pub fn queued_task_count(&self) -> usize {
    self.inner.queue.with(|queue| queue.len())
  }

  /// Returns the number of tasks a worker is executing right now.
  pub fn active_task_count(&self) -> usize {
    self.inner.active.load(Ordering::Acquire)
  }

  /// Queues `f` and returns a handle to its result without waiting for it to run.
  ///
  /// Arguments are bound by capturing them in the closure. A panic inside `f`
  /// is delivered through the handle as `PoolError::TaskPanicked`.
  pub fn submit<F, R>(&self, f: F) -> TaskFuture<R>
  where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
  {
    let task_id = task::next_task_id();
    let (promise, future) = promise::channel(task_id);
    self.enqueue(Job::new(task_id, move || run_to_promise(task_id, f, promise)));
    future
  }

  /// Queues `f(args)`. Equivalent to `submit(move || f(args))`.
  pub fn submit_with<A, F, R>(&self, f: F, args: A) -> TaskFuture<R>
  where
    A: Send + 'static,
    F: FnOnce(A) -> R + Send + 'static,
    R: Send + 'static,
  {
    self.submit(move || f(args))
  }

  /// Queues `f` with a fresh [`CancellationToken`] as its argument.
  ///
  /// The returned handle shares the token, so [`CancellableFuture::cancel`]
  /// becomes visible to the task wherever it checks or sleeps through it.
  pub fn submit_cancellable<F, R>(&self, f: F) -> CancellableFuture<R>
  where
    F: FnOnce(CancellationToken) -> R + Send + 'static,
    R: Send + 'static,
  {
    let token = CancellationToken::new();
    let task_token = token.clone();
    let future = self.submit(move || f(task_token));
    CancellableFuture::new(future, token)
  }

  fn enqueue(&self, job: Job) {
    debug!(pool_name = %self.inner.name, task_id = %job.task_id, "Submitting task to queue.");
    self.inner.queue.with(|queue| queue.push_back(job));
    self.inner.queue.notify_one();
  }
}

fn run_to_promise<F, R>(task_id: TaskId, f: F, promise: Promise<R>)
where
  F: FnOnce() -> R,
{
  let outcome = panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
    let message = task::panic_message(payload.as_ref());
    error!(%task_id, "Task panicked during execution: {}", message);
    PoolError::TaskPanicked(message)
  });
  if outcome.is_ok() {
    trace!(%task_id, "Task executed successfully.");
  }
  promise.complete(outcome);
}

fn run_worker_loop(inner: Arc<PoolInner>, index: usize) {
  let span = info_span!("pool_worker", pool_name = %inner.name, worker = index);
  let _entered = span.enter();
  debug!("Worker started.");

  loop {
    let next = inner.queue.wait(
      |queue| {
        let job = queue.pop_front();
        if job.is_some() {
          inner.active.fetch_add(1, Ordering::AcqRel);
        }
        job
      },
      |queue| queue.is_empty(),
      &inner.stopping,
    );

    let Some(job) = next.flatten() else {
      break;
    };

    let task_id = job.task_id;
    trace!(%task_id, "Dequeued task.");
    trace_span!("pool_task", %task_id).in_scope(|| job.run());
    inner.active.fetch_sub(1, Ordering::AcqRel);
  }

  debug!("Worker observed shutdown signal. Exiting.");
}

impl Drop for ThreadPool {
  fn drop(&mut self) {
    info!(
      pool_name = %self.inner.name,
      workers = self.workers.len(),
      "ThreadPool dropped. Signalling workers to stop."
    );

    // Raised under the queue lock so a worker cannot check the flag and then
    // miss the notify below.
    self.inner.queue.with(|_| self.inner.stopping.store(true, Ordering::Release));
    self.inner.queue.notify_all();

    let current = thread::current().id();
    for (index, handle) in self.workers.drain(..).enumerate() {
      if handle.thread().id() == current {
        warn!(pool_name = %self.inner.name, worker = index, "Pool dropped from one of its own workers; not joining it.");
        continue;
      }
      if handle.join().is_err() {
        error!(pool_name = %self.inner.name, worker = index, "Worker thread panicked outside of a task.");
      }
    }

    let discarded = self.inner.queue.with(std::mem::take);
    if !discarded.is_empty() {
      warn!(
        pool_name = %self.inner.name,
        discarded = discarded.len(),
        "Discarding queued tasks that never started."
      );
      for job in &discarded {
        debug!(pool_name = %self.inner.name, task_id = %job.task_id, "Task discarded unexecuted.");
      }
    }
    // Dropping the jobs drops their promises, breaking the callers' handles.
    drop(discarded);

    info!(pool_name = %self.inner.name, "Thread pool stopped.");
  }
}

impl fmt::Debug for ThreadPool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ThreadPool")
      .field("name", &self.inner.name)
      .field("workers", &self.workers.len())
      .field("queued", &self.queued_task_count())
      .field("active", &self.active_task_count())
      .finish()
  }
}
