use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thread_orchestra::{CancellationToken, FutureStatus, ThreadPool};

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,thread_orchestra=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

#[test]
fn test_cancel_interrupts_long_sleep() {
  setup_tracing_for_test();
  let pool = ThreadPool::builder().worker_count(1).name("test_pool_cancel_sleep").build().unwrap();

  let mut handle = pool.submit_cancellable(|token| {
    let start = Instant::now();
    token.sleep_for(Duration::from_secs(10));
    (token.is_cancelled(), start.elapsed())
  });

  thread::sleep(Duration::from_millis(50));
  assert!(!handle.is_cancellation_requested());
  handle.cancel();
  assert!(handle.is_cancellation_requested());

  let (observed, slept) = handle.get().unwrap();
  assert!(observed, "task should observe the cancellation");
  assert!(slept < Duration::from_secs(2), "sleep lasted {:?}", slept);
}

#[test]
fn test_cancelled_task_chooses_its_own_outcome() {
  setup_tracing_for_test();
  let pool = ThreadPool::new(1).unwrap();

  let mut handle = pool.submit_cancellable(|token| {
    for step in 0..20 {
      if token.is_cancelled() {
        return Err(format!("stopped at step {}", step));
      }
      token.sleep_for(Duration::from_millis(500));
    }
    Ok("finished")
  });

  thread::sleep(Duration::from_millis(30));
  handle.cancel();

  match handle.get() {
    Ok(Err(message)) => assert!(message.starts_with("stopped at step"), "{}", message),
    other => panic!("Expected the task's own cancellation error, got {:?}", other),
  }
}

#[test]
fn test_cancel_before_start_is_seen_immediately() {
  setup_tracing_for_test();
  let pool = ThreadPool::new(1).unwrap();
  let release = CancellationToken::new();

  // Occupy the single worker so the next task stays queued.
  let mut blocker = {
    let release = release.clone();
    pool.submit(move || release.sleep_for(Duration::from_secs(10)))
  };
  let mut handle = pool.submit_cancellable(|token| token.is_cancelled());

  handle.cancel();
  release.cancel();

  assert_eq!(blocker.get(), Ok(()));
  assert_eq!(handle.get(), Ok(true));
}

#[test]
fn test_uncooperative_task_is_not_stopped() {
  setup_tracing_for_test();
  let pool = ThreadPool::new(1).unwrap();
  let finished = Arc::new(AtomicBool::new(false));

  let mut handle = {
    let finished = finished.clone();
    pool.submit_cancellable(move |_token| {
      thread::sleep(Duration::from_millis(100));
      finished.store(true, Ordering::SeqCst);
      "ran to completion"
    })
  };

  thread::sleep(Duration::from_millis(10));
  handle.cancel();

  assert_eq!(handle.get(), Ok("ran to completion"));
  assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn test_wait_timeout_does_not_cancel_task() {
  setup_tracing_for_test();
  let pool = ThreadPool::new(1).unwrap();

  let mut handle = pool.submit_cancellable(|token| {
    token.sleep_for(Duration::from_millis(150));
    token.is_cancelled()
  });

  assert_eq!(handle.wait_for(Duration::from_millis(10)), Ok(FutureStatus::Timeout));
  assert!(!handle.is_cancellation_requested());
  assert_eq!(handle.wait(), Ok(()));
  assert!(handle.is_ready());
  assert!(handle.valid());
  assert_eq!(handle.get(), Ok(false));
  assert!(!handle.valid());
}

#[test]
fn test_token_accessor_shares_the_task_token() {
  setup_tracing_for_test();
  let pool = ThreadPool::new(1).unwrap();

  let mut handle = pool.submit_cancellable(|token| {
    token.sleep_for(Duration::from_secs(10));
    token.is_cancelled()
  });

  let external = handle.token();
  assert!(!external.is_cancelled());

  thread::spawn(move || {
    thread::sleep(Duration::from_millis(20));
    external.cancel();
  });

  assert_eq!(handle.wait_until(Instant::now() + Duration::from_secs(5)), Ok(FutureStatus::Ready));
  assert_eq!(handle.get(), Ok(true));
}

#[test]
fn test_dropping_pool_with_cancellable_task_queued_breaks_it() {
  setup_tracing_for_test();
  let pool = ThreadPool::new(1).unwrap();
  let release = CancellationToken::new();

  let mut running = {
    let release = release.clone();
    pool.submit_cancellable(move |_token| release.sleep_for(Duration::from_secs(10)))
  };
  let mut queued = pool.submit_cancellable(|token| token.is_cancelled());

  // Wait until the first task occupies the worker.
  let deadline = Instant::now() + Duration::from_secs(5);
  while pool.active_task_count() == 0 && Instant::now() < deadline {
    thread::sleep(Duration::from_millis(5));
  }

  let releaser = {
    let release = release.clone();
    thread::spawn(move || {
      thread::sleep(Duration::from_millis(50));
      release.cancel();
    })
  };
  drop(pool);
  releaser.join().unwrap();

  assert_eq!(running.get(), Ok(()));
  assert_eq!(queued.get(), Err(thread_orchestra::PoolError::BrokenResult));
}
