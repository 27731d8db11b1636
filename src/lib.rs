//! A fixed-size thread pool with single-value result handles, panic capture,
//! and cooperative cancellation.
//!
//! ```
//! use std::time::Duration;
//! use thread_orchestra::ThreadPool;
//!
//! let pool = ThreadPool::new(2).unwrap();
//!
//! let mut sum = pool.submit(|| 1 + 2);
//! assert_eq!(sum.get(), Ok(3));
//!
//! let mut sleeper = pool.submit_cancellable(|token| {
//!   token.sleep_for(Duration::from_secs(10));
//!   token.is_cancelled()
//! });
//! sleeper.cancel();
//! assert_eq!(sleeper.get(), Ok(true));
//! ```

mod error;
mod handle;
mod pool;
mod promise;
mod shared;
mod task;
mod token;

pub use error::PoolError;
pub use handle::CancellableFuture;
pub use pool::{ThreadPool, ThreadPoolBuilder};
pub use promise::{FutureStatus, TaskFuture};
pub use shared::Shared;
pub use task::TaskId;
pub use token::CancellationToken;
