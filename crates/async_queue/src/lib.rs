//! Async Queue - bounded expansion of dynamically requeued async tasks
//!
//! Seed tasks each run an asynchronous operation. Every produced value may
//! derive follow-up arguments ("requeue terms"), which become tasks one layer
//! deeper. The expansion continues until every branch is exhausted, the
//! maximum depth or the maximum number of admitted tasks is reached, or a
//! short-circuit predicate ends the run early.
//!
//! # Overview
//!
//! - Branches resolve independently, values are collected in completion
//!   order and grouped by layer
//! - A failing operation, callback or requeue step abandons only its own
//!   branch
//! - Optional hooks collect free-form data from produced values and requeue
//!   terms; a failing hook never affects the run
//!
//! # Example
//!
//! ```rust
//! use async_queue::{AsyncQueue, QueueConfig, RequeueTerms};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut queue: AsyncQueue<i64, i64, i64, String> =
//!         AsyncQueue::new(QueueConfig::with_depth(2)?);
//!
//!     queue.enqueue_all(
//!         |arg| async move { Ok(arg) },
//!         [0, 50, 100],
//!         |value| async move { Ok(value) },
//!         |value| async move { Ok(RequeueTerms::Single(value + 1)) },
//!     )?;
//!
//!     let result = queue.begin().await;
//!     assert_eq!(result.len(), 9);
//!     assert_eq!(result.layer(2).len(), 3);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod executor;
pub mod limits;
pub mod reporter;
pub mod result;
pub mod task;
pub mod types;

pub use error::{BoxError, BranchFailure, ConfigViolation, HookFailure, HookKind, QueueError, QueueResult};
pub use executor::AsyncQueue;
pub use limits::Limit;
pub use reporter::{ExpansionEvent, ExpansionReporter, MultiReporter, NoOpReporter, TracingReporter};
pub use result::{ExpansionResult, ResultAggregator};
pub use task::{Expansion, RequeueTerms, Task, TaskId};
pub use types::{ConfigArg, DataMap, QueueConfig, QueueConfigBuilder, QueueLimits, QueueOption, RunStats};

use std::future::Future;
use std::pin::Pin;

/// A boxed future that is Send and can be used across thread boundaries
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
