//! Serial task scheduler with per-type handlers and paced retries.
//!
//! This module provides:
//! - **TaskQueue**: FIFO of repeated tasks worked through by one background loop.
//! - **TaskHandler**: per-type strategy for running, retrying and grouping tasks.
//! - **Pacing**: randomized attempt backoff and the session throttle.
//! - **TimeEstimator**: rolling per-type duration estimates for ETAs.
//! - **QueueEvent**: broadcast notifications for UIs and logs.
//!
//! # Example
//!
//! ```ignore
//! use promptloom::scheduler::{PacingConfig, TaskQueue};
//!
//! let queue = TaskQueue::new(handlers, PacingConfig::default());
//! let mut events = queue.subscribe();
//! queue.add_task("generate", params, 10)?;
//! let handle = queue.run().expect("not running yet");
//! handle.await?;
//! ```

mod estimator;
mod events;
mod handler;
mod pacing;
mod run;
mod service;
mod task;

pub use estimator::{EstimateKind, EstimatorConfig, TimeEstimator};
pub use events::{EventBus, QueueEvent};
pub use handler::TaskHandler;
pub use pacing::{PacingConfig, RetryConfig};
pub use run::TaskRun;
pub use service::{NO_RESULT_MESSAGE, TaskQueue};
pub use task::{CostItem, Task, TaskInfo, TaskStats};
