//! # Conduit Scheduling
//!
//! Trigger-driven scheduling for the Conduit messaging runtime.
//!
//! ## Key Components
//!
//! - [`Trigger`]: computes the next run time ([`PeriodicTrigger`], [`CronTrigger`], [`OneShotTrigger`])
//! - [`TaskScheduler`]: delay queue with a single dispatch loop
//! - [`ScheduledHandle`]: cancellation handle for a scheduled task
//! - [`TaskExecutor`]: where work runs ([`PooledExecutor`], [`ErrorHandlingTaskExecutor`])
//! - [`Runnable`] / [`Advice`]: units of work and their wrappers
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use conduit_scheduling::{FnRunnable, PeriodicTrigger, TaskScheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scheduler = TaskScheduler::builder("app").pool_size(4).build();
//!     scheduler.start()?;
//!
//!     let work = Arc::new(FnRunnable::new(|| async {
//!         tracing::info!("tick");
//!         Ok(())
//!     }));
//!     let handle = scheduler.schedule(work, Arc::new(PeriodicTrigger::new(Duration::from_secs(1))))?;
//!
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     handle.cancel();
//!     scheduler.stop();
//!     Ok(())
//! }
//! ```

pub mod executor;
pub mod metrics;
pub mod runnable;
pub mod scheduler;
mod task;
pub mod trigger;

pub use executor::{BoxedTask, ErrorHandlingTaskExecutor, PooledExecutor, TaskExecutor};
pub use metrics::{SchedulerMetrics, SchedulerMetricsSnapshot};
pub use runnable::{Advice, FnRunnable, Runnable, apply_advice};
pub use scheduler::{TaskScheduler, TaskSchedulerBuilder};
pub use task::ScheduledHandle;
pub use trigger::{CronTrigger, OneShotTrigger, PeriodicTrigger, Trigger, TriggerContext};
// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;
