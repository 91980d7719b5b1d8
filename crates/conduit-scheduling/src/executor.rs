//! Executors that run scheduled work on tokio tasks.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug};

use conduit_core::{ErrorHandler, MessagingError, MessagingResult};

/// Boxed unit of work handed to an executor.
pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs units of work concurrently.
pub trait TaskExecutor: Send + Sync {
    /// Start executing `task`. The returned handle can abort it.
    fn execute(&self, name: &str, task: BoxedTask) -> JoinHandle<()>;
}

/// Describe a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Await `work`, turning a panic into a [`MessagingError::WorkExecution`].
pub(crate) async fn run_catching<F>(work: F) -> MessagingResult<()>
where
    F: Future<Output = MessagingResult<()>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(MessagingError::WorkExecution(format!(
            "task panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

/// Spawns each unit of work on the tokio runtime, bounded by a semaphore.
pub struct PooledExecutor {
    name: String,
    permits: Option<Arc<Semaphore>>,
    active: Arc<AtomicUsize>,
}

impl PooledExecutor {
    /// Create an executor running at most `capacity` tasks at once.
    ///
    /// `None` (or `Some(0)`) is unbounded.
    pub fn new(name: impl Into<String>, capacity: Option<usize>) -> Self {
        Self {
            name: name.into(),
            permits: capacity
                .filter(|&c| c > 0)
                .map(|c| Arc::new(Semaphore::new(c))),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create an unbounded executor.
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of tasks currently running (not waiting for a permit).
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of free slots, or `None` when unbounded.
    pub fn available_permits(&self) -> Option<usize> {
        self.permits.as_ref().map(|p| p.available_permits())
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TaskExecutor for PooledExecutor {
    fn execute(&self, name: &str, task: BoxedTask) -> JoinHandle<()> {
        let permits = self.permits.clone();
        let active = self.active.clone();
        let span = tracing::debug_span!("executor_task", executor = %self.name, task = %name);

        debug!(executor = %self.name, task = %name, "Submitting task");

        tokio::spawn(
            async move {
                let _permit = match permits {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                    None => None,
                };
                active.fetch_add(1, Ordering::SeqCst);
                let _guard = ActiveGuard(active);
                task.await;
            }
            .instrument(span),
        )
    }
}

/// Executor wrapper that routes failures of fallible work to an
/// [`ErrorHandler`] instead of dropping them.
pub struct ErrorHandlingTaskExecutor {
    executor: Arc<dyn TaskExecutor>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl ErrorHandlingTaskExecutor {
    pub fn new(executor: Arc<dyn TaskExecutor>, error_handler: Arc<dyn ErrorHandler>) -> Self {
        Self {
            executor,
            error_handler,
        }
    }

    /// Execute fallible work. Errors and panics go to the error handler.
    pub fn execute_fallible<F>(&self, name: &str, work: F) -> JoinHandle<()>
    where
        F: Future<Output = MessagingResult<()>> + Send + 'static,
    {
        let error_handler = self.error_handler.clone();
        self.executor.execute(
            name,
            Box::pin(async move {
                if let Err(e) = run_catching(work).await {
                    error_handler.handle_error(e).await;
                }
            }),
        )
    }
}

impl TaskExecutor for ErrorHandlingTaskExecutor {
    /// Panics in `task` are reported to the error handler.
    fn execute(&self, name: &str, task: BoxedTask) -> JoinHandle<()> {
        self.execute_fallible(name, async move {
            task.await;
            Ok(())
        })
    }
}
