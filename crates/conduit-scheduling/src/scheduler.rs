//! Trigger-driven task scheduler.
//!
//! Pending tasks wait in a delay queue ordered by their next run time. A
//! single dispatch loop hands due tasks to the executor; after each run the
//! task asks its trigger for the next time and goes back into the queue.
//! A task is only ever queued or running, never both, so its runs never
//! overlap.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info};

use conduit_config::SchedulerConfig;
use conduit_core::{ErrorHandler, LoggingErrorHandler, MessagingError, MessagingResult};

use crate::executor::{PooledExecutor, TaskExecutor, run_catching};
use crate::metrics::{SchedulerMetrics, SchedulerMetricsSnapshot};
use crate::runnable::Runnable;
use crate::task::{PendingEntry, ScheduledHandle, ScheduledTask};
use crate::trigger::{PeriodicTrigger, Trigger};

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

/// Lifecycle state guarded by the scheduler lock.
struct DispatchState {
    running: bool,
    token: CancellationToken,
    dispatcher: Option<JoinHandle<()>>,
}

/// Shared scheduler state.
pub(crate) struct SchedulerInner {
    name: String,
    queue: Mutex<BinaryHeap<PendingEntry>>,
    executing: DashMap<u64, Arc<ScheduledTask>>,
    state: Mutex<DispatchState>,
    wakeup: Arc<Notify>,
    executor: Arc<dyn TaskExecutor>,
    error_handler: Arc<dyn ErrorHandler>,
    metrics: SchedulerMetrics,
    next_id: AtomicU64,
    sequence: AtomicU64,
}

impl SchedulerInner {
    fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn enqueue(&self, task: Arc<ScheduledTask>, at: DateTime<Utc>) {
        self.push(task, at, false);
    }

    /// Re-enqueue after a run. A scheduler stopped meanwhile cancels the task.
    fn reschedule(&self, task: Arc<ScheduledTask>, at: DateTime<Utc>) {
        self.push(task, at, true);
    }

    fn push(&self, task: Arc<ScheduledTask>, at: DateTime<Utc>, require_running: bool) {
        task.set_next_run(Some(at));
        {
            let mut queue = self.queue.lock();
            // Checked under the queue lock so a concurrent cancel or stop
            // cannot miss the entry.
            if !task.is_active() {
                return;
            }
            if require_running && !self.is_running() {
                if task.cancel() {
                    self.metrics.record_cancelled();
                }
                return;
            }
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            queue.push(PendingEntry { at, seq, task });
        }
        self.wakeup.notify_one();
    }

    /// Drop every reference to a cancelled task.
    pub(crate) fn forget(&self, task: &ScheduledTask) {
        self.queue.lock().retain(|entry| entry.task.id != task.id);
        self.executing.remove(&task.id);
        self.metrics.record_cancelled();
        debug!(scheduler = %self.name, task_id = task.id, task = %task.name, "Task cancelled");
    }

    /// Hand every due task to the executor.
    ///
    /// Returns how long until the next task is due, or `None` when the queue
    /// is empty.
    fn dispatch_due(self: &Arc<Self>, token: &CancellationToken) -> Option<Duration> {
        loop {
            let task = {
                let mut queue = self.queue.lock();
                let head = queue.peek()?;
                let now = Utc::now();
                if head.at > now {
                    return Some((head.at - now).to_std().unwrap_or(Duration::ZERO));
                }
                // A deactivated scheduler leaves due tasks queued.
                if token.is_cancelled() {
                    return None;
                }
                // Marked executing before the queue lock is released, so a
                // concurrent stop or cancel always finds the task.
                queue
                    .pop()
                    .map(|entry| entry.task)
                    .filter(|task| task.is_active())
                    .inspect(|task| {
                        self.executing.insert(task.id, task.clone());
                    })
            };
            if let Some(task) = task {
                self.dispatch(task);
            }
        }
    }

    fn dispatch(self: &Arc<Self>, task: Arc<ScheduledTask>) {
        debug!(scheduler = %self.name, task_id = task.id, task = %task.name, "Dispatching task");

        let handle = self.executor.execute(
            &task.name,
            Box::pin(Self::run_task(self.clone(), task.clone())),
        );
        task.set_execution(handle.abort_handle());
    }

    async fn run_task(self: Arc<Self>, task: Arc<ScheduledTask>) {
        // Cancelled between dispatch and the executor picking the run up.
        if !task.is_active() {
            self.executing.remove(&task.id);
            return;
        }
        let started = Utc::now();
        let scheduled = task.next_run().unwrap_or(started);

        let result = run_catching(task.work.run()).await;

        let completed = Utc::now();
        self.executing.remove(&task.id);
        self.metrics.record_execution(result.is_err());
        if let Err(e) = result {
            debug!(task_id = task.id, task = %task.name, error = %e, "Task run failed");
            self.error_handler.handle_error(e).await;
        }

        if !task.is_active() {
            return;
        }

        match task.record_run(scheduled, started, completed) {
            Ok(Some(next)) => self.reschedule(task, next),
            Ok(None) => {
                task.retire();
                debug!(task_id = task.id, task = %task.name, "Trigger exhausted, task retired");
            }
            Err(e) => {
                task.retire();
                self.error_handler.handle_error(e).await;
            }
        }
    }
}

async fn dispatch_loop(
    inner: Weak<SchedulerInner>,
    wakeup: Arc<Notify>,
    token: CancellationToken,
) {
    loop {
        let notified = wakeup.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if token.is_cancelled() {
            break;
        }
        let wait = match inner.upgrade() {
            Some(inner) => inner.dispatch_due(&token),
            None => break,
        };

        match wait {
            None => tokio::select! {
                _ = token.cancelled() => break,
                _ = notified.as_mut() => {}
            },
            Some(delay) => tokio::select! {
                _ = token.cancelled() => break,
                _ = notified.as_mut() => {}
                _ = tokio::time::sleep(delay) => {}
            },
        }
    }
    debug!("Dispatch loop exited");
}

/// Trigger-driven task scheduler.
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

impl TaskScheduler {
    /// Create a scheduler with an unbounded executor and a logging error handler.
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> TaskSchedulerBuilder {
        TaskSchedulerBuilder::new(name)
    }

    /// Create a scheduler from configuration.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::builder(config.name.clone())
            .pool_size(config.pool_size)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Error handler receiving task failures.
    pub fn error_handler(&self) -> Arc<dyn ErrorHandler> {
        self.inner.error_handler.clone()
    }

    /// Start the dispatch loop. Starting a running scheduler is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a tokio runtime.
    pub fn start(&self) -> MessagingResult<()> {
        let mut state = self.inner.state.lock();
        if state.running {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MessagingError::Internal(format!("scheduler needs a tokio runtime: {e}")))?;

        let token = CancellationToken::new();
        let span = tracing::info_span!("dispatch_loop", scheduler = %self.inner.name);
        let dispatcher = runtime.spawn(
            dispatch_loop(
                Arc::downgrade(&self.inner),
                self.inner.wakeup.clone(),
                token.clone(),
            )
            .instrument(span),
        );

        state.running = true;
        state.token = token;
        state.dispatcher = Some(dispatcher);
        info!(scheduler = %self.inner.name, "Scheduler started");
        Ok(())
    }

    /// Stop the scheduler: interrupt the dispatch loop, cancel every queued
    /// task and abort every running one. Stopping a stopped scheduler is a
    /// no-op.
    pub fn stop(&self) {
        let dispatcher = {
            let mut state = self.inner.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            state.token.cancel();
            state.dispatcher.take()
        };

        // Under the queue lock the dispatch loop cannot be between taking a
        // task off the queue and marking it executing.
        let (pending, running) = {
            let mut queue = self.inner.queue.lock();
            let pending: Vec<PendingEntry> = queue.drain().collect();
            let running: Vec<Arc<ScheduledTask>> = self
                .inner
                .executing
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            self.inner.executing.clear();
            (pending, running)
        };

        let tasks = pending.into_iter().map(|entry| entry.task).chain(running);
        let mut cancelled = 0usize;
        for task in tasks {
            if task.cancel() {
                self.inner.metrics.record_cancelled();
                cancelled += 1;
            }
        }

        if let Some(dispatcher) = dispatcher {
            dispatcher.abort();
        }
        info!(scheduler = %self.inner.name, cancelled, "Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Schedule `work` according to `trigger`.
    ///
    /// Tasks scheduled before [`start`](Self::start) wait until the scheduler
    /// runs. A trigger that yields no first run returns a handle that is
    /// already done.
    ///
    /// # Errors
    ///
    /// Returns the trigger's error if the first run cannot be computed.
    pub fn schedule(
        &self,
        work: Arc<dyn Runnable>,
        trigger: Arc<dyn Trigger>,
    ) -> MessagingResult<ScheduledHandle> {
        self.schedule_task(None, work, trigger)
    }

    /// Schedule `work` under a task name used in logs.
    pub fn schedule_named(
        &self,
        name: impl Into<String>,
        work: Arc<dyn Runnable>,
        trigger: Arc<dyn Trigger>,
    ) -> MessagingResult<ScheduledHandle> {
        self.schedule_task(Some(name.into()), work, trigger)
    }

    fn schedule_task(
        &self,
        name: Option<String>,
        work: Arc<dyn Runnable>,
        trigger: Arc<dyn Trigger>,
    ) -> MessagingResult<ScheduledHandle> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.unwrap_or_else(|| format!("{}-task-{id}", self.inner.name));
        let task = Arc::new(ScheduledTask::new(id, name, work, trigger));
        let handle = ScheduledHandle::new(task.clone(), Arc::downgrade(&self.inner));

        match task.first_run()? {
            Some(at) => {
                self.inner.metrics.record_scheduled();
                debug!(
                    scheduler = %self.inner.name,
                    task_id = id,
                    task = %task.name,
                    at = %at.to_rfc3339(),
                    "Task scheduled"
                );
                self.inner.enqueue(task, at);
            }
            None => task.retire(),
        }
        Ok(handle)
    }

    /// Run `work` repeatedly, `delay` after each completion.
    pub fn schedule_with_fixed_delay(
        &self,
        work: Arc<dyn Runnable>,
        delay: Duration,
    ) -> MessagingResult<ScheduledHandle> {
        self.schedule(work, Arc::new(PeriodicTrigger::new(delay)))
    }

    /// Run `work` every `period`, measured between scheduled start times.
    pub fn schedule_at_fixed_rate(
        &self,
        work: Arc<dyn Runnable>,
        period: Duration,
    ) -> MessagingResult<ScheduledHandle> {
        self.schedule(work, Arc::new(PeriodicTrigger::fixed_rate(period)))
    }

    /// Tasks waiting in the delay queue.
    pub fn pending_count(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Tasks currently executing.
    pub fn active_count(&self) -> usize {
        self.inner.executing.len()
    }

    pub fn metrics(&self) -> SchedulerMetricsSnapshot {
        self.inner
            .metrics
            .snapshot(self.pending_count(), self.active_count())
    }
}

/// Builder for [`TaskScheduler`].
pub struct TaskSchedulerBuilder {
    name: String,
    pool_size: Option<usize>,
    executor: Option<Arc<dyn TaskExecutor>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl TaskSchedulerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pool_size: None,
            executor: None,
            error_handler: None,
        }
    }

    /// Bound the default executor. `0` is unbounded. Ignored when an
    /// executor is supplied.
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = Some(pool_size);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn error_handler(mut self, error_handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(error_handler);
        self
    }

    pub fn build(self) -> TaskScheduler {
        let executor: Arc<dyn TaskExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(PooledExecutor::new(self.name.clone(), self.pool_size)),
        };
        let error_handler: Arc<dyn ErrorHandler> = match self.error_handler {
            Some(handler) => handler,
            None => Arc::new(LoggingErrorHandler),
        };

        TaskScheduler {
            inner: Arc::new(SchedulerInner {
                name: self.name,
                queue: Mutex::new(BinaryHeap::new()),
                executing: DashMap::new(),
                state: Mutex::new(DispatchState {
                    running: false,
                    token: CancellationToken::new(),
                    dispatcher: None,
                }),
                wakeup: Arc::new(Notify::new()),
                executor,
                error_handler,
                metrics: SchedulerMetrics::new(),
                next_id: AtomicU64::new(0),
                sequence: AtomicU64::new(0),
            }),
        }
    }
}
