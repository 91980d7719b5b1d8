//! Polling endpoints.
//!
//! A polling endpoint schedules one repeating task from its poller's trigger.
//! Each activation runs a poll cycle: up to `max_messages_per_poll` sequential
//! poll-once operations, optionally inside a transaction boundary, with the
//! whole cycle wrapped by the poller's advice chain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, trace};

use conduit_config::{PollerConfig, TriggerConfig};
use conduit_core::{ErrorHandler, MessagingError, MessagingResult, timeout_from_millis};
use conduit_scheduling::{
    Advice, CronTrigger, ErrorHandlingTaskExecutor, PeriodicTrigger, Runnable, ScheduledHandle,
    TaskExecutor, TaskScheduler, Trigger, apply_advice,
};

use crate::lifecycle::{Endpoint, EndpointLifecycle};

#[cfg(test)]
#[path = "polling_tests.rs"]
mod tests;

/// Default receive timeout for polling consumers.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Sentinel for "poll until nothing is received".
pub const UNBOUNDED: i64 = -1;

/// The operation a polling endpoint repeats.
#[async_trait]
pub trait PollSource: Send + Sync {
    /// Attempt one unit of work. Returns `Ok(false)` when there was nothing
    /// to do.
    async fn poll_once(&self, poller: &PollerMetadata) -> MessagingResult<bool>;

    /// Messages per cycle when the poller does not say.
    fn default_max_messages_per_poll(&self) -> i64 {
        UNBOUNDED
    }
}

/// Runs each poll-once inside a transaction.
///
/// Implementations commit on `Ok` and roll back on `Err`, returning the
/// error so the cycle aborts.
#[async_trait]
pub trait TransactionBoundary: Send + Sync {
    async fn execute(
        &self,
        work: BoxFuture<'_, MessagingResult<bool>>,
    ) -> MessagingResult<bool>;
}

/// Poller settings for a polling endpoint.
#[derive(Clone)]
pub struct PollerMetadata {
    pub trigger: Arc<dyn Trigger>,
    /// `None` uses the endpoint default. Non-positive is unbounded.
    pub max_messages_per_poll: Option<i64>,
    /// `None` waits indefinitely.
    pub receive_timeout: Option<Duration>,
    /// `None` waits indefinitely.
    pub send_timeout: Option<Duration>,
    pub transaction_boundary: Option<Arc<dyn TransactionBoundary>>,
    /// First entry is the outermost wrapper.
    pub advice_chain: Vec<Arc<dyn Advice>>,
    /// Dedicated executor for poll cycles.
    pub task_executor: Option<Arc<dyn TaskExecutor>>,
    /// Receives poll failures. Defaults to the scheduler's error handler.
    pub error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl PollerMetadata {
    pub fn new(trigger: Arc<dyn Trigger>) -> Self {
        Self {
            trigger,
            max_messages_per_poll: None,
            receive_timeout: Some(DEFAULT_RECEIVE_TIMEOUT),
            send_timeout: None,
            transaction_boundary: None,
            advice_chain: Vec::new(),
            task_executor: None,
            error_handler: None,
        }
    }

    /// Poll every `interval`, measured from the end of the previous cycle.
    pub fn fixed_delay(interval: Duration) -> Self {
        Self::new(Arc::new(PeriodicTrigger::new(interval)))
    }

    /// Build poller settings from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Configuration`] when the trigger settings are
    /// missing or conflicting, and [`MessagingError::InvalidScheduleExpression`]
    /// for a malformed cron expression.
    pub fn from_config(config: &PollerConfig) -> MessagingResult<Self> {
        let trigger: Arc<dyn Trigger> = match config
            .trigger()
            .map_err(|e| MessagingError::configuration(e.to_string()))?
        {
            TriggerConfig::FixedDelay(interval) => {
                Arc::new(PeriodicTrigger::new(interval).with_initial_delay(config.initial_delay()))
            }
            TriggerConfig::FixedRate(interval) => Arc::new(
                PeriodicTrigger::fixed_rate(interval).with_initial_delay(config.initial_delay()),
            ),
            TriggerConfig::Cron(expression) => Arc::new(CronTrigger::new(expression)?),
        };

        let mut poller = Self::new(trigger)
            .with_receive_timeout(timeout_from_millis(config.receive_timeout_ms))
            .with_send_timeout(timeout_from_millis(config.send_timeout_ms));
        poller.max_messages_per_poll = config.max_messages_per_poll;
        Ok(poller)
    }

    pub fn with_max_messages_per_poll(mut self, max: i64) -> Self {
        self.max_messages_per_poll = Some(max);
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_transaction_boundary(mut self, boundary: Arc<dyn TransactionBoundary>) -> Self {
        self.transaction_boundary = Some(boundary);
        self
    }

    /// Append an advice. Advice added first wraps outermost.
    pub fn with_advice(mut self, advice: Arc<dyn Advice>) -> Self {
        self.advice_chain.push(advice);
        self
    }

    pub fn with_task_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.task_executor = Some(executor);
        self
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }
}

/// One activation of a polling endpoint.
struct PollCycle {
    endpoint: String,
    source: Arc<dyn PollSource>,
    poller: PollerMetadata,
    max_messages: i64,
    error_handler: Arc<dyn ErrorHandler>,
}

impl PollCycle {
    async fn poll_once(&self) -> MessagingResult<bool> {
        match &self.poller.transaction_boundary {
            Some(boundary) => {
                boundary
                    .execute(self.source.poll_once(&self.poller))
                    .await
            }
            None => self.source.poll_once(&self.poller).await,
        }
    }
}

#[async_trait]
impl Runnable for PollCycle {
    /// Poll up to the configured maximum, stopping at the first empty poll.
    ///
    /// A failed poll inside a transaction boundary aborts the cycle with the
    /// error. Without a boundary the failure goes to the error handler and
    /// counts as an attempt; a bounded cycle carries on, an unbounded one
    /// ends so a broken source is not polled in a tight loop.
    async fn run(&self) -> MessagingResult<()> {
        let unbounded = self.max_messages <= 0;
        let mut count: i64 = 0;

        while unbounded || count < self.max_messages {
            match self.poll_once().await {
                Ok(false) => break,
                Ok(true) => count += 1,
                Err(e) if self.poller.transaction_boundary.is_some() => {
                    debug!(endpoint = %self.endpoint, error = %e, "Poll rolled back, cycle aborted");
                    return Err(e);
                }
                Err(e) => {
                    self.error_handler.handle_error(e).await;
                    count += 1;
                    if unbounded {
                        break;
                    }
                }
            }
        }

        trace!(endpoint = %self.endpoint, polled = count, "Poll cycle finished");
        Ok(())
    }
}

/// Hands each cycle to a dedicated executor and waits for it.
///
/// Waiting keeps one cycle in flight per endpoint, so fixed-delay triggers
/// still measure from the end of the cycle. Dropping the run aborts the
/// handed-off cycle.
struct ExecutorHandoff {
    endpoint: String,
    executor: ErrorHandlingTaskExecutor,
    cycle: Arc<dyn Runnable>,
    in_flight: Arc<Mutex<Option<AbortHandle>>>,
}

#[async_trait]
impl Runnable for ExecutorHandoff {
    async fn run(&self) -> MessagingResult<()> {
        let cycle = self.cycle.clone();
        let handle = self
            .executor
            .execute_fallible(&self.endpoint, async move { cycle.run().await });
        *self.in_flight.lock() = Some(handle.abort_handle());

        let outcome = AbortOnDropHandle::new(handle).await;
        self.in_flight.lock().take();
        if outcome.is_err() {
            debug!(endpoint = %self.endpoint, "Handed-off poll cycle aborted");
        }
        // Cycle failures already went to the executor's error handler.
        Ok(())
    }
}

/// Endpoint that repeatedly polls a [`PollSource`] on a scheduler.
pub struct PollingEndpoint {
    lifecycle: EndpointLifecycle,
    source: Arc<dyn PollSource>,
    scheduler: Option<TaskScheduler>,
    poller: Option<PollerMetadata>,
    handle: Mutex<Option<ScheduledHandle>>,
    in_flight: Arc<Mutex<Option<AbortHandle>>>,
}

impl PollingEndpoint {
    /// Create an endpoint. A scheduler and a poller must be set before start.
    pub fn new(name: impl Into<String>, source: Arc<dyn PollSource>) -> Self {
        Self {
            lifecycle: EndpointLifecycle::new(name),
            source,
            scheduler: None,
            poller: None,
            handle: Mutex::new(None),
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_poller(mut self, poller: PollerMetadata) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn poller(&self) -> Option<&PollerMetadata> {
        self.poller.as_ref()
    }

    /// Effective messages per cycle.
    pub fn max_messages_per_poll(&self) -> i64 {
        self.poller
            .as_ref()
            .and_then(|p| p.max_messages_per_poll)
            .unwrap_or_else(|| self.source.default_max_messages_per_poll())
    }

    /// Handle of the scheduled poll task while running.
    pub fn scheduled_handle(&self) -> Option<ScheduledHandle> {
        self.handle.lock().clone()
    }

    fn build_task(
        &self,
        scheduler: &TaskScheduler,
        poller: &PollerMetadata,
    ) -> Arc<dyn Runnable> {
        let error_handler = poller
            .error_handler
            .clone()
            .unwrap_or_else(|| scheduler.error_handler());

        let cycle: Arc<dyn Runnable> = Arc::new(PollCycle {
            endpoint: self.name().to_string(),
            source: self.source.clone(),
            poller: poller.clone(),
            max_messages: self.max_messages_per_poll(),
            error_handler: error_handler.clone(),
        });
        let advised = apply_advice(cycle, &poller.advice_chain);

        match &poller.task_executor {
            None => advised,
            Some(executor) => Arc::new(ExecutorHandoff {
                endpoint: self.name().to_string(),
                executor: ErrorHandlingTaskExecutor::new(executor.clone(), error_handler),
                cycle: advised,
                in_flight: self.in_flight.clone(),
            }),
        }
    }
}

impl Endpoint for PollingEndpoint {
    fn lifecycle(&self) -> &EndpointLifecycle {
        &self.lifecycle
    }

    fn on_init(&self) -> MessagingResult<()> {
        if self.scheduler.is_none() {
            return Err(MessagingError::configuration(format!(
                "polling endpoint '{}' has no task scheduler",
                self.name()
            )));
        }
        if self.poller.is_none() {
            return Err(MessagingError::configuration(format!(
                "polling endpoint '{}' has no poller trigger",
                self.name()
            )));
        }
        Ok(())
    }

    fn do_start(&self) -> MessagingResult<()> {
        let (Some(scheduler), Some(poller)) = (&self.scheduler, &self.poller) else {
            return Err(MessagingError::configuration(format!(
                "polling endpoint '{}' is not configured",
                self.name()
            )));
        };

        let task = self.build_task(scheduler, poller);
        let handle = scheduler.schedule_named(self.name(), task, poller.trigger.clone())?;
        debug!(endpoint = %self.name(), task_id = handle.id(), "Poll task scheduled");
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn do_stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.cancel();
        }
        if let Some(cycle) = self.in_flight.lock().take() {
            cycle.abort();
        }
    }
}
