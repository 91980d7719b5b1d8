//! Triggers compute the next run time of a scheduled task.
//!
//! A trigger is a pure function of the [`TriggerContext`]: it never mutates
//! state and may be called concurrently.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use cron::Schedule;

use conduit_core::{MessagingError, MessagingResult};

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;

/// Execution history of a scheduled task.
///
/// Every field is `None` until the task has run once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerContext {
    /// When the last run was scheduled to start.
    pub last_scheduled: Option<DateTime<Utc>>,
    /// When the last run actually started.
    pub last_actual_start: Option<DateTime<Utc>>,
    /// When the last run completed.
    pub last_completion: Option<DateTime<Utc>>,
}

impl TriggerContext {
    /// Context of a task that never ran.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed run.
    pub fn update(
        &mut self,
        scheduled: DateTime<Utc>,
        actual_start: DateTime<Utc>,
        completion: DateTime<Utc>,
    ) {
        self.last_scheduled = Some(scheduled);
        self.last_actual_start = Some(actual_start);
        self.last_completion = Some(completion);
    }
}

/// Computes when a task should next run.
pub trait Trigger: Send + Sync + fmt::Debug {
    /// Next run time, or `None` to retire the task.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::InvalidScheduleExpression`] when no next time
    /// can be computed.
    fn next_execution_time(&self, context: &TriggerContext)
    -> MessagingResult<Option<DateTime<Utc>>>;
}

fn to_delta(duration: Duration) -> MessagingResult<TimeDelta> {
    TimeDelta::from_std(duration)
        .map_err(|e| MessagingError::configuration(format!("duration out of range: {e}")))
}

/// Fixed-delay or fixed-rate periodic trigger.
///
/// Fixed-delay (the default) measures the interval from the completion of the
/// previous run; fixed-rate measures it from the previous scheduled time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicTrigger {
    interval: Duration,
    initial_delay: Duration,
    fixed_rate: bool,
}

impl PeriodicTrigger {
    /// Create a fixed-delay trigger with no initial delay.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            initial_delay: Duration::ZERO,
            fixed_rate: false,
        }
    }

    /// Create a fixed-rate trigger with no initial delay.
    pub fn fixed_rate(interval: Duration) -> Self {
        Self {
            fixed_rate: true,
            ..Self::new(interval)
        }
    }

    /// Delay the first run.
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn is_fixed_rate(&self) -> bool {
        self.fixed_rate
    }
}

impl Trigger for PeriodicTrigger {
    fn next_execution_time(
        &self,
        context: &TriggerContext,
    ) -> MessagingResult<Option<DateTime<Utc>>> {
        let Some(last_scheduled) = context.last_scheduled else {
            return Ok(Some(Utc::now() + to_delta(self.initial_delay)?));
        };

        let interval = to_delta(self.interval)?;
        if self.fixed_rate {
            return Ok(Some(last_scheduled + interval));
        }

        let base = context.last_completion.unwrap_or_else(Utc::now);
        Ok(Some(base + interval))
    }
}

/// Trigger driven by a cron expression.
///
/// Uses the seconds-first syntax of the `cron` crate:
/// `second minute hour day_of_month month day_of_week [year]`.
#[derive(Clone)]
pub struct CronTrigger {
    expression: String,
    schedule: Schedule,
}

impl CronTrigger {
    /// Parse a cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::InvalidScheduleExpression`] if the expression
    /// is malformed.
    pub fn new(expression: impl Into<String>) -> MessagingResult<Self> {
        let expression = expression.into();
        let schedule = Schedule::from_str(&expression).map_err(|e| {
            MessagingError::InvalidScheduleExpression {
                expression: expression.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            expression,
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl fmt::Debug for CronTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronTrigger")
            .field("expression", &self.expression)
            .finish()
    }
}

impl Trigger for CronTrigger {
    fn next_execution_time(
        &self,
        context: &TriggerContext,
    ) -> MessagingResult<Option<DateTime<Utc>>> {
        let mut base = context.last_completion.unwrap_or_else(Utc::now);
        // A run that finished early must not fire twice for the same slot.
        if let Some(scheduled) = context.last_scheduled {
            if scheduled > base {
                base = scheduled;
            }
        }

        match self.schedule.after(&base).next() {
            Some(next) => Ok(Some(next)),
            None => Err(MessagingError::InvalidScheduleExpression {
                expression: self.expression.clone(),
                reason: format!("no fire time after {}", base.to_rfc3339()),
            }),
        }
    }
}

/// Trigger that fires exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneShotTrigger {
    at: DateTime<Utc>,
}

impl OneShotTrigger {
    /// Fire at `at`.
    pub fn at(at: DateTime<Utc>) -> Self {
        Self { at }
    }

    /// Fire `delay` from now.
    pub fn after(delay: Duration) -> MessagingResult<Self> {
        Ok(Self::at(Utc::now() + to_delta(delay)?))
    }
}

impl Trigger for OneShotTrigger {
    fn next_execution_time(
        &self,
        context: &TriggerContext,
    ) -> MessagingResult<Option<DateTime<Utc>>> {
        Ok(match context.last_scheduled {
            None => Some(self.at),
            Some(_) => None,
        })
    }
}
