//! Scheduled tasks, their queue ordering, and the handles returned to callers.

use std::cmp::Ordering;
use std::sync::atomic::{self, AtomicU8};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::AbortHandle;

use conduit_core::MessagingResult;

use crate::runnable::Runnable;
use crate::scheduler::SchedulerInner;
use crate::trigger::{Trigger, TriggerContext};

const ACTIVE: u8 = 0;
const DONE: u8 = 1;
const CANCELLED: u8 = 2;

/// A unit of work bound to its trigger.
pub(crate) struct ScheduledTask {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) work: Arc<dyn Runnable>,
    trigger: Arc<dyn Trigger>,
    context: Mutex<TriggerContext>,
    next_run: Mutex<Option<DateTime<Utc>>>,
    state: AtomicU8,
    execution: Mutex<Option<AbortHandle>>,
}

impl ScheduledTask {
    pub(crate) fn new(
        id: u64,
        name: String,
        work: Arc<dyn Runnable>,
        trigger: Arc<dyn Trigger>,
    ) -> Self {
        Self {
            id,
            name,
            work,
            trigger,
            context: Mutex::new(TriggerContext::new()),
            next_run: Mutex::new(None),
            state: AtomicU8::new(ACTIVE),
            execution: Mutex::new(None),
        }
    }

    /// Ask the trigger for the first run.
    pub(crate) fn first_run(&self) -> MessagingResult<Option<DateTime<Utc>>> {
        self.trigger.next_execution_time(&self.context.lock())
    }

    /// Record a completed run and ask the trigger for the next one.
    pub(crate) fn record_run(
        &self,
        scheduled: DateTime<Utc>,
        started: DateTime<Utc>,
        completed: DateTime<Utc>,
    ) -> MessagingResult<Option<DateTime<Utc>>> {
        let mut context = self.context.lock();
        context.update(scheduled, started, completed);
        self.trigger.next_execution_time(&context)
    }

    pub(crate) fn next_run(&self) -> Option<DateTime<Utc>> {
        *self.next_run.lock()
    }

    pub(crate) fn set_next_run(&self, at: Option<DateTime<Utc>>) {
        *self.next_run.lock() = at;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.load(atomic::Ordering::SeqCst) == ACTIVE
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.load(atomic::Ordering::SeqCst) == CANCELLED
    }

    /// Retire after the trigger returned no further run.
    pub(crate) fn retire(&self) {
        let _ = self.transition(DONE);
        self.set_next_run(None);
    }

    /// Cancel the task and abort its in-flight run. Returns `false` if the
    /// task was already cancelled or retired.
    pub(crate) fn cancel(&self) -> bool {
        if !self.transition(CANCELLED) {
            return false;
        }
        self.set_next_run(None);
        if let Some(execution) = self.execution.lock().take() {
            execution.abort();
        }
        true
    }

    /// Track the in-flight run. A task cancelled before this point is
    /// aborted right away.
    pub(crate) fn set_execution(&self, handle: AbortHandle) {
        let mut execution = self.execution.lock();
        if self.is_cancelled() {
            handle.abort();
            return;
        }
        *execution = Some(handle);
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(ACTIVE, to, atomic::Ordering::SeqCst, atomic::Ordering::SeqCst)
            .is_ok()
    }
}

/// Delay-queue entry. Earliest time first, insertion order breaks ties.
pub(crate) struct PendingEntry {
    pub(crate) at: DateTime<Utc>,
    pub(crate) seq: u64,
    pub(crate) task: Arc<ScheduledTask>,
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for PendingEntry {}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Handle to a task accepted by [`TaskScheduler::schedule`](crate::TaskScheduler::schedule).
#[derive(Clone)]
pub struct ScheduledHandle {
    task: Arc<ScheduledTask>,
    scheduler: Weak<SchedulerInner>,
}

impl ScheduledHandle {
    pub(crate) fn new(task: Arc<ScheduledTask>, scheduler: Weak<SchedulerInner>) -> Self {
        Self { task, scheduler }
    }

    /// Scheduler-assigned task ID.
    pub fn id(&self) -> u64 {
        self.task.id
    }

    pub fn name(&self) -> &str {
        &self.task.name
    }

    /// Cancel the task.
    ///
    /// A pending task is removed from the queue; a running one is aborted at
    /// its next await point. The task is never rescheduled. Returns `false`
    /// if it was already cancelled or finished.
    pub fn cancel(&self) -> bool {
        if !self.task.cancel() {
            return false;
        }
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.forget(&self.task);
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    /// Check if the task will not run again (retired or cancelled).
    pub fn is_done(&self) -> bool {
        !self.task.is_active()
    }

    /// Next scheduled run, if one is pending.
    pub fn next_execution_time(&self) -> Option<DateTime<Utc>> {
        self.task.next_run()
    }
}

impl std::fmt::Debug for ScheduledHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledHandle")
            .field("id", &self.task.id)
            .field("name", &self.task.name)
            .field("done", &self.is_done())
            .finish()
    }
}
