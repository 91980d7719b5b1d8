//! FIFO pollable channel.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::channel::{MessageChannel, PollableChannel};
use crate::error::MessagingResult;
use crate::message::Message;

/// Pollable channel backed by an in-memory FIFO queue.
///
/// With a capacity, senders wait for space up to their timeout.
pub struct QueueChannel {
    name: String,
    queue: Mutex<VecDeque<Message>>,
    capacity: Option<usize>,
    message_available: Notify,
    space_available: Notify,
}

impl QueueChannel {
    /// Create an unbounded queue channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            capacity: None,
            message_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    /// Create a queue channel holding at most `capacity` messages.
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(name)
        }
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Check if no messages are buffered.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Drop all buffered messages, returning them.
    pub fn clear(&self) -> Vec<Message> {
        let drained: Vec<Message> = self.queue.lock().drain(..).collect();
        if !drained.is_empty() {
            self.space_available.notify_waiters();
        }
        drained
    }

    fn try_push(&self, message: Message) -> Result<(), Message> {
        let mut queue = self.queue.lock();
        if self.capacity.is_some_and(|cap| queue.len() >= cap) {
            return Err(message);
        }
        queue.push_back(message);
        Ok(())
    }

    fn try_pop(&self) -> Option<Message> {
        self.queue.lock().pop_front()
    }
}

/// Wait for a notification, bounded by an optional deadline.
///
/// Returns `false` if the deadline passed first.
async fn wait_for(notified: Pin<&mut Notified<'_>>, deadline: Option<Instant>) -> bool {
    match deadline {
        None => {
            notified.await;
            true
        }
        Some(deadline) => tokio::time::timeout_at(deadline, notified).await.is_ok(),
    }
}

#[async_trait]
impl MessageChannel for QueueChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: Message, timeout: Option<Duration>) -> MessagingResult<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut message = message;

        loop {
            let notified = self.space_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_push(message) {
                Ok(()) => {
                    self.message_available.notify_one();
                    return Ok(true);
                }
                Err(rejected) => message = rejected,
            }

            if !wait_for(notified, deadline).await {
                debug!(channel = %self.name, "Queue full, send timed out");
                return Ok(false);
            }
        }
    }
}

#[async_trait]
impl PollableChannel for QueueChannel {
    async fn receive(&self, timeout: Option<Duration>) -> Option<Message> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let notified = self.message_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_pop() {
                self.space_available.notify_one();
                return Some(message);
            }

            if !wait_for(notified, deadline).await {
                return None;
            }
        }
    }
}
