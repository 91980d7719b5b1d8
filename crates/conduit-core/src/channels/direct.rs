//! Point-to-point subscribable channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::channel::{MessageChannel, SubscribableChannel};
use crate::error::{MessagingError, MessagingResult};
use crate::handler::MessageHandler;
use crate::message::Message;

/// Subscribable channel that invokes exactly one subscriber per message, in
/// the sender's task. Subscribers are chosen round-robin.
pub struct DirectChannel {
    name: String,
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
    next: AtomicUsize,
}

impl DirectChannel {
    /// Create a new direct channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: RwLock::new(Vec::new()),
            next: AtomicUsize::new(0),
        }
    }

    /// Number of subscribed handlers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }
}

#[async_trait]
impl MessageChannel for DirectChannel {
    fn name(&self) -> &str {
        &self.name
    }

    /// Handler failures are returned to the sender. The timeout is ignored.
    async fn send(&self, message: Message, _timeout: Option<Duration>) -> MessagingResult<bool> {
        let handler = {
            let handlers = self.handlers.read();
            if handlers.is_empty() {
                return Err(MessagingError::delivery(&self.name, "channel has no subscribers"));
            }
            let index = self.next.fetch_add(1, Ordering::Relaxed) % handlers.len();
            handlers[index].clone()
        };

        handler.handle_message(message).await?;
        Ok(true)
    }
}

impl SubscribableChannel for DirectChannel {
    fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> bool {
        let mut handlers = self.handlers.write();
        if handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return false;
        }
        handlers.push(handler);
        true
    }

    fn unsubscribe(&self, handler: &Arc<dyn MessageHandler>) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|h| !Arc::ptr_eq(h, handler));
        handlers.len() < before
    }
}
