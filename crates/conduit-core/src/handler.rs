//! Handler and source protocols, plus closure adapters.

use async_trait::async_trait;

use crate::error::MessagingResult;
use crate::message::Message;

/// Consumes messages. Invoked synchronously by consumers.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a single message.
    async fn handle_message(&self, message: Message) -> MessagingResult<()>;
}

/// Produces messages on demand. Invoked synchronously by source-polling adapters.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Produce the next message, or `None` if nothing is available.
    async fn receive(&self) -> MessagingResult<Option<Message>>;
}

/// Adapts a closure into a [`MessageHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Message) -> MessagingResult<()> + Send + Sync,
{
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> MessagingResult<()> + Send + Sync,
{
    async fn handle_message(&self, message: Message) -> MessagingResult<()> {
        (self.f)(message)
    }
}

/// Adapts a closure into a [`MessageSource`].
pub struct FnSource<F> {
    f: F,
}

impl<F> FnSource<F>
where
    F: Fn() -> MessagingResult<Option<Message>> + Send + Sync,
{
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> MessageSource for FnSource<F>
where
    F: Fn() -> MessagingResult<Option<Message>> + Send + Sync,
{
    async fn receive(&self) -> MessagingResult<Option<Message>> {
        (self.f)()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::error::MessagingError;

    #[tokio::test]
    async fn test_fn_handler() {
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();
        let handler = FnHandler::new(move |_msg| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        handler.handle_message(Message::new(json!(1))).await.unwrap();
        handler.handle_message(Message::new(json!(2))).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fn_handler_error() {
        let handler = FnHandler::new(|msg| Err(MessagingError::handling("rejected", msg)));
        let err = handler.handle_message(Message::new(json!("x"))).await.unwrap_err();
        assert!(err.failed_message().is_some());
    }

    #[tokio::test]
    async fn test_fn_source() {
        let remaining = Arc::new(AtomicU32::new(2));
        let counter = remaining.clone();
        let source = FnSource::new(move || {
            let left = counter.load(Ordering::SeqCst);
            if left == 0 {
                return Ok(None);
            }
            counter.store(left - 1, Ordering::SeqCst);
            Ok(Some(Message::new(json!(left))))
        });

        assert!(source.receive().await.unwrap().is_some());
        assert!(source.receive().await.unwrap().is_some());
        assert!(source.receive().await.unwrap().is_none());
    }
}
