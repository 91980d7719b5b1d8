//! Handler that turns requests into correlated replies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use conduit_core::{
    ChannelRef, ChannelRegistry, Message, MessageBuilder, MessageChannel, MessageHandler,
    MessagingError, MessagingResult,
};

/// Adapts a reply function into a [`MessageHandler`].
///
/// The reply goes to the output channel when one is set, otherwise to the
/// request's reply-channel header. Returning `Ok(None)` sends nothing.
pub struct ReplyProducingHandler<F> {
    f: F,
    output: Option<Arc<dyn MessageChannel>>,
    registry: Option<Arc<ChannelRegistry>>,
    send_timeout: Option<Duration>,
}

impl<F> ReplyProducingHandler<F>
where
    F: Fn(&Message) -> MessagingResult<Option<Value>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            output: None,
            registry: None,
            send_timeout: None,
        }
    }

    pub fn with_output_channel(mut self, channel: Arc<dyn MessageChannel>) -> Self {
        self.output = Some(channel);
        self
    }

    /// Resolve name-valued reply-channel headers through `registry`.
    pub fn with_registry(mut self, registry: Arc<ChannelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    fn reply_target(&self, request: &Message) -> MessagingResult<Arc<dyn MessageChannel>> {
        if let Some(output) = &self.output {
            return Ok(output.clone());
        }

        let header = request.headers().reply_channel().ok_or_else(|| {
            MessagingError::handling("no output channel or reply-channel header", request.clone())
        })?;
        let resolved = match (header, &self.registry) {
            (ChannelRef::Instance(channel), _) => Some(channel.clone()),
            (ChannelRef::Name(name), Some(registry)) => registry.get(name),
            (ChannelRef::Name(_), None) => None,
        };
        resolved.ok_or_else(|| {
            MessagingError::handling(
                format!("reply channel '{}' cannot be resolved", header.name()),
                request.clone(),
            )
        })
    }
}

#[async_trait]
impl<F> MessageHandler for ReplyProducingHandler<F>
where
    F: Fn(&Message) -> MessagingResult<Option<Value>> + Send + Sync,
{
    async fn handle_message(&self, message: Message) -> MessagingResult<()> {
        let payload = match (self.f)(&message) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(()),
            Err(e) => return Err(crate::consumer::with_failed_message(e, message)),
        };

        let target = self.reply_target(&message)?;
        let reply = MessageBuilder::reply_to(&message, payload).build();
        trace!(channel = %target.name(), request_id = %message.id(), "Sending reply");

        if target.send(reply, self.send_timeout).await? {
            Ok(())
        } else {
            Err(MessagingError::delivery(
                target.name(),
                "reply channel did not accept the reply",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use conduit_core::{PollableChannel, QueueChannel};

    use super::*;

    fn doubler()
    -> ReplyProducingHandler<impl Fn(&Message) -> MessagingResult<Option<Value>> + Send + Sync> {
        ReplyProducingHandler::new(|msg: &Message| {
            Ok(msg.data().and_then(Value::as_i64).map(|n| json!(n * 2)))
        })
    }

    #[tokio::test]
    async fn test_replies_to_header_channel() {
        let replies = Arc::new(QueueChannel::new("replies"));
        let request = MessageBuilder::with_payload(json!(21))
            .reply_channel(replies.clone())
            .build();
        let request_id = request.id().to_string();

        doubler().handle_message(request).await.unwrap();

        let reply = replies.receive(Some(Duration::ZERO)).await.unwrap();
        assert_eq!(reply.data(), Some(&json!(42)));
        assert_eq!(reply.headers().correlation_id(), Some(request_id.as_str()));
    }

    #[tokio::test]
    async fn test_output_channel_wins() {
        let output = Arc::new(QueueChannel::new("out"));
        let header = Arc::new(QueueChannel::new("header"));
        let handler = doubler().with_output_channel(output.clone());

        let request = MessageBuilder::with_payload(json!(1))
            .reply_channel(header.clone())
            .build();
        handler.handle_message(request).await.unwrap();

        assert_eq!(output.len(), 1);
        assert!(header.is_empty());
    }

    #[tokio::test]
    async fn test_named_reply_channel_resolves_through_registry() {
        let registry = Arc::new(ChannelRegistry::new());
        let replies = Arc::new(QueueChannel::new("named-replies"));
        registry.register(replies.clone()).unwrap();

        let request = MessageBuilder::with_payload(json!(2))
            .reply_channel_name("named-replies")
            .build();
        doubler()
            .with_registry(registry)
            .handle_message(request)
            .await
            .unwrap();
        assert_eq!(replies.len(), 1);

        let orphan = MessageBuilder::with_payload(json!(2))
            .reply_channel_name("named-replies")
            .build();
        let err = doubler().handle_message(orphan).await.unwrap_err();
        assert!(err.failed_message().is_some());
    }

    #[tokio::test]
    async fn test_missing_target_is_handling_error() {
        let err = doubler()
            .handle_message(Message::new(json!(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::Handling { .. }));
    }

    #[tokio::test]
    async fn test_no_reply_sends_nothing() {
        let replies = Arc::new(QueueChannel::new("replies"));
        let request = MessageBuilder::with_payload(json!("not a number"))
            .reply_channel(replies.clone())
            .build();
        doubler().handle_message(request).await.unwrap();
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_function_error_carries_request() {
        let handler = ReplyProducingHandler::new(|_msg: &Message| {
            Err(MessagingError::Internal("bad input".into()))
        });
        let request = Message::new(json!(1));
        let id = request.id();
        let err = handler.handle_message(request).await.unwrap_err();
        assert_eq!(err.failed_message().map(|m| m.id()), Some(id));
    }
}
