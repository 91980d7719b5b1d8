//! Channel protocol definitions.
//!
//! - [`MessageChannel`]: anything a message can be sent to
//! - [`PollableChannel`]: buffers messages until a consumer receives them
//! - [`SubscribableChannel`]: pushes messages to subscribed handlers
//!
//! Timeouts are `Option<Duration>`: `None` waits indefinitely,
//! `Some(Duration::ZERO)` does not wait at all.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::MessagingResult;
use crate::handler::MessageHandler;
use crate::message::Message;

/// A channel messages can be sent to.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Channel name.
    fn name(&self) -> &str;

    /// Send a message, waiting at most `timeout` for the channel to accept it.
    ///
    /// Returns `Ok(false)` when the channel did not accept the message in time.
    async fn send(&self, message: Message, timeout: Option<Duration>) -> MessagingResult<bool>;
}

/// A channel that buffers messages for consumers to receive.
#[async_trait]
pub trait PollableChannel: MessageChannel {
    /// Receive the next message, waiting at most `timeout`.
    ///
    /// Returns `None` when nothing arrived in time.
    async fn receive(&self, timeout: Option<Duration>) -> Option<Message>;
}

/// A channel that dispatches messages to subscribed handlers.
pub trait SubscribableChannel: MessageChannel {
    /// Subscribe a handler. Returns `false` if it was already subscribed.
    fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> bool;

    /// Unsubscribe a handler. Returns `false` if it was not subscribed.
    fn unsubscribe(&self, handler: &Arc<dyn MessageHandler>) -> bool;
}

/// Reference to a channel stored in a message header.
#[derive(Clone)]
pub enum ChannelRef {
    /// A channel instance.
    Instance(Arc<dyn MessageChannel>),
    /// A channel name, resolved through a [`ChannelRegistry`](crate::ChannelRegistry).
    Name(String),
}

impl ChannelRef {
    /// Name of the referenced channel.
    pub fn name(&self) -> &str {
        match self {
            ChannelRef::Instance(channel) => channel.name(),
            ChannelRef::Name(name) => name,
        }
    }
}

impl fmt::Debug for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Instance(channel) => f.debug_tuple("Instance").field(&channel.name()).finish(),
            ChannelRef::Name(name) => f.debug_tuple("Name").field(name).finish(),
        }
    }
}

/// Convert a millisecond timeout setting into a wait duration.
///
/// Negative values wait indefinitely.
pub fn timeout_from_millis(millis: i64) -> Option<Duration> {
    u64::try_from(millis).ok().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_from_millis() {
        assert_eq!(timeout_from_millis(-1), None);
        assert_eq!(timeout_from_millis(0), Some(Duration::ZERO));
        assert_eq!(timeout_from_millis(250), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_channel_ref_name() {
        let by_name = ChannelRef::Name("errors".to_string());
        assert_eq!(by_name.name(), "errors");
        assert_eq!(format!("{by_name:?}"), "Name(\"errors\")");
    }
}
