//! Error handlers invoked when scheduled or polled work fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::channel::MessageChannel;
use crate::error::MessagingError;
use crate::message::{Message, MessageBuilder};
use crate::registry::ChannelRegistry;

/// Receives failures from scheduled tasks, poll cycles and executors.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Handle a failure. Must not panic.
    async fn handle_error(&self, error: MessagingError);
}

/// Error handler that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

#[async_trait]
impl ErrorHandler for LoggingErrorHandler {
    async fn handle_error(&self, error: MessagingError) {
        error!(error = %error, "Unhandled messaging failure");
    }
}

/// Error handler that publishes failures as error messages.
///
/// The target is the failed message's error-channel header when present
/// (names are resolved through the registry), otherwise the default error
/// channel. Failures that cannot be published are logged.
pub struct MessagePublishingErrorHandler {
    default_channel: Option<Arc<dyn MessageChannel>>,
    registry: Option<Arc<ChannelRegistry>>,
    send_timeout: Option<Duration>,
}

impl MessagePublishingErrorHandler {
    /// Create a handler that publishes to `default_channel` unless the failed
    /// message names another error channel.
    pub fn new(default_channel: Arc<dyn MessageChannel>) -> Self {
        Self {
            default_channel: Some(default_channel),
            registry: None,
            send_timeout: Some(Duration::from_secs(1)),
        }
    }

    /// Create a handler that only honours error-channel headers.
    pub fn header_only() -> Self {
        Self {
            default_channel: None,
            registry: None,
            send_timeout: Some(Duration::from_secs(1)),
        }
    }

    /// Resolve name-valued error-channel headers through `registry`.
    pub fn with_registry(mut self, registry: Arc<ChannelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the send timeout (`None` waits indefinitely).
    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    fn resolve_channel(&self, failed: Option<&Message>) -> Option<Arc<dyn MessageChannel>> {
        let from_header = failed
            .and_then(|msg| msg.headers().error_channel())
            .and_then(|channel_ref| {
                let resolved = match &self.registry {
                    Some(registry) => registry.resolve(channel_ref),
                    None => match channel_ref {
                        crate::channel::ChannelRef::Instance(channel) => Some(channel.clone()),
                        crate::channel::ChannelRef::Name(_) => None,
                    },
                };
                if resolved.is_none() {
                    warn!(channel = %channel_ref.name(), "Unresolvable error channel header");
                }
                resolved
            });
        from_header.or_else(|| self.default_channel.clone())
    }
}

#[async_trait]
impl ErrorHandler for MessagePublishingErrorHandler {
    async fn handle_error(&self, error: MessagingError) {
        let Some(channel) = self.resolve_channel(error.failed_message()) else {
            error!(error = %error, "No error channel available, failure dropped");
            return;
        };

        let mut builder = MessageBuilder::error(error.clone());
        if let Some(failed) = error.failed_message() {
            builder = builder.correlation_id(failed.correlation_key());
        }

        match channel.send(builder.build(), self.send_timeout).await {
            Ok(true) => {}
            Ok(false) => {
                error!(channel = %channel.name(), error = %error, "Error channel did not accept failure");
            }
            Err(send_error) => {
                error!(
                    channel = %channel.name(),
                    error = %error,
                    send_error = %send_error,
                    "Failed to publish failure to error channel"
                );
            }
        }
    }
}
