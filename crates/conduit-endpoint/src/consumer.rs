//! Consumers: endpoints that hand channel messages to a handler.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use conduit_core::{
    Message, MessageHandler, MessagingError, MessagingResult, PollableChannel, SubscribableChannel,
};
use conduit_scheduling::TaskScheduler;

use crate::lifecycle::{Endpoint, EndpointLifecycle};
use crate::polling::{PollSource, PollerMetadata, PollingEndpoint};

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

/// Attach the received message to a handler failure.
///
/// Failures that already carry a message are kept as they are.
pub(crate) fn with_failed_message(error: MessagingError, message: Message) -> MessagingError {
    match error {
        MessagingError::Handling {
            failed_message: Some(_),
            ..
        } => error,
        other => MessagingError::handling(other.to_string(), message),
    }
}

/// Receives one message from a pollable channel and hands it to a handler.
struct ChannelPollSource {
    channel: Arc<dyn PollableChannel>,
    handler: Arc<dyn MessageHandler>,
}

#[async_trait]
impl PollSource for ChannelPollSource {
    async fn poll_once(&self, poller: &PollerMetadata) -> MessagingResult<bool> {
        let Some(message) = self.channel.receive(poller.receive_timeout).await else {
            return Ok(false);
        };
        trace!(channel = %self.channel.name(), message_id = %message.id(), "Message received");

        let copy = message.clone();
        self.handler
            .handle_message(message)
            .await
            .map_err(|e| with_failed_message(e, copy))?;
        Ok(true)
    }
}

/// Polls a [`PollableChannel`] and invokes a handler for each message.
///
/// Drains until the channel is empty unless the poller caps messages per poll.
pub struct PollingConsumer {
    endpoint: PollingEndpoint,
    channel: Arc<dyn PollableChannel>,
}

impl PollingConsumer {
    pub fn new(
        name: impl Into<String>,
        channel: Arc<dyn PollableChannel>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let source = Arc::new(ChannelPollSource {
            channel: channel.clone(),
            handler,
        });
        Self {
            endpoint: PollingEndpoint::new(name, source),
            channel,
        }
    }

    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.endpoint = self.endpoint.with_scheduler(scheduler);
        self
    }

    pub fn with_poller(mut self, poller: PollerMetadata) -> Self {
        self.endpoint = self.endpoint.with_poller(poller);
        self
    }

    pub fn input_channel(&self) -> &Arc<dyn PollableChannel> {
        &self.channel
    }

    pub fn polling_endpoint(&self) -> &PollingEndpoint {
        &self.endpoint
    }
}

impl Endpoint for PollingConsumer {
    fn lifecycle(&self) -> &EndpointLifecycle {
        self.endpoint.lifecycle()
    }

    fn on_init(&self) -> MessagingResult<()> {
        self.endpoint.on_init()
    }

    fn do_start(&self) -> MessagingResult<()> {
        self.endpoint.do_start()
    }

    fn do_stop(&self) {
        self.endpoint.do_stop();
    }
}

/// Subscribes a handler to a [`SubscribableChannel`] while running.
pub struct EventDrivenConsumer {
    lifecycle: EndpointLifecycle,
    channel: Arc<dyn SubscribableChannel>,
    handler: Arc<dyn MessageHandler>,
    subscribed: Mutex<bool>,
}

impl EventDrivenConsumer {
    pub fn new(
        name: impl Into<String>,
        channel: Arc<dyn SubscribableChannel>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            lifecycle: EndpointLifecycle::new(name),
            channel,
            handler,
            subscribed: Mutex::new(false),
        }
    }

    pub fn input_channel(&self) -> &Arc<dyn SubscribableChannel> {
        &self.channel
    }
}

impl Endpoint for EventDrivenConsumer {
    fn lifecycle(&self) -> &EndpointLifecycle {
        &self.lifecycle
    }

    fn do_start(&self) -> MessagingResult<()> {
        let mut subscribed = self.subscribed.lock();
        if !*subscribed {
            self.channel.subscribe(self.handler.clone());
            *subscribed = true;
            debug!(endpoint = %self.name(), channel = %self.channel.name(), "Handler subscribed");
        }
        Ok(())
    }

    fn do_stop(&self) {
        let mut subscribed = self.subscribed.lock();
        if *subscribed {
            self.channel.unsubscribe(&self.handler);
            *subscribed = false;
            debug!(endpoint = %self.name(), channel = %self.channel.name(), "Handler unsubscribed");
        }
    }
}
