//! Inbound adapter that polls a [`MessageSource`] into an output channel.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use conduit_core::{MessageChannel, MessageSource, MessagingResult};
use conduit_scheduling::TaskScheduler;

use crate::lifecycle::{Endpoint, EndpointLifecycle};
use crate::polling::{PollSource, PollerMetadata, PollingEndpoint};

struct SourceToChannel {
    source: Arc<dyn MessageSource>,
    output: Arc<dyn MessageChannel>,
}

#[async_trait]
impl PollSource for SourceToChannel {
    async fn poll_once(&self, poller: &PollerMetadata) -> MessagingResult<bool> {
        let Some(message) = self.source.receive().await? else {
            return Ok(false);
        };

        let message_id = message.id();
        let sent = self.output.send(message, poller.send_timeout).await?;
        if !sent {
            warn!(
                channel = %self.output.name(),
                message_id = %message_id,
                "Output channel did not accept polled message"
            );
        }
        Ok(sent)
    }

    fn default_max_messages_per_poll(&self) -> i64 {
        1
    }
}

/// Polls a [`MessageSource`] and sends what it produces to an output channel.
///
/// Moves one message per poll unless the poller says otherwise.
pub struct SourcePollingChannelAdapter {
    endpoint: PollingEndpoint,
    output: Arc<dyn MessageChannel>,
}

impl SourcePollingChannelAdapter {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn MessageSource>,
        output: Arc<dyn MessageChannel>,
    ) -> Self {
        let poll_source = Arc::new(SourceToChannel {
            source,
            output: output.clone(),
        });
        Self {
            endpoint: PollingEndpoint::new(name, poll_source),
            output,
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

    pub fn output_channel(&self) -> &Arc<dyn MessageChannel> {
        &self.output
    }

    pub fn polling_endpoint(&self) -> &PollingEndpoint {
        &self.endpoint
    }
}

impl Endpoint for SourcePollingChannelAdapter {
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
