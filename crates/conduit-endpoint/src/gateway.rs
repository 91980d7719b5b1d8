//! Request/reply messaging gateway.
//!
//! A gateway sends requests to a request channel and, for request/reply
//! calls, waits for the reply carrying the call's correlation id. Requests
//! are stamped with that id as a header, so it survives handlers that copy
//! the message on its way. Replies arriving on a shared reply channel are
//! routed to their callers by a correlator endpoint, created on first use.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use conduit_config::GatewayConfig;
use conduit_core::{
    Message, MessageBuilder, MessageChannel, MessageHandler, MessagingError, MessagingResult,
    PollableChannel, SubscribableChannel, timeout_from_millis,
};
use conduit_scheduling::TaskScheduler;

use crate::consumer::{EventDrivenConsumer, PollingConsumer};
use crate::lifecycle::Endpoint;
use crate::polling::{PollerMetadata, UNBOUNDED};

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;

/// Poll interval of the default reply correlator.
const REPLY_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Receive timeout of the default reply correlator.
const REPLY_RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// Timeouts and error behaviour of a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewaySettings {
    /// `None` waits indefinitely for the request channel.
    pub request_timeout: Option<Duration>,
    /// `None` waits indefinitely for the reply.
    pub reply_timeout: Option<Duration>,
    /// Return the carried error of an error reply as `Err`.
    pub throw_errors: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            request_timeout: None,
            reply_timeout: None,
            throw_errors: true,
        }
    }
}

impl GatewaySettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            request_timeout: timeout_from_millis(config.request_timeout_ms),
            reply_timeout: timeout_from_millis(config.reply_timeout_ms),
            throw_errors: config.throw_errors,
        }
    }
}

/// A configured reply channel, keeping the view the correlator needs.
#[derive(Clone)]
pub enum ReplyChannel {
    Pollable {
        channel: Arc<dyn MessageChannel>,
        receiver: Arc<dyn PollableChannel>,
    },
    Subscribable {
        channel: Arc<dyn MessageChannel>,
        subscriber: Arc<dyn SubscribableChannel>,
    },
}

impl ReplyChannel {
    pub fn pollable<C: PollableChannel + 'static>(channel: Arc<C>) -> Self {
        Self::Pollable {
            channel: channel.clone(),
            receiver: channel,
        }
    }

    pub fn subscribable<C: SubscribableChannel + 'static>(channel: Arc<C>) -> Self {
        Self::Subscribable {
            channel: channel.clone(),
            subscriber: channel,
        }
    }

    pub fn channel(&self) -> &Arc<dyn MessageChannel> {
        match self {
            Self::Pollable { channel, .. } | Self::Subscribable { channel, .. } => channel,
        }
    }
}

/// Callers waiting on the shared reply channel, keyed by correlation id.
type PendingReplies = DashMap<String, oneshot::Sender<Message>>;

/// Hand a reply to the caller waiting for it.
///
/// Returns `false` for replies nobody is waiting for; those are dropped.
fn correlate(gateway: &str, pending: &PendingReplies, reply: Message) -> bool {
    let Some(key) = reply.headers().correlation_id().map(str::to_string) else {
        let error = MessagingError::Correlation("reply has no correlation id".to_string());
        warn!(gateway = %gateway, message_id = %reply.id(), error = %error, "Reply dropped");
        return false;
    };

    match pending.remove(&key) {
        Some((_, waiter)) => {
            // The caller may have given up in the meantime.
            if waiter.send(reply).is_err() {
                debug!(gateway = %gateway, correlation_id = %key, "Caller gone, reply discarded");
            }
            true
        }
        None => {
            let error = MessagingError::Correlation(format!("no pending request '{key}'"));
            warn!(gateway = %gateway, message_id = %reply.id(), error = %error, "Reply dropped");
            false
        }
    }
}

/// Handler run by the correlator endpoint on the shared reply channel.
struct CorrelationHandler {
    gateway: String,
    pending: Arc<PendingReplies>,
}

#[async_trait]
impl MessageHandler for CorrelationHandler {
    async fn handle_message(&self, message: Message) -> MessagingResult<()> {
        correlate(&self.gateway, &self.pending, message);
        Ok(())
    }
}

/// Single-use reply channel created for one call when no reply channel is
/// configured. The first message it receives is the reply.
struct TemporaryReplyChannel {
    name: String,
    gateway: String,
    waiter: Mutex<Option<oneshot::Sender<Message>>>,
}

#[async_trait]
impl MessageChannel for TemporaryReplyChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: Message, _timeout: Option<Duration>) -> MessagingResult<bool> {
        let Some(waiter) = self.waiter.lock().take() else {
            let error = MessagingError::Correlation(format!("'{}' already replied", self.name));
            warn!(gateway = %self.gateway, message_id = %message.id(), error = %error, "Reply dropped");
            return Ok(false);
        };
        if waiter.send(message).is_err() {
            debug!(gateway = %self.gateway, channel = %self.name, "Caller gone, reply discarded");
        }
        Ok(true)
    }
}

/// Removes a pending entry when the call ends, however it ends.
struct PendingGuard<'a> {
    pending: &'a PendingReplies,
    key: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.key);
    }
}

/// Sends requests and waits for correlated replies.
pub struct MessagingGateway {
    name: String,
    request_channel: Arc<dyn MessageChannel>,
    reply_channel: Option<ReplyChannel>,
    settings: GatewaySettings,
    scheduler: Option<TaskScheduler>,
    reply_poller: Option<PollerMetadata>,
    pending: Arc<PendingReplies>,
    correlator: Mutex<Option<Box<dyn Endpoint>>>,
}

impl MessagingGateway {
    pub fn new(name: impl Into<String>, request_channel: Arc<dyn MessageChannel>) -> Self {
        Self {
            name: name.into(),
            request_channel,
            reply_channel: None,
            settings: GatewaySettings::default(),
            scheduler: None,
            reply_poller: None,
            pending: Arc::new(DashMap::new()),
            correlator: Mutex::new(None),
        }
    }

    /// Receive replies on a shared channel instead of per-call channels.
    pub fn with_reply_channel(mut self, reply_channel: ReplyChannel) -> Self {
        self.reply_channel = Some(reply_channel);
        self
    }

    pub fn with_settings(mut self, settings: GatewaySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Scheduler for the correlator of a pollable reply channel.
    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Poller for the correlator of a pollable reply channel.
    pub fn with_reply_poller(mut self, poller: PollerMetadata) -> Self {
        self.reply_poller = Some(poller);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Calls currently waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether the reply correlator exists and is running.
    pub fn is_correlator_running(&self) -> bool {
        self.correlator
            .lock()
            .as_ref()
            .is_some_and(|correlator| correlator.is_running())
    }

    /// One-way send.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Delivery`] when the request channel does not
    /// accept the message within the request timeout.
    pub async fn send(&self, message: Message) -> MessagingResult<()> {
        if self
            .request_channel
            .send(message, self.settings.request_timeout)
            .await?
        {
            Ok(())
        } else {
            Err(MessagingError::delivery(
                self.request_channel.name(),
                "request channel did not accept the message",
            ))
        }
    }

    /// Send a request and wait for its reply.
    ///
    /// Returns `Ok(None)` when the request is not accepted or no reply
    /// arrives within the reply timeout.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Remote`] for error replies when
    /// `throw_errors` is set, and propagates request channel failures.
    pub async fn send_and_receive(&self, message: Message) -> MessagingResult<Option<Message>> {
        let key = Uuid::new_v4().to_string();
        let (waiter, reply) = oneshot::channel();

        let (reply_target, _guard): (Arc<dyn MessageChannel>, _) = match &self.reply_channel {
            Some(reply_channel) => {
                self.ensure_correlator(reply_channel)?;
                self.pending.insert(key.clone(), waiter);
                let guard = PendingGuard {
                    pending: &self.pending,
                    key: key.clone(),
                };
                (reply_channel.channel().clone(), Some(guard))
            }
            None => {
                let temporary: Arc<dyn MessageChannel> = Arc::new(TemporaryReplyChannel {
                    name: format!("{}.reply.{}", self.name, key),
                    gateway: self.name.clone(),
                    waiter: Mutex::new(Some(waiter)),
                });
                (temporary, None)
            }
        };

        let request = MessageBuilder::from_message(&message)
            .correlation_id(key.clone())
            .reply_channel(reply_target.clone())
            .error_channel(reply_target)
            .build();

        if !self
            .request_channel
            .send(request, self.settings.request_timeout)
            .await?
        {
            warn!(
                gateway = %self.name,
                channel = %self.request_channel.name(),
                correlation_id = %key,
                "Request channel did not accept the request"
            );
            return Ok(None);
        }

        let reply = match self.settings.reply_timeout {
            None => reply.await.ok(),
            Some(timeout) => tokio::time::timeout(timeout, reply)
                .await
                .ok()
                .and_then(Result::ok),
        };
        let Some(reply) = reply else {
            debug!(gateway = %self.name, correlation_id = %key, "No reply received");
            return Ok(None);
        };

        if self.settings.throw_errors {
            if let Some(error) = reply.carried_error() {
                return Err(MessagingError::Remote(error.clone()));
            }
        }
        Ok(Some(reply))
    }

    /// Stop the reply correlator, if one was started.
    pub fn stop(&self) {
        if let Some(correlator) = self.correlator.lock().as_ref() {
            correlator.stop();
        }
    }

    fn ensure_correlator(&self, reply_channel: &ReplyChannel) -> MessagingResult<()> {
        let mut correlator = self.correlator.lock();
        if let Some(existing) = correlator.as_ref() {
            return existing.start();
        }

        let handler: Arc<dyn MessageHandler> = Arc::new(CorrelationHandler {
            gateway: self.name.clone(),
            pending: self.pending.clone(),
        });
        let endpoint_name = format!("{}.correlator", self.name);

        let endpoint: Box<dyn Endpoint> = match reply_channel {
            ReplyChannel::Subscribable { subscriber, .. } => Box::new(EventDrivenConsumer::new(
                endpoint_name,
                subscriber.clone(),
                handler,
            )),
            ReplyChannel::Pollable { receiver, .. } => {
                let Some(scheduler) = self.scheduler.clone() else {
                    return Err(MessagingError::configuration(format!(
                        "gateway '{}' needs a task scheduler to poll its reply channel",
                        self.name
                    )));
                };
                let poller = match &self.reply_poller {
                    Some(poller) => poller.clone(),
                    None => PollerMetadata::fixed_delay(REPLY_POLL_INTERVAL)
                        .with_receive_timeout(Some(REPLY_RECEIVE_TIMEOUT))
                        .with_max_messages_per_poll(UNBOUNDED),
                };
                Box::new(
                    PollingConsumer::new(endpoint_name, receiver.clone(), handler)
                        .with_scheduler(scheduler)
                        .with_poller(poller),
                )
            }
        };

        endpoint.start()?;
        debug!(gateway = %self.name, correlator = %endpoint.name(), "Reply correlator started");
        *correlator = Some(endpoint);
        Ok(())
    }
}
