//! Immutable messages and the builder used to derive new ones.
//!
//! A [`Message`] never changes after construction. Its id and timestamp are
//! assigned by [`MessageBuilder::build`]; every other header change goes through
//! a builder and produces a new message with a fresh id and timestamp.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::channel::{ChannelRef, MessageChannel};
use crate::error::MessagingError;

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

/// Message body.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Regular data payload.
    Data(Value),
    /// The message reports a failure.
    Error(Arc<MessagingError>),
}

/// Message headers.
///
/// Fields are private so that headers can only be set through a
/// [`MessageBuilder`].
#[derive(Debug, Clone)]
pub struct MessageHeaders {
    id: Uuid,
    timestamp: DateTime<Utc>,
    correlation_id: Option<String>,
    reply_channel: Option<ChannelRef>,
    error_channel: Option<ChannelRef>,
    priority: Option<i32>,
    sequence_number: Option<u32>,
    sequence_size: Option<u32>,
    custom: HashMap<String, Value>,
}

impl MessageHeaders {
    /// Unique message ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Creation timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Correlation ID linking this message to another one.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Where replies to this message should go.
    pub fn reply_channel(&self) -> Option<&ChannelRef> {
        self.reply_channel.as_ref()
    }

    /// Where failures while processing this message should go.
    pub fn error_channel(&self) -> Option<&ChannelRef> {
        self.error_channel.as_ref()
    }

    /// Message priority.
    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    /// Position of this message within a sequence.
    pub fn sequence_number(&self) -> Option<u32> {
        self.sequence_number
    }

    /// Size of the sequence this message belongs to.
    pub fn sequence_size(&self) -> Option<u32> {
        self.sequence_size
    }

    /// Get a custom header.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }

    /// All custom headers.
    pub fn custom(&self) -> &HashMap<String, Value> {
        &self.custom
    }
}

/// An immutable message: payload plus headers.
#[derive(Debug, Clone)]
pub struct Message {
    payload: Payload,
    headers: MessageHeaders,
}

impl Message {
    /// Create a message with a data payload and default headers.
    pub fn new(payload: Value) -> Self {
        MessageBuilder::with_payload(payload).build()
    }

    /// Create an error message carrying the given failure.
    pub fn error(error: MessagingError) -> Self {
        MessageBuilder::error(error).build()
    }

    /// Unique message ID.
    pub fn id(&self) -> Uuid {
        self.headers.id
    }

    /// Key a reply to this message should carry as its correlation id.
    ///
    /// The correlation id when one is set, since it survives copies made by
    /// intermediate handlers; otherwise the message id.
    pub fn correlation_key(&self) -> String {
        match &self.headers.correlation_id {
            Some(id) => id.clone(),
            None => self.headers.id.to_string(),
        }
    }

    /// Message headers.
    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    /// Message payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The data payload, if this is not an error message.
    pub fn data(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Data(value) => Some(value),
            Payload::Error(_) => None,
        }
    }

    /// The carried failure, if this is an error message.
    pub fn carried_error(&self) -> Option<&Arc<MessagingError>> {
        match &self.payload {
            Payload::Error(err) => Some(err),
            Payload::Data(_) => None,
        }
    }

    /// Check if this is an error message.
    pub fn is_error(&self) -> bool {
        matches!(self.payload, Payload::Error(_))
    }
}

/// Builder for new messages.
///
/// Copies of existing messages keep every header except id and timestamp,
/// which are always assigned fresh on [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    payload: Payload,
    correlation_id: Option<String>,
    reply_channel: Option<ChannelRef>,
    error_channel: Option<ChannelRef>,
    priority: Option<i32>,
    sequence_number: Option<u32>,
    sequence_size: Option<u32>,
    custom: HashMap<String, Value>,
}

impl MessageBuilder {
    fn from_payload(payload: Payload) -> Self {
        Self {
            payload,
            correlation_id: None,
            reply_channel: None,
            error_channel: None,
            priority: None,
            sequence_number: None,
            sequence_size: None,
            custom: HashMap::new(),
        }
    }

    /// Start a message with a data payload.
    pub fn with_payload(payload: Value) -> Self {
        Self::from_payload(Payload::Data(payload))
    }

    /// Start an error message.
    pub fn error(error: MessagingError) -> Self {
        Self::from_payload(Payload::Error(Arc::new(error)))
    }

    /// Start from an existing message, copying its payload and headers.
    pub fn from_message(message: &Message) -> Self {
        let headers = &message.headers;
        Self {
            payload: message.payload.clone(),
            correlation_id: headers.correlation_id.clone(),
            reply_channel: headers.reply_channel.clone(),
            error_channel: headers.error_channel.clone(),
            priority: headers.priority,
            sequence_number: headers.sequence_number,
            sequence_size: headers.sequence_size,
            custom: headers.custom.clone(),
        }
    }

    /// Start a reply to `request`, correlated by [`Message::correlation_key`].
    pub fn reply_to(request: &Message, payload: Value) -> Self {
        Self::with_payload(payload).correlation_id(request.correlation_key())
    }

    /// Replace the payload.
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Payload::Data(payload);
        self
    }

    /// Set the correlation ID.
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the reply channel to a channel instance.
    pub fn reply_channel(mut self, channel: Arc<dyn MessageChannel>) -> Self {
        self.reply_channel = Some(ChannelRef::Instance(channel));
        self
    }

    /// Set the reply channel by name.
    pub fn reply_channel_name(mut self, name: impl Into<String>) -> Self {
        self.reply_channel = Some(ChannelRef::Name(name.into()));
        self
    }

    /// Set the error channel to a channel instance.
    pub fn error_channel(mut self, channel: Arc<dyn MessageChannel>) -> Self {
        self.error_channel = Some(ChannelRef::Instance(channel));
        self
    }

    /// Set the error channel by name.
    pub fn error_channel_name(mut self, name: impl Into<String>) -> Self {
        self.error_channel = Some(ChannelRef::Name(name.into()));
        self
    }

    /// Set the priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the sequence position and size.
    pub fn sequence(mut self, number: u32, size: u32) -> Self {
        self.sequence_number = Some(number);
        self.sequence_size = Some(size);
        self
    }

    /// Add a custom header.
    pub fn header(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }

    /// Remove a custom header.
    pub fn remove_header(mut self, key: &str) -> Self {
        self.custom.remove(key);
        self
    }

    /// Build the message, assigning a new id and timestamp.
    pub fn build(self) -> Message {
        Message {
            payload: self.payload,
            headers: MessageHeaders {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                correlation_id: self.correlation_id,
                reply_channel: self.reply_channel,
                error_channel: self.error_channel,
                priority: self.priority,
                sequence_number: self.sequence_number,
                sequence_size: self.sequence_size,
                custom: self.custom,
            },
        }
    }
}
