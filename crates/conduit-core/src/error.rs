//! Error types shared by every Conduit crate.

use std::sync::Arc;

use thiserror::Error;

use crate::message::Message;

/// Errors raised by channels, endpoints, the scheduler and gateways.
#[derive(Debug, Clone, Error)]
pub enum MessagingError {
    /// Required configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A trigger could not compute its next run time.
    #[error("Invalid schedule expression '{expression}': {reason}")]
    InvalidScheduleExpression { expression: String, reason: String },

    /// Scheduled work or a poll cycle failed.
    #[error("Work execution failed: {0}")]
    WorkExecution(String),

    /// A message handler failed on a specific message.
    #[error("Failed to handle message: {reason}")]
    Handling {
        reason: String,
        failed_message: Option<Box<Message>>,
    },

    /// A channel rejected a message or did not accept it in time.
    #[error("Delivery to '{channel}' failed: {reason}")]
    Delivery { channel: String, reason: String },

    /// A reply could not be matched to a pending request.
    #[error("Correlation error: {0}")]
    Correlation(String),

    /// Error carried back inside an error reply.
    #[error("Remote failure: {0}")]
    Remote(Arc<MessagingError>),

    /// A bounded wait elapsed.
    #[error("Operation timed out")]
    Timeout,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MessagingError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a handling error that carries the message being processed.
    pub fn handling(reason: impl Into<String>, failed_message: Message) -> Self {
        Self::Handling {
            reason: reason.into(),
            failed_message: Some(Box::new(failed_message)),
        }
    }

    /// Create a delivery error for the named channel.
    pub fn delivery(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delivery {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// The message that was being processed when this error occurred, if known.
    pub fn failed_message(&self) -> Option<&Message> {
        match self {
            Self::Handling { failed_message, .. } => failed_message.as_deref(),
            Self::Remote(inner) => inner.failed_message(),
            _ => None,
        }
    }
}

/// Result type for messaging operations.
pub type MessagingResult<T> = Result<T, MessagingError>;
