//! # Conduit Core
//!
//! Message model and channel protocols shared by the Conduit messaging runtime.
//!
//! ## Key Components
//!
//! - [`Message`] / [`MessageBuilder`]: immutable payload plus headers
//! - [`MessageChannel`], [`PollableChannel`], [`SubscribableChannel`]: channel protocols
//! - [`MessageHandler`], [`MessageSource`]: consumer and producer protocols
//! - [`ErrorHandler`]: sink for failures raised by scheduled work
//! - [`ChannelRegistry`]: name to channel resolution for header references
//! - [`QueueChannel`], [`DirectChannel`]: in-memory channels

pub mod channel;
pub mod channels;
pub mod error;
pub mod error_handler;
pub mod handler;
pub mod message;
pub mod registry;

pub use channel::{
    ChannelRef, MessageChannel, PollableChannel, SubscribableChannel, timeout_from_millis,
};
pub use channels::{DirectChannel, QueueChannel};
pub use error::{MessagingError, MessagingResult};
pub use error_handler::{ErrorHandler, LoggingErrorHandler, MessagePublishingErrorHandler};
pub use handler::{FnHandler, FnSource, MessageHandler, MessageSource};
pub use message::{Message, MessageBuilder, MessageHeaders, Payload};
pub use registry::ChannelRegistry;
