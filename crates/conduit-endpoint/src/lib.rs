//! # Conduit Endpoint
//!
//! Endpoints that connect channels to handlers, and the request/reply gateway.
//!
//! ## Key Components
//!
//! - [`Endpoint`]: stopped/running lifecycle shared by every endpoint
//! - [`PollingEndpoint`]: runs poll cycles of a [`PollSource`] on a [`TaskScheduler`](conduit_scheduling::TaskScheduler)
//! - [`PollingConsumer`], [`EventDrivenConsumer`]: hand channel messages to a handler
//! - [`SourcePollingChannelAdapter`]: moves messages from a source to a channel
//! - [`MessagingGateway`]: request/reply over channels with reply correlation
//! - [`EndpointRegistry`]: ordered startup and shutdown

pub mod adapter;
pub mod consumer;
pub mod gateway;
pub mod lifecycle;
pub mod polling;
pub mod registry;
pub mod reply_handler;

pub use adapter::SourcePollingChannelAdapter;
pub use consumer::{EventDrivenConsumer, PollingConsumer};
pub use gateway::{GatewaySettings, MessagingGateway, ReplyChannel};
pub use lifecycle::{Endpoint, EndpointLifecycle};
pub use polling::{
    DEFAULT_RECEIVE_TIMEOUT, PollSource, PollerMetadata, PollingEndpoint, TransactionBoundary,
    UNBOUNDED,
};
pub use registry::EndpointRegistry;
pub use reply_handler::ReplyProducingHandler;
