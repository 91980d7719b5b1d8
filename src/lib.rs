//! # Conduit
//!
//! In-process messaging runtime: triggers and a task scheduler, polling and
//! event-driven endpoints, and a request/reply gateway.
//!
//! The building blocks live in their own crates and are re-exported here:
//!
//! - [`messaging`]: messages, channel protocols, errors
//! - [`config`]: TOML configuration
//! - [`scheduling`]: triggers, scheduler, executors
//! - [`endpoint`]: endpoints and gateways
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use conduit::messaging::{FnHandler, Message, MessageChannel, QueueChannel};
//! use conduit::endpoint::{Endpoint, PollerMetadata, PollingConsumer};
//! use conduit::scheduling::TaskScheduler;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     conduit::telemetry::init_tracing("info");
//!
//!     let scheduler = TaskScheduler::new("app");
//!     scheduler.start()?;
//!
//!     let orders = Arc::new(QueueChannel::new("orders"));
//!     let consumer = PollingConsumer::new(
//!         "order-consumer",
//!         orders.clone(),
//!         Arc::new(FnHandler::new(|msg| {
//!             tracing::info!(message_id = %msg.id(), "order received");
//!             Ok(())
//!         })),
//!     )
//!     .with_scheduler(scheduler.clone())
//!     .with_poller(PollerMetadata::fixed_delay(Duration::from_millis(100)));
//!
//!     consumer.start()?;
//!     orders.send(Message::new(serde_json::json!({"id": 1})), None).await?;
//!
//!     tokio::time::sleep(Duration::from_secs(1)).await;
//!     consumer.stop();
//!     scheduler.stop();
//!     Ok(())
//! }
//! ```

pub mod telemetry;

pub use conduit_config as config;
pub use conduit_core as messaging;
pub use conduit_endpoint as endpoint;
pub use conduit_scheduling as scheduling;

pub use conduit_core::{Message, MessageBuilder, MessagingError, MessagingResult};
pub use conduit_endpoint::{Endpoint, EndpointRegistry, MessagingGateway, PollingEndpoint};
pub use conduit_scheduling::TaskScheduler;
