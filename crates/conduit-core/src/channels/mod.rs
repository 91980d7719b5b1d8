//! Minimal in-memory channel implementations.

mod direct;
mod queue;

pub use direct::DirectChannel;
pub use queue::QueueChannel;
