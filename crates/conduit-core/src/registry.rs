//! Channel registry for resolving channels by name.

use std::sync::Arc;

use dashmap::DashMap;

use crate::channel::{ChannelRef, MessageChannel};
use crate::error::{MessagingError, MessagingResult};

/// Registry for managing named channels.
///
/// Used to resolve name-valued reply and error channel headers.
pub struct ChannelRegistry {
    channels: DashMap<String, Arc<dyn MessageChannel>>,
}

impl ChannelRegistry {
    /// Create a new channel registry.
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Register a channel under its own name.
    ///
    /// # Errors
    ///
    /// Returns an error if a channel with the same name is already registered.
    pub fn register(&self, channel: Arc<dyn MessageChannel>) -> MessagingResult<()> {
        let name = channel.name().to_string();
        if self.channels.contains_key(&name) {
            return Err(MessagingError::configuration(format!(
                "channel '{name}' is already registered"
            )));
        }
        self.channels.insert(name, channel);
        Ok(())
    }

    /// Unregister a channel by name.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn MessageChannel>> {
        self.channels.remove(name).map(|(_, channel)| channel)
    }

    /// Get a channel by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn MessageChannel>> {
        self.channels.get(name).map(|entry| entry.value().clone())
    }

    /// Resolve a header channel reference.
    pub fn resolve(&self, channel: &ChannelRef) -> Option<Arc<dyn MessageChannel>> {
        match channel {
            ChannelRef::Instance(channel) => Some(channel.clone()),
            ChannelRef::Name(name) => self.get(name),
        }
    }

    /// Check if a channel is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// List all registered channel names.
    pub fn list_names(&self) -> Vec<String> {
        self.channels.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Get the number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
