//! Configuration schema definitions.
//!
//! Timeouts are signed milliseconds: a negative value waits indefinitely and
//! `0` does not wait at all.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Poller settings keyed by endpoint name.
    #[serde(default)]
    pub pollers: BTreeMap<String, PollerConfig>,

    /// Gateway settings keyed by gateway name.
    #[serde(default)]
    pub gateways: BTreeMap<String, GatewayConfig>,
}

/// Task scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_name")]
    pub name: String,

    /// Maximum concurrently executing tasks. `0` means unbounded.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: default_scheduler_name(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_scheduler_name() -> String {
    "conduit-scheduler".to_string()
}

fn default_pool_size() -> usize {
    10
}

/// Poller configuration for a polling endpoint.
///
/// Exactly one of `fixed_delay_ms`, `fixed_rate_ms` and `cron` selects the
/// trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_delay_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_rate_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,

    #[serde(default)]
    pub initial_delay_ms: u64,

    /// Messages per poll cycle. Non-positive polls until nothing is received.
    /// When absent the endpoint's own default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages_per_poll: Option<i64>,

    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: i64,

    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: i64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            fixed_delay_ms: None,
            fixed_rate_ms: None,
            cron: None,
            initial_delay_ms: 0,
            max_messages_per_poll: None,
            receive_timeout_ms: default_receive_timeout_ms(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

fn default_receive_timeout_ms() -> i64 {
    1000
}

fn default_send_timeout_ms() -> i64 {
    -1
}

/// Trigger selected by a [`PollerConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerConfig {
    FixedDelay(Duration),
    FixedRate(Duration),
    Cron(String),
}

impl PollerConfig {
    /// Resolve the configured trigger.
    ///
    /// # Errors
    ///
    /// Returns an error if no trigger or more than one trigger is configured.
    pub fn trigger(&self) -> Result<TriggerConfig, ConfigError> {
        let mut selected = Vec::with_capacity(1);
        if let Some(ms) = self.fixed_delay_ms {
            selected.push(TriggerConfig::FixedDelay(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.fixed_rate_ms {
            selected.push(TriggerConfig::FixedRate(Duration::from_millis(ms)));
        }
        if let Some(expr) = &self.cron {
            selected.push(TriggerConfig::Cron(expr.clone()));
        }

        match selected.len() {
            0 => Err(ConfigError::MissingField(
                "fixed_delay_ms, fixed_rate_ms or cron".to_string(),
            )),
            1 => Ok(selected.remove(0)),
            _ => Err(ConfigError::invalid_value(
                "trigger",
                "only one of fixed_delay_ms, fixed_rate_ms and cron may be set",
            )),
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

/// Messaging gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_timeout_ms")]
    pub request_timeout_ms: i64,

    #[serde(default = "default_gateway_timeout_ms")]
    pub reply_timeout_ms: i64,

    /// Raise the carried error when the reply is an error message.
    #[serde(default = "default_throw_errors")]
    pub throw_errors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_gateway_timeout_ms(),
            reply_timeout_ms: default_gateway_timeout_ms(),
            throw_errors: default_throw_errors(),
        }
    }
}

fn default_gateway_timeout_ms() -> i64 {
    -1
}

fn default_throw_errors() -> bool {
    true
}
