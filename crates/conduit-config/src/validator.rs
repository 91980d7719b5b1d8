//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::{Config, PollerConfig};

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_scheduler(config, &mut result);

        for (name, poller) in &config.pollers {
            Self::validate_poller(&format!("pollers.{name}"), poller, &mut result);
        }

        Self::validate_gateways(config, &mut result);

        Ok(result)
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        if config.scheduler.name.trim().is_empty() {
            result.add_error(ValidationError::new(
                "scheduler.name",
                "Scheduler name cannot be empty",
            ));
        }

        if config.scheduler.pool_size == 0 {
            result.add_warning(ValidationWarning::new(
                "scheduler.pool_size",
                "pool_size is 0, task execution is unbounded",
            ));
        }
    }

    fn validate_poller(path: &str, poller: &PollerConfig, result: &mut ValidationResult) {
        if let Err(e) = poller.trigger() {
            result.add_error(ValidationError::new(path, e.to_string()));
        }

        if poller.fixed_delay_ms == Some(0) {
            result.add_error(ValidationError::new(
                format!("{path}.fixed_delay_ms"),
                "Period must be greater than 0",
            ));
        }
        if poller.fixed_rate_ms == Some(0) {
            result.add_error(ValidationError::new(
                format!("{path}.fixed_rate_ms"),
                "Period must be greater than 0",
            ));
        }
        if poller.cron.as_deref().is_some_and(|expr| expr.trim().is_empty()) {
            result.add_error(ValidationError::new(
                format!("{path}.cron"),
                "Cron expression cannot be empty",
            ));
        }

        if poller.max_messages_per_poll.is_some_and(|max| max <= 0) {
            result.add_warning(ValidationWarning::new(
                format!("{path}.max_messages_per_poll"),
                "Unbounded polling: a source that always has data will never yield",
            ));
        }

        if poller.receive_timeout_ms < 0 {
            result.add_warning(ValidationWarning::new(
                format!("{path}.receive_timeout_ms"),
                "Receive blocks indefinitely and holds an executor slot while idle",
            ));
        }
    }

    fn validate_gateways(config: &Config, result: &mut ValidationResult) {
        for (name, gateway) in &config.gateways {
            if gateway.reply_timeout_ms < 0 {
                result.add_warning(ValidationWarning::new(
                    format!("gateways.{name}.reply_timeout_ms"),
                    "Callers wait indefinitely for replies",
                ));
            }
        }
    }
}
