use super::*;
use crate::schema::GatewayConfig;

fn poller(fixed_delay_ms: u64) -> PollerConfig {
    PollerConfig {
        fixed_delay_ms: Some(fixed_delay_ms),
        ..Default::default()
    }
}

#[test]
fn test_validate_default_config() {
    let config = Config::default();
    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.is_empty());
}

#[test]
fn test_validate_empty_scheduler_name() {
    let mut config = Config::default();
    config.scheduler.name = "  ".to_string();

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "scheduler.name"));
}

#[test]
fn test_validate_unbounded_pool_warning() {
    let mut config = Config::default();
    config.scheduler.pool_size = 0;

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "scheduler.pool_size"));
}

#[test]
fn test_validate_poller_without_trigger() {
    let mut config = Config::default();
    config.pollers.insert("orders".to_string(), PollerConfig::default());

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "pollers.orders"));
}

#[test]
fn test_validate_poller_with_two_triggers() {
    let mut config = Config::default();
    config.pollers.insert(
        "orders".to_string(),
        PollerConfig {
            fixed_rate_ms: Some(100),
            cron: Some("* * * * * *".to_string()),
            ..Default::default()
        },
    );

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
}

#[test]
fn test_validate_zero_period() {
    let mut config = Config::default();
    config.pollers.insert("orders".to_string(), poller(0));

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
    assert!(
        result
            .errors
            .iter()
            .any(|e| e.path == "pollers.orders.fixed_delay_ms")
    );
}

#[test]
fn test_validate_empty_cron() {
    let mut config = Config::default();
    config.pollers.insert(
        "nightly".to_string(),
        PollerConfig {
            cron: Some(String::new()),
            ..Default::default()
        },
    );

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "pollers.nightly.cron"));
}

#[test]
fn test_validate_unbounded_polling_warning() {
    let mut config = Config::default();
    let mut unbounded = poller(100);
    unbounded.max_messages_per_poll = Some(-1);
    unbounded.receive_timeout_ms = -1;
    config.pollers.insert("drain".to_string(), unbounded);

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert_eq!(result.warnings.len(), 2);
}

#[test]
fn test_validate_gateway_wait_warning() {
    let mut config = Config::default();
    config
        .gateways
        .insert("pricing".to_string(), GatewayConfig::default());

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.path == "gateways.pricing.reply_timeout_ms")
    );
}
