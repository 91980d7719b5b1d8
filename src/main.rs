//! Conduit command line: configuration checks for the messaging runtime.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use conduit::config::{Config, ConfigLoader, ConfigValidator};
use conduit::endpoint::{GatewaySettings, PollerMetadata};

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    conduit::telemetry::init_tracing(&cli.log);

    let config = match ConfigLoader::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %cli.config.display(), error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Check => check(&config),
        Commands::Describe => describe(&config),
    }
}

fn check(config: &Config) -> ExitCode {
    let result = match ConfigValidator::validate(config) {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Validation failed");
            return ExitCode::FAILURE;
        }
    };

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for err in &result.errors {
        println!("error: {}: {}", err.path, err.message);
    }

    if result.is_valid() {
        println!(
            "ok: {} poller(s), {} gateway(s)",
            config.pollers.len(),
            config.gateways.len()
        );
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn describe(config: &Config) -> ExitCode {
    let pool = match config.scheduler.pool_size {
        0 => "unbounded".to_string(),
        n => n.to_string(),
    };
    println!("scheduler {} (pool: {pool})", config.scheduler.name);

    let mut failed = false;
    for (name, poller_config) in &config.pollers {
        match PollerMetadata::from_config(poller_config) {
            Ok(poller) => println!(
                "poller {name}: trigger {:?}, max/poll {:?}, receive timeout {:?}, send timeout {:?}",
                poller.trigger,
                poller.max_messages_per_poll,
                poller.receive_timeout,
                poller.send_timeout
            ),
            Err(e) => {
                println!("poller {name}: {e}");
                failed = true;
            }
        }
    }

    for (name, gateway_config) in &config.gateways {
        let settings = GatewaySettings::from_config(gateway_config);
        println!(
            "gateway {name}: request timeout {:?}, reply timeout {:?}, throw errors {}",
            settings.request_timeout, settings.reply_timeout, settings.throw_errors
        );
    }

    if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}
