//! fayolex-infra CLI.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 3: Configuration or validation failure

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fayolex_infra::{config, selection, topology};

mod commands;

use commands::{Cli, Commands};

pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const VALIDATION_FAILURE: u8 = 3;
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fayolex_infra=info,warn"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Synth(args) => commands::synth::execute(args),
        Commands::List(args) => commands::list::execute(args),
        Commands::Lookup(args) => commands::lookup::execute(args).await,
        Commands::Outputs(args) => commands::outputs::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

/// Bad input is a validation failure; everything else is general.
fn categorize_error(e: &anyhow::Error) -> u8 {
    let invalid_input = e.chain().any(|cause| {
        cause.is::<config::Error>() || cause.is::<topology::Error>() || cause.is::<selection::Error>()
    });

    if invalid_input {
        ExitCodes::VALIDATION_FAILURE
    } else {
        ExitCodes::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::{categorize_error, ExitCodes};
    use fayolex_infra::{config, selection, stacks, topology};

    #[test]
    fn filter_selecting_nothing_is_a_validation_failure() {
        let error = Err::<(), _>(selection::Error::NoMatch(String::from("Nope*")))
            .context("Invalid stack filter")
            .unwrap_err();
        assert_eq!(ExitCodes::VALIDATION_FAILURE, categorize_error(&error));
    }

    #[test]
    fn config_and_topology_errors_are_validation_failures() {
        let config_error = Err::<(), _>(config::Error::FileNotFound(String::from("deploy.yaml")))
            .context("Failed to load deployment config deploy.yaml")
            .unwrap_err();
        assert_eq!(ExitCodes::VALIDATION_FAILURE, categorize_error(&config_error));

        let topology_error = Err::<(), _>(topology::Error::Stack {
            stack: "LoadBalancerStack",
            source: stacks::Error::MissingCertificate,
        })
        .context("Topology validation failed")
        .unwrap_err();
        assert_eq!(ExitCodes::VALIDATION_FAILURE, categorize_error(&topology_error));
    }

    #[test]
    fn other_errors_are_general() {
        let error = anyhow::anyhow!("connection reset");
        assert_eq!(ExitCodes::GENERAL_ERROR, categorize_error(&error));
    }
}
