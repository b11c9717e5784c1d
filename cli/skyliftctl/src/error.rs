//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

use skylift_orchestrator::ClusterError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("No configuration file found. Create a skylift.toml or pass --config.")]
    NoConfig,

    #[error("DNS API token missing. Set CLOUDFLARE_API_TOKEN or [dns].api_token.")]
    MissingDnsToken,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::NoConfig => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `skylift` from a directory containing skylift.toml, or pass --config <path>."
                        .yellow()
                );
            }
            CliError::MissingDnsToken => {
                eprintln!(
                    "\n{}",
                    "Hint: Export CLOUDFLARE_API_TOKEN with a token scoped to the zone.".yellow()
                );
            }
            _ => {}
        }
        return;
    }

    if let Some(cluster_err) = err.downcast_ref::<ClusterError>() {
        match cluster_err {
            ClusterError::Configuration(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check the [cluster] section of your configuration.".yellow()
                );
            }
            ClusterError::Persistence(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: No cluster topology found. Run `skylift create` first.".yellow()
                );
            }
            ClusterError::Remote(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check that the nodes are reachable and the SSH key matches.".yellow()
                );
            }
            ClusterError::PartialTeardown(failures) => {
                eprintln!(
                    "\n{}",
                    "Some resources could not be removed and may still be billed:".yellow()
                );
                for failure in failures {
                    eprintln!("  - {}", failure);
                }
            }
            _ => {}
        }
    }
}
