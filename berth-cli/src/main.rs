//! Berth CLI
//!
//! Command-line interface for operating the Berth orchestrator.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "Berth self-hosted deployment CLI", long_about = None)]
struct Cli {
    /// Orchestrator URL
    #[arg(
        long,
        env = "BERTH_ORCHESTRATOR_URL",
        default_value = "http://localhost:8080"
    )]
    orchestrator_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        orchestrator_url: cli.orchestrator_url,
    };

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_build_with_default_head() {
        let cli = Cli::try_parse_from(["berth", "build", "acme/site"]).unwrap();
        assert_eq!(cli.orchestrator_url, "http://localhost:8080");
        assert!(matches!(
            cli.command,
            Commands::Build { ref repository, head: None } if repository == "acme/site"
        ));
    }

    #[test]
    fn test_cli_parses_list_field() {
        let cli = Cli::try_parse_from([
            "berth",
            "--orchestrator-url",
            "http://berth.internal:9000",
            "list",
            "domains",
        ])
        .unwrap();
        assert_eq!(cli.orchestrator_url, "http://berth.internal:9000");
        assert!(matches!(cli.command, Commands::List { field: Some(ref f) } if f == "domains"));
    }

    #[test]
    fn test_cli_parses_getkey() {
        let cli = Cli::try_parse_from(["berth", "getkey", "acme/site"]).unwrap();
        assert!(matches!(cli.command, Commands::Getkey { .. }));
    }
}
