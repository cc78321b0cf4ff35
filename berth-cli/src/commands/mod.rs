//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod key;
mod service;

use anyhow::Result;
use berth_client::OrchestratorClient;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a repository head, or rebuild it if already deployed
    Build {
        /// Repository (e.g. owner/name)
        repository: String,

        /// Branch to build (defaults to master)
        head: Option<String>,
    },
    /// Rebuild every deployed service
    Reboot,
    /// Rewrite every proxy config and reload the proxy
    Reload,
    /// Register a repository and print its service key
    Create {
        /// Repository (e.g. owner/name)
        repository: String,
    },
    /// Stop a service's container
    Stop {
        /// Service ID or unambiguous prefix
        id: String,
    },
    /// Start a service from its last built image
    Start {
        /// Service ID or unambiguous prefix
        id: String,
    },
    /// Rebuild a single service and wait for it
    Rebuild {
        /// Service ID or unambiguous prefix
        id: String,
    },
    /// Stop a service and forget it
    Delete {
        /// Service ID or unambiguous prefix
        id: String,
    },
    /// Print the service key of a registered repository
    Getkey {
        /// Repository (e.g. owner/name)
        repository: String,
    },
    /// List services, or a single field of every service
    List {
        /// Field to print (e.g. id, domains, ports, online)
        field: Option<String>,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        Commands::Build { repository, head } => {
            service::build(&client, &repository, head.as_deref()).await
        }
        Commands::Reboot => service::reboot(&client).await,
        Commands::Reload => service::reload(&client).await,
        Commands::Create { repository } => key::create(&client, &repository).await,
        Commands::Stop { id } => service::stop(&client, &id).await,
        Commands::Start { id } => service::start(&client, &id).await,
        Commands::Rebuild { id } => service::rebuild(&client, &id).await,
        Commands::Delete { id } => service::delete(&client, &id).await,
        Commands::Getkey { repository } => key::get(&client, &repository).await,
        Commands::List { field } => service::list(&client, field.as_deref()).await,
    }
}
