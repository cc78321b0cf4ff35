//! Service key command handlers

use anyhow::{Context, Result};
use berth_client::OrchestratorClient;
use colored::*;

/// Register a repository and print its key
pub async fn create(client: &OrchestratorClient, repository: &str) -> Result<()> {
    let key = client
        .create_key(repository)
        .await
        .with_context(|| format!("Failed to register {}", repository))?;

    println!("{}", "✓ Repository registered!".green().bold());
    println!("  Repository: {}", key.repository.bold());
    println!("  Key:        {}", key.key.cyan());
    println!(
        "  {}",
        "Keep this key secret; it authorizes builds via POST /trigger.".dimmed()
    );

    Ok(())
}

/// Print the key of an already registered repository
pub async fn get(client: &OrchestratorClient, repository: &str) -> Result<()> {
    let key = client
        .get_key(repository)
        .await
        .with_context(|| format!("Failed to fetch key for {}", repository))?;

    println!("{}", key.key);

    Ok(())
}
