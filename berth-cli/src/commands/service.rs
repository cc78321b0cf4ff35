//! Service command handlers
//!
//! Build, reboot, proxy reload, start/stop/delete and listing.

use anyhow::{Context, Result, anyhow};
use berth_client::OrchestratorClient;
use berth_core::domain::service::ServiceStatus;
use colored::*;
use serde_json::Value as JsonValue;

use crate::id_resolver::resolve_service_id;
use crate::types::IdOrPrefix;

/// Request a build of a repository head
pub async fn build(client: &OrchestratorClient, repository: &str, head: Option<&str>) -> Result<()> {
    let accepted = client
        .build(repository, head)
        .await
        .with_context(|| format!("Failed to build {}", repository))?;

    println!("{}", "✓ Build accepted!".green().bold());
    println!("  ID:   {}", accepted.id.to_string().cyan());
    println!(
        "  {}",
        "The image builds in the background; check progress with `berth list`.".dimmed()
    );

    Ok(())
}

/// Rebuild every service and report the outcome of each
pub async fn reboot(client: &OrchestratorClient) -> Result<()> {
    let report = client.reboot().await.context("Failed to reboot services")?;

    for id in &report.rebuilt {
        println!("  {} {}", "✓".green(), id);
    }
    for failure in &report.failed {
        println!("  {} {}: {}", "✗".red(), failure.id, failure.error.dimmed());
    }

    let summary = format!(
        "{} rebuilt, {} failed",
        report.rebuilt.len(),
        report.failed.len()
    );
    if report.failed.is_empty() {
        println!("{}", summary.green().bold());
    } else {
        println!("{}", summary.yellow().bold());
    }

    Ok(())
}

/// Rewrite every proxy config and reload the proxy
pub async fn reload(client: &OrchestratorClient) -> Result<()> {
    let reloaded = client
        .reload_proxy()
        .await
        .context("Failed to reload proxy")?;

    println!(
        "{}",
        format!("✓ Proxy reloaded with {} service(s)", reloaded.configured)
            .green()
            .bold()
    );

    Ok(())
}

pub async fn stop(client: &OrchestratorClient, id: &str) -> Result<()> {
    let id = resolve_service_id(client, &IdOrPrefix::parse(id)).await?;
    client.stop_service(&id).await?;

    println!("{}", format!("✓ Service {} stopped", short(&id)).green().bold());
    Ok(())
}

pub async fn start(client: &OrchestratorClient, id: &str) -> Result<()> {
    let id = resolve_service_id(client, &IdOrPrefix::parse(id)).await?;
    let status = client.start_service(&id).await?;

    println!("{}", format!("✓ Service {} started", short(&id)).green().bold());
    print_service_summary(&status);
    Ok(())
}

pub async fn rebuild(client: &OrchestratorClient, id: &str) -> Result<()> {
    let id = resolve_service_id(client, &IdOrPrefix::parse(id)).await?;
    let config = client.rebuild_service(&id).await?;

    println!("{}", format!("✓ Service {} rebuilt", short(&id)).green().bold());
    if let Some(image_id) = &config.image_id {
        println!("  Image: {}", image_id.dimmed());
    }
    Ok(())
}

pub async fn delete(client: &OrchestratorClient, id: &str) -> Result<()> {
    let id = resolve_service_id(client, &IdOrPrefix::parse(id)).await?;
    client.delete_service(&id).await?;

    println!("{}", format!("✓ Service {} deleted", short(&id)).green().bold());
    Ok(())
}

/// List every service, or one field of every service
pub async fn list(client: &OrchestratorClient, field: Option<&str>) -> Result<()> {
    let services = client.list_services().await?;

    if let Some(field) = field {
        for line in project_field(&services, field)? {
            println!("{}", line);
        }
        return Ok(());
    }

    if services.is_empty() {
        println!("{}", "No services found.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} service(s):", services.len()).bold());
    println!();
    for status in &services {
        print_service_summary(status);
    }

    Ok(())
}

/// Renders `field` of every service, one line per service
fn project_field(services: &[ServiceStatus], field: &str) -> Result<Vec<String>> {
    services
        .iter()
        .map(|status| -> Result<String> {
            let value = serde_json::to_value(status)?;
            let selected = value
                .get(field)
                .ok_or_else(|| anyhow!("Unknown field '{}'", field))?;
            Ok(render_value(selected))
        })
        .collect()
}

fn render_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        JsonValue::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn short(id: &str) -> &str {
    &id[..id.len().min(7)]
}

fn print_service_summary(status: &ServiceStatus) {
    let config = &status.config;
    let state = if status.online {
        "online".green()
    } else {
        "offline".red()
    };

    println!(
        "  {} {} {}@{} [{}]",
        short(config.id.as_str()).cyan(),
        state,
        config.repository.bold(),
        config.branch,
        config.service_type.dimmed()
    );
    println!("      domains: {}", config.domains.join(", "));
    println!(
        "      ports:   {}",
        config
            .ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(", ")
            .dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::domain::service::{ServiceConfiguration, ServiceIdentity};
    use std::collections::BTreeMap;

    fn status(repository: &str, online: bool) -> ServiceStatus {
        ServiceStatus {
            config: ServiceConfiguration {
                id: ServiceIdentity::derive(repository, "master"),
                service_type: "node".to_string(),
                url: format!("https://github.com/{}", repository),
                clone_url: format!("https://github.com/{}.git", repository),
                branch: "master".to_string(),
                repository: repository.to_string(),
                web_socket: None,
                domains: vec!["a.example.com".to_string(), "b.example.com".to_string()],
                ports: vec![12000],
                env: BTreeMap::new(),
                image_id: None,
            },
            online,
        }
    }

    #[test]
    fn test_project_field() {
        let services = vec![status("acme/a", true), status("acme/b", false)];

        assert_eq!(
            project_field(&services, "repository").unwrap(),
            vec!["acme/a", "acme/b"]
        );
        assert_eq!(
            project_field(&services, "domains").unwrap()[0],
            "a.example.com, b.example.com"
        );
        assert_eq!(project_field(&services, "online").unwrap(), vec!["true", "false"]);
        assert_eq!(project_field(&services, "ports").unwrap()[0], "12000");
    }

    #[test]
    fn test_project_unknown_field() {
        assert!(project_field(&[status("acme/a", true)], "nope").is_err());
        assert!(project_field(&[], "nope").unwrap().is_empty());
    }
}
