//! Podman container management
//!
//! Drives the podman CLI (docker accepts the same arguments) for the service lifecycle:
//! - Checking engine availability
//! - Building a service image from its per-type build context
//! - Running a service container named after the service identity
//! - Stopping the container with a bounded grace period
//! - Listing running containers for reconciliation

use async_trait::async_trait;
use berth_core::domain::service::ServiceConfiguration;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{ContainerEngine, EngineError, Result};

/// Path inside every container where the per-service data directory is mounted
pub const CONTAINER_DATA_DIR: &str = "/data";

/// Container engine backed by the podman (or docker) CLI
pub struct PodmanEngine {
    bin: String,
    images_dir: PathBuf,
    data_dir: PathBuf,
    stop_timeout: Duration,
}

impl PodmanEngine {
    /// Creates a new engine adapter
    ///
    /// # Arguments
    /// * `bin` - Engine binary ("podman" or "docker")
    /// * `images_dir` - Directory holding one build context per service type
    /// * `data_dir` - Root of the per-service data directories
    /// * `stop_timeout` - Grace period before a stopping container is killed
    pub fn new(bin: String, images_dir: PathBuf, data_dir: PathBuf, stop_timeout: Duration) -> Self {
        Self {
            bin,
            images_dir,
            data_dir,
            stop_timeout,
        }
    }

    /// Checks if the engine binary is installed and available
    pub async fn check_available(&self) -> anyhow::Result<()> {
        let output = Command::new(&self.bin)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to execute '{} --version'. Is it installed? {}",
                    self.bin,
                    e
                )
            })?;

        if !output.status.success() {
            anyhow::bail!("{} is not working correctly", self.bin);
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("Container engine is available: {}", version.trim());

        Ok(())
    }

    /// Runs the engine binary with the given arguments and logs its output
    async fn exec(&self, args: &[String]) -> Result<Output> {
        let subcommand = args.first().map(String::as_str).unwrap_or_default();

        let output = Command::new(&self.bin)
            .args(args)
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                command: format!("{} {}", self.bin, subcommand),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stdout.trim().is_empty() {
            debug!("{} {} stdout: {}", self.bin, subcommand, stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("{} {} stderr: {}", self.bin, subcommand, stderr.trim());
        }

        Ok(output)
    }

    /// Absolute host directory mounted as the service's data directory
    fn service_data_dir(&self, service: &ServiceConfiguration) -> Result<PathBuf> {
        let dir = self.data_dir.join(service.id.as_str());
        std::fs::create_dir_all(&dir).map_err(|source| EngineError::DataDir {
            id: service.id.clone(),
            source,
        })?;
        std::path::absolute(&dir).map_err(|source| EngineError::DataDir {
            id: service.id.clone(),
            source,
        })
    }
}

#[async_trait]
impl ContainerEngine for PodmanEngine {
    async fn list_running_containers(&self) -> Result<Vec<String>> {
        let args = vec![
            "ps".to_string(),
            "--format".to_string(),
            "{{.Names}}".to_string(),
        ];
        let output = self.exec(&args).await?;

        if !output.status.success() {
            return Err(EngineError::ListFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_container_names(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn build_image(&self, service: &ServiceConfiguration) -> Result<String> {
        info!(
            "Building image for {} ({}) with type {}",
            service.repository, service.id, service.service_type
        );

        let args = build_args(service, &self.images_dir, chrono::Utc::now().timestamp());
        let output = self.exec(&args).await?;

        if !output.status.success() {
            let err = EngineError::BuildFailed {
                repository: service.repository.clone(),
                id: service.id.clone(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            };
            error!("{}", err);
            return Err(err);
        }

        // `--quiet` prints the image ID as the last line
        let stdout = String::from_utf8_lossy(&output.stdout);
        let image_id = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| image_tag(service));

        info!("Built image {} for {}", image_id, service.id);
        Ok(image_id)
    }

    async fn run_service(&self, service: &ServiceConfiguration) -> Result<()> {
        let image_id = service
            .image_id
            .as_deref()
            .ok_or_else(|| EngineError::NotBuilt(service.id.clone()))?;

        let data_dir = self.service_data_dir(service)?;

        info!("Starting container {} from image {}", service.id, image_id);

        let args = run_args(service, image_id, &data_dir);
        let output = self.exec(&args).await?;

        if !output.status.success() {
            let err = EngineError::RunFailed {
                id: service.id.clone(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            };
            error!("{}", err);
            return Err(err);
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(
            "Container {} started successfully with ID: {}",
            service.id, container_id
        );

        Ok(())
    }

    async fn stop_service(&self, service: &ServiceConfiguration) -> Result<()> {
        let running = self.list_running_containers().await?;
        if running.iter().any(|name| name == service.container_name()) {
            info!("Stopping container {}", service.id);

            let args = vec![
                "stop".to_string(),
                "--time".to_string(),
                self.stop_timeout.as_secs().to_string(),
                service.container_name().to_string(),
            ];
            let output = self.exec(&args).await?;

            if !output.status.success() {
                return Err(EngineError::StopFailed {
                    id: service.id.clone(),
                    exit_code: output.status.code().unwrap_or(-1),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }

            info!("Container {} stopped", service.id);
        } else {
            debug!("Container {} is not running, nothing to stop", service.id);
        }

        // `--rm` cleanup is asynchronous on docker; the name must be free before the next run
        let output = self.exec(&remove_args(service)).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() && !is_missing_container(&stderr) {
            return Err(EngineError::StopFailed {
                id: service.id.clone(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Tag given to every image built for a service
fn image_tag(service: &ServiceConfiguration) -> String {
    format!("berth/{}", service.id)
}

/// Arguments for building a service image
///
/// The build context is the directory of the service type; the repository is
/// passed as build arguments. `CACHEBUST` changes on every build so the clone
/// layer is never reused.
fn build_args(service: &ServiceConfiguration, images_dir: &Path, timestamp: i64) -> Vec<String> {
    vec![
        "build".to_string(),
        "--quiet".to_string(),
        "--tag".to_string(),
        image_tag(service),
        "--build-arg".to_string(),
        format!("REPOSITORY={}", service.clone_url),
        "--build-arg".to_string(),
        format!("BRANCH={}", service.branch),
        "--build-arg".to_string(),
        format!("CACHEBUST={}", timestamp),
        images_dir
            .join(&service.service_type)
            .to_string_lossy()
            .into_owned(),
    ]
}

/// Arguments for running a service container
///
/// Ports are published on loopback only; the reverse proxy is the sole way in.
fn run_args(service: &ServiceConfiguration, image_id: &str, data_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--detach".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        service.container_name().to_string(),
    ];

    for port in &service.ports {
        args.push("-p".to_string());
        args.push(format!("127.0.0.1:{}:{}", port, port));
    }

    args.push("-v".to_string());
    args.push(format!("{}:{}", data_dir.display(), CONTAINER_DATA_DIR));

    for (name, value) in &service.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", name, strip_quotes(value)));
    }
    args.push("-e".to_string());
    args.push(format!("DATA_DIR={}", CONTAINER_DATA_DIR));

    args.push(image_id.to_string());
    args
}

/// Arguments for removing a service container whatever its state
fn remove_args(service: &ServiceConfiguration) -> Vec<String> {
    vec![
        "rm".to_string(),
        "--force".to_string(),
        service.container_name().to_string(),
    ]
}

fn is_missing_container(stderr: &str) -> bool {
    stderr.to_lowercase().contains("no such container")
}

fn strip_quotes(value: &str) -> String {
    value.replace(['"', '\''], "")
}

fn parse_container_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::domain::service::{ServiceIdentity, WebSocket};
    use std::collections::BTreeMap;

    fn service() -> ServiceConfiguration {
        ServiceConfiguration {
            id: ServiceIdentity::derive("acme/chat", "master"),
            service_type: "node".to_string(),
            url: "https://github.com/acme/chat".to_string(),
            clone_url: "https://github.com/acme/chat.git".to_string(),
            branch: "master".to_string(),
            repository: "acme/chat".to_string(),
            web_socket: Some(WebSocket {
                path: "/ws".to_string(),
            }),
            domains: vec![],
            ports: vec![12000, 12001],
            env: BTreeMap::from([
                ("GREETING".to_string(), r#"say "hi" it's me"#.to_string()),
                ("PORT".to_string(), "12000".to_string()),
            ]),
            image_id: Some("abc123".to_string()),
        }
    }

    #[test]
    fn test_build_args_bust_cache_and_select_type_context() {
        let args = build_args(&service(), Path::new("/srv/images"), 1_700_000_000);

        assert_eq!(args[0], "build");
        assert!(args.contains(&"CACHEBUST=1700000000".to_string()));
        assert!(args.contains(&"REPOSITORY=https://github.com/acme/chat.git".to_string()));
        assert_eq!(args.last().unwrap(), "/srv/images/node");
    }

    #[test]
    fn test_run_args_bind_loopback_per_port() {
        let svc = service();
        let args = run_args(&svc, "abc123", Path::new("/srv/data/x"));

        assert!(args.contains(&"127.0.0.1:12000:12000".to_string()));
        assert!(args.contains(&"127.0.0.1:12001:12001".to_string()));
        assert!(args.contains(&"/srv/data/x:/data".to_string()));
        assert!(args.contains(&"DATA_DIR=/data".to_string()));

        let name_pos = args.iter().position(|a| a == "--name").unwrap();
        assert_eq!(args[name_pos + 1], svc.id.as_str());
        assert_eq!(args.last().unwrap(), "abc123");
    }

    #[test]
    fn test_run_args_strip_quotes_from_env() {
        let args = run_args(&service(), "abc123", Path::new("/d"));
        assert!(args.contains(&"GREETING=say hi its me".to_string()));
    }

    #[test]
    fn test_remove_args_free_the_container_name() {
        let svc = service();
        assert_eq!(
            remove_args(&svc),
            vec!["rm", "--force", svc.container_name()]
        );
    }

    #[test]
    fn test_missing_container_is_not_a_removal_failure() {
        assert!(is_missing_container(
            "Error response from daemon: No such container: abc"
        ));
        assert!(is_missing_container("Error: no such container abc"));
        assert!(!is_missing_container("Error: permission denied"));
    }

    #[test]
    fn test_parse_container_names() {
        assert_eq!(
            parse_container_names("alpha\n\n  beta  \n"),
            vec!["alpha".to_string(), "beta".to_string()]
        );
        assert!(parse_container_names("").is_empty());
    }
}
