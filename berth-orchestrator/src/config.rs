//! Orchestrator configuration
//!
//! Defines all configurable parameters for the orchestrator: HTTP binding,
//! state backing, port allocation, container engine, reverse proxy and
//! source host settings.

use std::path::PathBuf;
use std::time::Duration;

use crate::service::ServiceSettings;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// Directory holding one JSON snapshot per collection
    pub state_dir: PathBuf,

    /// When set, collections are stored in Postgres instead of snapshot files
    pub database_url: Option<String>,

    /// Domain under which every service gets a derived subdomain
    pub base_domain: String,

    /// Runtime type used when a repository declares none or an unsupported one
    pub default_type: String,

    /// Runtime types with a build context under `images_dir`
    pub supported_types: Vec<String>,

    /// Exclusive lower bound of the port range
    pub port_min: u16,

    /// Exclusive upper bound of the port range
    pub port_max: u16,

    /// How many candidates to draw before giving up on port allocation
    pub port_attempts: u32,

    /// Root of the per-service data directories mounted into containers
    pub data_dir: PathBuf,

    /// Root of the per-type image build contexts
    pub images_dir: PathBuf,

    /// Container engine binary (podman or docker)
    pub container_bin: String,

    /// Grace period given to a container on stop
    pub stop_timeout: Duration,

    /// Directory the reverse proxy includes site configs from
    pub proxy_sites_dir: PathBuf,

    /// Command that makes the reverse proxy pick up new configs
    pub proxy_reload_cmd: Vec<String>,

    /// Shared secret for webhook signatures; webhooks are refused when unset
    pub webhook_secret: Option<String>,

    /// Source host REST API base URL
    pub source_api_url: String,

    /// Source host raw content base URL
    pub source_raw_url: String,

    /// Source host web base URL, used for clone and browse URLs
    pub source_web_url: String,

    /// Token sent to the source host API
    pub source_token: Option<String>,

    /// File in the repository root holding the service manifest
    pub manifest_file: String,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional; see `Default` for the fallbacks.
    /// - BERTH_BIND_ADDR, BERTH_STATE_DIR, DATABASE_URL
    /// - BERTH_BASE_DOMAIN, BERTH_DEFAULT_TYPE, BERTH_SUPPORTED_TYPES (comma-separated)
    /// - BERTH_PORT_MIN, BERTH_PORT_MAX, BERTH_PORT_ATTEMPTS
    /// - BERTH_DATA_DIR, BERTH_IMAGES_DIR, BERTH_CONTAINER_BIN, BERTH_STOP_TIMEOUT (seconds)
    /// - BERTH_PROXY_SITES_DIR, BERTH_PROXY_RELOAD_CMD
    /// - BERTH_WEBHOOK_SECRET
    /// - BERTH_SOURCE_API_URL, BERTH_SOURCE_RAW_URL, BERTH_SOURCE_WEB_URL, BERTH_SOURCE_TOKEN, BERTH_MANIFEST_FILE
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let port_min = parse_env("BERTH_PORT_MIN")?.unwrap_or(defaults.port_min);
        let port_max = parse_env("BERTH_PORT_MAX")?.unwrap_or(defaults.port_max);
        let port_attempts = parse_env("BERTH_PORT_ATTEMPTS")?.unwrap_or(defaults.port_attempts);

        let stop_timeout = parse_env::<u64>("BERTH_STOP_TIMEOUT")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.stop_timeout);

        let supported_types = std::env::var("BERTH_SUPPORTED_TYPES")
            .ok()
            .map(|s| split_list(&s, ','))
            .unwrap_or(defaults.supported_types);

        let proxy_reload_cmd = std::env::var("BERTH_PROXY_RELOAD_CMD")
            .ok()
            .map(|s| split_list(&s, ' '))
            .unwrap_or(defaults.proxy_reload_cmd);

        Ok(Self {
            bind_addr: env_or("BERTH_BIND_ADDR", defaults.bind_addr),
            state_dir: env_or("BERTH_STATE_DIR", defaults.state_dir),
            database_url: std::env::var("DATABASE_URL").ok(),
            base_domain: env_or("BERTH_BASE_DOMAIN", defaults.base_domain),
            default_type: env_or("BERTH_DEFAULT_TYPE", defaults.default_type),
            supported_types,
            port_min,
            port_max,
            port_attempts,
            data_dir: env_or("BERTH_DATA_DIR", defaults.data_dir),
            images_dir: env_or("BERTH_IMAGES_DIR", defaults.images_dir),
            container_bin: env_or("BERTH_CONTAINER_BIN", defaults.container_bin),
            stop_timeout,
            proxy_sites_dir: env_or("BERTH_PROXY_SITES_DIR", defaults.proxy_sites_dir),
            proxy_reload_cmd,
            webhook_secret: std::env::var("BERTH_WEBHOOK_SECRET").ok(),
            source_api_url: env_or("BERTH_SOURCE_API_URL", defaults.source_api_url),
            source_raw_url: env_or("BERTH_SOURCE_RAW_URL", defaults.source_raw_url),
            source_web_url: env_or("BERTH_SOURCE_WEB_URL", defaults.source_web_url),
            source_token: std::env::var("BERTH_SOURCE_TOKEN").ok(),
            manifest_file: env_or("BERTH_MANIFEST_FILE", defaults.manifest_file),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_domain.trim().is_empty() {
            anyhow::bail!("base_domain cannot be empty");
        }

        if self.supported_types.is_empty() {
            anyhow::bail!("supported_types cannot be empty");
        }

        if !self.supported_types.contains(&self.default_type) {
            anyhow::bail!(
                "default_type '{}' is not one of the supported types",
                self.default_type
            );
        }

        // The range is open, so at least one value must lie strictly between the bounds
        if self.port_max <= self.port_min.saturating_add(1) {
            anyhow::bail!(
                "port range ({}, {}) contains no ports",
                self.port_min,
                self.port_max
            );
        }

        if self.port_attempts == 0 {
            anyhow::bail!("port_attempts must be greater than 0");
        }

        if self.container_bin.is_empty() {
            anyhow::bail!("container_bin cannot be empty");
        }

        if self.proxy_reload_cmd.is_empty() {
            anyhow::bail!("proxy_reload_cmd cannot be empty");
        }

        for url in [&self.source_api_url, &self.source_raw_url, &self.source_web_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("source URL '{}' must start with http:// or https://", url);
            }
        }

        if matches!(&self.webhook_secret, Some(secret) if secret.is_empty()) {
            anyhow::bail!("webhook_secret cannot be empty when set");
        }

        Ok(())
    }

    /// Settings consumed by the orchestrator service
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            base_domain: self.base_domain.clone(),
            default_type: self.default_type.clone(),
            supported_types: self.supported_types.clone(),
            port_range: (self.port_min, self.port_max),
            port_attempts: self.port_attempts,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            state_dir: PathBuf::from("./state"),
            database_url: None,
            base_domain: "localhost".to_string(),
            default_type: "node".to_string(),
            supported_types: vec![
                "node".to_string(),
                "static".to_string(),
                "python".to_string(),
            ],
            port_min: 10_000,
            port_max: 60_000,
            port_attempts: 1_000,
            data_dir: PathBuf::from("./data"),
            images_dir: PathBuf::from("./images"),
            container_bin: "podman".to_string(),
            stop_timeout: Duration::from_secs(10),
            proxy_sites_dir: PathBuf::from("./sites"),
            proxy_reload_cmd: vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()],
            webhook_secret: None,
            source_api_url: "https://api.github.com".to_string(),
            source_raw_url: "https://raw.githubusercontent.com".to_string(),
            source_web_url: "https://github.com".to_string(),
            source_token: None,
            manifest_file: "berth.json".to_string(),
        }
    }
}

fn env_or<T: From<String>>(name: &str, default: T) -> T {
    std::env::var(name).map(T::from).unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", name, raw)),
        Err(_) => Ok(None),
    }
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.default_type, "node");
        assert_eq!(config.stop_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.default_type = "ruby".to_string();
        assert!(config.validate().is_err());
        config.default_type = "node".to_string();

        config.port_min = 5000;
        config.port_max = 5001;
        assert!(config.validate().is_err());
        config.port_max = 5002;
        assert!(config.validate().is_ok());

        config.source_api_url = "api.github.com".to_string();
        assert!(config.validate().is_err());
        config.source_api_url = "https://api.github.com".to_string();
        config.source_web_url = "github.com".to_string();
        assert!(config.validate().is_err());
        config.source_web_url = "https://github.com".to_string();

        config.webhook_secret = Some(String::new());
        assert!(config.validate().is_err());
        config.webhook_secret = Some("s3cret".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("node, static,,python ", ','), vec!["node", "static", "python"]);
        assert_eq!(split_list("nginx -s  reload", ' '), vec!["nginx", "-s", "reload"]);
    }

    #[test]
    fn test_service_settings() {
        let settings = Config::default().service_settings();
        assert_eq!(settings.port_range, (10_000, 60_000));
        assert_eq!(settings.base_domain, "localhost");
    }
}
