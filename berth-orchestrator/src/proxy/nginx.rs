//! nginx site configs
//!
//! Every service gets `<sites_dir>/<id>.conf`, a server block listing its
//! domains and proxying to the loopback-bound container ports.

use async_trait::async_trait;
use berth_core::domain::service::{ServiceConfiguration, ServiceIdentity};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ProxyError, Result, ReverseProxy};

pub struct NginxProxy {
    sites_dir: PathBuf,
    reload_cmd: Vec<String>,
}

impl NginxProxy {
    /// # Arguments
    /// * `sites_dir` - Directory included by the main nginx config
    /// * `reload_cmd` - Program and arguments that reload nginx
    pub fn new(sites_dir: PathBuf, reload_cmd: Vec<String>) -> Self {
        Self {
            sites_dir,
            reload_cmd,
        }
    }

    fn site_path(&self, id: &ServiceIdentity) -> PathBuf {
        self.sites_dir.join(format!("{}.conf", id))
    }
}

#[async_trait]
impl ReverseProxy for NginxProxy {
    async fn configure(&self, service: &ServiceConfiguration) -> Result<()> {
        let rendered = render_site(service)?;
        let path = self.site_path(&service.id);
        let tmp = path.with_extension("conf.tmp");

        tokio::fs::create_dir_all(&self.sites_dir)
            .await
            .map_err(|source| ProxyError::Write {
                path: self.sites_dir.clone(),
                source,
            })?;
        tokio::fs::write(&tmp, rendered)
            .await
            .map_err(|source| ProxyError::Write {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| ProxyError::Write {
                path: path.clone(),
                source,
            })?;

        info!(
            "Wrote proxy config for {} ({})",
            service.id,
            service.domains.join(", ")
        );
        Ok(())
    }

    async fn remove(&self, id: &ServiceIdentity) -> Result<()> {
        let path = self.site_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Removed proxy config for {}", id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No proxy config to remove for {}", id);
                Ok(())
            }
            Err(source) => Err(ProxyError::Write { path, source }),
        }
    }

    async fn reload(&self) -> Result<()> {
        let command = self.reload_cmd.join(" ");
        let (program, args) = self
            .reload_cmd
            .split_first()
            .ok_or_else(|| ProxyError::Spawn {
                command: command.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            })?;

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| ProxyError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProxyError::ReloadFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!("Reverse proxy reloaded");
        Ok(())
    }
}

/// Renders the nginx server block for a service
fn render_site(service: &ServiceConfiguration) -> Result<String> {
    let http_port = service
        .http_port()
        .ok_or_else(|| ProxyError::NoPort(service.id.clone()))?;

    let web_socket_location = match (&service.web_socket, service.web_socket_port()) {
        (Some(ws), Some(ws_port)) => format!(
            concat!(
                "    location {path} {{\n",
                "        proxy_pass http://127.0.0.1:{port};\n",
                "        proxy_http_version 1.1;\n",
                "        proxy_set_header Upgrade $http_upgrade;\n",
                "        proxy_set_header Connection \"upgrade\";\n",
                "        proxy_set_header Host $host;\n",
                "    }}\n",
                "\n",
            ),
            path = ws.path,
            port = ws_port,
        ),
        _ => String::new(),
    };

    Ok(format!(
        concat!(
            "# {id} {repository}@{branch}\n",
            "server {{\n",
            "    listen 80;\n",
            "    server_name {domains};\n",
            "\n",
            "{web_socket_location}",
            "    location / {{\n",
            "        proxy_pass http://127.0.0.1:{port};\n",
            "        proxy_set_header Host $host;\n",
            "        proxy_set_header X-Real-IP $remote_addr;\n",
            "        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n",
            "    }}\n",
            "}}\n",
        ),
        id = service.id,
        repository = service.repository,
        branch = service.branch,
        domains = service.domains.join(" "),
        web_socket_location = web_socket_location,
        port = http_port,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::domain::service::WebSocket;
    use std::collections::BTreeMap;

    fn service(ports: Vec<u16>, web_socket: Option<WebSocket>) -> ServiceConfiguration {
        ServiceConfiguration {
            id: ServiceIdentity::derive("acme/site", "master"),
            service_type: "node".to_string(),
            url: String::new(),
            clone_url: String::new(),
            branch: "master".to_string(),
            repository: "acme/site".to_string(),
            web_socket,
            domains: vec!["site.example.com".to_string(), "abcdef0.example.com".to_string()],
            ports,
            env: BTreeMap::new(),
            image_id: None,
        }
    }

    #[test]
    fn test_render_routes_domains_to_http_port() {
        let site = render_site(&service(vec![12000], None)).unwrap();
        assert!(site.contains("server_name site.example.com abcdef0.example.com;"));
        assert!(site.contains("proxy_pass http://127.0.0.1:12000;"));
        assert!(!site.contains("Upgrade"));
    }

    #[test]
    fn test_render_adds_web_socket_location() {
        let ws = Some(WebSocket {
            path: "/socket".to_string(),
        });
        let site = render_site(&service(vec![12000, 12001], ws)).unwrap();
        assert!(site.contains("location /socket {"));
        assert!(site.contains("proxy_pass http://127.0.0.1:12001;"));
        assert!(site.contains("proxy_set_header Upgrade $http_upgrade;"));
    }

    #[test]
    fn test_render_full_server_block() {
        let svc = service(vec![12000], None);
        let expected = format!(
            "# {} acme/site@master\n\
             server {{\n    \
             listen 80;\n    \
             server_name site.example.com abcdef0.example.com;\n\
             \n    \
             location / {{\n        \
             proxy_pass http://127.0.0.1:12000;\n        \
             proxy_set_header Host $host;\n        \
             proxy_set_header X-Real-IP $remote_addr;\n        \
             proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n    \
             }}\n\
             }}\n",
            svc.id
        );

        assert_eq!(render_site(&svc).unwrap(), expected);
    }

    #[test]
    fn test_render_without_port_fails() {
        assert!(matches!(
            render_site(&service(vec![], None)),
            Err(ProxyError::NoPort(_))
        ));
    }

    #[tokio::test]
    async fn test_configure_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = NginxProxy::new(dir.path().to_path_buf(), vec!["true".to_string()]);
        let svc = service(vec![12000], None);

        proxy.configure(&svc).await.unwrap();
        let path = dir.path().join(format!("{}.conf", svc.id));
        assert!(path.exists());

        proxy.remove(&svc.id).await.unwrap();
        assert!(!path.exists());
        // Removing twice is fine
        proxy.remove(&svc.id).await.unwrap();
    }
}
