//! Service orchestrator
//!
//! Turns a repository reference into a deployed, routable service and keeps
//! stored service records consistent with the live container set:
//! - deploy: fetch manifest, allocate ports, derive domains, persist, build in the background
//! - rebuild: build → stop → run → configure proxy → reload proxy
//! - reconcile: merge stored records with the running container list
//! - recover: finish interrupted rebuilds and restart built services at startup

use berth_core::domain::key::ServiceKey;
use berth_core::domain::service::{ServiceConfiguration, ServiceIdentity, ServiceStatus};
use berth_core::dto::service::{RebootReport, RebuildFailure, ServiceManifest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::ports::allocate_port;
use super::{Result, ServiceError, ServiceSettings};
use crate::engine::ContainerEngine;
use crate::proxy::ReverseProxy;
use crate::repository::{Collection, Stores};
use crate::source::{RepositoryDescriptor, SourceHost};

/// Everything needed to deploy a repository head
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub descriptor: RepositoryDescriptor,

    /// Caller-supplied values; the repository manifest wins where both set a field
    pub overrides: ServiceManifest,
}

/// Durable marker of a rebuild that has started but not finished
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RebuildIntent {
    pub id: ServiceIdentity,
    pub started_at: DateTime<Utc>,
}

/// What the startup recovery pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub rebuilt: usize,
    pub restarted: usize,
    pub failed: usize,
}

/// Drives the lifecycle of every deployed service
pub struct Orchestrator {
    settings: ServiceSettings,
    pub(super) services: Collection<ServiceConfiguration>,
    pub(super) keys: Collection<ServiceKey>,
    intents: Collection<RebuildIntent>,
    engine: Arc<dyn ContainerEngine>,
    proxy: Arc<dyn ReverseProxy>,
    pub(super) source: Arc<dyn SourceHost>,

    /// Identities with a rebuild (or start/delete) currently running
    building: Arc<Mutex<HashSet<ServiceIdentity>>>,

    /// Serializes the read-modify-write of the port set
    allocation: tokio::sync::Mutex<()>,

    /// Serializes key registration from the duplicate check through the write
    pub(super) registration: tokio::sync::Mutex<()>,

    /// Rebuilds detached from the request that triggered them
    detached: Mutex<JoinSet<()>>,
}

impl Orchestrator {
    pub fn new(
        settings: ServiceSettings,
        stores: Stores,
        engine: Arc<dyn ContainerEngine>,
        proxy: Arc<dyn ReverseProxy>,
        source: Arc<dyn SourceHost>,
    ) -> Self {
        Self {
            settings,
            services: Collection::new(stores.services),
            keys: Collection::new(stores.keys),
            intents: Collection::new(stores.intents),
            engine,
            proxy,
            source,
            building: Arc::new(Mutex::new(HashSet::new())),
            allocation: tokio::sync::Mutex::new(()),
            registration: tokio::sync::Mutex::new(()),
            detached: Mutex::new(JoinSet::new()),
        }
    }

    /// Identity of a repository head
    pub fn identity(repository: &str, head: &str) -> ServiceIdentity {
        ServiceIdentity::derive(repository, head)
    }

    // =============================================================================
    // Deploy
    // =============================================================================

    /// Creates (or replaces) the record of a repository head and builds it in the background
    ///
    /// Returns as soon as the record is persisted. Failures of the background
    /// rebuild are logged and never reach the caller.
    pub async fn deploy_service(self: &Arc<Self>, request: DeployRequest) -> Result<ServiceIdentity> {
        let descriptor = request.descriptor;

        let declared = self
            .source
            .fetch_service_configuration(&descriptor.configuration_url)
            .await
            .map_err(|source| ServiceError::DeploymentFailed {
                repository: descriptor.repository.clone(),
                head: descriptor.branch.clone(),
                source,
            })?;
        let manifest = declared.merged_over(request.overrides);

        let config = self.create_configuration(descriptor, manifest).await?;
        let id = config.id.clone();

        info!(
            "Deployed {}@{} as {} on ports {:?}",
            config.repository, config.branch, id, config.ports
        );

        self.spawn_rebuild(config);
        Ok(id)
    }

    /// Deploys a repository head, or rebuilds it in the background if it is already known
    pub async fn build_repository(
        self: &Arc<Self>,
        repository: &str,
        head: &str,
    ) -> Result<ServiceIdentity> {
        let id = Self::identity(repository, head);

        if let Some(config) = self.services.get(id.as_str()).await? {
            info!("Rebuilding known service {} ({}@{})", id, repository, head);
            self.spawn_rebuild(config);
            return Ok(id);
        }

        let descriptor = self
            .source
            .get_service_from_repository(repository, head)
            .await
            .map_err(|source| ServiceError::DeploymentFailed {
                repository: repository.to_string(),
                head: head.to_string(),
                source,
            })?;

        self.deploy_service(DeployRequest {
            descriptor,
            overrides: ServiceManifest::default(),
        })
        .await
    }

    /// Allocates ports, derives domains and env, and persists the record
    async fn create_configuration(
        &self,
        descriptor: RepositoryDescriptor,
        manifest: ServiceManifest,
    ) -> Result<ServiceConfiguration> {
        let id = Self::identity(&descriptor.repository, &descriptor.branch);
        let service_type = self.resolve_type(&id, manifest.service_type.as_deref());

        let _allocation = self.allocation.lock().await;

        let mut taken: HashSet<u16> = self
            .services
            .values()
            .await?
            .into_iter()
            .flat_map(|service| service.ports)
            .collect();

        let mut ports = vec![self.allocate(&mut taken)?];
        if manifest.web_socket.is_some() {
            ports.push(self.allocate(&mut taken)?);
        }

        let mut env: BTreeMap<String, String> = manifest.env.unwrap_or_default();
        env.insert("PORT".to_string(), ports[0].to_string());
        if let Some(port) = ports.get(1) {
            env.insert("WEBSOCKET_PORT".to_string(), port.to_string());
        }

        let domains = service_domains(manifest.domain.as_deref(), &id, &self.settings.base_domain);

        let config = ServiceConfiguration {
            id,
            service_type,
            url: descriptor.url,
            clone_url: descriptor.clone_url,
            branch: descriptor.branch,
            repository: descriptor.repository,
            web_socket: manifest.web_socket,
            domains,
            ports,
            env,
            image_id: None,
        };

        // The background build has not started yet; recovery picks it up if it never does
        self.services.set(config.id.as_str(), &config).await?;
        self.mark_rebuild_started(&config.id).await?;
        Ok(config)
    }

    async fn mark_rebuild_started(&self, id: &ServiceIdentity) -> Result<()> {
        self.intents
            .set(
                id.as_str(),
                &RebuildIntent {
                    id: id.clone(),
                    started_at: Utc::now(),
                },
            )
            .await?;
        Ok(())
    }

    fn resolve_type(&self, id: &ServiceIdentity, declared: Option<&str>) -> String {
        match declared {
            Some(t) if self.settings.supported_types.iter().any(|s| s == t) => t.to_string(),
            Some(t) => {
                warn!(
                    "Service {} declares unsupported type '{}', using '{}'",
                    id, t, self.settings.default_type
                );
                self.settings.default_type.clone()
            }
            None => self.settings.default_type.clone(),
        }
    }

    /// Draws one free port and marks it taken
    fn allocate(&self, taken: &mut HashSet<u16>) -> Result<u16> {
        let (min, max) = self.settings.port_range;
        let attempts = self.settings.port_attempts;

        let port = allocate_port(&mut rand::rng(), (min, max), taken, attempts)
            .ok_or(ServiceError::PortAllocationExhausted { min, max, attempts })?;

        taken.insert(port);
        Ok(port)
    }

    // =============================================================================
    // Rebuild
    // =============================================================================

    /// Rebuilds a known repository head and waits for the pipeline to finish
    pub async fn rebuild_repository(
        &self,
        repository: &str,
        head: &str,
    ) -> Result<ServiceConfiguration> {
        let id = Self::identity(repository, head);
        let config = self.services.get(id.as_str()).await?.ok_or_else(|| {
            ServiceError::UnknownService(format!("{} ({}@{})", id, repository, head))
        })?;

        self.rebuild_service(config).await
    }

    /// Rebuilds a stored service by identity and waits for the pipeline to finish
    pub async fn rebuild_by_id(&self, id: &ServiceIdentity) -> Result<ServiceConfiguration> {
        let config = self.require(id).await?;
        self.rebuild_service(config).await
    }

    /// build → stop → run → configure proxy → reload proxy
    ///
    /// Any failing step aborts the pipeline; the previous container may
    /// already be stopped at that point. The durable intent marker stays in
    /// place only if the process dies mid-pipeline.
    pub async fn rebuild_service(&self, config: ServiceConfiguration) -> Result<ServiceConfiguration> {
        let _guard = BuildGuard::acquire(&self.building, &config.id)?;
        let id = config.id.clone();

        self.mark_rebuild_started(&id).await?;

        let result = self.run_pipeline(config).await;

        if let Err(e) = self.intents.delete(id.as_str()).await {
            warn!("Failed to clear rebuild intent for {}: {}", id, e);
        }

        match &result {
            Ok(config) => info!(
                "Rebuilt {} ({}@{}) from image {}",
                id,
                config.repository,
                config.branch,
                config.image_id.as_deref().unwrap_or("?")
            ),
            Err(e) => error!("Rebuild of {} failed: {}", id, e),
        }

        result
    }

    async fn run_pipeline(&self, mut config: ServiceConfiguration) -> Result<ServiceConfiguration> {
        let image_id = self.engine.build_image(&config).await?;
        config.image_id = Some(image_id);

        // The record may have been deleted while the image was building
        if !self.services.has(config.id.as_str()).await? {
            return Err(ServiceError::UnknownService(config.id.to_string()));
        }
        self.services.set(config.id.as_str(), &config).await?;

        self.engine.stop_service(&config).await?;
        self.engine.run_service(&config).await?;

        self.proxy.configure(&config).await?;
        self.proxy.reload().await?;

        Ok(config)
    }

    /// Runs a rebuild on its own task; failures are only logged
    fn spawn_rebuild(self: &Arc<Self>, config: ServiceConfiguration) {
        let this = Arc::clone(self);
        let mut detached = self.detached.lock().unwrap_or_else(PoisonError::into_inner);

        // Reap finished tasks so the set does not grow without bound
        while detached.try_join_next().is_some() {}

        detached.spawn(async move {
            let id = config.id.clone();
            let repository = config.repository.clone();
            if let Err(e) = this.rebuild_service(config).await {
                error!("Background rebuild of {} ({}) failed: {}", id, repository, e);
            }
        });
    }

    /// Waits for every background rebuild started so far
    pub async fn wait_for_background_builds(&self) {
        let mut pending = {
            let mut detached = self.detached.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *detached)
        };

        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!("Background rebuild task panicked: {}", e);
            }
        }
    }

    /// Rebuilds every stored service one after another
    pub async fn reboot_all(&self) -> Result<RebootReport> {
        let mut report = RebootReport::default();

        for config in self.sorted_services().await? {
            let id = config.id.clone();
            match self.rebuild_service(config).await {
                Ok(_) => report.rebuilt.push(id),
                Err(e) => report.failed.push(RebuildFailure {
                    id,
                    error: e.to_string(),
                }),
            }
        }

        info!(
            "Reboot finished: {} rebuilt, {} failed",
            report.rebuilt.len(),
            report.failed.len()
        );
        Ok(report)
    }

    // =============================================================================
    // Reconciliation & queries
    // =============================================================================

    /// Every stored service with `online` computed from the running container list
    pub async fn get_all_services(&self) -> Result<Vec<ServiceStatus>> {
        let running = self.running_names().await?;

        Ok(self
            .sorted_services()
            .await?
            .into_iter()
            .map(|config| {
                let online = running.contains(config.container_name());
                ServiceStatus { config, online }
            })
            .collect())
    }

    pub async fn get_service(&self, id: &ServiceIdentity) -> Result<ServiceStatus> {
        let config = self.require(id).await?;
        let online = self.running_names().await?.contains(config.container_name());
        Ok(ServiceStatus { config, online })
    }

    async fn running_names(&self) -> Result<HashSet<String>> {
        Ok(self
            .engine
            .list_running_containers()
            .await?
            .into_iter()
            .collect())
    }

    async fn sorted_services(&self) -> Result<Vec<ServiceConfiguration>> {
        let mut services = self.services.values().await?;
        services.sort_by(|a, b| {
            (&a.repository, &a.branch, &a.id).cmp(&(&b.repository, &b.branch, &b.id))
        });
        Ok(services)
    }

    async fn require(&self, id: &ServiceIdentity) -> Result<ServiceConfiguration> {
        self.services
            .get(id.as_str())
            .await?
            .ok_or_else(|| ServiceError::UnknownService(id.to_string()))
    }

    // =============================================================================
    // Operator actions
    // =============================================================================

    /// Runs the already built image of a service and routes to it
    pub async fn start_service(&self, id: &ServiceIdentity) -> Result<ServiceStatus> {
        let config = self.require(id).await?;
        let _guard = BuildGuard::acquire(&self.building, id)?;

        if config.image_id.is_none() {
            return Err(ServiceError::NotBuilt(id.clone()));
        }

        if self.running_names().await?.contains(config.container_name()) {
            debug!("Service {} is already running", id);
        } else {
            self.engine.run_service(&config).await?;
        }

        self.proxy.configure(&config).await?;
        self.proxy.reload().await?;

        info!("Started service {}", id);
        Ok(ServiceStatus {
            config,
            online: true,
        })
    }

    /// Stops the container of a service, keeping its record and route
    pub async fn stop_service(&self, id: &ServiceIdentity) -> Result<()> {
        let config = self.require(id).await?;
        self.engine.stop_service(&config).await?;
        info!("Stopped service {}", id);
        Ok(())
    }

    /// Stops a service, removes its route and forgets it
    pub async fn delete_service(&self, id: &ServiceIdentity) -> Result<()> {
        let config = self.require(id).await?;
        let _guard = BuildGuard::acquire(&self.building, id)?;

        self.engine.stop_service(&config).await?;
        self.proxy.remove(id).await?;
        self.proxy.reload().await?;

        self.services.delete(id.as_str()).await?;
        self.intents.delete(id.as_str()).await?;

        info!("Deleted service {} ({}@{})", id, config.repository, config.branch);
        Ok(())
    }

    /// Rewrites the route of every service and reloads the proxy once
    pub async fn reload_proxy(&self) -> Result<usize> {
        let mut configured = 0;
        for config in self.sorted_services().await? {
            if config.ports.is_empty() {
                warn!("Service {} has no ports, skipping proxy config", config.id);
                continue;
            }
            self.proxy.configure(&config).await?;
            configured += 1;
        }

        self.proxy.reload().await?;
        info!("Proxy reloaded with {} service(s)", configured);
        Ok(configured)
    }

    /// Reconciles stored state with the container engine after a restart
    ///
    /// Rebuilds services whose rebuild was interrupted, then starts every
    /// built service that is not running. Individual failures are logged and
    /// counted; only store or listing failures abort the pass.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let mut rebuilt = HashSet::new();

        for intent in self.intents.values().await? {
            let Some(config) = self.services.get(intent.id.as_str()).await? else {
                self.intents.delete(intent.id.as_str()).await?;
                continue;
            };

            warn!(
                "Rebuild of {} started at {} did not finish, rebuilding",
                intent.id, intent.started_at
            );
            match self.rebuild_service(config).await {
                Ok(_) => {
                    report.rebuilt += 1;
                    rebuilt.insert(intent.id);
                }
                Err(e) => {
                    error!("Recovery rebuild of {} failed: {}", intent.id, e);
                    report.failed += 1;
                }
            }
        }

        let running = self.running_names().await?;
        for config in self.sorted_services().await? {
            if config.image_id.is_none()
                || rebuilt.contains(&config.id)
                || running.contains(config.container_name())
            {
                continue;
            }

            match self.start_service(&config.id).await {
                Ok(_) => report.restarted += 1,
                Err(e) => {
                    error!("Failed to restart {}: {}", config.id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Recovery finished: {} rebuilt, {} restarted, {} failed",
            report.rebuilt, report.restarted, report.failed
        );
        Ok(report)
    }
}

/// Domains of a service: the explicit domain (if any) followed by the derived subdomain
fn service_domains(explicit: Option<&str>, id: &ServiceIdentity, base_domain: &str) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    let candidates = [explicit.map(str::to_string), Some(id.subdomain(base_domain))];

    for domain in candidates.into_iter().flatten() {
        let domain = domain.trim().to_lowercase();
        if !domain.is_empty() && !domains.contains(&domain) {
            domains.push(domain);
        }
    }

    domains
}

/// Marks an identity as busy for as long as the guard lives
struct BuildGuard {
    building: Arc<Mutex<HashSet<ServiceIdentity>>>,
    id: ServiceIdentity,
}

impl BuildGuard {
    fn acquire(building: &Arc<Mutex<HashSet<ServiceIdentity>>>, id: &ServiceIdentity) -> Result<Self> {
        let mut set = building.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(id.clone()) {
            return Err(ServiceError::BuildInProgress(id.clone()));
        }

        Ok(Self {
            building: Arc::clone(building),
            id: id.clone(),
        })
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.building
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
