//! In-process fakes for the orchestrator's adapters

use async_trait::async_trait;
use berth_core::domain::service::{ServiceConfiguration, ServiceIdentity};
use berth_core::dto::service::ServiceManifest;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::engine::{self, ContainerEngine, EngineError};
use crate::proxy::{self, ReverseProxy};
use crate::repository::Stores;
use crate::service::{Orchestrator, ServiceSettings};
use crate::source::{self, RepositoryDescriptor, SourceError, SourceHost};

pub fn settings() -> ServiceSettings {
    ServiceSettings {
        base_domain: "example.com".to_string(),
        default_type: "node".to_string(),
        supported_types: vec!["node".to_string(), "static".to_string()],
        port_range: (10_000, 60_000),
        port_attempts: 1_000,
    }
}

pub fn descriptor(repository: &str, head: &str) -> RepositoryDescriptor {
    RepositoryDescriptor {
        repository: repository.to_string(),
        branch: head.to_string(),
        clone_url: format!("https://git.test/{}.git", repository),
        url: format!("https://git.test/{}", repository),
        configuration_url: manifest_url(repository, head),
    }
}

fn manifest_url(repository: &str, head: &str) -> String {
    format!("https://raw.test/{}/{}/berth.json", repository, head)
}

/// An orchestrator wired to fakes, with handles to inspect them
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub engine: Arc<FakeEngine>,
    pub proxy: Arc<FakeProxy>,
    pub source: Arc<FakeSource>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(settings())
    }

    pub fn with_port_range(port_range: (u16, u16)) -> Self {
        Self::with_settings(ServiceSettings {
            port_range,
            ..settings()
        })
    }

    pub fn with_settings(settings: ServiceSettings) -> Self {
        let engine = Arc::new(FakeEngine::default());
        let proxy = Arc::new(FakeProxy::default());
        let source = Arc::new(FakeSource::default());

        let orchestrator = Arc::new(Orchestrator::new(
            settings,
            Stores::in_memory(),
            engine.clone(),
            proxy.clone(),
            source.clone(),
        ));

        Self {
            orchestrator,
            engine,
            proxy,
            source,
        }
    }
}

/// Container engine keeping running containers in a set
#[derive(Default)]
pub struct FakeEngine {
    running: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    builds: AtomicUsize,
    fail_builds: AtomicBool,
    fail_runs: AtomicBool,
}

impl FakeEngine {
    pub fn fail_builds(&self, fail: bool) {
        self.fail_builds.store(fail, Ordering::SeqCst);
    }

    pub fn fail_runs(&self, fail: bool) {
        self.fail_runs.store(fail, Ordering::SeqCst);
    }

    /// Makes a container disappear without going through the orchestrator
    pub fn kill(&self, name: &str) {
        self.running.lock().unwrap().remove(name);
    }

    pub fn running(&self) -> HashSet<String> {
        self.running.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str, id: &ServiceIdentity) {
        self.calls.lock().unwrap().push(format!("{} {}", call, id));
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn list_running_containers(&self) -> engine::Result<Vec<String>> {
        Ok(self.running.lock().unwrap().iter().cloned().collect())
    }

    async fn build_image(&self, service: &ServiceConfiguration) -> engine::Result<String> {
        self.record("build", &service.id);
        if self.fail_builds.load(Ordering::SeqCst) {
            return Err(EngineError::BuildFailed {
                repository: service.repository.clone(),
                id: service.id.clone(),
                exit_code: 1,
                stderr: "clone failed".to_string(),
            });
        }
        let n = self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(format!("sha256:image{}", n))
    }

    async fn run_service(&self, service: &ServiceConfiguration) -> engine::Result<()> {
        self.record("run", &service.id);
        if service.image_id.is_none() {
            return Err(EngineError::NotBuilt(service.id.clone()));
        }
        if self.fail_runs.load(Ordering::SeqCst) {
            return Err(EngineError::RunFailed {
                id: service.id.clone(),
                exit_code: 125,
                stderr: "port is already allocated".to_string(),
            });
        }
        self.running
            .lock()
            .unwrap()
            .insert(service.container_name().to_string());
        Ok(())
    }

    async fn stop_service(&self, service: &ServiceConfiguration) -> engine::Result<()> {
        self.record("stop", &service.id);
        self.running.lock().unwrap().remove(service.container_name());
        Ok(())
    }
}

/// Reverse proxy keeping the last written config per service
#[derive(Default)]
pub struct FakeProxy {
    sites: Mutex<HashMap<ServiceIdentity, ServiceConfiguration>>,
    reloads: AtomicUsize,
}

impl FakeProxy {
    pub fn configured(&self, id: &ServiceIdentity) -> Option<ServiceConfiguration> {
        self.sites.lock().unwrap().get(id).cloned()
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReverseProxy for FakeProxy {
    async fn configure(&self, service: &ServiceConfiguration) -> proxy::Result<()> {
        self.sites
            .lock()
            .unwrap()
            .insert(service.id.clone(), service.clone());
        Ok(())
    }

    async fn remove(&self, id: &ServiceIdentity) -> proxy::Result<()> {
        self.sites.lock().unwrap().remove(id);
        Ok(())
    }

    async fn reload(&self) -> proxy::Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Source host that knows every repository unless told otherwise
#[derive(Default)]
pub struct FakeSource {
    manifests: Mutex<HashMap<String, ServiceManifest>>,
    missing: Mutex<HashSet<String>>,
    fail_fetches: AtomicBool,
    lookup_delay_ms: AtomicU64,
}

impl FakeSource {
    pub fn set_manifest(&self, repository: &str, head: &str, manifest: ServiceManifest) {
        self.manifests
            .lock()
            .unwrap()
            .insert(manifest_url(repository, head), manifest);
    }

    pub fn mark_missing(&self, repository: &str) {
        self.missing.lock().unwrap().insert(repository.to_string());
    }

    pub fn fail_fetches(&self) {
        self.fail_fetches.store(true, Ordering::SeqCst);
    }

    /// Makes every existence lookup take `ms` milliseconds
    pub fn slow_lookups(&self, ms: u64) {
        self.lookup_delay_ms.store(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceHost for FakeSource {
    async fn exists(&self, repository: &str) -> source::Result<bool> {
        let delay = self.lookup_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        Ok(!self.missing.lock().unwrap().contains(repository))
    }

    async fn fetch_service_configuration(&self, url: &str) -> source::Result<ServiceManifest> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: 503,
            });
        }
        Ok(self
            .manifests
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_service_from_repository(
        &self,
        repository: &str,
        head: &str,
    ) -> source::Result<RepositoryDescriptor> {
        Ok(descriptor(repository, head))
    }
}
