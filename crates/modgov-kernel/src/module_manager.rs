use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modgov_runtime::{
    Container, ContainerFactory, ContainerStartContext, LocalRuntime, ModuleLoaderFactory, ModuleSource,
    ResourceGuard, SecurityVerifier,
};
use modgov_store::PermissionStore;
use modgov_types::{AccessType, Fqsid, InvocationContext, KernelError, ModuleId, ModuleManifest, ResourceType};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::IntoKernelError;
use crate::events::{EventBus, KernelEvent};
use crate::governance_kernel::GovernanceKernel;
use crate::instance::Instance;
use crate::invocation_executor::Bulkhead;
use crate::lifecycle_manager::LifecycleManager;
use crate::service_registry::{ServiceEntry, ServiceRegistry};
use crate::traffic_router::CanaryConfig;

/// Tunables that would otherwise be threaded through every `install` call
/// (spec §6 `runtime.*`); one struct mirrors `modgov_config::RuntimeSettings`
/// so a `ModuleManager` can be built straight from parsed configuration.
#[derive(Debug, Clone)]
pub struct RuntimeTunables {
    pub max_history_snapshots: usize,
    pub force_cleanup_delay: Duration,
    pub dying_check_interval: Duration,
    pub default_timeout: Duration,
    pub bulkhead_max_concurrent: usize,
    pub bulkhead_acquire_timeout: Duration,
    pub global_max_threads: usize,
    pub max_threads_per_module: usize,
    pub default_threads_per_module: usize,
}

impl Default for RuntimeTunables {
    fn default() -> Self {
        RuntimeTunables {
            max_history_snapshots: 3,
            force_cleanup_delay: Duration::from_secs(30),
            dying_check_interval: Duration::from_secs(5),
            default_timeout: Duration::from_millis(5000),
            bulkhead_max_concurrent: 32,
            bulkhead_acquire_timeout: Duration::from_millis(1000),
            global_max_threads: 256,
            max_threads_per_module: 16,
            default_threads_per_module: 4,
        }
    }
}

struct ModuleEntry {
    lifecycle: Arc<LifecycleManager>,
    bulkhead: Arc<Bulkhead>,
    source: ModuleSource,
    manifest: ModuleManifest,
    canary: Option<CanaryConfig>,
}

#[derive(Default)]
struct Registry {
    modules: HashMap<ModuleId, ModuleEntry>,
    allocations: HashMap<ModuleId, usize>,
}

/// Global owner of every installed module's [`LifecycleManager`] plus the
/// process-wide FQSID table (spec §4.11). One instance per process.
pub struct ModuleManager {
    registry: RwLock<Registry>,
    fqsids: Arc<ServiceRegistry>,
    permissions: Arc<dyn PermissionStore>,
    events: Arc<EventBus>,
    kernel: Arc<GovernanceKernel>,
    container_factory: Arc<dyn ContainerFactory>,
    loader_factory: Arc<dyn ModuleLoaderFactory>,
    security_verifiers: Vec<Arc<dyn SecurityVerifier>>,
    resource_guard: Arc<dyn ResourceGuard>,
    tunables: RuntimeTunables,
    remaining_threads: AtomicUsize,
    shut_down: std::sync::atomic::AtomicBool,
}

impl ModuleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        permissions: Arc<dyn PermissionStore>,
        events: Arc<EventBus>,
        audit: Arc<modgov_store::AuditSink>,
        container_factory: Arc<dyn ContainerFactory>,
        loader_factory: Arc<dyn ModuleLoaderFactory>,
        security_verifiers: Vec<Arc<dyn SecurityVerifier>>,
        resource_guard: Arc<dyn ResourceGuard>,
        tunables: RuntimeTunables,
    ) -> Self {
        let kernel = Arc::new(GovernanceKernel::new(permissions.clone(), audit, events.clone()));
        ModuleManager {
            registry: RwLock::new(Registry::default()),
            fqsids: Arc::new(ServiceRegistry::new()),
            permissions,
            events,
            kernel,
            container_factory,
            loader_factory,
            security_verifiers,
            resource_guard,
            remaining_threads: AtomicUsize::new(tunables.global_max_threads),
            tunables,
            shut_down: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Wires a `ModuleManager` entirely over the in-process [`LocalRuntime`]
    /// and an in-memory permission store (used by `modgov-cli` and tests).
    pub fn local(permissions: Arc<dyn PermissionStore>, tunables: RuntimeTunables) -> Self {
        let local = LocalRuntime::new();
        let events = Arc::new(EventBus::new());
        let audit = Arc::new(modgov_store::AuditSink::new(1024, Arc::new(modgov_store::StdoutAuditWriter)));
        ModuleManager::new(
            permissions,
            events,
            audit,
            local.container_factory.clone(),
            local.loader_factory.clone(),
            vec![local.security_verifier.clone()],
            local.resource_guard.clone(),
            tunables,
        )
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Threads not currently allocated to any module. `remaining_threads()
    /// + sum(allocations)` must always equal `global_max_threads` (spec §8
    /// invariant 6).
    pub fn remaining_threads(&self) -> usize {
        self.remaining_threads.load(Ordering::Acquire)
    }

    pub fn kernel(&self) -> &Arc<GovernanceKernel> {
        &self.kernel
    }

    /// `min(defaultThreadsPerModule, maxThreadsPerModule, remaining)`,
    /// minimum 1, deducted via CAS (spec §4.11 "Thread budget").
    fn allocate_threads(&self) -> usize {
        loop {
            let remaining = self.remaining_threads.load(Ordering::Acquire);
            let wanted = self
                .tunables
                .default_threads_per_module
                .min(self.tunables.max_threads_per_module)
                .min(remaining)
                .max(1);
            let next = remaining.saturating_sub(wanted);
            if self
                .remaining_threads
                .compare_exchange_weak(remaining, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return wanted;
            }
        }
    }

    fn release_threads(&self, amount: usize) {
        self.remaining_threads.fetch_add(amount, Ordering::AcqRel);
    }

    async fn install_internal(
        &self,
        manifest: ModuleManifest,
        source: ModuleSource,
        is_default: bool,
        labels: HashMap<String, String>,
    ) -> Result<(), KernelError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(KernelError::InvalidInput {
                module_id: manifest.id.clone(),
                message: "module manager is shut down".into(),
            });
        }

        let module_id = manifest.id.clone();
        self.events.publish(KernelEvent::ModuleInstalling { module_id: module_id.clone() });

        for verifier in &self.security_verifiers {
            verifier
                .verify(&module_id, &source)
                .await
                .map_err(|e| e.into_kernel_error(module_id.clone()))?;
        }

        let loader = self
            .loader_factory
            .create(&module_id, &source, None)
            .await
            .map_err(|e| e.into_kernel_error(module_id.clone()))?;
        let container: Arc<dyn Container> = self
            .container_factory
            .create(&module_id, &source, &loader)
            .await
            .map_err(|e| e.into_kernel_error(module_id.clone()))?
            .into();

        let instance = Arc::new(Instance::new(module_id.clone(), manifest.version.clone(), labels, container));
        let ctx = ContainerStartContext { module_id: module_id.clone(), version: manifest.version.clone() };

        let threads = self.allocate_threads();
        let lifecycle = {
            let mut guard = self.registry.write().await;
            // Accumulate rather than overwrite: canary/reload installs onto
            // an already-installed moduleId each deduct their own share, and
            // `uninstall` must return the full sum or the global budget leaks.
            *guard.allocations.entry(module_id.clone()).or_insert(0) += threads;
            let entry = guard.modules.entry(module_id.clone()).or_insert_with(|| ModuleEntry {
                lifecycle: LifecycleManager::new(
                    module_id.clone(),
                    self.tunables.max_history_snapshots,
                    self.events.clone(),
                    self.resource_guard.clone(),
                    self.tunables.dying_check_interval,
                    self.tunables.force_cleanup_delay,
                ),
                bulkhead: Arc::new(Bulkhead::new(
                    self.tunables.bulkhead_max_concurrent,
                    self.tunables.bulkhead_acquire_timeout,
                )),
                source: source.clone(),
                manifest: manifest.clone(),
                canary: None,
            });
            entry.manifest = manifest.clone();
            entry.source = source.clone();
            entry.lifecycle.clone()
        };

        if let Err(e) = lifecycle.add_instance(instance, &ctx, is_default).await {
            self.release_threads(threads);
            return Err(e);
        }

        for cap in &manifest.capabilities {
            self.permissions.grant(module_id.clone(), cap.capability.clone(), cap.access_type).await;
        }
        self.fqsids
            .register(ServiceEntry {
                fqsid: Fqsid::new(module_id.clone(), "self"),
                module_id: module_id.clone(),
                bean_name: None,
                method_name: None,
            })
            .await;

        self.events.publish(KernelEvent::ModuleInstalled { module_id: module_id.clone() });
        info!(module_id = %module_id, version = %manifest.version, "module installed");
        Ok(())
    }

    pub async fn install(&self, manifest: ModuleManifest, source: ModuleSource) -> Result<(), KernelError> {
        self.install_internal(manifest, source, true, HashMap::new()).await
    }

    /// Convenience path that loads the manifest from a directory's
    /// `manifest.yml` before delegating to `install` (spec §4.11
    /// `installDev`).
    pub async fn install_dev(&self, dir: std::path::PathBuf) -> Result<(), KernelError> {
        let manifest_path = dir.join("manifest.yml");
        let manifest = modgov_config::load_manifest(&manifest_path)
            .map_err(|e| e.into_kernel_error(ModuleId::new(dir.display().to_string())))?;
        self.install_internal(manifest, ModuleSource::Directory(dir), true, HashMap::new()).await
    }

    pub async fn deploy_canary(
        &self,
        manifest: ModuleManifest,
        source: ModuleSource,
        labels: HashMap<String, String>,
        percent: u8,
    ) -> Result<(), KernelError> {
        let module_id = manifest.id.clone();
        let version = manifest.version.clone();
        self.install_internal(manifest, source, false, labels).await?;
        let mut guard = self.registry.write().await;
        if let Some(entry) = guard.modules.get_mut(&module_id) {
            entry.canary = Some(CanaryConfig { percent, canary_version: version });
        }
        Ok(())
    }

    /// Re-installs a module from its stored source under a generated
    /// version, preserving the previous default instance's labels
    /// (spec §4.11 `reload`).
    pub async fn reload(&self, module_id: &ModuleId) -> Result<(), KernelError> {
        let (mut manifest, source, labels) = {
            let guard = self.registry.read().await;
            let entry = guard
                .modules
                .get(module_id)
                .ok_or_else(|| KernelError::NotFound { what: format!("module '{}'", module_id) })?;
            let labels = entry
                .lifecycle
                .pool()
                .default()
                .await
                .map(|inst| inst.labels.clone())
                .unwrap_or_default();
            (entry.manifest.clone(), entry.source.clone(), labels)
        };
        manifest.version = format!("{}-reload-{}", manifest.version, reload_suffix(module_id));
        self.install_internal(manifest, source, true, labels).await
    }

    /// Failure-isolated: errors in any one step are logged and do not stop
    /// the remaining cleanup steps (spec §7, §4.11 `uninstall`).
    pub async fn uninstall(&self, module_id: &ModuleId) -> Result<(), KernelError> {
        self.events.publish(KernelEvent::ModuleUninstalling { module_id: module_id.clone() });

        let entry = {
            let mut guard = self.registry.write().await;
            guard.modules.remove(module_id)
        };
        let Some(entry) = entry else {
            return Err(KernelError::NotFound { what: format!("module '{}'", module_id) });
        };

        entry.lifecycle.shutdown().await;

        let threads = {
            let mut guard = self.registry.write().await;
            guard.allocations.remove(module_id)
        };
        if let Some(threads) = threads {
            self.release_threads(threads);
        }

        self.permissions.remove_module(module_id).await;
        self.fqsids.unregister_module(module_id).await;
        self.events.unsubscribe_all(module_id).await;

        self.events.publish(KernelEvent::ModuleUninstalled { module_id: module_id.clone() });
        info!(module_id = %module_id, "module uninstalled");
        Ok(())
    }

    /// Routes a call through the governance kernel to the live default (or
    /// canary-selected) instance of the fqsid's owning module
    /// (spec §4.11 `invokeService`).
    pub async fn invoke_service<F, Fut, T>(
        &self,
        caller_id: ModuleId,
        fqsid: &Fqsid,
        call: F,
    ) -> Option<Result<T, KernelError>>
    where
        F: FnOnce(Arc<Instance>) -> Fut,
        Fut: std::future::Future<Output = Result<T, KernelError>>,
    {
        let entry = self.fqsids.lookup(fqsid).await?;
        let (pool, bulkhead, canary) = {
            let guard = self.registry.read().await;
            let module = guard.modules.get(&entry.module_id)?;
            (module.lifecycle.pool().clone(), module.bulkhead.clone(), module.canary.clone())
        };

        let ctx = InvocationContext::new(caller_id, entry.module_id.clone(), ResourceType::Service, fqsid.to_string())
            .with_capability(fqsid.to_string(), AccessType::Execute);

        Some(
            self.kernel
                .invoke(ctx, &pool, &bulkhead, canary.as_ref(), self.tunables.default_timeout, call)
                .await,
        )
    }

    pub async fn module_ids(&self) -> Vec<ModuleId> {
        self.registry.read().await.modules.keys().cloned().collect()
    }

    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let ids: Vec<ModuleId> = self.module_ids().await;
        for id in ids {
            if let Err(e) = self.uninstall(&id).await {
                warn!(module_id = %id, error = %e, "uninstall during shutdown failed, continuing");
            }
        }
        self.events.shutdown().await;
    }
}

fn reload_suffix(module_id: &ModuleId) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let mut hasher = DefaultHasher::new();
    module_id.hash(&mut hasher);
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgov_store::InMemoryPermissionStore;

    fn manifest(id: &str) -> ModuleManifest {
        ModuleManifest::new(id, "1.0.0")
    }

    fn manager() -> ModuleManager {
        ModuleManager::local(Arc::new(InMemoryPermissionStore::new(true, true)), RuntimeTunables::default())
    }

    #[tokio::test]
    async fn install_then_invoke_service_succeeds() {
        let mgr = manager();
        mgr.install(manifest("user"), ModuleSource::Beans(HashMap::new())).await.unwrap();

        let fqsid = Fqsid::new(ModuleId::new("user"), "self");
        let result = mgr
            .invoke_service(ModuleId::new("caller"), &fqsid, |_inst| async { Ok::<_, KernelError>(7) })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn invoke_service_on_unknown_fqsid_returns_none() {
        let mgr = manager();
        let fqsid = Fqsid::new(ModuleId::new("nobody"), "find");
        assert!(mgr.invoke_service(ModuleId::new("caller"), &fqsid, |_| async { Ok::<_, KernelError>(()) }).await.is_none());
    }

    #[tokio::test]
    async fn uninstall_purges_fqsids_and_invoke_service_returns_none_afterward() {
        let mgr = manager();
        mgr.install(manifest("user"), ModuleSource::Beans(HashMap::new())).await.unwrap();
        mgr.uninstall(&ModuleId::new("user")).await.unwrap();

        let fqsid = Fqsid::new(ModuleId::new("user"), "self");
        assert!(mgr.invoke_service(ModuleId::new("caller"), &fqsid, |_| async { Ok::<_, KernelError>(()) }).await.is_none());
    }

    #[tokio::test]
    async fn install_grants_declared_capabilities() {
        let mgr = manager();
        let mut m = manifest("billing");
        m.capabilities.push(modgov_types::DeclaredCapability {
            capability: "storage:sql".into(),
            access_type: AccessType::Write,
        });
        mgr.install(m, ModuleSource::Beans(HashMap::new())).await.unwrap();

        assert_eq!(
            mgr.permissions.get_permission(&ModuleId::new("billing"), "storage:sql").await,
            Some(AccessType::Write)
        );
    }

    #[tokio::test]
    async fn thread_budget_is_reclaimed_on_uninstall() {
        let mgr = manager();
        let before = mgr.remaining_threads.load(Ordering::Acquire);
        mgr.install(manifest("a"), ModuleSource::Beans(HashMap::new())).await.unwrap();
        assert!(mgr.remaining_threads.load(Ordering::Acquire) < before);

        mgr.uninstall(&ModuleId::new("a")).await.unwrap();
        assert_eq!(mgr.remaining_threads.load(Ordering::Acquire), before);
    }

    #[tokio::test]
    async fn failure_isolation_uninstall_of_missing_module_does_not_affect_others() {
        let mgr = manager();
        mgr.install(manifest("a"), ModuleSource::Beans(HashMap::new())).await.unwrap();
        assert!(mgr.uninstall(&ModuleId::new("ghost")).await.is_err());

        let fqsid = Fqsid::new(ModuleId::new("a"), "self");
        assert!(mgr.invoke_service(ModuleId::new("caller"), &fqsid, |_| async { Ok::<_, KernelError>(()) }).await.is_some());
    }

    #[tokio::test]
    async fn deploy_canary_does_not_become_default() {
        let mgr = manager();
        mgr.install(manifest("user"), ModuleSource::Beans(HashMap::new())).await.unwrap();
        let mut canary_manifest = manifest("user");
        canary_manifest.version = "2.0.0".into();
        mgr.deploy_canary(canary_manifest, ModuleSource::Beans(HashMap::new()), HashMap::new(), 50)
            .await
            .unwrap();

        let guard = mgr.registry.read().await;
        let entry = guard.modules.get(&ModuleId::new("user")).unwrap();
        assert!(entry.canary.is_some());
        drop(guard);

        let default = mgr
            .registry
            .read()
            .await
            .modules
            .get(&ModuleId::new("user"))
            .unwrap()
            .lifecycle
            .pool()
            .default()
            .await
            .unwrap();
        assert_eq!(default.version, "1.0.0");
    }
}
