use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use modgov_types::ModuleId;
use tracing::debug;

use crate::container::{Bean, Container, ContainerFactory, ContainerStartContext, LoaderHandle, ModuleLoaderFactory, ModuleSource};
use crate::error::RuntimeError;
use crate::resource_guard::ResourceGuard;
use crate::security::SecurityVerifier;
use crate::thread_local::ThreadLocalPropagator;

/// In-process `Container`: holds whatever beans the source provided and
/// never isolates code — single process, one loader token per instance.
/// Sufficient to exercise every kernel invariant without a real module
/// loader (spec §9: "ClassLoader-style isolation is an external concern").
pub struct LocalContainer {
    beans: HashMap<String, Bean>,
    active: AtomicBool,
    loader: LoaderHandle,
}

#[async_trait]
impl Container for LocalContainer {
    async fn start(&self, ctx: &ContainerStartContext) -> Result<(), RuntimeError> {
        debug!(module_id = %ctx.module_id, version = %ctx.version, "LocalContainer: start");
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop(&self) -> Result<(), RuntimeError> {
        debug!(loader_id = self.loader.id(), "LocalContainer: stop");
        self.active.store(false, Ordering::Release);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn get_bean(&self, name: &str) -> Option<Bean> {
        self.beans.get(name).cloned()
    }

    fn bean_names(&self) -> Vec<String> {
        self.beans.keys().cloned().collect()
    }

    fn class_loader_handle(&self) -> LoaderHandle {
        self.loader.clone()
    }
}

/// Builds [`LocalContainer`]s. Only understands `ModuleSource::Beans`;
/// `Directory` sources start with no beans registered (a real loader
/// would populate them by inspecting the directory).
#[derive(Debug, Default)]
pub struct LocalContainerFactory;

#[async_trait]
impl ContainerFactory for LocalContainerFactory {
    async fn create(
        &self,
        module_id: &ModuleId,
        source: &ModuleSource,
        code_loader: &LoaderHandle,
    ) -> Result<Box<dyn Container>, RuntimeError> {
        debug!(module_id = %module_id, "LocalContainerFactory: create");
        let beans = match source {
            ModuleSource::Beans(beans) => beans.clone(),
            ModuleSource::Directory(_) => HashMap::new(),
        };
        Ok(Box::new(LocalContainer {
            beans,
            active: AtomicBool::new(false),
            loader: code_loader.clone(),
        }))
    }
}

/// Mints a fresh [`LoaderHandle`] per call. Never shares state across
/// modules — the local runtime has no real isolation to share.
#[derive(Debug, Default)]
pub struct LocalModuleLoaderFactory {
    counter: AtomicU64,
}

#[async_trait]
impl ModuleLoaderFactory for LocalModuleLoaderFactory {
    async fn create(
        &self,
        module_id: &ModuleId,
        _source: &ModuleSource,
        _parent: Option<&LoaderHandle>,
    ) -> Result<LoaderHandle, RuntimeError> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let handle = LoaderHandle::new(format!("{}#{}", module_id, seq));
        debug!(module_id = %module_id, loader_id = handle.id(), "LocalModuleLoaderFactory: create");
        Ok(handle)
    }
}

/// Accepts everything. Real verification (signature checks, static
/// analysis) is an external concern; local installs are trusted by
/// construction (spec §9).
#[derive(Debug, Default, Clone)]
pub struct LocalSecurityVerifier;

#[async_trait]
impl SecurityVerifier for LocalSecurityVerifier {
    async fn verify(&self, module_id: &ModuleId, _source: &ModuleSource) -> Result<(), RuntimeError> {
        debug!(module_id = %module_id, "LocalSecurityVerifier: verify (no-op)");
        Ok(())
    }
}

/// No external resource to release; the loader token is reclaimed by Rust's
/// own allocator once the last `LoaderHandle` clone is dropped.
#[derive(Debug, Default, Clone)]
pub struct LocalResourceGuard;

#[async_trait]
impl ResourceGuard for LocalResourceGuard {
    async fn cleanup(&self, module_id: &ModuleId, handle: &LoaderHandle) -> Result<(), RuntimeError> {
        debug!(module_id = %module_id, loader_id = handle.id(), "LocalResourceGuard: cleanup");
        Ok(())
    }
}

/// No thread-local state to propagate in the local runtime; snapshot is a
/// unit value.
#[derive(Debug, Default, Clone)]
pub struct NoopThreadLocalPropagator;

impl ThreadLocalPropagator for NoopThreadLocalPropagator {
    fn capture(&self) -> Box<dyn Any + Send> {
        Box::new(())
    }

    fn restore(&self, _snapshot: Box<dyn Any + Send>) {}
}

/// Bundles the five collaborator traits the core demands (spec §6) with
/// in-process implementations, so the kernel is runnable standalone
/// without an external module loader or container host.
#[derive(Clone)]
pub struct LocalRuntime {
    pub container_factory: Arc<LocalContainerFactory>,
    pub loader_factory: Arc<LocalModuleLoaderFactory>,
    pub security_verifier: Arc<LocalSecurityVerifier>,
    pub resource_guard: Arc<LocalResourceGuard>,
    pub thread_local_propagator: Arc<NoopThreadLocalPropagator>,
}

impl Default for LocalRuntime {
    fn default() -> Self {
        LocalRuntime {
            container_factory: Arc::new(LocalContainerFactory),
            loader_factory: Arc::new(LocalModuleLoaderFactory::default()),
            security_verifier: Arc::new(LocalSecurityVerifier),
            resource_guard: Arc::new(LocalResourceGuard),
            thread_local_propagator: Arc::new(NoopThreadLocalPropagator),
        }
    }
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}
