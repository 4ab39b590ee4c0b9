use std::collections::HashMap;

use modgov_types::{Fqsid, ModuleId};
use tokio::sync::RwLock;
use tracing::warn;

/// `(fqsid, moduleId, bean handle, method handle)` (spec §3). The bean and
/// method names are opaque labels here — the kernel never dispatches by
/// reflection (spec §9); actual invocation is a thunk supplied by the
/// caller of `GovernanceKernel::invoke`.
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub fqsid: Fqsid,
    pub module_id: ModuleId,
    pub bean_name: Option<String>,
    pub method_name: Option<String>,
}

#[derive(Default)]
struct Inner {
    fqsids: HashMap<Fqsid, ServiceEntry>,
    /// Modules that have declared an interface, in registration order.
    interface_providers: HashMap<String, Vec<ModuleId>>,
    /// Resolved-interface cache, lazily populated by `resolve_interface`.
    interface_cache: HashMap<String, ModuleId>,
}

/// FQSID → service table and interface → module cache (spec §4.6).
/// Populated by `ModuleManager` on instance startup, cleared on teardown.
#[derive(Default)]
pub struct ServiceRegistry {
    inner: RwLock<Inner>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-registering an existing fqsid under a different owner logs a
    /// warning and overwrites — this is what makes hot upgrade able to
    /// atomically replace the mapping.
    pub async fn register(&self, entry: ServiceEntry) {
        let mut guard = self.inner.write().await;
        if let Some(existing) = guard.fqsids.get(&entry.fqsid) {
            if existing.module_id != entry.module_id {
                warn!(
                    fqsid = %entry.fqsid,
                    previous_owner = %existing.module_id,
                    new_owner = %entry.module_id,
                    "fqsid re-registered under a different module"
                );
            }
        }
        guard.fqsids.insert(entry.fqsid.clone(), entry);
    }

    pub async fn unregister(&self, fqsid: &Fqsid) {
        self.inner.write().await.fqsids.remove(fqsid);
    }

    /// Purges every fqsid entry owned by `module_id` and its interface
    /// registrations, invalidating any cached resolutions that named it.
    pub async fn unregister_module(&self, module_id: &ModuleId) {
        let mut guard = self.inner.write().await;
        guard.fqsids.retain(|_, entry| &entry.module_id != module_id);
        for providers in guard.interface_providers.values_mut() {
            providers.retain(|m| m != module_id);
        }
        guard.interface_cache.retain(|_, m| m != module_id);
    }

    pub async fn lookup(&self, fqsid: &Fqsid) -> Option<ServiceEntry> {
        self.inner.read().await.fqsids.get(fqsid).cloned()
    }

    pub async fn register_interface_provider(&self, iface: impl Into<String>, module_id: ModuleId) {
        let mut guard = self.inner.write().await;
        let providers = guard.interface_providers.entry(iface.into()).or_default();
        if !providers.contains(&module_id) {
            providers.push(module_id);
        }
    }

    /// Deterministic (lexicographic over module ids) when more than one
    /// module declares the same interface; warns on first resolution.
    pub async fn resolve_interface(&self, iface: &str) -> Option<ModuleId> {
        {
            let guard = self.inner.read().await;
            if let Some(cached) = guard.interface_cache.get(iface) {
                return Some(cached.clone());
            }
        }

        let mut guard = self.inner.write().await;
        if let Some(cached) = guard.interface_cache.get(iface) {
            return Some(cached.clone());
        }
        let providers = guard.interface_providers.get(iface)?.clone();
        let mut sorted = providers;
        sorted.sort();
        let chosen = sorted.first()?.clone();
        if sorted.len() > 1 {
            warn!(
                interface = iface,
                chosen = %chosen,
                candidates = ?sorted,
                "multiple modules provide the same interface, resolved deterministically"
            );
        }
        guard.interface_cache.insert(iface.to_string(), chosen.clone());
        Some(chosen)
    }
}
