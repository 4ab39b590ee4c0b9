use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use modgov_types::{AccessType, ModuleId};
use tokio::sync::RwLock;
use tracing::warn;

/// Capabilities under this prefix are always allowed — they name framework
/// contracts rather than governed resources (spec §4.2: "whitelist
/// short-circuits capabilities starting with the framework contract prefix").
pub const FRAMEWORK_CAPABILITY_PREFIX: &str = "modgov:";

/// The module id the host application uses to issue calls. When
/// `host_governance_enabled` is false, this id bypasses permission checks
/// entirely (spec §4.2).
pub const HOST_MODULE_ID: &str = "__host__";

/// Result of a permission check, distinguishing a real grant from a
/// dev-mode bypass so callers (the governance kernel) can flag audit
/// records accordingly (spec §4.9 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionCheck {
    pub allowed: bool,
    pub dev_bypass: bool,
}

impl PermissionCheck {
    fn allowed() -> Self {
        PermissionCheck { allowed: true, dev_bypass: false }
    }

    fn dev_bypass() -> Self {
        PermissionCheck { allowed: true, dev_bypass: true }
    }

    fn denied() -> Self {
        PermissionCheck { allowed: false, dev_bypass: false }
    }
}

/// Holds `moduleId -> capability -> AccessType` (spec §4.2).
#[async_trait]
pub trait PermissionStore: Send + Sync + 'static {
    /// Full verdict, including whether the allow came from dev-mode bypass.
    async fn check(&self, module_id: &ModuleId, capability: &str, required: AccessType) -> PermissionCheck;

    async fn grant(&self, module_id: ModuleId, capability: String, access: AccessType);

    async fn revoke(&self, module_id: &ModuleId, capability: &str);

    async fn get_permission(&self, module_id: &ModuleId, capability: &str) -> Option<AccessType>;

    /// Idempotent. Must be called during uninstall before the module's
    /// code-loader handle is released so later inference never resolves
    /// stale grants (spec §4.2 invariant).
    async fn remove_module(&self, module_id: &ModuleId);

    /// Convenience wrapper over `check` for callers that only need the bool.
    async fn is_allowed(&self, module_id: &ModuleId, capability: &str, required: AccessType) -> bool {
        self.check(module_id, capability, required).await.allowed
    }
}

#[derive(Debug, Default)]
struct Inner {
    grants: HashMap<ModuleId, HashMap<String, AccessType>>,
}

/// In-memory [`PermissionStore`]. All grants are lost on process exit —
/// persistent permission storage is out of scope (spec §1 Non-goals).
#[derive(Debug, Clone)]
pub struct InMemoryPermissionStore {
    inner: Arc<RwLock<Inner>>,
    dev_mode: bool,
    host_governance_enabled: bool,
}

impl InMemoryPermissionStore {
    pub fn new(dev_mode: bool, host_governance_enabled: bool) -> Self {
        InMemoryPermissionStore {
            inner: Arc::new(RwLock::new(Inner::default())),
            dev_mode,
            host_governance_enabled,
        }
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn check(&self, module_id: &ModuleId, capability: &str, required: AccessType) -> PermissionCheck {
        if capability.starts_with(FRAMEWORK_CAPABILITY_PREFIX) {
            return PermissionCheck::allowed();
        }
        if !self.host_governance_enabled && module_id.as_str() == HOST_MODULE_ID {
            return PermissionCheck::allowed();
        }

        let granted = {
            let guard = self.inner.read().await;
            guard.grants.get(module_id).and_then(|caps| caps.get(capability)).copied()
        };

        match granted {
            Some(access) if access.satisfies(required) => PermissionCheck::allowed(),
            _ if self.dev_mode => {
                warn!(
                    module_id = %module_id,
                    capability = %capability,
                    required = %required,
                    "dev-mode permission bypass: missing declaration {}:{}",
                    capability,
                    required,
                );
                PermissionCheck::dev_bypass()
            }
            _ => PermissionCheck::denied(),
        }
    }

    async fn grant(&self, module_id: ModuleId, capability: String, access: AccessType) {
        let mut guard = self.inner.write().await;
        guard.grants.entry(module_id).or_default().insert(capability, access);
    }

    async fn revoke(&self, module_id: &ModuleId, capability: &str) {
        let mut guard = self.inner.write().await;
        if let Some(caps) = guard.grants.get_mut(module_id) {
            caps.remove(capability);
        }
    }

    async fn get_permission(&self, module_id: &ModuleId, capability: &str) -> Option<AccessType> {
        let guard = self.inner.read().await;
        guard.grants.get(module_id).and_then(|caps| caps.get(capability)).copied()
    }

    async fn remove_module(&self, module_id: &ModuleId) {
        let mut guard = self.inner.write().await;
        guard.grants.remove(module_id);
    }
}
