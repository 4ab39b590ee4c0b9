use std::sync::Weak;

use async_trait::async_trait;
use modgov_types::ModuleId;

use crate::container::LoaderHandle;
use crate::error::RuntimeError;

/// Releases and, after a delay, verifies the release of a module's
/// code-loader resource (spec §6 `ResourceGuard.cleanup`/`detectLeak`,
/// §4.10 `destroyInstance`).
#[async_trait]
pub trait ResourceGuard: Send + Sync + 'static {
    async fn cleanup(&self, module_id: &ModuleId, handle: &LoaderHandle) -> Result<(), RuntimeError>;

    /// `true` if `snapshot` (taken before `cleanup`) still upgrades, i.e.
    /// something other than the guard itself is still holding the handle.
    fn detect_leak(&self, snapshot: &Weak<()>) -> bool {
        snapshot.upgrade().is_some()
    }
}
