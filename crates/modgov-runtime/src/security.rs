use async_trait::async_trait;
use modgov_types::ModuleId;

use crate::container::ModuleSource;
use crate::error::RuntimeError;

/// Runs before a module's code-loader is created. A failed verification
/// surfaces as `RuntimeError::SecurityViolation`, which `ModuleManager`
/// maps to the kernel's SECURITY_VIOLATION kind (spec §6, §4.12).
#[async_trait]
pub trait SecurityVerifier: Send + Sync + 'static {
    async fn verify(&self, module_id: &ModuleId, source: &ModuleSource) -> Result<(), RuntimeError>;
}
