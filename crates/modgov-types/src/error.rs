use thiserror::Error;

use crate::ids::ModuleId;

/// The flat error taxonomy from spec §4.12 / §7. Each variant carries the
/// offending module id, a capability or fqsid where meaningful, and an
/// optional underlying cause — the deep exception hierarchies of the
/// source collapse to this.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("invalid input for module '{module_id}': {message}")]
    InvalidInput { module_id: ModuleId, message: String },

    #[error("permission denied: module '{module_id}' lacks '{capability}'")]
    PermissionDenied { module_id: ModuleId, capability: String },

    #[error("module '{module_id}' unavailable: {message}")]
    Unavailable { module_id: ModuleId, message: String },

    #[error("module '{module_id}' busy: {message}")]
    Busy { module_id: ModuleId, message: String },

    #[error("module '{module_id}' already has an instance at version '{version}' with these labels")]
    DuplicateInstance { module_id: ModuleId, version: String },

    #[error("call to '{module_id}' rejected: {message}")]
    Rejected { module_id: ModuleId, message: String },

    #[error("call to '{module_id}' timed out")]
    Timeout { module_id: ModuleId },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("install of '{module_id}' failed: {message}")]
    InstallFailed {
        module_id: ModuleId,
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("security violation for '{module_id}': {message}")]
    SecurityViolation { module_id: ModuleId, message: String },

    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl KernelError {
    pub fn module_id(&self) -> Option<&ModuleId> {
        match self {
            KernelError::InvalidInput { module_id, .. }
            | KernelError::PermissionDenied { module_id, .. }
            | KernelError::Unavailable { module_id, .. }
            | KernelError::Busy { module_id, .. }
            | KernelError::DuplicateInstance { module_id, .. }
            | KernelError::Rejected { module_id, .. }
            | KernelError::Timeout { module_id }
            | KernelError::InstallFailed { module_id, .. }
            | KernelError::SecurityViolation { module_id, .. } => Some(module_id),
            KernelError::NotFound { .. } | KernelError::Internal { .. } => None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        KernelError::Internal { message: message.into(), cause: None }
    }
}
