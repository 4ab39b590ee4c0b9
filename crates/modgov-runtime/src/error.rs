use modgov_types::ModuleId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("module '{module_id}' failed security verification: {message}")]
    SecurityViolation { module_id: ModuleId, message: String },

    #[error("module '{module_id}' code loader could not be created: {message}")]
    LoadFailed { module_id: ModuleId, message: String },

    #[error("module '{module_id}' container failed to start: {message}")]
    StartFailed { module_id: ModuleId, message: String },

    #[error("module '{module_id}' container failed to stop cleanly: {message}")]
    StopFailed { module_id: ModuleId, message: String },

    #[error("module '{module_id}' has no bean named '{name}'")]
    BeanNotFound { module_id: ModuleId, name: String },

    #[error("module '{module_id}' invocation failed: {message}")]
    InvocationFailed { module_id: ModuleId, message: String },
}

impl RuntimeError {
    pub fn module_id(&self) -> &ModuleId {
        match self {
            RuntimeError::SecurityViolation { module_id, .. }
            | RuntimeError::LoadFailed { module_id, .. }
            | RuntimeError::StartFailed { module_id, .. }
            | RuntimeError::StopFailed { module_id, .. }
            | RuntimeError::BeanNotFound { module_id, .. }
            | RuntimeError::InvocationFailed { module_id, .. } => module_id,
        }
    }
}
