use modgov_config::ConfigError;
use modgov_runtime::RuntimeError;
use modgov_types::{KernelError, ModuleId};

/// Lowers a collaborator's own error type into the kernel's flat taxonomy
/// (spec §4.12/§7). `KernelError` lives in `modgov-types` so it can be
/// shared by every crate; this trait is what lets `modgov-kernel`
/// contribute `From`-style conversions for foreign error types without
/// running into the orphan rule (neither `KernelError` nor `ConfigError`
/// etc. is local to this crate, but the trait is).
pub trait IntoKernelError {
    fn into_kernel_error(self, module_id: ModuleId) -> KernelError;
}

impl IntoKernelError for ConfigError {
    fn into_kernel_error(self, module_id: ModuleId) -> KernelError {
        KernelError::InstallFailed { module_id, message: self.to_string(), cause: Some(Box::new(self)) }
    }
}

impl IntoKernelError for RuntimeError {
    fn into_kernel_error(self, module_id: ModuleId) -> KernelError {
        match &self {
            RuntimeError::SecurityViolation { message, .. } => {
                KernelError::SecurityViolation { module_id, message: message.clone() }
            }
            _ => KernelError::InstallFailed { module_id, message: self.to_string(), cause: Some(Box::new(self)) },
        }
    }
}
