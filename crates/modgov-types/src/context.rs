use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::capability::AccessType;
use crate::ids::ModuleId;

/// What kind of resource a governed call is reaching for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Service,
    Storage,
    Cache,
    Ipc,
    Other,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceType::Service => "SERVICE",
            ResourceType::Storage => "STORAGE",
            ResourceType::Cache => "CACHE",
            ResourceType::Ipc => "IPC",
            ResourceType::Other => "OTHER",
        };
        write!(f, "{}", s)
    }
}

/// Immutable record passed through the kernel for every governed call
/// (spec §3, `InvocationContext`).
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub trace_id: Option<String>,
    pub caller_module_id: ModuleId,
    pub target_module_id: ModuleId,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub access_type: Option<AccessType>,
    pub required_capability: Option<String>,
    pub should_audit: bool,
    pub audit_action: Option<String>,
    pub labels: HashMap<String, String>,
    pub deadline: Option<Instant>,
}

impl InvocationContext {
    pub fn new(
        caller_module_id: impl Into<ModuleId>,
        target_module_id: impl Into<ModuleId>,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
    ) -> Self {
        InvocationContext {
            trace_id: None,
            caller_module_id: caller_module_id.into(),
            target_module_id: target_module_id.into(),
            resource_type,
            resource_id: resource_id.into(),
            access_type: None,
            required_capability: None,
            should_audit: false,
            audit_action: None,
            labels: HashMap::new(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>, access: AccessType) -> Self {
        self.required_capability = Some(capability.into());
        self.access_type = Some(access);
        self
    }

    pub fn force_audit(mut self, action: impl Into<String>) -> Self {
        self.should_audit = true;
        self.audit_action = Some(action.into());
        self
    }

    /// The effective deadline given an additional default timeout, per
    /// InvocationExecutor step 4: `min(ctx.deadline, now + default_timeout)`.
    pub fn effective_deadline(&self, default_timeout: Duration) -> Instant {
        let default_deadline = Instant::now() + default_timeout;
        match self.deadline {
            Some(d) => d.min(default_deadline),
            None => default_deadline,
        }
    }
}
