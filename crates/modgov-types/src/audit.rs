use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ModuleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditOutcome {
    Allowed,
    Denied,
    Error,
}

/// One entry in the audit trail (spec §3, `AuditRecord`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub trace_id: Option<String>,
    pub caller_module_id: ModuleId,
    pub target_module_id: ModuleId,
    pub capability: Option<String>,
    pub operation: String,
    pub outcome: AuditOutcome,
    pub latency_ns: u64,
    /// Set when the permission check failed but dev-mode converted it to
    /// an allow (spec §4.9 step 2 / §4.2).
    pub dev_bypass: bool,
}
