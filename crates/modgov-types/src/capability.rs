use serde::{Deserialize, Serialize};

use crate::ids::ModuleId;

/// Access type lattice: `NONE < READ < WRITE`, `NONE < EXECUTE`.
///
/// `WRITE` satisfies `READ`; every type satisfies itself and `NONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessType {
    None,
    Read,
    Write,
    Execute,
}

impl AccessType {
    /// Whether a grant of `self` satisfies a requirement of `required`.
    pub fn satisfies(&self, required: AccessType) -> bool {
        match (self, required) {
            (_, AccessType::None) => true,
            (AccessType::Write, AccessType::Read) => true,
            (granted, required) => *granted == required,
        }
    }
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccessType::None => "NONE",
            AccessType::Read => "READ",
            AccessType::Write => "WRITE",
            AccessType::Execute => "EXECUTE",
        };
        write!(f, "{}", s)
    }
}

/// `(moduleId, capability, accessType)` — one entry in the permission store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityGrant {
    pub module_id: ModuleId,
    pub capability: String,
    pub access: AccessType,
}

/// A capability declaration as it appears in a module manifest's
/// `governance.capabilities` list (see §6 of the spec).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredCapability {
    pub capability: String,
    pub access_type: AccessType,
}
