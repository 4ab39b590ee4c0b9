use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::capability::DeclaredCapability;
use crate::ids::ModuleId;

/// The parsed module manifest the core consumes. Parsing the on-disk
/// (YAML) representation into this struct is `modgov-config`'s job;
/// the kernel only ever sees the struct (see spec §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub id: ModuleId,
    pub version: String,
    /// Opaque key passed to `ContainerFactory`; the kernel never interprets it.
    pub main_class: Option<String>,
    pub capabilities: Vec<DeclaredCapability>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ModuleManifest {
    pub fn new(id: impl Into<ModuleId>, version: impl Into<String>) -> Self {
        ModuleManifest {
            id: id.into(),
            version: version.into(),
            main_class: None,
            capabilities: Vec::new(),
            labels: HashMap::new(),
        }
    }
}
