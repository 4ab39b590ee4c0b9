use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Wire schema for a module manifest file (spec §6).
///
/// ```yaml
/// id: user
/// version: 1.0.0
/// mainClass: com.example.UserModule
/// governance:
///   capabilities:
///     - capability: "storage:sql"
///       accessType: "READ"
/// labels:
///   team: identity
/// ```
#[derive(Debug, Deserialize, Serialize)]
pub struct RawManifest {
    pub id: String,
    pub version: String,
    #[serde(rename = "mainClass")]
    pub main_class: Option<String>,
    #[serde(default)]
    pub governance: RawGovernance,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawGovernance {
    #[serde(default)]
    pub capabilities: Vec<RawCapability>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawCapability {
    pub capability: String,
    #[serde(rename = "accessType")]
    pub access_type: String,
}
