use serde::{Deserialize, Serialize};

/// Identity of an installed module. Stable across upgrades — the
/// `(id, version)` pair in spec terms is `(ModuleId, Instance::version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub String);

impl ModuleId {
    pub fn new(s: impl Into<String>) -> Self {
        ModuleId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        ModuleId::new(s)
    }
}

/// Fully-qualified service id: `"<moduleId>:<shortId>"`, unique process-wide.
///
/// A second kind of FQSID uses an interface's fully-qualified name as the
/// `shortId` for interface-based routing (see `ServiceRegistry::resolve_interface`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fqsid {
    pub module_id: ModuleId,
    pub short_id: String,
}

impl Fqsid {
    pub fn new(module_id: impl Into<ModuleId>, short_id: impl Into<String>) -> Self {
        Fqsid { module_id: module_id.into(), short_id: short_id.into() }
    }
}

impl std::fmt::Display for Fqsid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.module_id, self.short_id)
    }
}

impl std::str::FromStr for Fqsid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((module, short)) if !module.is_empty() && !short.is_empty() => {
                Ok(Fqsid::new(ModuleId::new(module), short.to_string()))
            }
            _ => Err(format!("malformed fqsid '{}', expected 'moduleId:shortId'", s)),
        }
    }
}

impl Serialize for Fqsid {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Fqsid {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let s = String::deserialize(d)?;
        s.parse().map_err(D::Error::custom)
    }
}
