use std::path::Path;

use modgov_types::{AccessType, DeclaredCapability, ModuleId, ModuleManifest};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawManifest;

/// Load a module manifest from `path` (a `manifest.yml` file), converting
/// the wire schema into the `ModuleManifest` struct the kernel consumes.
///
/// Used by `ModuleManager::install_dev` — the dev-mode convenience path
/// that reads a manifest off disk instead of taking a pre-parsed struct
/// (spec §4.11 names `installDev(def, dir)` but leaves manifest parsing
/// external; this is the reference implementation of that parsing step).
pub fn load_manifest(path: &Path) -> Result<ModuleManifest, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawManifest = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;

    debug!(manifest = %path.display(), module_id = %raw.id, "loaded module manifest");
    convert_manifest(raw, path)
}

fn convert_manifest(raw: RawManifest, path: &Path) -> Result<ModuleManifest, ConfigError> {
    let capabilities = raw
        .governance
        .capabilities
        .into_iter()
        .map(|c| {
            let access_type = parse_access_type(&c.access_type, path)?;
            Ok(DeclaredCapability { capability: c.capability, access_type })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    Ok(ModuleManifest {
        id: ModuleId::new(raw.id),
        version: raw.version,
        main_class: raw.main_class,
        capabilities,
        labels: raw.labels,
    })
}

fn parse_access_type(s: &str, path: &Path) -> Result<AccessType, ConfigError> {
    match s.to_ascii_uppercase().as_str() {
        "NONE" => Ok(AccessType::None),
        "READ" => Ok(AccessType::Read),
        "WRITE" => Ok(AccessType::Write),
        "EXECUTE" => Ok(AccessType::Execute),
        other => Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!("unknown access type '{}'", other),
        }),
    }
}
