use std::path::Path;

use modgov_types::{Fqsid, KernelError, ModuleId};

pub fn render_install_ok(dir: &Path) -> String {
    format!("installed module from {}", dir.display())
}

pub fn render_canary_ok(dir: &Path, percent: u8) -> String {
    format!("deployed canary from {} at {}% traffic", dir.display(), percent)
}

pub fn render_not_found(fqsid: &Fqsid) -> String {
    format!("no route for '{}': unknown fqsid or module offline", fqsid)
}

pub fn render_invoke_ok(fqsid: &Fqsid, beans: &[String]) -> String {
    if beans.is_empty() {
        format!("'{}' ok (no beans registered)", fqsid)
    } else {
        format!("'{}' ok, beans: {}", fqsid, beans.join(", "))
    }
}

pub fn render_invoke_err(fqsid: &Fqsid, err: &KernelError) -> String {
    format!("'{}' failed: {}", fqsid, err)
}

pub fn render_module_list(ids: &[ModuleId]) -> String {
    if ids.is_empty() {
        return "no modules installed".to_string();
    }
    ids.iter().map(|id| format!("- {}", id)).collect::<Vec<_>>().join("\n")
}
