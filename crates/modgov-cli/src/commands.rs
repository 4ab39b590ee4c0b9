use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use modgov_kernel::{ModuleManager, RuntimeTunables};
use modgov_store::InMemoryPermissionStore;
use modgov_types::{Fqsid, ModuleId};

use crate::output;

pub fn build_manager(dev_mode: bool) -> ModuleManager {
    let permissions = Arc::new(InMemoryPermissionStore::new(dev_mode, true));
    ModuleManager::local(permissions, RuntimeTunables::default())
}

pub async fn install(manager: &ModuleManager, dir: PathBuf) -> Result<()> {
    manager
        .install_dev(dir.clone())
        .await
        .with_context(|| format!("installing module from {}", dir.display()))?;
    println!("{}", output::render_install_ok(&dir));
    Ok(())
}

pub async fn deploy_canary(manager: &ModuleManager, dir: PathBuf, percent: u8) -> Result<()> {
    let manifest_path = dir.join("manifest.yml");
    let manifest = modgov_config::load_manifest(&manifest_path)
        .with_context(|| format!("loading manifest from {}", manifest_path.display()))?;
    manager
        .deploy_canary(
            manifest,
            modgov_runtime::ModuleSource::Directory(dir.clone()),
            Default::default(),
            percent,
        )
        .await
        .with_context(|| format!("deploying canary from {}", dir.display()))?;
    println!("{}", output::render_canary_ok(&dir, percent));
    Ok(())
}

pub async fn reload(manager: &ModuleManager, module_id: String) -> Result<()> {
    manager
        .reload(&ModuleId::new(module_id.clone()))
        .await
        .with_context(|| format!("reloading module '{}'", module_id))?;
    println!("reloaded module '{}'", module_id);
    Ok(())
}

pub async fn uninstall(manager: &ModuleManager, module_id: String) -> Result<()> {
    manager
        .uninstall(&ModuleId::new(module_id.clone()))
        .await
        .with_context(|| format!("uninstalling module '{}'", module_id))?;
    println!("uninstalled module '{}'", module_id);
    Ok(())
}

pub async fn invoke(manager: &ModuleManager, fqsid: String, caller: String) -> Result<()> {
    let fqsid: Fqsid = fqsid.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let result = manager
        .invoke_service(ModuleId::new(caller), &fqsid, |instance| async move {
            Ok(instance.container.bean_names())
        })
        .await;

    match result {
        None => {
            println!("{}", output::render_not_found(&fqsid));
            Ok(())
        }
        Some(Ok(beans)) => {
            println!("{}", output::render_invoke_ok(&fqsid, &beans));
            Ok(())
        }
        Some(Err(e)) => {
            println!("{}", output::render_invoke_err(&fqsid, &e));
            Err(e.into())
        }
    }
}

pub async fn list(manager: &ModuleManager) -> Result<()> {
    let ids = manager.module_ids().await;
    println!("{}", output::render_module_list(&ids));
    Ok(())
}
