use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use modgov_types::ModuleId;

use crate::error::RuntimeError;

/// A value exposed by a `Container` under a name (spec §6:
/// `Container.getBean(type|name)`). Opaque to the kernel.
pub type Bean = Arc<dyn Any + Send + Sync>;

/// What gets handed to `ModuleLoaderFactory`/`ContainerFactory.create`.
/// The kernel never inspects this; it is a pure external concern (spec §6).
/// The in-process [`crate::local`] runtime supports only `Beans`, since it
/// never performs real code isolation.
#[derive(Clone)]
pub enum ModuleSource {
    /// A directory on disk, as used by the dev convenience install path.
    Directory(PathBuf),
    /// Pre-built beans to register directly, used by the in-process runtime
    /// and by tests that don't want to touch the filesystem.
    Beans(HashMap<String, Bean>),
}

impl fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSource::Directory(path) => f.debug_tuple("Directory").field(path).finish(),
            ModuleSource::Beans(beans) => {
                f.debug_tuple("Beans").field(&beans.keys().collect::<Vec<_>>()).finish()
            }
        }
    }
}

/// Identity of an isolated code-loader resource (the ClassLoader-equivalent
/// handle of spec §6/§9). Cloning shares the same underlying token, so
/// identity survives being passed around; `downgrade` supports the
/// post-teardown leak check described in spec §4.10.
#[derive(Clone)]
pub struct LoaderHandle {
    id: String,
    token: Arc<()>,
}

impl LoaderHandle {
    pub fn new(id: impl Into<String>) -> Self {
        LoaderHandle { id: id.into(), token: Arc::new(()) }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn downgrade(&self) -> Weak<()> {
        Arc::downgrade(&self.token)
    }
}

impl fmt::Debug for LoaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderHandle").field("id", &self.id).finish()
    }
}

/// Context passed to `Container::start` (spec §4.10 `addInstance`).
#[derive(Debug, Clone)]
pub struct ContainerStartContext {
    pub module_id: ModuleId,
    pub version: String,
}

/// An opaque running instance of module code (spec §6 `Container`).
#[async_trait]
pub trait Container: Send + Sync {
    async fn start(&self, ctx: &ContainerStartContext) -> Result<(), RuntimeError>;
    async fn stop(&self) -> Result<(), RuntimeError>;
    fn is_active(&self) -> bool;
    fn get_bean(&self, name: &str) -> Option<Bean>;
    fn bean_names(&self) -> Vec<String>;
    fn class_loader_handle(&self) -> LoaderHandle;
}

/// Builds a `Container` for a module, given its code-loader handle
/// (spec §6 `ContainerFactory.create`).
#[async_trait]
pub trait ContainerFactory: Send + Sync + 'static {
    async fn create(
        &self,
        module_id: &ModuleId,
        source: &ModuleSource,
        code_loader: &LoaderHandle,
    ) -> Result<Box<dyn Container>, RuntimeError>;
}

/// Creates the isolated code-loader resource for a module
/// (spec §6 `ModuleLoaderFactory.create`).
#[async_trait]
pub trait ModuleLoaderFactory: Send + Sync + 'static {
    async fn create(
        &self,
        module_id: &ModuleId,
        source: &ModuleSource,
        parent: Option<&LoaderHandle>,
    ) -> Result<LoaderHandle, RuntimeError>;
}
