pub mod container;
pub mod error;
pub mod local;
pub mod resource_guard;
pub mod security;
pub mod thread_local;

pub use container::{Bean, Container, ContainerFactory, ContainerStartContext, LoaderHandle, ModuleLoaderFactory, ModuleSource};
pub use error::RuntimeError;
pub use local::LocalRuntime;
pub use resource_guard::ResourceGuard;
pub use security::SecurityVerifier;
pub use thread_local::ThreadLocalPropagator;
