pub mod error;
pub mod events;
pub mod governance_kernel;
pub mod instance;
pub mod instance_pool;
pub mod invocation_executor;
pub mod lifecycle_manager;
pub mod module_manager;
pub mod service_registry;
pub mod trace;
pub mod traffic_router;

pub use error::IntoKernelError;
pub use events::{EventBus, EventHandler, KernelEvent};
pub use governance_kernel::GovernanceKernel;
pub use instance::{Instance, InstanceState};
pub use instance_pool::InstancePool;
pub use invocation_executor::{Bulkhead, InvocationExecutor};
pub use lifecycle_manager::LifecycleManager;
pub use module_manager::{ModuleManager, RuntimeTunables};
pub use service_registry::{ServiceEntry, ServiceRegistry};
pub use trace::TraceContext;
pub use traffic_router::{CanaryConfig, TrafficRouter};
