pub mod audit;
pub mod capability;
pub mod context;
pub mod error;
pub mod ids;
pub mod manifest;

pub use audit::{AuditOutcome, AuditRecord};
pub use capability::{AccessType, CapabilityGrant, DeclaredCapability};
pub use context::{InvocationContext, ResourceType};
pub use error::KernelError;
pub use ids::{Fqsid, ModuleId};
pub use manifest::ModuleManifest;
