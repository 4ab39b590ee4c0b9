pub mod audit_sink;
pub mod permissions;

pub use audit_sink::{AuditSink, AuditWriter, StdoutAuditWriter};
pub use permissions::{
    InMemoryPermissionStore, PermissionCheck, PermissionStore, FRAMEWORK_CAPABILITY_PREFIX,
    HOST_MODULE_ID,
};
