use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use modgov_store::PermissionStore;
use modgov_types::{AccessType, AuditOutcome, AuditRecord, InvocationContext, KernelError};
use tracing::debug;

use crate::events::{EventBus, KernelEvent};
use crate::instance::Instance;
use crate::invocation_executor::{Bulkhead, InvocationExecutor};
use crate::instance_pool::InstancePool;
use crate::traffic_router::{CanaryConfig, TrafficRouter};
use crate::trace::TraceContext;

/// Method-name prefix → inferred access type (spec §4.9 step 1).
const READ_PREFIXES: &[&str] = &["get", "find", "query", "list", "select", "count", "check", "is", "has"];
const WRITE_PREFIXES: &[&str] = &["create", "save", "insert", "update", "modify", "delete", "remove", "add", "set"];

fn infer_access_type(resource_id: &str) -> AccessType {
    let last_segment = resource_id.rsplit(':').next().unwrap_or(resource_id);
    let lower = last_segment.to_ascii_lowercase();
    if READ_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        AccessType::Read
    } else if WRITE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        AccessType::Write
    } else {
        AccessType::Execute
    }
}

fn should_emit_audit(ctx: &InvocationContext, access_type: AccessType, allowed: bool, dev_bypass: bool) -> bool {
    ctx.should_audit || access_type != AccessType::Read || !allowed || dev_bypass
}

/// Single entry point for every governed call (spec §4.9): composes the
/// permission check, trace propagation, `InvocationExecutor`, and audit
/// emission.
pub struct GovernanceKernel {
    permissions: Arc<dyn PermissionStore>,
    audit: Arc<modgov_store::AuditSink>,
    events: Arc<EventBus>,
}

impl GovernanceKernel {
    pub fn new(permissions: Arc<dyn PermissionStore>, audit: Arc<modgov_store::AuditSink>, events: Arc<EventBus>) -> Self {
        GovernanceKernel { permissions, audit, events }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn invoke<F, Fut, T>(
        &self,
        ctx: InvocationContext,
        pool: &InstancePool,
        bulkhead: &Bulkhead,
        canary: Option<&CanaryConfig>,
        default_timeout: Duration,
        call: F,
    ) -> Result<T, KernelError>
    where
        F: FnOnce(Arc<Instance>) -> Fut,
        Fut: Future<Output = Result<T, KernelError>>,
    {
        let started = Instant::now();
        let access_type = ctx.access_type.unwrap_or_else(|| infer_access_type(&ctx.resource_id));
        let capability = ctx.required_capability.clone().unwrap_or_else(|| ctx.resource_id.clone());

        let check = self.permissions.check(&ctx.caller_module_id, &capability, access_type).await;
        if !check.allowed {
            self.finish(&ctx, &capability, AuditOutcome::Denied, started.elapsed(), false, false).await;
            return Err(KernelError::PermissionDenied { module_id: ctx.caller_module_id.clone(), capability });
        }

        let target = match TrafficRouter::route(pool, canary).await {
            Some(inst) => inst,
            None => {
                self.finish(&ctx, &capability, AuditOutcome::Error, started.elapsed(), check.dev_bypass, true).await;
                return Err(KernelError::Unavailable {
                    module_id: ctx.target_module_id.clone(),
                    message: "no eligible instance to route to".into(),
                });
            }
        };

        let deadline = ctx.effective_deadline(default_timeout);
        let trace_id = ctx.trace_id.clone();
        let module_id = ctx.target_module_id.clone();

        self.events.publish(KernelEvent::InvocationStarted {
            trace_id: trace_id.clone(),
            fqsid: ctx.resource_id.clone(),
        });

        let result = TraceContext::start(
            trace_id,
            InvocationExecutor::run(&module_id, bulkhead, &target.clone(), deadline, move || call(target.clone())),
        )
        .await;

        match &result {
            Ok(_) => self.events.publish(KernelEvent::InvocationCompleted {
                trace_id: TraceContext::current(),
                fqsid: ctx.resource_id.clone(),
            }),
            Err(e) => self.events.publish(KernelEvent::InvocationRejected {
                trace_id: TraceContext::current(),
                fqsid: ctx.resource_id.clone(),
                reason: e.to_string(),
            }),
        }

        let outcome = if result.is_ok() { AuditOutcome::Allowed } else { AuditOutcome::Error };
        self.finish(&ctx, &capability, outcome, started.elapsed(), check.dev_bypass, true).await;
        result
    }

    async fn finish(
        &self,
        ctx: &InvocationContext,
        capability: &str,
        outcome: AuditOutcome,
        latency: Duration,
        dev_bypass: bool,
        allowed: bool,
    ) {
        let access_type = ctx.access_type.unwrap_or_else(|| infer_access_type(&ctx.resource_id));
        if !should_emit_audit(ctx, access_type, allowed, dev_bypass) {
            return;
        }
        let record = AuditRecord {
            timestamp: Utc::now(),
            trace_id: ctx.trace_id.clone().or_else(TraceContext::current),
            caller_module_id: ctx.caller_module_id.clone(),
            target_module_id: ctx.target_module_id.clone(),
            capability: Some(capability.to_string()),
            operation: ctx.audit_action.clone().unwrap_or_else(|| ctx.resource_id.clone()),
            outcome,
            latency_ns: latency.as_nanos() as u64,
            dev_bypass,
        };
        debug!(capability = capability, outcome = ?record.outcome, "emitting audit record");
        self.events.publish(KernelEvent::Audit(record.clone()));
        self.audit.record(record);
    }
}
