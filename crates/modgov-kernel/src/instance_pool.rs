use std::sync::Arc;

use modgov_types::{KernelError, ModuleId};
use tokio::sync::RwLock;
use tracing::warn;

use crate::instance::{Instance, InstanceState};

struct PoolState {
    active: Vec<Arc<Instance>>,
    dying: Vec<Arc<Instance>>,
    default: Option<Arc<Instance>>,
}

/// Active + dying instance set for one module, with an atomically-swapped
/// default pointer (spec §4.5).
pub struct InstancePool {
    module_id: ModuleId,
    max_history_snapshots: usize,
    state: RwLock<PoolState>,
}

impl InstancePool {
    pub fn new(module_id: ModuleId, max_history_snapshots: usize) -> Self {
        InstancePool {
            module_id,
            max_history_snapshots,
            state: RwLock::new(PoolState { active: Vec::new(), dying: Vec::new(), default: None }),
        }
    }

    /// Appends `inst` to the active set; if `is_default`, atomically swaps
    /// the default pointer and returns the instance it displaced (if any).
    /// Fails BUSY if the dying queue is already at capacity, or with a
    /// duplicate-instance error if the active set already holds an
    /// instance at the same `(version, labels)` (spec §3: at most one
    /// instance may carry a given tuple).
    pub async fn add_instance(
        &self,
        inst: Arc<Instance>,
        is_default: bool,
    ) -> Result<Option<Arc<Instance>>, KernelError> {
        let mut guard = self.state.write().await;
        if guard.dying.len() >= self.max_history_snapshots {
            return Err(KernelError::Busy {
                module_id: self.module_id.clone(),
                message: format!(
                    "dying instance backlog ({}) at capacity ({})",
                    guard.dying.len(),
                    self.max_history_snapshots
                ),
            });
        }
        if guard.active.iter().any(|i| i.version == inst.version && i.labels == inst.labels) {
            return Err(KernelError::DuplicateInstance {
                module_id: self.module_id.clone(),
                version: inst.version.clone(),
            });
        }
        guard.active.push(inst.clone());
        let previous_default = if is_default { guard.default.replace(inst) } else { None };
        Ok(previous_default)
    }

    /// READY → DYING; removes `inst` from the active set. Idempotent: a
    /// second call on an already-dying or destroyed instance is a no-op.
    pub async fn move_to_dying(&self, inst: &Arc<Instance>) {
        let mut guard = self.state.write().await;
        guard.active.retain(|i| !Arc::ptr_eq(i, inst));
        if matches!(inst.state(), InstanceState::Ready) {
            inst.advance_to(InstanceState::Dying);
        }
        if !guard.dying.iter().any(|i| Arc::ptr_eq(i, inst)) {
            guard.dying.push(inst.clone());
        }
        if guard.default.as_ref().map(|d| Arc::ptr_eq(d, inst)).unwrap_or(false) {
            guard.default = None;
        }
    }

    /// Destroys every Dying instance with a zero refcount via `destroy_fn`.
    /// Safe to call concurrently with `enter`/`exit`. Returns the count
    /// destroyed.
    pub async fn cleanup_idle<F, Fut>(&self, destroy_fn: F) -> usize
    where
        F: Fn(Arc<Instance>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let candidates: Vec<Arc<Instance>> = {
            let guard = self.state.read().await;
            guard.dying.iter().filter(|i| i.is_destructible()).cloned().collect()
        };
        for inst in &candidates {
            destroy_fn(inst.clone()).await;
        }
        let mut guard = self.state.write().await;
        guard.dying.retain(|i| !candidates.iter().any(|c| Arc::ptr_eq(c, i)));
        candidates.len()
    }

    /// Destroys every Dying instance regardless of refcount. Used only on
    /// shutdown after the drain timeout expires.
    pub async fn force_cleanup_all<F, Fut>(&self, destroy_fn: F) -> usize
    where
        F: Fn(Arc<Instance>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let remaining: Vec<Arc<Instance>> = {
            let mut guard = self.state.write().await;
            std::mem::take(&mut guard.dying)
        };
        if !remaining.is_empty() {
            warn!(
                module_id = %self.module_id,
                count = remaining.len(),
                "force-destroying instances still holding references past the drain deadline"
            );
        }
        for inst in &remaining {
            destroy_fn(inst.clone()).await;
        }
        remaining.len()
    }

    pub async fn active_snapshot(&self) -> Vec<Arc<Instance>> {
        self.state.read().await.active.clone()
    }

    pub async fn default(&self) -> Option<Arc<Instance>> {
        self.state.read().await.default.clone()
    }

    pub async fn dying_count(&self) -> usize {
        self.state.read().await.dying.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgov_runtime::{local::LocalContainerFactory, ContainerFactory, ModuleSource};
    use std::collections::HashMap;

    async fn new_instance(version: &str) -> Arc<Instance> {
        let factory = LocalContainerFactory;
        let loader = modgov_runtime::LoaderHandle::new(version);
        let container = factory
            .create(&ModuleId::new("m"), &ModuleSource::Beans(HashMap::new()), &loader)
            .await
            .unwrap();
        let inst = Arc::new(Instance::new(ModuleId::new("m"), version, HashMap::new(), container.into()));
        inst.advance_to(InstanceState::Ready);
        inst
    }

    #[tokio::test]
    async fn add_instance_swaps_default_and_returns_previous() {
        let pool = InstancePool::new(ModuleId::new("m"), 3);
        let v1 = new_instance("1.0.0").await;
        assert!(pool.add_instance(v1.clone(), true).await.unwrap().is_none());

        let v2 = new_instance("1.0.1").await;
        let displaced = pool.add_instance(v2.clone(), true).await.unwrap();
        assert!(Arc::ptr_eq(&displaced.unwrap(), &v1));
        assert!(Arc::ptr_eq(&pool.default().await.unwrap(), &v2));
    }

    #[tokio::test]
    async fn move_to_dying_is_idempotent_and_clears_default() {
        let pool = InstancePool::new(ModuleId::new("m"), 3);
        let v1 = new_instance("1.0.0").await;
        pool.add_instance(v1.clone(), true).await.unwrap();

        pool.move_to_dying(&v1).await;
        assert_eq!(v1.state(), InstanceState::Dying);
        assert!(pool.default().await.is_none());
        assert_eq!(pool.dying_count().await, 1);

        pool.move_to_dying(&v1).await;
        assert_eq!(pool.dying_count().await, 1);
    }

    #[tokio::test]
    async fn add_instance_rejects_duplicate_version_and_labels() {
        let pool = InstancePool::new(ModuleId::new("m"), 3);
        let v1 = new_instance("1.0.0").await;
        pool.add_instance(v1.clone(), true).await.unwrap();

        let v1_again = new_instance("1.0.0").await;
        let err = pool.add_instance(v1_again, false).await.unwrap_err();
        assert!(matches!(err, KernelError::DuplicateInstance { .. }));
    }

    #[tokio::test]
    async fn add_instance_fails_busy_at_backpressure_limit() {
        let pool = InstancePool::new(ModuleId::new("m"), 1);
        let v1 = new_instance("1.0.0").await;
        pool.add_instance(v1.clone(), true).await.unwrap();
        pool.move_to_dying(&v1).await;

        let v2 = new_instance("1.0.1").await;
        let err = pool.add_instance(v2, true).await.unwrap_err();
        assert!(matches!(err, KernelError::Busy { .. }));
    }

    #[tokio::test]
    async fn cleanup_idle_destroys_only_zero_refcount_dying_instances() {
        let pool = InstancePool::new(ModuleId::new("m"), 3);
        let busy = new_instance("1.0.0").await;
        let idle = new_instance("1.0.1").await;
        pool.add_instance(busy.clone(), true).await.unwrap();
        pool.add_instance(idle.clone(), false).await.unwrap();

        busy.enter();
        pool.move_to_dying(&busy).await;
        pool.move_to_dying(&idle).await;

        let destroyed = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let destroyed_clone = destroyed.clone();
        let count = pool
            .cleanup_idle(move |inst| {
                let destroyed = destroyed_clone.clone();
                async move {
                    destroyed.lock().unwrap().push(inst.version.clone());
                }
            })
            .await;

        assert_eq!(count, 1);
        assert_eq!(*destroyed.lock().unwrap(), vec!["1.0.1".to_string()]);
        assert_eq!(pool.dying_count().await, 1);
    }

    #[tokio::test]
    async fn force_cleanup_all_ignores_refcount() {
        let pool = InstancePool::new(ModuleId::new("m"), 3);
        let busy = new_instance("1.0.0").await;
        pool.add_instance(busy.clone(), true).await.unwrap();
        busy.enter();
        pool.move_to_dying(&busy).await;

        let count = pool.force_cleanup_all(|_| async {}).await;
        assert_eq!(count, 1);
        assert_eq!(pool.dying_count().await, 0);
    }
}
