use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modgov_runtime::{ContainerStartContext, ResourceGuard};
use modgov_types::{KernelError, ModuleId};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::events::{EventBus, KernelEvent};
use crate::instance::{Instance, InstanceState};
use crate::instance_pool::InstancePool;

/// State ownership for one module's [`InstancePool`] (spec §4.10).
///
/// Owns the periodic cleanup ticker and is the only writer of its pool's
/// instances; `ModuleManager` holds one of these per installed module.
pub struct LifecycleManager {
    module_id: ModuleId,
    max_history_snapshots: usize,
    pool: Arc<InstancePool>,
    events: Arc<EventBus>,
    resource_guard: Arc<dyn ResourceGuard>,
    forced_cleanup_delay: Duration,
    shutting_down: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleManager {
    pub fn new(
        module_id: ModuleId,
        max_history_snapshots: usize,
        events: Arc<EventBus>,
        resource_guard: Arc<dyn ResourceGuard>,
        dying_check_interval: Duration,
        forced_cleanup_delay: Duration,
    ) -> Arc<Self> {
        let manager = Arc::new(LifecycleManager {
            pool: Arc::new(InstancePool::new(module_id.clone(), max_history_snapshots)),
            module_id,
            max_history_snapshots,
            events,
            resource_guard,
            forced_cleanup_delay,
            shutting_down: AtomicBool::new(false),
            ticker: Mutex::new(None),
        });
        manager.clone().spawn_ticker(dying_check_interval);
        manager
    }

    pub fn pool(&self) -> &Arc<InstancePool> {
        &self.pool
    }

    fn spawn_ticker(self: Arc<Self>, interval: Duration) {
        let ticker_self = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if ticker_self.shutting_down.load(Ordering::Acquire) {
                    break;
                }
                ticker_self.cleanup_idle().await;
            }
        });
        // Stash the handle via a blocking lock attempt; the ticker itself
        // never contends for it, so this never actually blocks.
        if let Ok(mut guard) = self.ticker.try_lock() {
            *guard = Some(handle);
        }
    }

    /// Starts `new_inst`, installs it into the pool, and moves any
    /// displaced default to dying (spec §4.10 `addInstance`).
    pub async fn add_instance(
        &self,
        new_inst: Arc<Instance>,
        ctx: &ContainerStartContext,
        is_default: bool,
    ) -> Result<(), KernelError> {
        if self.pool.dying_count().await >= self.max_history_snapshots {
            return Err(KernelError::Busy {
                module_id: self.module_id.clone(),
                message: "dying instance backlog at capacity".into(),
            });
        }

        self.events.publish(KernelEvent::InstanceUpgrading {
            module_id: self.module_id.clone(),
            version: new_inst.version.clone(),
        });

        if let Err(e) = new_inst.container.start(ctx).await {
            warn!(module_id = %self.module_id, version = %new_inst.version, error = %e, "instance start failed");
            new_inst.advance_to(InstanceState::Destroyed);
            return Err(KernelError::InstallFailed {
                module_id: self.module_id.clone(),
                message: "container start failed".into(),
                cause: Some(Box::new(e)),
            });
        }
        new_inst.advance_to(InstanceState::Ready);

        match self.pool.add_instance(new_inst.clone(), is_default).await {
            Ok(displaced) => {
                if let Some(old) = displaced {
                    self.pool.move_to_dying(&old).await;
                    self.events.publish(KernelEvent::InstanceDying {
                        module_id: self.module_id.clone(),
                        version: old.version.clone(),
                    });
                }
            }
            Err(e) => {
                // Backpressure discovered after start: tear the new instance
                // back down rather than leave it running unreachable.
                self.pool.move_to_dying(&new_inst).await;
                self.destroy_instance(&new_inst).await;
                return Err(e);
            }
        }

        self.events.publish(KernelEvent::InstanceStarted {
            module_id: self.module_id.clone(),
            version: new_inst.version.clone(),
        });
        Ok(())
    }

    /// Runs one sweep of the dying queue, destroying zero-refcount entries.
    pub async fn cleanup_idle(&self) -> usize {
        let events = self.events.clone();
        let guard = self.resource_guard.clone();
        let module_id = self.module_id.clone();
        self.pool
            .cleanup_idle(move |inst| {
                let events = events.clone();
                let guard = guard.clone();
                let module_id = module_id.clone();
                async move { destroy(&module_id, &inst, &events, &guard).await }
            })
            .await
    }

    /// Idempotent drain-then-force shutdown (spec §4.10 `shutdown`).
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.events.publish(KernelEvent::RuntimeShuttingDown);

        let active = self.pool.active_snapshot().await;
        for inst in &active {
            self.pool.move_to_dying(inst).await;
        }
        self.cleanup_idle().await;

        let deadline = tokio::time::Instant::now() + self.forced_cleanup_delay;
        while self.pool.dying_count().await > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.cleanup_idle().await;
        }

        let events = self.events.clone();
        let guard = self.resource_guard.clone();
        let module_id = self.module_id.clone();
        self.pool
            .force_cleanup_all(move |inst| {
                let events = events.clone();
                let guard = guard.clone();
                let module_id = module_id.clone();
                async move { destroy(&module_id, &inst, &events, &guard).await }
            })
            .await;

        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
        self.events.publish(KernelEvent::RuntimeShutdown);
    }

    async fn destroy_instance(&self, inst: &Arc<Instance>) {
        destroy(&self.module_id, inst, &self.events, &self.resource_guard).await;
    }
}

/// Stops the container, releases its code-loader resource, and schedules a
/// delayed leak check (spec §4.10 `destroyInstance`).
async fn destroy(module_id: &ModuleId, inst: &Arc<Instance>, events: &Arc<EventBus>, guard: &Arc<dyn ResourceGuard>) {
    events.publish(KernelEvent::InstanceStopping { module_id: module_id.clone(), version: inst.version.clone() });

    if let Err(e) = inst.container.stop().await {
        warn!(module_id = %module_id, version = %inst.version, error = %e, "container stop failed, continuing teardown");
    }

    // Snapshot before cleanup so the post-teardown leak check still has a
    // reference even after `cleanup` drops its own handle.
    let handle = inst.container.class_loader_handle();
    let snapshot = handle.downgrade();

    if let Err(e) = guard.cleanup(module_id, &handle).await {
        warn!(module_id = %module_id, error = %e, "resource guard cleanup failed");
    }

    inst.advance_to(InstanceState::Destroyed);
    events.publish(KernelEvent::InstanceStopped { module_id: module_id.clone(), version: inst.version.clone() });

    let module_id = module_id.clone();
    let version = inst.version.clone();
    let guard = guard.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        if guard.detect_leak(&snapshot) {
            warn!(module_id = %module_id, version = %version, "code-loader resource handle still referenced after teardown");
        } else {
            info!(module_id = %module_id, version = %version, "code-loader resource released cleanly");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgov_runtime::local::{LocalContainerFactory, LocalResourceGuard};
    use modgov_runtime::{ContainerFactory, ModuleSource};
    use std::collections::HashMap;

    async fn instance(version: &str) -> (Arc<Instance>, ContainerStartContext) {
        let factory = LocalContainerFactory;
        let loader = modgov_runtime::LoaderHandle::new(version);
        let container = factory
            .create(&ModuleId::new("m"), &ModuleSource::Beans(HashMap::new()), &loader)
            .await
            .unwrap();
        let ctx = ContainerStartContext { module_id: ModuleId::new("m"), version: version.into() };
        (Arc::new(Instance::new(ModuleId::new("m"), version, HashMap::new(), container.into())), ctx)
    }

    fn manager() -> Arc<LifecycleManager> {
        LifecycleManager::new(
            ModuleId::new("m"),
            3,
            Arc::new(EventBus::new()),
            Arc::new(LocalResourceGuard),
            Duration::from_secs(3600),
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn add_instance_starts_and_becomes_default() {
        let mgr = manager();
        let (inst, ctx) = instance("1.0.0").await;
        mgr.add_instance(inst.clone(), &ctx, true).await.unwrap();

        assert_eq!(inst.state(), InstanceState::Ready);
        assert!(Arc::ptr_eq(&mgr.pool().default().await.unwrap(), &inst));
    }

    #[tokio::test]
    async fn second_default_moves_first_to_dying() {
        let mgr = manager();
        let (v1, ctx1) = instance("1.0.0").await;
        mgr.add_instance(v1.clone(), &ctx1, true).await.unwrap();

        let (v2, ctx2) = instance("1.0.1").await;
        mgr.add_instance(v2.clone(), &ctx2, true).await.unwrap();

        assert_eq!(v1.state(), InstanceState::Dying);
        assert!(Arc::ptr_eq(&mgr.pool().default().await.unwrap(), &v2));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_drains_dying_instances() {
        let mgr = manager();
        let (inst, ctx) = instance("1.0.0").await;
        mgr.add_instance(inst.clone(), &ctx, true).await.unwrap();

        mgr.shutdown().await;
        mgr.shutdown().await;

        assert_eq!(inst.state(), InstanceState::Destroyed);
        assert_eq!(mgr.pool().dying_count().await, 0);
    }

    #[tokio::test]
    async fn cleanup_idle_leaves_busy_instances_in_the_dying_queue() {
        let mgr = manager();
        let (inst, ctx) = instance("1.0.0").await;
        mgr.add_instance(inst.clone(), &ctx, true).await.unwrap();
        inst.enter();

        let (v2, ctx2) = instance("1.0.1").await;
        mgr.add_instance(v2, &ctx2, true).await.unwrap();

        mgr.cleanup_idle().await;
        assert_eq!(mgr.pool().dying_count().await, 1);
        assert_eq!(inst.state(), InstanceState::Dying);
    }
}
