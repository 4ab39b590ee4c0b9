use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use modgov_types::{AuditRecord, ModuleId};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::warn;

/// Every event type the kernel can emit (spec §6 "Emitted events").
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum KernelEvent {
    ModuleInstalling { module_id: ModuleId },
    ModuleInstalled { module_id: ModuleId },
    ModuleUninstalling { module_id: ModuleId },
    ModuleUninstalled { module_id: ModuleId },
    InstanceUpgrading { module_id: ModuleId, version: String },
    InstanceReady { module_id: ModuleId, version: String },
    InstanceStarting { module_id: ModuleId, version: String },
    InstanceStarted { module_id: ModuleId, version: String },
    InstanceStopping { module_id: ModuleId, version: String },
    InstanceStopped { module_id: ModuleId, version: String },
    InstanceDying { module_id: ModuleId, version: String },
    InstanceDestroyed { module_id: ModuleId, version: String },
    RuntimeShuttingDown,
    RuntimeShutdown,
    InvocationStarted { trace_id: Option<String>, fqsid: String },
    InvocationCompleted { trace_id: Option<String>, fqsid: String },
    InvocationRejected { trace_id: Option<String>, fqsid: String, reason: String },
    Trace { trace_id: String, message: String },
    Audit(AuditRecord),
}

pub type EventHandler = Arc<dyn Fn(&KernelEvent) + Send + Sync>;

struct Subscription {
    owner: ModuleId,
    handler: EventHandler,
}

#[derive(Default)]
struct Subscribers {
    entries: Vec<Subscription>,
}

/// Typed pub/sub used by the kernel and observers (spec §4.1).
///
/// `publish` enqueues onto an unbounded channel and returns immediately; a
/// single background task delivers events to the subscriber list *as it
/// stands at delivery time*, so `unsubscribe_all` is atomic with respect to
/// events published (but not yet delivered) before it runs — matching the
/// spec's guarantee that no handler under a removed owner fires again after
/// `unsubscribe_all` returns.
pub struct EventBus {
    subscribers: Arc<RwLock<Subscribers>>,
    tx: mpsc::UnboundedSender<KernelEvent>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<KernelEvent>();
        let subscribers: Arc<RwLock<Subscribers>> = Arc::new(RwLock::new(Subscribers::default()));
        let worker_subs = subscribers.clone();

        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let guard = worker_subs.read().await;
                for sub in guard.entries.iter() {
                    let handler = sub.handler.clone();
                    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
                    if outcome.is_err() {
                        warn!(owner = %sub.owner, "event handler panicked, skipping");
                    }
                }
            }
        });

        EventBus { subscribers, tx, worker: Mutex::new(Some(worker)) }
    }

    /// Best-effort, at-most-once per subscriber. Never blocks the caller.
    pub fn publish(&self, event: KernelEvent) {
        // An unbounded channel never fails to send unless the receiver has
        // been dropped, which only happens after `shutdown`.
        let _ = self.tx.send(event);
    }

    pub async fn subscribe(&self, owner: ModuleId, handler: EventHandler) {
        self.subscribers.write().await.entries.push(Subscription { owner, handler });
    }

    /// Atomic w.r.t. future deliveries: once this returns, no handler
    /// registered under `owner` will run again (spec §4.1).
    pub async fn unsubscribe_all(&self, owner: &ModuleId) {
        self.subscribers.write().await.entries.retain(|s| &s.owner != owner);
    }

    /// Stops the dispatch worker after the channel drains. Intended for
    /// orderly process shutdown; further `publish` calls after this are
    /// silently dropped.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.worker.lock().await.take() {
            handle.abort();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
