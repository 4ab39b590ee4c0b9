use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use modgov_types::AuditRecord;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where drained audit records end up. The default (dev) writer logs a
/// single line per record; a production host injects an opaque writer
/// backed by persistent storage (out of scope here — spec §1 Non-goals).
#[async_trait]
pub trait AuditWriter: Send + Sync + 'static {
    async fn write(&self, record: &AuditRecord);
}

/// Writes one line per record via `tracing`, matching the "stdout line
/// format in dev" default described in spec §4.3.
#[derive(Debug, Default)]
pub struct StdoutAuditWriter;

#[async_trait]
impl AuditWriter for StdoutAuditWriter {
    async fn write(&self, record: &AuditRecord) {
        info!(
            trace_id = record.trace_id.as_deref().unwrap_or("-"),
            caller = %record.caller_module_id,
            target = %record.target_module_id,
            capability = record.capability.as_deref().unwrap_or("-"),
            operation = %record.operation,
            outcome = ?record.outcome,
            latency_ns = record.latency_ns,
            dev_bypass = record.dev_bypass,
            "audit"
        );
    }
}

struct Queue {
    records: std::sync::Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
    dropped: AtomicU64,
    notify: Notify,
    closed: std::sync::atomic::AtomicBool,
}

/// Single-producer-facing, single-consumer bounded audit queue (spec §4.3).
///
/// `record` never blocks the caller: on overflow the oldest queued record
/// is dropped and a counter is incremented, rather than applying
/// back-pressure to the invocation path.
pub struct AuditSink {
    queue: Arc<Queue>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AuditSink {
    pub fn new(capacity: usize, writer: Arc<dyn AuditWriter>) -> Self {
        let queue = Arc::new(Queue {
            records: std::sync::Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
            closed: std::sync::atomic::AtomicBool::new(false),
        });

        let worker_queue = queue.clone();
        let worker = tokio::spawn(async move {
            loop {
                let next = {
                    let mut guard = worker_queue.records.lock().expect("audit queue mutex poisoned");
                    guard.pop_front()
                };
                match next {
                    Some(record) => writer.write(&record).await,
                    None => {
                        if worker_queue.closed.load(Ordering::Acquire) {
                            break;
                        }
                        worker_queue.notify.notified().await;
                    }
                }
            }
        });

        AuditSink { queue, worker: tokio::sync::Mutex::new(Some(worker)) }
    }

    /// Enqueue a record. Non-blocking; drops the oldest record on overflow.
    pub fn record(&self, record: AuditRecord) {
        let mut guard = self.queue.records.lock().expect("audit queue mutex poisoned");
        let mut dropped_total = None;
        if guard.len() >= self.queue.capacity {
            guard.pop_front();
            dropped_total = Some(self.queue.dropped.fetch_add(1, Ordering::Relaxed) + 1);
        }
        guard.push_back(record);
        drop(guard);
        if let Some(dropped) = dropped_total {
            warn!(dropped_total = dropped, "audit queue overflow, dropped oldest record");
        }
        self.queue.notify.notify_one();
    }

    /// Count of records dropped due to overflow since construction.
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.records.lock().expect("audit queue mutex poisoned").len()
    }

    /// Flush remaining records and stop the worker, waiting up to `deadline`.
    /// Idempotent: a second call is a no-op since the worker handle is only
    /// taken once.
    pub async fn shutdown(&self, deadline: Duration) {
        self.queue.closed.store(true, Ordering::Release);
        self.queue.notify.notify_one();
        let mut guard = self.worker.lock().await;
        if let Some(handle) = guard.take() {
            if tokio::time::timeout(deadline, handle).await.is_err() {
                warn!("audit sink did not drain within the shutdown deadline");
            } else {
                debug!("audit sink drained cleanly");
            }
        }
    }
}
