use std::future::Future;

use uuid::Uuid;

tokio::task_local! {
    static CURRENT_TRACE_ID: String;
}

/// Scoped trace-id propagation (spec §4.4). A task-local binding is the
/// Rust analogue of the source's thread-local: the id is available to
/// everything the scoped future calls without being threaded through every
/// argument list, and is released automatically when the future completes
/// or is dropped (including on panic unwind).
pub struct TraceContext;

impl TraceContext {
    /// The trace id bound to the calling task, if any.
    pub fn current() -> Option<String> {
        CURRENT_TRACE_ID.try_with(|id| id.clone()).ok()
    }

    /// Runs `fut` with a trace id bound to the task-local scope: reuses the
    /// caller's id if one is already active, otherwise binds `preferred`
    /// (when given) or mints a fresh one.
    pub async fn start<F, T>(preferred: Option<String>, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        if Self::current().is_some() {
            return fut.await;
        }
        let id = preferred.unwrap_or_else(Self::mint);
        CURRENT_TRACE_ID.scope(id, fut).await
    }

    fn mint() -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_mints_a_fresh_id_when_none_is_active() {
        assert!(TraceContext::current().is_none());
        let id = TraceContext::start(None, async { TraceContext::current() }).await;
        assert!(id.is_some());
        assert!(TraceContext::current().is_none());
    }

    #[tokio::test]
    async fn nested_start_reuses_the_active_id() {
        let outer = TraceContext::start(Some("t-1".into()), async {
            TraceContext::start(Some("t-2".into()), async { TraceContext::current() }).await
        })
        .await;
        assert_eq!(outer.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn preferred_id_is_honored_when_none_active() {
        let id = TraceContext::start(Some("caller-provided".into()), async { TraceContext::current() }).await;
        assert_eq!(id.as_deref(), Some("caller-provided"));
    }
}
