//! Fire-and-forget usage recording.
//!
//! Resolution hands events to a bounded queue with `try_send`; a background
//! task forwards them to a [`ClickSink`]. A full queue drops the new event,
//! and sink failures are logged and dropped. Neither ever reaches the caller.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ClickError;
use crate::model::{Identity, Namespace};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClickEvent {
    pub namespace: Namespace,
    pub key: String,
    pub user_id: Option<String>,
    pub at: DateTime<Utc>,
}

impl ClickEvent {
    pub fn new(namespace: &Namespace, key: &str, identity: &Identity) -> Self {
        Self {
            namespace: namespace.clone(),
            key: key.to_string(),
            user_id: identity.user_id().map(str::to_string),
            at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ClickSink: Send + Sync + 'static {
    async fn record(&self, event: ClickEvent) -> Result<(), ClickError>;
}

/// Keeps events in memory; used by tests and local runs.
#[derive(Default)]
pub struct MemoryClickSink {
    events: Mutex<Vec<ClickEvent>>,
    fail: AtomicBool,
}

impl MemoryClickSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ClickEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl ClickSink for MemoryClickSink {
    async fn record(&self, event: ClickEvent) -> Result<(), ClickError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(ClickError::Rejected("memory sink set to fail".into()));
        }
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClickStats {
    pub queued: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub failed: u64,
}

/// Cloneable handle used on the request path.
#[derive(Clone)]
pub struct ClickRecorder {
    tx: mpsc::Sender<ClickEvent>,
    counters: Arc<Counters>,
}

/// Owns the background task; join it after every recorder handle is dropped
/// to drain what is still queued.
pub struct ClickWorker {
    handle: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl ClickWorker {
    pub async fn join(self) -> ClickStats {
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "click worker ended abnormally");
        }
        snapshot(&self.counters)
    }
}

fn snapshot(c: &Counters) -> ClickStats {
    ClickStats {
        queued: c.queued.load(Ordering::Relaxed),
        dropped: c.dropped.load(Ordering::Relaxed),
        delivered: c.delivered.load(Ordering::Relaxed),
        failed: c.failed.load(Ordering::Relaxed),
    }
}

impl ClickRecorder {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn ClickSink>, capacity: usize) -> (Self, ClickWorker) {
        let (tx, mut rx) = mpsc::channel::<ClickEvent>(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker_counters = counters.clone();

        let handle = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                match sink.record(ev.clone()).await {
                    Ok(()) => {
                        worker_counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            namespace = %ev.namespace,
                            key = %ev.key,
                            error = %e,
                            "click record failed; dropped"
                        );
                    }
                }
            }
            tracing::debug!("click queue closed");
        });

        let worker = ClickWorker {
            handle,
            counters: counters.clone(),
        };
        (Self { tx, counters }, worker)
    }

    /// Never blocks. Returns whether the event was queued.
    pub fn record(&self, event: ClickEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(ev)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(namespace = %ev.namespace, key = %ev.key, "click queue full; dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(ev)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(namespace = %ev.namespace, key = %ev.key, "click queue closed; dropped");
                false
            }
        }
    }

    /// Misses are only logged; there is no shortcut to count against.
    pub fn record_query(&self, query: &str, identity: &Identity) {
        tracing::info!(query = %query, user = ?identity.user_id(), "fallback search");
    }

    pub fn stats(&self) -> ClickStats {
        snapshot(&self.counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(key: &str) -> ClickEvent {
        ClickEvent::new(&Namespace::global(), key, &Identity::user("alice", &[]))
    }

    #[tokio::test]
    async fn delivers_to_sink() {
        let sink = Arc::new(MemoryClickSink::new());
        let (rec, worker) = ClickRecorder::spawn(sink.clone(), 8);
        assert!(rec.record(ev("docs")));
        assert!(rec.record(ev("jira")));
        drop(rec);
        let stats = worker.join().await;

        assert_eq!(stats.queued, 2);
        assert_eq!(stats.delivered, 2);
        let keys: Vec<String> = sink.events().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, ["docs", "jira"]);
        assert_eq!(sink.events()[0].user_id.as_deref(), Some("alice"));
    }

    struct Stuck(tokio::sync::Notify);

    #[async_trait]
    impl ClickSink for Stuck {
        async fn record(&self, _event: ClickEvent) -> Result<(), ClickError> {
            self.0.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn full_queue_drops_new_events() {
        let sink = Arc::new(Stuck(tokio::sync::Notify::new()));
        let (rec, _worker) = ClickRecorder::spawn(sink, 1);
        let mut accepted = 0;
        for i in 0..10 {
            if rec.record(ev(&format!("k{i}"))) {
                accepted += 1;
            }
        }
        // One may be in flight in the worker plus one buffered.
        assert!(accepted <= 2, "accepted {accepted}");
        let stats = rec.stats();
        assert_eq!(stats.queued + stats.dropped, 10);
        assert!(stats.dropped >= 8);
    }

    #[tokio::test]
    async fn sink_failures_are_counted_not_raised() {
        let sink = Arc::new(MemoryClickSink::new());
        sink.set_failing(true);
        let (rec, worker) = ClickRecorder::spawn(sink.clone(), 4);
        assert!(rec.record(ev("docs")));
        drop(rec);
        let stats = worker.join().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delivered, 0);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn failing_memory_sink_reports_rejection() {
        let sink = MemoryClickSink::new();
        sink.set_failing(true);
        let err = sink.record(ev("docs")).await.unwrap_err();
        assert!(matches!(err, ClickError::Rejected(_)));
        sink.set_failing(false);
        assert!(sink.record(ev("docs")).await.is_ok());
    }
}
