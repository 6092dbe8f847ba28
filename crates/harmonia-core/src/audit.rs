use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use harmonia_types::events::AuditEvent;

use crate::error::{PipelineError, Result};

/// External audit log. Delivery is best-effort; see [`run_audit_worker`].
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// Events held while the sink is slow or down. Beyond this, new events are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Non-blocking handle the store uses to hand events to the audit worker.
#[derive(Clone)]
pub struct AuditDispatcher {
    tx: Option<mpsc::Sender<AuditEvent>>,
}

impl AuditDispatcher {
    /// Returns the dispatcher and the bounded queue the worker drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Dispatcher that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue an event. Never blocks and never fails the caller.
    pub fn emit(&self, event: AuditEvent) {
        if let Some(tx) = &self.tx {
            match tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    warn!(
                        action = %event.action,
                        resource_id = %event.resource_id,
                        "Audit queue full, event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Audit worker gone, event dropped");
                }
            }
        }
    }
}

/// Per-event delivery policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one. At least one retry is always made.
    pub retries: u32,
    /// Bound on each individual attempt.
    pub timeout: Duration,
    /// Delay before the first retry, doubled for each following one.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            timeout: Duration::from_millis(2000),
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Try to deliver one event, retrying with backoff. Returns the last error.
pub async fn deliver(sink: &dyn AuditSink, event: &AuditEvent, policy: &RetryPolicy) -> Result<()> {
    let retries = policy.retries.max(1);
    let mut last_err = PipelineError::SinkUnavailable("no attempt made".into());

    for attempt in 0..=retries {
        match tokio::time::timeout(policy.timeout, sink.record(event)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => last_err = e,
            Err(_) => {
                last_err = PipelineError::SinkUnavailable(format!(
                    "timed out after {} ms",
                    policy.timeout.as_millis()
                ))
            }
        }

        if attempt < retries {
            debug!(
                action = %event.action,
                attempt = attempt + 1,
                "Audit delivery failed, retrying: {}",
                last_err
            );
            tokio::time::sleep(policy.backoff_for(attempt)).await;
        }
    }

    Err(last_err)
}

/// Drain the audit queue until every dispatcher is dropped.
///
/// Events are delivered one at a time in emission order. A failed event is
/// logged and dropped; the conversation state it describes is already
/// committed and stays valid.
pub async fn run_audit_worker(
    mut rx: mpsc::Receiver<AuditEvent>,
    sink: Arc<dyn AuditSink>,
    policy: RetryPolicy,
) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = deliver(sink.as_ref(), &event, &policy).await {
            warn!(
                action = %event.action,
                actor_id = %event.actor_id,
                resource_id = %event.resource_id,
                "Audit event dropped: {}",
                e
            );
        }
    }
    info!("Audit worker stopped");
}

pub fn spawn_audit_worker(
    rx: mpsc::Receiver<AuditEvent>,
    sink: Arc<dyn AuditSink>,
    policy: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(run_audit_worker(rx, sink, policy))
}

// -- Sinks --

/// Posts each event as JSON to an HTTP endpoint.
pub struct HttpAuditSink {
    client: reqwest::Client,
    url: String,
}

impl HttpAuditSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Internal(format!("failed to build audit client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| PipelineError::SinkUnavailable(e.to_string()))?;
        Ok(())
    }
}

/// Writes events to the `harmonia::audit` tracing target.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        info!(
            target: "harmonia::audit",
            action = %event.action,
            actor_id = %event.actor_id,
            resource_id = %event.resource_id,
            timestamp = %event.timestamp,
            "audit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;
    use harmonia_types::events::AuditAction;

    /// Fails the first `failures` calls, then records.
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
        recorded: Mutex<Vec<AuditEvent>>,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                recorded: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AuditSink for FlakySink {
        async fn record(&self, event: &AuditEvent) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(PipelineError::SinkUnavailable("connection refused".into()));
            }
            self.recorded.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct HangingSink;

    #[async_trait]
    impl AuditSink for HangingSink {
        async fn record(&self, _event: &AuditEvent) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            timeout: Duration::from_millis(50),
            backoff: Duration::from_millis(1),
        }
    }

    fn event(resource: &str) -> AuditEvent {
        AuditEvent::new(AuditAction::MessageAppend, "ana", resource, Utc::now())
    }

    #[tokio::test]
    async fn retries_until_sink_recovers() {
        let sink = FlakySink::new(2);
        deliver(&sink, &event("1"), &fast_policy(2)).await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.recorded.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_retries() {
        let sink = FlakySink::new(10);
        let err = deliver(&sink, &event("1"), &fast_policy(2)).await.unwrap_err();
        assert!(matches!(err, PipelineError::SinkUnavailable(_)));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_still_retries_once() {
        let sink = FlakySink::new(1);
        deliver(&sink, &event("1"), &fast_policy(0)).await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn hanging_sink_times_out() {
        let err = deliver(&HangingSink, &event("1"), &fast_policy(1)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn worker_delivers_in_order_and_stops_when_dispatchers_drop() {
        let sink = Arc::new(FlakySink::new(0));
        let (dispatcher, rx) = AuditDispatcher::channel(8);
        let worker = spawn_audit_worker(rx, sink.clone(), fast_policy(1));

        dispatcher.emit(event("1"));
        dispatcher.emit(event("2"));
        drop(dispatcher);
        worker.await.unwrap();

        let resources: Vec<String> = sink
            .recorded
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.resource_id.clone())
            .collect();
        assert_eq!(resources, vec!["1", "2"]);
    }

    #[test]
    fn full_queue_drops_instead_of_growing() {
        let (dispatcher, mut rx) = AuditDispatcher::channel(2);
        for i in 0..5 {
            dispatcher.emit(event(&i.to_string()));
        }

        let mut queued = Vec::new();
        while let Ok(e) = rx.try_recv() {
            queued.push(e.resource_id);
        }
        assert_eq!(queued, vec!["0", "1"]);
    }

    #[tokio::test]
    async fn stalled_sink_does_not_block_emitters() {
        let (dispatcher, rx) = AuditDispatcher::channel(4);
        let worker = spawn_audit_worker(
            rx,
            Arc::new(HangingSink),
            RetryPolicy {
                retries: 1,
                timeout: Duration::from_secs(3600),
                backoff: Duration::from_secs(3600),
            },
        );

        let emitting = async {
            for i in 0..1000 {
                dispatcher.emit(event(&i.to_string()));
                tokio::task::yield_now().await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), emitting)
            .await
            .expect("emit must never wait on the sink");

        worker.abort();
    }

    #[test]
    fn emit_without_worker_is_silent() {
        AuditDispatcher::disabled().emit(event("1"));

        let (dispatcher, rx) = AuditDispatcher::channel(8);
        drop(rx);
        dispatcher.emit(event("1"));
    }
}
