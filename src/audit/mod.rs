//! Best-effort interface history for outbound provider calls.
//!
//! Recording never blocks the caller and never fails: events are pushed onto
//! an unbounded channel and persisted by a background worker.

use crate::domain::{OrderId, TimeMs};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Response code recorded for calls that never produced an HTTP status.
pub const UNKNOWN_FAILURE_CODE: &str = "9999";
pub const SUCCESS_CODE: &str = "0000";

/// Identifies one outbound call across its start and completion events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuditHandle(pub Uuid);

impl AuditHandle {
    pub fn new() -> Self {
        AuditHandle(Uuid::new_v4())
    }
}

impl Default for AuditHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An outbound call about to be made.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditCall {
    /// Provider tag, e.g. `TOSS`.
    pub provider: String,
    /// Logical API name, e.g. `confirm` or `cancel`.
    pub api: String,
    pub url: String,
    pub request: serde_json::Value,
    pub order_id: OrderId,
}

/// Records outbound calls. Implementations must swallow their own failures.
pub trait AuditRecorder: Send + Sync + fmt::Debug {
    fn record_request_start(&self, call: AuditCall) -> AuditHandle;

    fn record_success(&self, handle: AuditHandle, response: &serde_json::Value, http_status: u16);

    fn record_failure(
        &self,
        handle: AuditHandle,
        response: Option<&str>,
        response_code: &str,
        http_status: Option<u16>,
        message: &str,
    );
}

/// Recorder that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditRecorder;

impl AuditRecorder for NoopAuditRecorder {
    fn record_request_start(&self, _call: AuditCall) -> AuditHandle {
        AuditHandle::new()
    }

    fn record_success(&self, _handle: AuditHandle, _response: &serde_json::Value, _status: u16) {}

    fn record_failure(
        &self,
        _handle: AuditHandle,
        _response: Option<&str>,
        _response_code: &str,
        _http_status: Option<u16>,
        _message: &str,
    ) {
    }
}

/// Event handed to the background worker.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    Started {
        handle: AuditHandle,
        call: AuditCall,
        at: TimeMs,
    },
    Completed(AuditCompletion),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditCompletion {
    pub handle: AuditHandle,
    pub response: Option<String>,
    pub response_code: String,
    pub http_status: Option<u16>,
    pub error_message: Option<String>,
    pub at: TimeMs,
}

/// Durable destination of audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn insert_started(
        &self,
        handle: AuditHandle,
        call: &AuditCall,
        at: TimeMs,
    ) -> Result<(), sqlx::Error>;

    async fn complete(&self, completion: &AuditCompletion) -> Result<(), sqlx::Error>;
}

/// Recorder backed by an unbounded channel and a spawned persistence worker.
#[derive(Debug, Clone)]
pub struct ChannelAuditRecorder {
    tx: mpsc::UnboundedSender<AuditEvent>,
}

impl ChannelAuditRecorder {
    /// Spawn the worker on the current runtime.
    ///
    /// The worker exits once every recorder clone has been dropped.
    pub fn spawn(sink: Arc<dyn AuditSink>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(sink, rx));
        (Self { tx }, worker)
    }

    fn push(&self, event: AuditEvent) {
        if self.tx.send(event).is_err() {
            warn!("Audit worker is gone; dropping interface history event");
        }
    }
}

impl AuditRecorder for ChannelAuditRecorder {
    fn record_request_start(&self, call: AuditCall) -> AuditHandle {
        let handle = AuditHandle::new();
        self.push(AuditEvent::Started {
            handle,
            call,
            at: TimeMs::now(),
        });
        handle
    }

    fn record_success(&self, handle: AuditHandle, response: &serde_json::Value, http_status: u16) {
        self.push(AuditEvent::Completed(AuditCompletion {
            handle,
            response: Some(response.to_string()),
            response_code: SUCCESS_CODE.to_string(),
            http_status: Some(http_status),
            error_message: None,
            at: TimeMs::now(),
        }));
    }

    fn record_failure(
        &self,
        handle: AuditHandle,
        response: Option<&str>,
        response_code: &str,
        http_status: Option<u16>,
        message: &str,
    ) {
        self.push(AuditEvent::Completed(AuditCompletion {
            handle,
            response: response.map(str::to_string),
            response_code: failure_code(response_code).to_string(),
            http_status,
            error_message: Some(message.to_string()),
            at: TimeMs::now(),
        }));
    }
}

/// A failure is never recorded with the success code.
fn failure_code(code: &str) -> &str {
    if code.is_empty() || code == SUCCESS_CODE {
        UNKNOWN_FAILURE_CODE
    } else {
        code
    }
}

async fn run_worker(sink: Arc<dyn AuditSink>, mut rx: mpsc::UnboundedReceiver<AuditEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = persist(sink.as_ref(), &event).await {
            warn!(error = %e, "Failed to persist interface history event");
        }
    }
    debug!("Audit worker stopped");
}

async fn persist(sink: &dyn AuditSink, event: &AuditEvent) -> Result<(), sqlx::Error> {
    let backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(50),
        max_elapsed_time: Some(Duration::from_secs(2)),
        ..Default::default()
    };

    retry(backoff, || async {
        let result = match event {
            AuditEvent::Started { handle, call, at } => sink.insert_started(*handle, call, *at).await,
            AuditEvent::Completed(completion) => sink.complete(completion).await,
        };
        result.map_err(|e| match e {
            sqlx::Error::Database(_) | sqlx::Error::RowNotFound => backoff::Error::permanent(e),
            other => backoff::Error::transient(other),
        })
    })
    .await
}
