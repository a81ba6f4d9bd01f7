use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::model::audit::{AuditEntry, AuditEvent};
use crate::store::AuditSink;

/// Entries waiting for the writer. Beyond this, new entries are dropped.
pub const AUDIT_QUEUE_CAPACITY: usize = 1000;

enum Command {
    Append(AuditEntry),
    Flush(oneshot::Sender<()>),
}

/// Append-only trail of check-in/check-out attempts.
///
/// `record` never waits on storage: entries are handed to a background
/// writer task in the order they were recorded. A failed append, or an
/// entry arriving while the queue is full, is logged and dropped.
#[derive(Clone)]
pub struct AuditLog {
    tx: mpsc::Sender<Command>,
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    /// Starts the writer task on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>) -> Self {
        Self::with_capacity(sink, AUDIT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(sink: Arc<dyn AuditSink>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_writer(sink.clone(), rx));
        Self { tx, sink }
    }

    pub fn record(&self, event: AuditEvent) {
        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            recorded_at: Utc::now(),
            event,
        };
        match self.tx.try_send(Command::Append(entry)) {
            Ok(()) => {}
            Err(TrySendError::Full(Command::Append(entry))) => warn!(
                action = %entry.event.action,
                outcome = %entry.event.outcome,
                user_id = ?entry.event.user_id,
                "Audit queue full, entry dropped"
            ),
            Err(_) => warn!("Audit writer is gone, entry dropped"),
        }
    }

    /// Resolves once everything recorded before the call has been appended.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Newest first.
    pub async fn recent(&self, limit: usize) -> EngineResult<Vec<AuditEntry>> {
        Ok(self.sink.recent(limit).await?)
    }
}

async fn run_writer(sink: Arc<dyn AuditSink>, mut rx: mpsc::Receiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Append(entry) => {
                if let Err(e) = sink.append(&entry).await {
                    warn!(
                        error = %e,
                        action = %entry.event.action,
                        outcome = %entry.event.outcome,
                        "Failed to append audit entry"
                    );
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
