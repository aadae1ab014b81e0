//! Best-effort audit recording.
//!
//! Entries are appended after the primary unit of work has committed. A
//! failed append is logged, counted and forwarded to an optional failure
//! channel; it is never returned to the caller of the business operation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use herdbook_core::ActorContext;
use herdbook_core::error::ErrorKind;
use herdbook_core::models::audit::{AuditAction, AuditEntity, AuditOutcome, CreateAuditLogEntry};
use herdbook_core::repository::AuditLogRepository;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// An entry that could not be persisted.
#[derive(Debug, Clone)]
pub struct AuditFailure {
    pub entry: CreateAuditLogEntry,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Clone)]
pub struct AuditRecorder<S: AuditLogRepository> {
    sink: S,
    failures: Arc<AtomicU64>,
    failure_tx: Option<mpsc::UnboundedSender<AuditFailure>>,
}

impl<S: AuditLogRepository> AuditRecorder<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            failures: Arc::new(AtomicU64::new(0)),
            failure_tx: None,
        }
    }

    /// Forward every failed entry to `tx` in addition to logging it.
    pub fn with_failure_channel(mut self, tx: mpsc::UnboundedSender<AuditFailure>) -> Self {
        self.failure_tx = Some(tx);
        self
    }

    /// Number of entries that failed to persist since construction.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub async fn record(&self, entry: CreateAuditLogEntry) {
        let action = entry.action.code();
        match self.sink.append(entry.clone()).await {
            Ok(_) => {}
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    action,
                    entity_type = entry.entity_type.as_str(),
                    entity_id = %entry.entity_id,
                    error = %e,
                    "failed to persist audit entry"
                );
                if let Some(tx) = &self.failure_tx {
                    let failure = AuditFailure {
                        kind: e.kind(),
                        message: e.to_string(),
                        entry,
                    };
                    if tx.send(failure).is_err() {
                        warn!(action, "audit failure channel closed");
                    }
                }
            }
        }
    }

    /// Record several entries in order.
    pub async fn record_all(&self, entries: impl IntoIterator<Item = CreateAuditLogEntry>) {
        for entry in entries {
            self.record(entry).await;
        }
    }
}

/// Build an audit entry attributed to `ctx`.
pub(crate) fn entry(
    ctx: &ActorContext,
    action: AuditAction,
    entity_type: AuditEntity,
    entity_id: impl ToString,
    before: Option<Value>,
    after: Option<Value>,
) -> CreateAuditLogEntry {
    CreateAuditLogEntry {
        actor_id: ctx.actor_id.clone(),
        actor_type: ctx.actor_type,
        action,
        entity_type,
        entity_id: entity_id.to_string(),
        outcome: AuditOutcome::Success,
        before,
        after,
    }
}

/// JSON snapshot of a record for the `before`/`after` columns.
pub(crate) fn snapshot<T: Serialize>(value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "could not snapshot record for audit");
            None
        }
    }
}
