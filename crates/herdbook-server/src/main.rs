//! Herdbook server process entry point.

mod config;

use herdbook_core::HerdError;
use herdbook_core::repository::{AnimalRepository, Pagination};
use herdbook_db::repository::{SurrealAnimalRepository, SurrealAuditLogRepository};
use herdbook_db::{DbError, DbManager, SurrealCoordinator};
use herdbook_ops::{AuditFailure, AuditRecorder};
use surrealdb::engine::any::Any;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::{Directive, ParseError};

use crate::config::{ConfigError, ServerConfig};

type Coordinator = SurrealCoordinator<Any>;
type AuditLog = SurrealAuditLogRepository<Any>;

#[derive(Debug, Error)]
enum StartupError {
    #[error("invalid log directive: {0}")]
    LogFilter(#[from] ParseError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error(transparent)]
    Herd(#[from] HerdError),
}

/// The process-wide handles every manager is built from. Both are cheap to
/// clone, so each request path constructs the manager it needs.
struct Services {
    coordinator: Coordinator,
    recorder: AuditRecorder<AuditLog>,
}

impl Services {
    fn wire(
        db: &DbManager,
        config: &ServerConfig,
        audit_failures: mpsc::UnboundedSender<AuditFailure>,
    ) -> Self {
        Self {
            coordinator: SurrealCoordinator::new(db.client().clone(), config.coordinator.clone()),
            recorder: AuditRecorder::new(SurrealAuditLogRepository::new(db.client().clone()))
                .with_failure_channel(audit_failures),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let directive: Directive = "herdbook=info".parse()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .json()
        .init();

    info!("Starting Herdbook server...");

    let config = ServerConfig::from_env().inspect_err(|e| error!(error = %e, "invalid configuration"))?;
    let db = DbManager::connect(&config.db).await?;

    let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();
    let services = Services::wire(&db, &config, failure_tx);

    let audit_watch = tokio::spawn(async move {
        let mut dropped = 0u64;
        while let Some(failure) = failure_rx.recv().await {
            dropped += 1;
            error!(
                action = failure.entry.action.code(),
                entity_id = %failure.entry.entity_id,
                kind = ?failure.kind,
                dropped,
                "audit entry dropped"
            );
        }
    });

    let herd = SurrealAnimalRepository::new(db.client().clone())
        .list(Pagination {
            offset: 0,
            limit: 1,
        })
        .await?;
    info!(
        animals = herd.total,
        max_units = services.coordinator.config().max_concurrent_units,
        max_batch = config.ops.max_batch_size,
        "Herdbook server ready"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }

    info!(
        idle_slots = services.coordinator.available_slots(),
        audit_failures = services.recorder.failures(),
        "Shutting down"
    );
    drop(services);
    if let Err(e) = audit_watch.await {
        error!(error = %e, "audit failure watcher panicked");
    }

    info!("Herdbook server stopped.");
    Ok(())
}
