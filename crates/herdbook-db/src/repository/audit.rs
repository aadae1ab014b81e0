//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! The table is append-only: the schema forbids update and delete, and this
//! repository exposes no way to issue either.

use chrono::{DateTime, Utc};
use herdbook_core::error::HerdResult;
use herdbook_core::models::audit::{AuditEntity, AuditLogEntry, CreateAuditLogEntry};
use herdbook_core::repository::{AuditLogRepository, PaginatedResult, Pagination};
use serde_json::{Value, json};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, first_count, parse_enum, parse_uuid};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AuditLogRow {
    record_id: String,
    actor_id: String,
    actor_type: String,
    action: String,
    entity_type: String,
    entity_id: String,
    outcome: String,
    changes: Value,
    timestamp: DateTime<Utc>,
}

impl AuditLogRow {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        let side = |key: &str| self.changes.get(key).filter(|v| !v.is_null()).cloned();
        let before = side("before");
        let after = side("after");
        Ok(AuditLogEntry {
            id: parse_uuid(&self.record_id, "audit log")?,
            actor_id: self.actor_id,
            actor_type: parse_enum(&self.actor_type)?,
            action: self.action,
            entity_type: parse_enum(&self.entity_type)?,
            entity_id: self.entity_id,
            outcome: parse_enum(&self.outcome)?,
            before,
            after,
            timestamp: self.timestamp,
        })
    }
}

fn collect(rows: Vec<AuditLogRow>) -> Result<Vec<AuditLogEntry>, DbError> {
    rows.into_iter().map(AuditLogRow::try_into_entry).collect()
}

/// SurrealDB implementation of the audit log.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, entry: CreateAuditLogEntry) -> HerdResult<AuditLogEntry> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let changes = json!({
            "before": entry.before,
            "after": entry.after,
        });

        let mut result = self
            .db
            .query(
                "CREATE type::record('audit_log', $id) SET \
                 actor_id = $actor_id, actor_type = $actor_type, \
                 action = $action, entity_type = $entity_type, \
                 entity_id = $entity_id, outcome = $outcome, \
                 changes = $changes; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('audit_log', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("actor_id", entry.actor_id))
            .bind(("actor_type", entry.actor_type.as_str()))
            .bind(("action", entry.action.code()))
            .bind(("entity_type", entry.entity_type.as_str()))
            .bind(("entity_id", entry.entity_id))
            .bind(("outcome", entry.outcome.as_str()))
            .bind(("changes", changes))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<AuditLogRow> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "audit_log".into(),
            id: id_str,
        })?;
        Ok(row.try_into_entry()?)
    }

    async fn list_for_entity(
        &self,
        entity_type: AuditEntity,
        entity_id: &str,
    ) -> HerdResult<Vec<AuditLogEntry>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM audit_log \
                 WHERE entity_type = $entity_type AND entity_id = $entity_id \
                 ORDER BY timestamp ASC",
            )
            .bind(("entity_type", entity_type.as_str()))
            .bind(("entity_id", entity_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<AuditLogRow> = result.take(0).map_err(DbError::from)?;
        Ok(collect(rows)?)
    }

    async fn list(&self, pagination: Pagination) -> HerdResult<PaginatedResult<AuditLogEntry>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM audit_log GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = first_count(count_rows);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM audit_log \
                 ORDER BY timestamp DESC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<AuditLogRow> = result.take(0).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: collect(rows)?,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
