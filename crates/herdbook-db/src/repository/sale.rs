//! SurrealDB implementation of [`SaleRepository`].

use chrono::{DateTime, Utc};
use herdbook_core::error::{HerdError, HerdResult};
use herdbook_core::models::sale::{SaleApproval, SaleCancellation, SaleRecord, SaleStatus};
use herdbook_core::repository::SaleRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{parse_enum, parse_uuid};
use crate::error::DbError;

/// Approval and cancellation details are flattened into nullable columns.
#[derive(Debug, SurrealValue)]
pub(crate) struct SaleRow {
    record_id: String,
    animal_id: String,
    sale_type: String,
    status: String,
    price_cents: i64,
    counterparty: String,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    approval_notes: Option<String>,
    invoice_number: Option<String>,
    cancellation_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SaleRow {
    fn try_into_sale(self) -> Result<SaleRecord, DbError> {
        let approval = match (self.approved_by, self.approved_at) {
            (Some(approved_by), Some(approved_at)) => Some(SaleApproval {
                approved_by,
                approved_at,
                notes: self.approval_notes,
                invoice_number: self.invoice_number,
            }),
            (None, None) => None,
            _ => {
                return Err(DbError::Corrupt(format!(
                    "sale {} has a partial approval",
                    self.record_id
                )));
            }
        };
        let cancellation = match (self.cancellation_reason, self.cancelled_at) {
            (Some(reason), Some(cancelled_at)) => Some(SaleCancellation {
                reason,
                cancelled_at,
            }),
            (None, None) => None,
            _ => {
                return Err(DbError::Corrupt(format!(
                    "sale {} has a partial cancellation",
                    self.record_id
                )));
            }
        };

        Ok(SaleRecord {
            id: parse_uuid(&self.record_id, "sale")?,
            animal_id: parse_uuid(&self.animal_id, "animal")?,
            sale_type: parse_enum(&self.sale_type)?,
            status: parse_enum(&self.status)?,
            price_cents: self.price_cents,
            counterparty: self.counterparty,
            approval,
            cancellation,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn first(rows: Vec<SaleRow>) -> Result<Option<SaleRecord>, DbError> {
    rows.into_iter()
        .next()
        .map(SaleRow::try_into_sale)
        .transpose()
}

pub(crate) async fn fetch_sale<C: Connection>(
    db: &Surreal<C>,
    id: Uuid,
) -> Result<Option<SaleRecord>, DbError> {
    let mut result = db
        .query("SELECT meta::id(id) AS record_id, * FROM type::record('sale_record', $id)")
        .bind(("id", id.to_string()))
        .await?;
    first(result.take(0)?)
}

/// The animal's pending sale, if one exists.
pub(crate) async fn fetch_pending_sale<C: Connection>(
    db: &Surreal<C>,
    animal_id: Uuid,
) -> Result<Option<SaleRecord>, DbError> {
    let mut result = db
        .query(
            "SELECT meta::id(id) AS record_id, * FROM sale_record \
             WHERE animal_id = $animal_id AND status = $status \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(("animal_id", animal_id.to_string()))
        .bind(("status", SaleStatus::Pending.as_str()))
        .await?;
    first(result.take(0)?)
}

/// SurrealDB implementation of the Sale repository.
#[derive(Clone)]
pub struct SurrealSaleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSaleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SaleRepository for SurrealSaleRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> HerdResult<SaleRecord> {
        fetch_sale(&self.db, id)
            .await?
            .ok_or_else(|| HerdError::not_found("sale_record", id))
    }

    async fn list_by_animal(&self, animal_id: Uuid) -> HerdResult<Vec<SaleRecord>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM sale_record \
                 WHERE animal_id = $animal_id ORDER BY created_at ASC",
            )
            .bind(("animal_id", animal_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SaleRow> = result.take(0).map_err(DbError::from)?;
        let sales = rows
            .into_iter()
            .map(SaleRow::try_into_sale)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(sales)
    }
}
