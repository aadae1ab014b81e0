//! SurrealDB implementation of [`HabitatRepository`].

use chrono::{DateTime, Utc};
use herdbook_core::error::{HerdError, HerdResult};
use herdbook_core::models::habitat::{Habitat, HabitatAssignment, HabitatTransfer, Occupancy};
use herdbook_core::repository::{HabitatRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, first_count, parse_enum, parse_opt_uuid, parse_uuid};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
pub(crate) struct HabitatRow {
    record_id: String,
    name: String,
    kind: String,
    capacity: Option<i64>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl HabitatRow {
    fn try_into_habitat(self) -> Result<Habitat, DbError> {
        let capacity = self
            .capacity
            .map(u32::try_from)
            .transpose()
            .map_err(|e| DbError::Corrupt(format!("invalid habitat capacity: {e}")))?;
        Ok(Habitat {
            id: parse_uuid(&self.record_id, "habitat")?,
            name: self.name,
            kind: parse_enum(&self.kind)?,
            capacity,
            status: parse_enum(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct AssignmentRow {
    record_id: String,
    habitat_id: String,
    animal_id: String,
    assigned_at: DateTime<Utc>,
}

impl AssignmentRow {
    fn try_into_assignment(self) -> Result<HabitatAssignment, DbError> {
        Ok(HabitatAssignment {
            id: parse_uuid(&self.record_id, "assignment")?,
            habitat_id: parse_uuid(&self.habitat_id, "habitat")?,
            animal_id: parse_uuid(&self.animal_id, "animal")?,
            assigned_at: self.assigned_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct TransferRow {
    record_id: String,
    animal_id: String,
    from_habitat_id: Option<String>,
    to_habitat_id: String,
    reason: Option<String>,
    actor_id: String,
    transferred_at: DateTime<Utc>,
}

impl TransferRow {
    fn try_into_transfer(self) -> Result<HabitatTransfer, DbError> {
        Ok(HabitatTransfer {
            id: parse_uuid(&self.record_id, "transfer")?,
            animal_id: parse_uuid(&self.animal_id, "animal")?,
            from_habitat_id: parse_opt_uuid(self.from_habitat_id.as_deref(), "habitat")?,
            to_habitat_id: parse_uuid(&self.to_habitat_id, "habitat")?,
            reason: self.reason,
            actor_id: self.actor_id,
            transferred_at: self.transferred_at,
        })
    }
}

pub(crate) async fn fetch_habitat<C: Connection>(
    db: &Surreal<C>,
    id: Uuid,
) -> Result<Option<Habitat>, DbError> {
    let mut result = db
        .query("SELECT meta::id(id) AS record_id, * FROM type::record('habitat', $id)")
        .bind(("id", id.to_string()))
        .await?;
    let rows: Vec<HabitatRow> = result.take(0)?;
    rows.into_iter()
        .next()
        .map(HabitatRow::try_into_habitat)
        .transpose()
}

/// Number of assignments currently held by the habitat.
pub(crate) async fn count_occupancy<C: Connection>(
    db: &Surreal<C>,
    habitat_id: Uuid,
) -> Result<u64, DbError> {
    let mut result = db
        .query(
            "SELECT count() AS total FROM habitat_assignment \
             WHERE habitat_id = $habitat_id GROUP ALL",
        )
        .bind(("habitat_id", habitat_id.to_string()))
        .await?;
    let rows: Vec<CountRow> = result.take(0)?;
    Ok(first_count(rows))
}

/// SurrealDB implementation of the Habitat repository.
#[derive(Clone)]
pub struct SurrealHabitatRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealHabitatRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> HabitatRepository for SurrealHabitatRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> HerdResult<Habitat> {
        fetch_habitat(&self.db, id)
            .await?
            .ok_or_else(|| HerdError::not_found("habitat", id))
    }

    async fn list(&self, pagination: Pagination) -> HerdResult<PaginatedResult<Habitat>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM habitat GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = first_count(count_rows);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM habitat \
                 ORDER BY name ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<HabitatRow> = result.take(0).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(HabitatRow::try_into_habitat)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn occupancy(&self, habitat_id: Uuid) -> HerdResult<Occupancy> {
        let habitat = self.get_by_id(habitat_id).await?;
        let occupied = count_occupancy(&self.db, habitat_id).await?;
        Ok(Occupancy {
            habitat_id,
            occupied,
            capacity: habitat.capacity,
        })
    }

    async fn list_assignments(&self, habitat_id: Uuid) -> HerdResult<Vec<HabitatAssignment>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM habitat_assignment \
                 WHERE habitat_id = $habitat_id ORDER BY assigned_at ASC",
            )
            .bind(("habitat_id", habitat_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<AssignmentRow> = result.take(0).map_err(DbError::from)?;
        let assignments = rows
            .into_iter()
            .map(AssignmentRow::try_into_assignment)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(assignments)
    }

    async fn transfer_history(&self, animal_id: Uuid) -> HerdResult<Vec<HabitatTransfer>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM habitat_transfer \
                 WHERE animal_id = $animal_id ORDER BY transferred_at ASC",
            )
            .bind(("animal_id", animal_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TransferRow> = result.take(0).map_err(DbError::from)?;
        let transfers = rows
            .into_iter()
            .map(TransferRow::try_into_transfer)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(transfers)
    }
}
