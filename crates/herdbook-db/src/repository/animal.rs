//! SurrealDB implementation of [`AnimalRepository`].

use chrono::{DateTime, Utc};
use herdbook_core::error::{HerdError, HerdResult};
use herdbook_core::models::animal::Animal;
use herdbook_core::repository::{AnimalRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, first_count, parse_enum, parse_opt_enum, parse_opt_uuid, parse_uuid};
use crate::error::DbError;

/// DB-side row struct, including the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
pub(crate) struct AnimalRow {
    record_id: String,
    tag_number: String,
    detection_tag: Option<String>,
    category: String,
    purpose: String,
    test_result: Option<String>,
    pregnancy_status: String,
    habitat_id: Option<String>,
    sale_status: Option<String>,
    sale_price_cents: Option<i64>,
    sold_at: Option<DateTime<Utc>>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AnimalRow {
    fn try_into_animal(self) -> Result<Animal, DbError> {
        Ok(Animal {
            id: parse_uuid(&self.record_id, "animal")?,
            tag_number: self.tag_number,
            detection_tag: self.detection_tag,
            category: parse_enum(&self.category)?,
            purpose: parse_enum(&self.purpose)?,
            test_result: parse_opt_enum(self.test_result.as_deref())?,
            pregnancy_status: parse_enum(&self.pregnancy_status)?,
            habitat_id: parse_opt_uuid(self.habitat_id.as_deref(), "habitat")?,
            sale_status: parse_opt_enum(self.sale_status.as_deref())?,
            sale_price_cents: self.sale_price_cents,
            sold_at: self.sold_at,
            status: parse_enum(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn collect(rows: Vec<AnimalRow>) -> Result<Vec<Animal>, DbError> {
    rows.into_iter().map(AnimalRow::try_into_animal).collect()
}

pub(crate) async fn fetch_animal<C: Connection>(
    db: &Surreal<C>,
    id: Uuid,
) -> Result<Option<Animal>, DbError> {
    let mut result = db
        .query("SELECT meta::id(id) AS record_id, * FROM type::record('animal', $id)")
        .bind(("id", id.to_string()))
        .await?;
    let rows: Vec<AnimalRow> = result.take(0)?;
    rows.into_iter()
        .next()
        .map(AnimalRow::try_into_animal)
        .transpose()
}

pub(crate) async fn fetch_animal_by_tag_number<C: Connection>(
    db: &Surreal<C>,
    tag_number: &str,
) -> Result<Option<Animal>, DbError> {
    let mut result = db
        .query(
            "SELECT meta::id(id) AS record_id, * FROM animal \
             WHERE tag_number = $tag_number LIMIT 1",
        )
        .bind(("tag_number", tag_number.to_string()))
        .await?;
    let rows: Vec<AnimalRow> = result.take(0)?;
    rows.into_iter()
        .next()
        .map(AnimalRow::try_into_animal)
        .transpose()
}

pub(crate) async fn fetch_animal_by_detection_tag<C: Connection>(
    db: &Surreal<C>,
    detection_tag: &str,
) -> Result<Option<Animal>, DbError> {
    let mut result = db
        .query(
            "SELECT meta::id(id) AS record_id, * FROM animal \
             WHERE detection_tag = $detection_tag LIMIT 1",
        )
        .bind(("detection_tag", detection_tag.to_string()))
        .await?;
    let rows: Vec<AnimalRow> = result.take(0)?;
    rows.into_iter()
        .next()
        .map(AnimalRow::try_into_animal)
        .transpose()
}

/// Number of diagnostic tests, sale records and transfers pointing at the animal.
pub(crate) async fn count_references<C: Connection>(
    db: &Surreal<C>,
    animal_id: Uuid,
) -> Result<u64, DbError> {
    let mut result = db
        .query(
            "SELECT count() AS total FROM diagnostic_test \
             WHERE animal_id = $animal_id GROUP ALL; \
             SELECT count() AS total FROM sale_record \
             WHERE animal_id = $animal_id GROUP ALL; \
             SELECT count() AS total FROM habitat_transfer \
             WHERE animal_id = $animal_id GROUP ALL;",
        )
        .bind(("animal_id", animal_id.to_string()))
        .await?;
    let tests: Vec<CountRow> = result.take(0)?;
    let sales: Vec<CountRow> = result.take(1)?;
    let transfers: Vec<CountRow> = result.take(2)?;
    Ok(first_count(tests) + first_count(sales) + first_count(transfers))
}

/// SurrealDB implementation of the Animal repository.
#[derive(Clone)]
pub struct SurrealAnimalRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAnimalRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AnimalRepository for SurrealAnimalRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> HerdResult<Animal> {
        fetch_animal(&self.db, id)
            .await?
            .ok_or_else(|| HerdError::not_found("animal", id))
    }

    async fn get_by_tag_number(&self, tag_number: &str) -> HerdResult<Animal> {
        fetch_animal_by_tag_number(&self.db, tag_number)
            .await?
            .ok_or_else(|| HerdError::not_found("animal", format!("tag_number={tag_number}")))
    }

    async fn find_by_detection_tag(&self, detection_tag: &str) -> HerdResult<Option<Animal>> {
        Ok(fetch_animal_by_detection_tag(&self.db, detection_tag).await?)
    }

    async fn list_by_habitat(&self, habitat_id: Uuid) -> HerdResult<Vec<Animal>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM animal \
                 WHERE habitat_id = $habitat_id ORDER BY tag_number ASC",
            )
            .bind(("habitat_id", habitat_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<AnimalRow> = result.take(0).map_err(DbError::from)?;
        Ok(collect(rows)?)
    }

    async fn list(&self, pagination: Pagination) -> HerdResult<PaginatedResult<Animal>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM animal GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = first_count(count_rows);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM animal \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<AnimalRow> = result.take(0).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: collect(rows)?,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
