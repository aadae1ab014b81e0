//! SurrealDB repository implementations.
//!
//! Each module owns the row type of its table and exposes `fetch_*`
//! helpers that the coordinator reuses for reads inside a unit of work.

use std::str::FromStr;

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

pub(crate) mod animal;
pub(crate) mod audit;
pub(crate) mod habitat;
pub(crate) mod sale;

pub use animal::SurrealAnimalRepository;
pub use audit::SurrealAuditLogRepository;
pub use diagnostic_test::SurrealDiagnosticTestRepository;
pub use habitat::SurrealHabitatRepository;
pub use sale::SurrealSaleRepository;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}

pub(crate) fn parse_uuid(value: &str, what: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Corrupt(format!("invalid {what} UUID: {e}")))
}

pub(crate) fn parse_opt_uuid(value: Option<&str>, what: &str) -> Result<Option<Uuid>, DbError> {
    value.map(|v| parse_uuid(v, what)).transpose()
}

pub(crate) fn parse_enum<T: FromStr<Err = String>>(value: &str) -> Result<T, DbError> {
    value.parse().map_err(DbError::Corrupt)
}

pub(crate) fn parse_opt_enum<T: FromStr<Err = String>>(
    value: Option<&str>,
) -> Result<Option<T>, DbError> {
    value.map(parse_enum).transpose()
}

pub(crate) fn first_count(rows: Vec<CountRow>) -> u64 {
    rows.first().map(|r| r.total).unwrap_or(0)
}
