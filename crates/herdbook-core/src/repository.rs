//! Repository trait definitions for data access abstraction.
//!
//! Repositories are the plain read side of storage: keyed lookups and
//! simple field-equality queries. Entity writes go through
//! [`crate::unit_of_work`]; the audit log's `append` is the only write here.

use uuid::Uuid;

use crate::error::HerdResult;
use crate::models::{
    animal::Animal,
    audit::{AuditEntity, AuditLogEntry, CreateAuditLogEntry},
    diagnostic_test::DiagnosticTest,
    habitat::{Habitat, HabitatAssignment, HabitatTransfer, Occupancy},
    sale::SaleRecord,
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Animal registry
// ---------------------------------------------------------------------------

/// Read side of the registry. Animals are created, edited, retired and
/// deleted only inside a unit of work, see [`crate::unit_of_work`].
pub trait AnimalRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = HerdResult<Animal>> + Send;
    fn get_by_tag_number(
        &self,
        tag_number: &str,
    ) -> impl Future<Output = HerdResult<Animal>> + Send;
    /// Animal currently holding `detection_tag`, if any.
    fn find_by_detection_tag(
        &self,
        detection_tag: &str,
    ) -> impl Future<Output = HerdResult<Option<Animal>>> + Send;
    fn list_by_habitat(
        &self,
        habitat_id: Uuid,
    ) -> impl Future<Output = HerdResult<Vec<Animal>>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = HerdResult<PaginatedResult<Animal>>> + Send;
}

// ---------------------------------------------------------------------------
// Diagnostic tests
// ---------------------------------------------------------------------------

pub trait DiagnosticTestRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = HerdResult<DiagnosticTest>> + Send;
    fn list_by_animal(
        &self,
        animal_id: Uuid,
    ) -> impl Future<Output = HerdResult<Vec<DiagnosticTest>>> + Send;
    fn find_open_for_animal(
        &self,
        animal_id: Uuid,
    ) -> impl Future<Output = HerdResult<Option<DiagnosticTest>>> + Send;
}

// ---------------------------------------------------------------------------
// Habitats
// ---------------------------------------------------------------------------

pub trait HabitatRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = HerdResult<Habitat>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = HerdResult<PaginatedResult<Habitat>>> + Send;
    fn occupancy(&self, habitat_id: Uuid) -> impl Future<Output = HerdResult<Occupancy>> + Send;
    fn list_assignments(
        &self,
        habitat_id: Uuid,
    ) -> impl Future<Output = HerdResult<Vec<HabitatAssignment>>> + Send;
    /// Transfer history of one animal, oldest first.
    fn transfer_history(
        &self,
        animal_id: Uuid,
    ) -> impl Future<Output = HerdResult<Vec<HabitatTransfer>>> + Send;
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

pub trait SaleRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = HerdResult<SaleRecord>> + Send;
    fn list_by_animal(
        &self,
        animal_id: Uuid,
    ) -> impl Future<Output = HerdResult<Vec<SaleRecord>>> + Send;
}

// ---------------------------------------------------------------------------
// Audit log (append-only)
// ---------------------------------------------------------------------------

/// Append-only sink for audit entries.
pub trait AuditLogRepository: Send + Sync {
    fn append(
        &self,
        entry: CreateAuditLogEntry,
    ) -> impl Future<Output = HerdResult<AuditLogEntry>> + Send;
    fn list_for_entity(
        &self,
        entity_type: AuditEntity,
        entity_id: &str,
    ) -> impl Future<Output = HerdResult<Vec<AuditLogEntry>>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = HerdResult<PaginatedResult<AuditLogEntry>>> + Send;
}
