//! Herdbook schema and its versioned migrations.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as strings
//! and every cross-entity reference is a UUID string pointing at `animal`
//! or `habitat`. Enums are stored as their variant names; required enum
//! fields carry ASSERT constraints.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "herd_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Animals
-- =======================================================================
DEFINE TABLE animal SCHEMAFULL;
DEFINE FIELD tag_number ON TABLE animal TYPE string;
DEFINE FIELD detection_tag ON TABLE animal TYPE option<string>;
DEFINE FIELD category ON TABLE animal TYPE string \
    ASSERT $value IN ['Cow', 'Heifer', 'Bull', 'Steer', 'Calf'];
DEFINE FIELD purpose ON TABLE animal TYPE string \
    ASSERT $value IN ['Breeding', 'Slaughter'];
DEFINE FIELD test_result ON TABLE animal TYPE option<string>;
DEFINE FIELD pregnancy_status ON TABLE animal TYPE string \
    ASSERT $value IN ['Unknown', 'Pregnant', 'NotPregnant'];
DEFINE FIELD habitat_id ON TABLE animal TYPE option<string>;
DEFINE FIELD sale_status ON TABLE animal TYPE option<string>;
DEFINE FIELD sale_price_cents ON TABLE animal TYPE option<int>;
DEFINE FIELD sold_at ON TABLE animal TYPE option<datetime>;
DEFINE FIELD status ON TABLE animal TYPE string \
    ASSERT $value IN ['Active', 'Retired'];
DEFINE FIELD created_at ON TABLE animal TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE animal TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_animal_tag_number ON TABLE animal \
    COLUMNS tag_number UNIQUE;
DEFINE INDEX idx_animal_detection_tag ON TABLE animal \
    COLUMNS detection_tag;
DEFINE INDEX idx_animal_habitat ON TABLE animal COLUMNS habitat_id;

-- =======================================================================
-- Diagnostic tests
-- =======================================================================
DEFINE TABLE diagnostic_test SCHEMAFULL;
DEFINE FIELD animal_id ON TABLE diagnostic_test TYPE string;
DEFINE FIELD tag_number ON TABLE diagnostic_test TYPE string;
DEFINE FIELD detection_tag ON TABLE diagnostic_test TYPE string;
DEFINE FIELD sample_date ON TABLE diagnostic_test TYPE datetime;
DEFINE FIELD status ON TABLE diagnostic_test TYPE string \
    ASSERT $value IN ['Pending', 'Finalized'];
DEFINE FIELD result ON TABLE diagnostic_test TYPE option<string>;
DEFINE FIELD result_date ON TABLE diagnostic_test TYPE option<datetime>;
DEFINE FIELD notes ON TABLE diagnostic_test TYPE option<string>;
DEFINE FIELD created_at ON TABLE diagnostic_test TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE diagnostic_test TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_test_animal_status ON TABLE diagnostic_test \
    COLUMNS animal_id, status;

-- =======================================================================
-- Habitats
-- =======================================================================
DEFINE TABLE habitat SCHEMAFULL;
DEFINE FIELD name ON TABLE habitat TYPE string;
DEFINE FIELD kind ON TABLE habitat TYPE string \
    ASSERT $value IN ['Shelter', 'Paddock'];
DEFINE FIELD capacity ON TABLE habitat TYPE option<int>;
DEFINE FIELD status ON TABLE habitat TYPE string \
    ASSERT $value IN ['Active', 'Inactive'];
DEFINE FIELD created_at ON TABLE habitat TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE habitat TYPE datetime \
    DEFAULT time::now();

-- One assignment per animal; occupancy is the row count per habitat.
DEFINE TABLE habitat_assignment SCHEMAFULL;
DEFINE FIELD habitat_id ON TABLE habitat_assignment TYPE string;
DEFINE FIELD animal_id ON TABLE habitat_assignment TYPE string;
DEFINE FIELD assigned_at ON TABLE habitat_assignment TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_assignment_animal ON TABLE habitat_assignment \
    COLUMNS animal_id UNIQUE;
DEFINE INDEX idx_assignment_habitat ON TABLE habitat_assignment \
    COLUMNS habitat_id;

DEFINE TABLE habitat_transfer SCHEMAFULL;
DEFINE FIELD animal_id ON TABLE habitat_transfer TYPE string;
DEFINE FIELD from_habitat_id ON TABLE habitat_transfer \
    TYPE option<string>;
DEFINE FIELD to_habitat_id ON TABLE habitat_transfer TYPE string;
DEFINE FIELD reason ON TABLE habitat_transfer TYPE option<string>;
DEFINE FIELD actor_id ON TABLE habitat_transfer TYPE string;
DEFINE FIELD transferred_at ON TABLE habitat_transfer TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_transfer_animal ON TABLE habitat_transfer \
    COLUMNS animal_id, transferred_at;

-- =======================================================================
-- Sale records
-- =======================================================================
DEFINE TABLE sale_record SCHEMAFULL;
DEFINE FIELD animal_id ON TABLE sale_record TYPE string;
DEFINE FIELD sale_type ON TABLE sale_record TYPE string \
    ASSERT $value IN ['Breeding', 'Slaughter'];
DEFINE FIELD status ON TABLE sale_record TYPE string \
    ASSERT $value IN ['Pending', 'Completed', 'Cancelled'];
DEFINE FIELD price_cents ON TABLE sale_record TYPE int;
DEFINE FIELD counterparty ON TABLE sale_record TYPE string;
DEFINE FIELD approved_by ON TABLE sale_record TYPE option<string>;
DEFINE FIELD approved_at ON TABLE sale_record TYPE option<datetime>;
DEFINE FIELD approval_notes ON TABLE sale_record TYPE option<string>;
DEFINE FIELD invoice_number ON TABLE sale_record TYPE option<string>;
DEFINE FIELD cancellation_reason ON TABLE sale_record \
    TYPE option<string>;
DEFINE FIELD cancelled_at ON TABLE sale_record TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE sale_record TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE sale_record TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_sale_animal_status ON TABLE sale_record \
    COLUMNS animal_id, status;

-- =======================================================================
-- Audit Log (append-only)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD actor_id ON TABLE audit_log TYPE string;
DEFINE FIELD actor_type ON TABLE audit_log TYPE string \
    ASSERT $value IN ['User', 'ServiceAccount', 'System'];
DEFINE FIELD action ON TABLE audit_log TYPE string;
DEFINE FIELD entity_type ON TABLE audit_log TYPE string \
    ASSERT $value IN ['animal', 'diagnostic_test', 'habitat', \
    'sale_record'];
DEFINE FIELD entity_id ON TABLE audit_log TYPE string;
DEFINE FIELD outcome ON TABLE audit_log TYPE string \
    ASSERT $value IN ['Success', 'Degraded'];
DEFINE FIELD changes ON TABLE audit_log TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_entity ON TABLE audit_log \
    COLUMNS entity_type, entity_id, timestamp;
DEFINE INDEX idx_audit_actor ON TABLE audit_log COLUMNS actor_id;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Bring the schema up to the latest version.
///
/// Each pending migration runs in its own transaction together with the
/// `_migration` row that records it, so a failed step leaves the recorded
/// version unchanged and is retried on the next start.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let applied = applied_version(db).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        info!(version = applied, "Schema up to date");
        return Ok(());
    }

    for migration in pending {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying schema migration"
        );
        let sql = format!(
            "BEGIN TRANSACTION;\n{}\n\
             CREATE _migration SET version = $version, name = $name;\n\
             COMMIT TRANSACTION;",
            migration.sql
        );
        db.query(sql)
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "schema v{} ({}) was not applied: {e}",
                    migration.version, migration.name
                ))
            })?;
    }

    Ok(())
}

async fn applied_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut response = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let rows: Vec<MigrationRecord> = response.take(0)?;
    Ok(rows.first().map_or(0, |r| r.version))
}

/// Latest schema version known to this build.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}
