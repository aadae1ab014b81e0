//! Audit log domain model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActorType {
    User,
    ServiceAccount,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::ServiceAccount => "ServiceAccount",
            Self::System => "System",
        }
    }
}

impl FromStr for ActorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Self::User),
            "ServiceAccount" => Ok(Self::ServiceAccount),
            "System" => Ok(Self::System),
            other => Err(format!("unknown actor type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    /// The primary write committed but a related record could not be kept
    /// in sync.
    Degraded,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Degraded => "Degraded",
        }
    }
}

impl FromStr for AuditOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Success" => Ok(Self::Success),
            "Degraded" => Ok(Self::Degraded),
            other => Err(format!("unknown audit outcome: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEntity {
    Animal,
    DiagnosticTest,
    Habitat,
    SaleRecord,
}

impl AuditEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Animal => "animal",
            Self::DiagnosticTest => "diagnostic_test",
            Self::Habitat => "habitat",
            Self::SaleRecord => "sale_record",
        }
    }
}

impl FromStr for AuditEntity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "animal" => Ok(Self::Animal),
            "diagnostic_test" => Ok(Self::DiagnosticTest),
            "habitat" => Ok(Self::Habitat),
            "sale_record" => Ok(Self::SaleRecord),
            other => Err(format!("unknown audit entity: {other}")),
        }
    }
}

/// Action codes written to the audit log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditAction {
    AnimalRegistered,
    AnimalUpdated,
    AnimalRetired,
    AnimalDeleted,
    DetectionTagAssigned,
    DetectionTagCleared,
    DiagnosisApplied,
    SampleSubmitted,
    ResultFinalized,
    SampleDeleted,
    HabitatCreated,
    AnimalsAssigned,
    AnimalsReleased,
    AnimalsTransferred,
    AnimalTransferred,
    SaleCreated,
    SaleApproved,
    SaleCancelled,
}

impl AuditAction {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AnimalRegistered => "animal.registered",
            Self::AnimalUpdated => "animal.updated",
            Self::AnimalRetired => "animal.retired",
            Self::AnimalDeleted => "animal.deleted",
            Self::DetectionTagAssigned => "animal.detection_tag_assigned",
            Self::DetectionTagCleared => "animal.detection_tag_cleared",
            Self::DiagnosisApplied => "animal.diagnosis_applied",
            Self::SampleSubmitted => "diagnostic_test.submitted",
            Self::ResultFinalized => "diagnostic_test.finalized",
            Self::SampleDeleted => "diagnostic_test.deleted",
            Self::HabitatCreated => "habitat.created",
            Self::AnimalsAssigned => "habitat.animals_assigned",
            Self::AnimalsReleased => "habitat.animals_released",
            Self::AnimalsTransferred => "habitat.animals_transferred",
            Self::AnimalTransferred => "habitat.animal_transferred",
            Self::SaleCreated => "sale.created",
            Self::SaleApproved => "sale.approved",
            Self::SaleCancelled => "sale.cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: String,
    pub actor_type: ActorType,
    /// Dotted action code, see [`AuditAction::code`].
    pub action: String,
    pub entity_type: AuditEntity,
    pub entity_id: String,
    pub outcome: AuditOutcome,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditLogEntry {
    pub actor_id: String,
    pub actor_type: ActorType,
    pub action: AuditAction,
    pub entity_type: AuditEntity,
    pub entity_id: String,
    pub outcome: AuditOutcome,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}
