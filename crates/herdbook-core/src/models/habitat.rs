//! Habitat (shelter / paddock) domain model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HabitatKind {
    Shelter,
    Paddock,
}

impl HabitatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shelter => "Shelter",
            Self::Paddock => "Paddock",
        }
    }
}

impl FromStr for HabitatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Shelter" => Ok(Self::Shelter),
            "Paddock" => Ok(Self::Paddock),
            other => Err(format!("unknown habitat kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HabitatStatus {
    Active,
    Inactive,
}

impl HabitatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
        }
    }
}

impl FromStr for HabitatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown habitat status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Habitat {
    pub id: Uuid,
    pub name: String,
    pub kind: HabitatKind,
    /// Maximum number of assigned animals; `None` means unbounded.
    pub capacity: Option<u32>,
    pub status: HabitatStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Habitat {
    /// Whether `incoming` more animals fit next to `occupancy` current ones.
    pub fn admits(&self, occupancy: u64, incoming: u64) -> bool {
        match self.capacity {
            Some(capacity) => occupancy + incoming <= u64::from(capacity),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHabitat {
    pub name: String,
    pub kind: HabitatKind,
    pub capacity: Option<u32>,
}

/// Current occupancy of a habitat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Occupancy {
    pub habitat_id: Uuid,
    pub occupied: u64,
    pub capacity: Option<u32>,
}

impl Occupancy {
    /// Remaining free places, `None` when unbounded.
    pub fn remaining(&self) -> Option<u64> {
        self.capacity
            .map(|capacity| u64::from(capacity).saturating_sub(self.occupied))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitatAssignment {
    pub id: Uuid,
    pub habitat_id: Uuid,
    pub animal_id: Uuid,
    pub assigned_at: DateTime<Utc>,
}

/// One row of the transfer-history ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitatTransfer {
    pub id: Uuid,
    pub animal_id: Uuid,
    pub from_habitat_id: Option<Uuid>,
    pub to_habitat_id: Uuid,
    pub reason: Option<String>,
    pub actor_id: String,
    pub transferred_at: DateTime<Utc>,
}
