//! Animal domain model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::diagnostic_test::TestResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnimalCategory {
    Cow,
    Heifer,
    Bull,
    Steer,
    Calf,
}

impl AnimalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cow => "Cow",
            Self::Heifer => "Heifer",
            Self::Bull => "Bull",
            Self::Steer => "Steer",
            Self::Calf => "Calf",
        }
    }
}

impl FromStr for AnimalCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cow" => Ok(Self::Cow),
            "Heifer" => Ok(Self::Heifer),
            "Bull" => Ok(Self::Bull),
            "Steer" => Ok(Self::Steer),
            "Calf" => Ok(Self::Calf),
            other => Err(format!("unknown animal category: {other}")),
        }
    }
}

/// Intended disposition of an animal, driven by diagnostic outcomes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Purpose {
    Breeding,
    Slaughter,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breeding => "Breeding",
            Self::Slaughter => "Slaughter",
        }
    }
}

impl FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Breeding" => Ok(Self::Breeding),
            "Slaughter" => Ok(Self::Slaughter),
            other => Err(format!("unknown purpose: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PregnancyStatus {
    Unknown,
    Pregnant,
    NotPregnant,
}

impl PregnancyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Pregnant => "Pregnant",
            Self::NotPregnant => "NotPregnant",
        }
    }
}

impl FromStr for PregnancyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unknown" => Ok(Self::Unknown),
            "Pregnant" => Ok(Self::Pregnant),
            "NotPregnant" => Ok(Self::NotPregnant),
            other => Err(format!("unknown pregnancy status: {other}")),
        }
    }
}

/// Sale status as seen from the animal record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnimalSaleStatus {
    Pending,
    Listed,
    Sold,
    Cancelled,
}

impl AnimalSaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Listed => "Listed",
            Self::Sold => "Sold",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl FromStr for AnimalSaleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Listed" => Ok(Self::Listed),
            "Sold" => Ok(Self::Sold),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown sale status: {other}")),
        }
    }
}

/// Animals are retired rather than deleted once anything references them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnimalStatus {
    Active,
    Retired,
}

impl AnimalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Retired => "Retired",
        }
    }
}

impl FromStr for AnimalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Retired" => Ok(Self::Retired),
            other => Err(format!("unknown animal status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Animal {
    pub id: Uuid,
    /// Permanent ear tag; never changes after registration.
    pub tag_number: String,
    /// Temporary identifier assigned when a sample is taken.
    pub detection_tag: Option<String>,
    pub category: AnimalCategory,
    pub purpose: Purpose,
    /// `None` until the first sample is finalized.
    pub test_result: Option<TestResult>,
    pub pregnancy_status: PregnancyStatus,
    pub habitat_id: Option<Uuid>,
    pub sale_status: Option<AnimalSaleStatus>,
    pub sale_price_cents: Option<i64>,
    pub sold_at: Option<DateTime<Utc>>,
    pub status: AnimalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Animal {
    pub fn is_active(&self) -> bool {
        self.status == AnimalStatus::Active
    }
}

/// Registry-owned fields. Derived status fields are written only by the
/// manager that owns them, through [`AnimalChanges`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateAnimal {
    pub category: Option<AnimalCategory>,
    pub pregnancy_status: Option<PregnancyStatus>,
}

/// Field-level patch staged inside a unit of work.
///
/// `Some(Some(v))` = set, `Some(None)` = clear, `None` = no change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimalChanges {
    pub category: Option<AnimalCategory>,
    pub pregnancy_status: Option<PregnancyStatus>,
    pub detection_tag: Option<Option<String>>,
    pub purpose: Option<Purpose>,
    pub test_result: Option<TestResult>,
    pub habitat_id: Option<Option<Uuid>>,
    pub sale_status: Option<AnimalSaleStatus>,
    pub sale_price_cents: Option<i64>,
    pub sold_at: Option<DateTime<Utc>>,
    pub status: Option<AnimalStatus>,
}

impl AnimalChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch to an in-memory copy, used for audit `after` snapshots.
    pub fn apply_to(&self, animal: &mut Animal) {
        if let Some(category) = self.category {
            animal.category = category;
        }
        if let Some(pregnancy_status) = self.pregnancy_status {
            animal.pregnancy_status = pregnancy_status;
        }
        if let Some(detection_tag) = &self.detection_tag {
            animal.detection_tag = detection_tag.clone();
        }
        if let Some(purpose) = self.purpose {
            animal.purpose = purpose;
        }
        if let Some(test_result) = self.test_result {
            animal.test_result = Some(test_result);
        }
        if let Some(habitat_id) = self.habitat_id {
            animal.habitat_id = habitat_id;
        }
        if let Some(sale_status) = self.sale_status {
            animal.sale_status = Some(sale_status);
        }
        if let Some(price) = self.sale_price_cents {
            animal.sale_price_cents = Some(price);
        }
        if let Some(sold_at) = self.sold_at {
            animal.sold_at = Some(sold_at);
        }
        if let Some(status) = self.status {
            animal.status = status;
        }
    }
}

impl From<UpdateAnimal> for AnimalChanges {
    fn from(update: UpdateAnimal) -> Self {
        Self {
            category: update.category,
            pregnancy_status: update.pregnancy_status,
            ..Default::default()
        }
    }
}
