//! Sale record domain model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SaleType {
    Breeding,
    Slaughter,
}

impl SaleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breeding => "Breeding",
            Self::Slaughter => "Slaughter",
        }
    }
}

impl FromStr for SaleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Breeding" => Ok(Self::Breeding),
            "Slaughter" => Ok(Self::Slaughter),
            other => Err(format!("unknown sale type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SaleStatus {
    Pending,
    Completed,
    Cancelled,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl FromStr for SaleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown sale status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaleApproval {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub invoice_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaleCancellation {
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: Uuid,
    pub animal_id: Uuid,
    pub sale_type: SaleType,
    pub status: SaleStatus,
    /// Price in the smallest currency unit.
    pub price_cents: i64,
    pub counterparty: String,
    pub approval: Option<SaleApproval>,
    pub cancellation: Option<SaleCancellation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_open() {
        assert!(!SaleStatus::Pending.is_terminal());
        assert!(SaleStatus::Completed.is_terminal());
        assert!(SaleStatus::Cancelled.is_terminal());
    }
}
