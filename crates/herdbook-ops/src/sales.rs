//! Sale Lifecycle Manager.
//!
//! A sale moves PENDING → COMPLETED or PENDING → CANCELLED; both are
//! terminal. Approval also writes the animal's sale fields in the same unit.

use chrono::Utc;
use herdbook_core::error::{HerdError, HerdResult};
use herdbook_core::models::animal::{AnimalChanges, AnimalSaleStatus};
use herdbook_core::models::audit::{AuditAction, AuditEntity};
use herdbook_core::models::sale::{
    SaleApproval, SaleCancellation, SaleRecord, SaleStatus, SaleType,
};
use herdbook_core::repository::AuditLogRepository;
use herdbook_core::{ActorContext, LockKey, LockSet, TransactionCoordinator, UnitOfWork};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::{self, AuditRecorder, snapshot};
use crate::validate;

/// Input for [`SaleManager::create_sale`].
#[derive(Debug, Clone)]
pub struct CreateSale {
    pub animal_id: Uuid,
    pub sale_type: SaleType,
    /// Price in the smallest currency unit.
    pub price_cents: i64,
    pub counterparty: String,
}

impl CreateSale {
    fn validated(self) -> HerdResult<Self> {
        if self.price_cents < 0 {
            return Err(HerdError::validation("price must not be negative"));
        }
        let counterparty = validate::required("counterparty", &self.counterparty)?;
        Ok(Self {
            counterparty,
            ..self
        })
    }
}

/// Input for [`SaleManager::approve`]. The approver is the acting user.
#[derive(Debug, Clone, Default)]
pub struct ApproveSale {
    pub sale_id: Uuid,
    pub notes: Option<String>,
    pub invoice_number: Option<String>,
}

/// Input for [`SaleManager::cancel`].
#[derive(Debug, Clone)]
pub struct CancelSale {
    pub sale_id: Uuid,
    pub reason: String,
}

fn require_pending(sale: &SaleRecord) -> HerdResult<()> {
    if sale.status.is_terminal() {
        return Err(HerdError::conflict(format!(
            "sale {} is already {}",
            sale.id,
            sale.status.as_str().to_lowercase()
        )));
    }
    Ok(())
}

pub struct SaleManager<C: TransactionCoordinator, S: AuditLogRepository> {
    coordinator: C,
    audit: AuditRecorder<S>,
}

impl<C: TransactionCoordinator, S: AuditLogRepository> SaleManager<C, S> {
    pub fn new(coordinator: C, audit: AuditRecorder<S>) -> Self {
        Self { coordinator, audit }
    }

    /// Open a PENDING sale for an active, unsold animal. The animal itself
    /// is not modified until approval.
    pub async fn create_sale(&self, ctx: &ActorContext, input: CreateSale) -> HerdResult<SaleRecord> {
        let input = input.validated()?;

        let mut unit = self
            .coordinator
            .begin("sale.create", LockSet::new().with(LockKey::Animal(input.animal_id)))
            .await?;

        let animal = unit
            .animal(input.animal_id)
            .await?
            .ok_or_else(|| HerdError::not_found("animal", input.animal_id))?;
        if !animal.is_active() {
            return Err(HerdError::conflict(format!(
                "animal {} is retired",
                animal.tag_number
            )));
        }
        if animal.sale_status == Some(AnimalSaleStatus::Sold) {
            return Err(HerdError::conflict(format!(
                "animal {} is already sold",
                animal.tag_number
            )));
        }
        if let Some(pending) = unit.pending_sale_for_animal(animal.id).await? {
            return Err(HerdError::conflict(format!(
                "animal {} already has pending sale {}",
                animal.tag_number, pending.id
            )));
        }

        let now = Utc::now();
        let sale = SaleRecord {
            id: Uuid::new_v4(),
            animal_id: animal.id,
            sale_type: input.sale_type,
            status: SaleStatus::Pending,
            price_cents: input.price_cents,
            counterparty: input.counterparty,
            approval: None,
            cancellation: None,
            created_at: now,
            updated_at: now,
        };
        unit.insert_sale(&sale);
        unit.commit().await?;

        info!(sale_id = %sale.id, animal_id = %animal.id, "sale created");
        self.audit
            .record(audit::entry(
                ctx,
                AuditAction::SaleCreated,
                AuditEntity::SaleRecord,
                sale.id,
                None,
                snapshot(&sale),
            ))
            .await;

        Ok(sale)
    }

    /// Complete a PENDING sale and mark the animal sold, atomically.
    pub async fn approve(&self, ctx: &ActorContext, input: ApproveSale) -> HerdResult<SaleRecord> {
        let notes = validate::optional(input.notes.as_deref());
        let invoice_number = validate::optional(input.invoice_number.as_deref());

        // 1. Resolve the sale's animal, then lock both.
        let animal_id = self.animal_of_sale(input.sale_id).await?;
        let locks = LockSet::new()
            .with(LockKey::Sale(input.sale_id))
            .with(LockKey::Animal(animal_id));
        let mut unit = self.coordinator.begin("sale.approve", locks).await?;

        // 2. Preconditions.
        let sale = unit
            .sale(input.sale_id)
            .await?
            .ok_or_else(|| HerdError::not_found("sale_record", input.sale_id))?;
        require_pending(&sale)?;
        let animal = unit
            .animal(animal_id)
            .await?
            .ok_or_else(|| HerdError::not_found("animal", animal_id))?;

        // 3. Stage the completion and the animal's sale fields.
        let now = Utc::now();
        let approval = SaleApproval {
            approved_by: ctx.actor_id.clone(),
            approved_at: now,
            notes,
            invoice_number,
        };
        let changes = AnimalChanges {
            sale_status: Some(AnimalSaleStatus::Sold),
            sale_price_cents: Some(sale.price_cents),
            sold_at: Some(now),
            ..Default::default()
        };
        unit.complete_sale(sale.id, &approval);
        unit.update_animal(animal.id, &changes);
        unit.commit().await?;

        let mut completed = sale.clone();
        completed.status = SaleStatus::Completed;
        completed.approval = Some(approval);
        completed.updated_at = now;

        info!(sale_id = %sale.id, animal_id = %animal.id, "sale approved");
        self.audit
            .record(audit::entry(
                ctx,
                AuditAction::SaleApproved,
                AuditEntity::SaleRecord,
                sale.id,
                snapshot(&sale),
                Some(json!({
                    "sale": completed,
                    "animal": {
                        "id": animal.id,
                        "sale_status": AnimalSaleStatus::Sold,
                        "sale_price_cents": sale.price_cents,
                        "sold_at": now,
                    },
                })),
            ))
            .await;

        Ok(completed)
    }

    /// Cancel a PENDING sale. The animal is left untouched.
    pub async fn cancel(&self, ctx: &ActorContext, input: CancelSale) -> HerdResult<SaleRecord> {
        let reason = validate::required("reason", &input.reason)?;

        let mut unit = self
            .coordinator
            .begin("sale.cancel", LockSet::new().with(LockKey::Sale(input.sale_id)))
            .await?;

        let sale = unit
            .sale(input.sale_id)
            .await?
            .ok_or_else(|| HerdError::not_found("sale_record", input.sale_id))?;
        require_pending(&sale)?;

        let now = Utc::now();
        let cancellation = SaleCancellation {
            reason,
            cancelled_at: now,
        };
        unit.cancel_sale(sale.id, &cancellation);
        unit.commit().await?;

        let mut cancelled = sale.clone();
        cancelled.status = SaleStatus::Cancelled;
        cancelled.cancellation = Some(cancellation);
        cancelled.updated_at = now;

        info!(sale_id = %sale.id, "sale cancelled");
        self.audit
            .record(audit::entry(
                ctx,
                AuditAction::SaleCancelled,
                AuditEntity::SaleRecord,
                sale.id,
                snapshot(&sale),
                snapshot(&cancelled),
            ))
            .await;

        Ok(cancelled)
    }

    async fn animal_of_sale(&self, sale_id: Uuid) -> HerdResult<Uuid> {
        let mut lookup = self
            .coordinator
            .begin("sale.resolve", LockSet::new().with(LockKey::Sale(sale_id)))
            .await?;
        let sale = lookup.sale(sale_id).await?;
        lookup.rollback().await;
        sale.map(|s| s.animal_id)
            .ok_or_else(|| HerdError::not_found("sale_record", sale_id))
    }
}

#[cfg(test)]
mod tests {
    use herdbook_core::ErrorKind;

    use super::*;

    #[test]
    fn negative_price_is_rejected() {
        let input = CreateSale {
            animal_id: Uuid::new_v4(),
            sale_type: SaleType::Slaughter,
            price_cents: -1,
            counterparty: "Abattoir".into(),
        };
        assert_eq!(input.validated().unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn blank_counterparty_is_rejected() {
        let input = CreateSale {
            animal_id: Uuid::new_v4(),
            sale_type: SaleType::Breeding,
            price_cents: 100,
            counterparty: " ".into(),
        };
        assert!(input.validated().is_err());
    }
}
