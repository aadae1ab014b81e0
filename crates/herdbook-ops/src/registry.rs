//! Animal Registry service: registration, detail edits, retirement and
//! deletion.
//!
//! Derived fields (detection tag, purpose, test result, habitat, sale
//! status) belong to the other managers and are not writable here.

use chrono::Utc;
use herdbook_core::error::{HerdError, HerdResult};
use herdbook_core::models::animal::{
    Animal, AnimalCategory, AnimalChanges, AnimalStatus, PregnancyStatus, Purpose, UpdateAnimal,
};
use herdbook_core::models::audit::{AuditAction, AuditEntity};
use herdbook_core::repository::AuditLogRepository;
use herdbook_core::{ActorContext, LockKey, LockSet, TransactionCoordinator, UnitOfWork};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::{self, AuditRecorder, snapshot};
use crate::validate;

/// Input for [`AnimalRegistry::register`].
#[derive(Debug, Clone)]
pub struct RegisterAnimal {
    pub tag_number: String,
    pub category: AnimalCategory,
    /// Defaults to [`Purpose::Breeding`].
    pub purpose: Option<Purpose>,
    /// Defaults to [`PregnancyStatus::Unknown`].
    pub pregnancy_status: Option<PregnancyStatus>,
}

pub struct AnimalRegistry<C: TransactionCoordinator, S: AuditLogRepository> {
    coordinator: C,
    audit: AuditRecorder<S>,
}

impl<C: TransactionCoordinator, S: AuditLogRepository> AnimalRegistry<C, S> {
    pub fn new(coordinator: C, audit: AuditRecorder<S>) -> Self {
        Self { coordinator, audit }
    }

    pub async fn register(&self, ctx: &ActorContext, input: RegisterAnimal) -> HerdResult<Animal> {
        let tag_number = validate::required("tag_number", &input.tag_number)?;

        let mut unit = self
            .coordinator
            .begin(
                "animal.register",
                LockSet::new().with(LockKey::TagNumber(tag_number.clone())),
            )
            .await?;

        if unit.animal_by_tag_number(&tag_number).await?.is_some() {
            return Err(HerdError::conflict(format!(
                "tag number {tag_number} is already registered"
            )));
        }

        let now = Utc::now();
        let animal = Animal {
            id: Uuid::new_v4(),
            tag_number,
            detection_tag: None,
            category: input.category,
            purpose: input.purpose.unwrap_or(Purpose::Breeding),
            test_result: None,
            pregnancy_status: input.pregnancy_status.unwrap_or(PregnancyStatus::Unknown),
            habitat_id: None,
            sale_status: None,
            sale_price_cents: None,
            sold_at: None,
            status: AnimalStatus::Active,
            created_at: now,
            updated_at: now,
        };
        unit.insert_animal(&animal);
        unit.commit().await?;

        info!(animal_id = %animal.id, tag_number = %animal.tag_number, "animal registered");
        self.audit
            .record(audit::entry(
                ctx,
                AuditAction::AnimalRegistered,
                AuditEntity::Animal,
                animal.id,
                None,
                snapshot(&animal),
            ))
            .await;

        Ok(animal)
    }

    /// Change category and/or pregnancy status of an active animal.
    pub async fn update_details(
        &self,
        ctx: &ActorContext,
        animal_id: Uuid,
        input: UpdateAnimal,
    ) -> HerdResult<Animal> {
        let changes = AnimalChanges::from(input);
        if changes.is_empty() {
            return Err(HerdError::validation("no fields to update"));
        }

        let mut unit = self
            .coordinator
            .begin("animal.update", LockSet::new().with(LockKey::Animal(animal_id)))
            .await?;

        let before = unit
            .animal(animal_id)
            .await?
            .ok_or_else(|| HerdError::not_found("animal", animal_id))?;
        if !before.is_active() {
            return Err(HerdError::conflict(format!(
                "animal {} is retired",
                before.tag_number
            )));
        }

        unit.update_animal(animal_id, &changes);
        unit.commit().await?;

        let mut after = before.clone();
        changes.apply_to(&mut after);
        after.updated_at = Utc::now();

        self.audit
            .record(audit::entry(
                ctx,
                AuditAction::AnimalUpdated,
                AuditEntity::Animal,
                animal_id,
                snapshot(&before),
                snapshot(&after),
            ))
            .await;

        Ok(after)
    }

    /// Retire an animal and release its habitat assignment in one unit.
    pub async fn retire(
        &self,
        ctx: &ActorContext,
        animal_id: Uuid,
        reason: Option<String>,
    ) -> HerdResult<Animal> {
        let reason = validate::optional(reason.as_deref());

        let mut unit = self
            .coordinator
            .begin("animal.retire", LockSet::new().with(LockKey::Animal(animal_id)))
            .await?;

        let before = unit
            .animal(animal_id)
            .await?
            .ok_or_else(|| HerdError::not_found("animal", animal_id))?;
        if !before.is_active() {
            return Err(HerdError::conflict(format!(
                "animal {} is already retired",
                before.tag_number
            )));
        }
        if let Some(sale) = unit.pending_sale_for_animal(animal_id).await? {
            return Err(HerdError::conflict(format!(
                "animal {} has pending sale {}",
                before.tag_number, sale.id
            )));
        }

        let mut changes = AnimalChanges {
            status: Some(AnimalStatus::Retired),
            ..Default::default()
        };
        if before.habitat_id.is_some() {
            changes.habitat_id = Some(None);
            unit.remove_assignment(animal_id);
        }
        unit.update_animal(animal_id, &changes);
        unit.commit().await?;

        let mut after = before.clone();
        changes.apply_to(&mut after);
        after.updated_at = Utc::now();

        info!(animal_id = %animal_id, "animal retired");
        self.audit
            .record(audit::entry(
                ctx,
                AuditAction::AnimalRetired,
                AuditEntity::Animal,
                animal_id,
                Some(json!({ "status": before.status, "habitat_id": before.habitat_id })),
                Some(json!({ "status": after.status, "habitat_id": after.habitat_id, "reason": reason })),
            ))
            .await;

        Ok(after)
    }

    /// Hard-delete an animal nothing refers to.
    pub async fn delete(&self, ctx: &ActorContext, animal_id: Uuid) -> HerdResult<()> {
        let mut unit = self
            .coordinator
            .begin("animal.delete", LockSet::new().with(LockKey::Animal(animal_id)))
            .await?;

        let animal = unit
            .animal(animal_id)
            .await?
            .ok_or_else(|| HerdError::not_found("animal", animal_id))?;
        let references = unit.animal_reference_count(animal_id).await?;
        if references > 0 {
            return Err(HerdError::conflict(format!(
                "animal {} has {references} test, sale or transfer records; retire it instead",
                animal.tag_number
            )));
        }

        unit.delete_animal(animal_id);
        unit.commit().await?;

        info!(animal_id = %animal_id, "animal deleted");
        self.audit
            .record(audit::entry(
                ctx,
                AuditAction::AnimalDeleted,
                AuditEntity::Animal,
                animal_id,
                snapshot(&animal),
                None,
            ))
            .await;

        Ok(())
    }
}
