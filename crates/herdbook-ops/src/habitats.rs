//! Habitat Capacity Manager: shelters and paddocks, the animals assigned
//! to them and the transfer history.
//!
//! Occupancy is the number of assignment rows of a habitat. Every check
//! against capacity runs under a lock on the habitat being filled, and the
//! assignment rows, the animals' `habitat_id` and the history rows of one
//! call are committed together.

use chrono::Utc;
use herdbook_core::error::{HerdError, HerdResult};
use herdbook_core::models::animal::{Animal, AnimalChanges};
use herdbook_core::models::audit::{AuditAction, AuditEntity};
use herdbook_core::models::habitat::{
    CreateHabitat, Habitat, HabitatAssignment, HabitatStatus, HabitatTransfer, Occupancy,
};
use herdbook_core::repository::AuditLogRepository;
use herdbook_core::{ActorContext, LockKey, LockSet, TransactionCoordinator, UnitOfWork};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::{self, AuditRecorder, snapshot};
use crate::config::OpsConfig;
use crate::validate;

/// Input for [`HabitatManager::assign_animals`].
#[derive(Debug, Clone)]
pub struct AssignAnimals {
    pub habitat_id: Uuid,
    pub animal_ids: Vec<Uuid>,
}

/// Input for [`HabitatManager::release_animals`].
#[derive(Debug, Clone)]
pub struct ReleaseAnimals {
    pub habitat_id: Uuid,
    pub animal_ids: Vec<Uuid>,
}

/// Input for [`HabitatManager::transfer_animals`].
#[derive(Debug, Clone)]
pub struct TransferAnimals {
    pub source_habitat_id: Uuid,
    pub target_habitat_id: Uuid,
    pub animal_ids: Vec<Uuid>,
    pub reason: Option<String>,
}

impl TransferAnimals {
    fn validate(&self, max_batch_size: usize) -> HerdResult<()> {
        if self.source_habitat_id == self.target_habitat_id {
            return Err(HerdError::validation(
                "source and target habitat must differ",
            ));
        }
        validate::animal_batch(&self.animal_ids, max_batch_size)
    }
}

/// Input for [`HabitatManager::transfer_single`].
#[derive(Debug, Clone)]
pub struct TransferSingle {
    pub animal_id: Uuid,
    pub target_habitat_id: Uuid,
    pub reason: Option<String>,
}

fn validate_habitat(input: &CreateHabitat) -> HerdResult<String> {
    let name = validate::required("name", &input.name)?;
    if input.capacity == Some(0) {
        return Err(HerdError::validation("capacity must be greater than zero"));
    }
    Ok(name)
}

fn batch_locks(habitats: &[Uuid], animals: &[Uuid]) -> LockSet {
    habitats
        .iter()
        .map(|id| LockKey::Habitat(*id))
        .chain(animals.iter().map(|id| LockKey::Animal(*id)))
        .collect()
}

/// Load every animal of a batch, failing on the first missing one.
async fn load_animals<U: UnitOfWork>(unit: &mut U, ids: &[Uuid]) -> HerdResult<Vec<Animal>> {
    let mut animals = Vec::with_capacity(ids.len());
    for id in ids {
        let animal = unit
            .animal(*id)
            .await?
            .ok_or_else(|| HerdError::not_found("animal", id))?;
        animals.push(animal);
    }
    Ok(animals)
}

fn require_active(habitat: &Habitat) -> HerdResult<()> {
    if habitat.status != HabitatStatus::Active {
        return Err(HerdError::conflict(format!(
            "habitat {} is inactive",
            habitat.name
        )));
    }
    Ok(())
}

fn require_room(habitat: &Habitat, occupied: u64, incoming: u64) -> HerdResult<()> {
    if !habitat.admits(occupied, incoming) {
        return Err(HerdError::conflict(format!(
            "habitat {} holds {occupied} of {} and cannot take {incoming} more",
            habitat.name,
            habitat.capacity.unwrap_or_default(),
        )));
    }
    Ok(())
}

pub struct HabitatManager<C: TransactionCoordinator, S: AuditLogRepository> {
    coordinator: C,
    audit: AuditRecorder<S>,
    config: OpsConfig,
}

impl<C: TransactionCoordinator, S: AuditLogRepository> HabitatManager<C, S> {
    pub fn new(coordinator: C, audit: AuditRecorder<S>, config: OpsConfig) -> Self {
        Self {
            coordinator,
            audit,
            config,
        }
    }

    pub async fn create_habitat(
        &self,
        ctx: &ActorContext,
        input: CreateHabitat,
    ) -> HerdResult<Habitat> {
        let name = validate_habitat(&input)?;
        let now = Utc::now();
        let habitat = Habitat {
            id: Uuid::new_v4(),
            name,
            kind: input.kind,
            capacity: input.capacity,
            status: HabitatStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let mut unit = self
            .coordinator
            .begin("habitat.create", LockSet::new().with(LockKey::Habitat(habitat.id)))
            .await?;
        unit.insert_habitat(&habitat);
        unit.commit().await?;

        info!(habitat_id = %habitat.id, name = %habitat.name, "habitat created");
        self.audit
            .record(audit::entry(
                ctx,
                AuditAction::HabitatCreated,
                AuditEntity::Habitat,
                habitat.id,
                None,
                snapshot(&habitat),
            ))
            .await;

        Ok(habitat)
    }

    /// Assign animals that hold no assignment yet. All or nothing.
    pub async fn assign_animals(
        &self,
        ctx: &ActorContext,
        input: AssignAnimals,
    ) -> HerdResult<Occupancy> {
        validate::animal_batch(&input.animal_ids, self.config.max_batch_size)?;

        let locks = batch_locks(&[input.habitat_id], &input.animal_ids);
        let mut unit = self.coordinator.begin("habitat.assign", locks).await?;

        // 1. Habitat exists and is open.
        let habitat = unit
            .habitat(input.habitat_id)
            .await?
            .ok_or_else(|| HerdError::not_found("habitat", input.habitat_id))?;
        require_active(&habitat)?;

        // 2. Every animal exists, is active and is unassigned.
        let animals = load_animals(&mut unit, &input.animal_ids).await?;
        for animal in &animals {
            if !animal.is_active() {
                return Err(HerdError::conflict(format!(
                    "animal {} is retired",
                    animal.tag_number
                )));
            }
            if let Some(current) = animal.habitat_id {
                return Err(HerdError::conflict(format!(
                    "animal {} is already assigned to habitat {current}",
                    animal.tag_number
                )));
            }
        }

        // 3. Capacity.
        let occupied = unit.occupancy(habitat.id).await?;
        let incoming = animals.len() as u64;
        require_room(&habitat, occupied, incoming)?;

        // 4. Stage.
        let now = Utc::now();
        let changes = AnimalChanges {
            habitat_id: Some(Some(habitat.id)),
            ..Default::default()
        };
        for animal in &animals {
            unit.insert_assignment(&HabitatAssignment {
                id: Uuid::new_v4(),
                habitat_id: habitat.id,
                animal_id: animal.id,
                assigned_at: now,
            });
            unit.update_animal(animal.id, &changes);
        }
        unit.commit().await?;

        let occupancy = Occupancy {
            habitat_id: habitat.id,
            occupied: occupied + incoming,
            capacity: habitat.capacity,
        };
        info!(habitat_id = %habitat.id, assigned = incoming, occupied = occupancy.occupied, "animals assigned");

        self.audit
            .record(audit::entry(
                ctx,
                AuditAction::AnimalsAssigned,
                AuditEntity::Habitat,
                habitat.id,
                Some(json!({ "occupied": occupied })),
                Some(json!({
                    "occupied": occupancy.occupied,
                    "animal_ids": input.animal_ids,
                })),
            ))
            .await;

        Ok(occupancy)
    }

    /// Remove animals currently in the habitat from it.
    pub async fn release_animals(
        &self,
        ctx: &ActorContext,
        input: ReleaseAnimals,
    ) -> HerdResult<Occupancy> {
        validate::animal_batch(&input.animal_ids, self.config.max_batch_size)?;

        let locks = batch_locks(&[input.habitat_id], &input.animal_ids);
        let mut unit = self.coordinator.begin("habitat.release", locks).await?;

        let habitat = unit
            .habitat(input.habitat_id)
            .await?
            .ok_or_else(|| HerdError::not_found("habitat", input.habitat_id))?;
        let animals = load_animals(&mut unit, &input.animal_ids).await?;
        for animal in &animals {
            if animal.habitat_id != Some(habitat.id) {
                return Err(HerdError::conflict(format!(
                    "animal {} is not in habitat {}",
                    animal.tag_number, habitat.name
                )));
            }
        }
        let occupied = unit.occupancy(habitat.id).await?;

        let changes = AnimalChanges {
            habitat_id: Some(None),
            ..Default::default()
        };
        for animal in &animals {
            unit.remove_assignment(animal.id);
            unit.update_animal(animal.id, &changes);
        }
        unit.commit().await?;

        let released = animals.len() as u64;
        let occupancy = Occupancy {
            habitat_id: habitat.id,
            occupied: occupied.saturating_sub(released),
            capacity: habitat.capacity,
        };
        info!(habitat_id = %habitat.id, released, "animals released");

        self.audit
            .record(audit::entry(
                ctx,
                AuditAction::AnimalsReleased,
                AuditEntity::Habitat,
                habitat.id,
                Some(json!({ "occupied": occupied })),
                Some(json!({
                    "occupied": occupancy.occupied,
                    "animal_ids": input.animal_ids,
                })),
            ))
            .await;

        Ok(occupancy)
    }

    /// Move animals from one habitat to another in a single unit: the
    /// removals, insertions, animal updates and history rows commit
    /// together or not at all.
    pub async fn transfer_animals(
        &self,
        ctx: &ActorContext,
        input: TransferAnimals,
    ) -> HerdResult<Vec<HabitatTransfer>> {
        input.validate(self.config.max_batch_size)?;
        let reason = validate::optional(input.reason.as_deref());

        let locks = batch_locks(
            &[input.source_habitat_id, input.target_habitat_id],
            &input.animal_ids,
        );
        let mut unit = self.coordinator.begin("habitat.transfer", locks).await?;

        // 1. Both habitats exist; the target is open.
        let source = unit
            .habitat(input.source_habitat_id)
            .await?
            .ok_or_else(|| HerdError::not_found("habitat", input.source_habitat_id))?;
        let target = unit
            .habitat(input.target_habitat_id)
            .await?
            .ok_or_else(|| HerdError::not_found("habitat", input.target_habitat_id))?;
        require_active(&target)?;

        // 2. Every animal is currently in the source.
        let animals = load_animals(&mut unit, &input.animal_ids).await?;
        for animal in &animals {
            if animal.habitat_id != Some(source.id) {
                return Err(HerdError::conflict(format!(
                    "animal {} is not in habitat {}",
                    animal.tag_number, source.name
                )));
            }
        }

        // 3. Target capacity after the move.
        let occupied = unit.occupancy(target.id).await?;
        require_room(&target, occupied, animals.len() as u64)?;

        // 4. Stage.
        let now = Utc::now();
        let changes = AnimalChanges {
            habitat_id: Some(Some(target.id)),
            ..Default::default()
        };
        let mut transfers = Vec::with_capacity(animals.len());
        for animal in &animals {
            unit.remove_assignment(animal.id);
            unit.insert_assignment(&HabitatAssignment {
                id: Uuid::new_v4(),
                habitat_id: target.id,
                animal_id: animal.id,
                assigned_at: now,
            });
            unit.update_animal(animal.id, &changes);
            let transfer = HabitatTransfer {
                id: Uuid::new_v4(),
                animal_id: animal.id,
                from_habitat_id: Some(source.id),
                to_habitat_id: target.id,
                reason: reason.clone(),
                actor_id: ctx.actor_id.clone(),
                transferred_at: now,
            };
            unit.insert_transfer(&transfer);
            transfers.push(transfer);
        }
        unit.commit().await?;

        info!(
            source = %source.id,
            target = %target.id,
            moved = transfers.len(),
            "animals transferred"
        );

        self.audit
            .record(audit::entry(
                ctx,
                AuditAction::AnimalsTransferred,
                AuditEntity::Habitat,
                target.id,
                Some(json!({ "habitat_id": source.id })),
                Some(json!({
                    "habitat_id": target.id,
                    "animal_ids": input.animal_ids,
                    "reason": reason,
                })),
            ))
            .await;

        Ok(transfers)
    }

    /// Move one animal to `target_habitat_id`, recording its prior habitat
    /// (if any) in the transfer history.
    pub async fn transfer_single(
        &self,
        ctx: &ActorContext,
        input: TransferSingle,
    ) -> HerdResult<HabitatTransfer> {
        let reason = validate::optional(input.reason.as_deref());

        let locks = LockSet::new()
            .with(LockKey::Animal(input.animal_id))
            .with(LockKey::Habitat(input.target_habitat_id));
        let mut unit = self.coordinator.begin("habitat.transfer_single", locks).await?;

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
        if animal.habitat_id == Some(input.target_habitat_id) {
            return Err(HerdError::conflict(format!(
                "animal {} is already in habitat {}",
                animal.tag_number, input.target_habitat_id
            )));
        }
        let target = unit
            .habitat(input.target_habitat_id)
            .await?
            .ok_or_else(|| HerdError::not_found("habitat", input.target_habitat_id))?;
        require_active(&target)?;
        let occupied = unit.occupancy(target.id).await?;
        require_room(&target, occupied, 1)?;

        let now = Utc::now();
        let transfer = HabitatTransfer {
            id: Uuid::new_v4(),
            animal_id: animal.id,
            from_habitat_id: animal.habitat_id,
            to_habitat_id: target.id,
            reason,
            actor_id: ctx.actor_id.clone(),
            transferred_at: now,
        };
        if animal.habitat_id.is_some() {
            unit.remove_assignment(animal.id);
        }
        unit.insert_assignment(&HabitatAssignment {
            id: Uuid::new_v4(),
            habitat_id: target.id,
            animal_id: animal.id,
            assigned_at: now,
        });
        unit.update_animal(
            animal.id,
            &AnimalChanges {
                habitat_id: Some(Some(target.id)),
                ..Default::default()
            },
        );
        unit.insert_transfer(&transfer);
        unit.commit().await?;

        info!(animal_id = %animal.id, target = %target.id, "animal transferred");

        self.audit
            .record(audit::entry(
                ctx,
                AuditAction::AnimalTransferred,
                AuditEntity::Animal,
                animal.id,
                Some(json!({ "habitat_id": animal.habitat_id })),
                snapshot(&transfer),
            ))
            .await;

        Ok(transfer)
    }
}
