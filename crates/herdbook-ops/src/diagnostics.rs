//! Diagnostic Test Ledger: sample submission, result finalization and
//! sample deletion.
//!
//! A test moves PENDING → FINALIZED or PENDING → deleted; both are terminal.
//! The ledger is the only writer of an animal's detection tag, purpose and
//! test result.

use chrono::{DateTime, Utc};
use herdbook_core::error::{HerdError, HerdResult};
use herdbook_core::models::animal::AnimalChanges;
use herdbook_core::models::audit::{AuditAction, AuditEntity, AuditOutcome};
use herdbook_core::models::diagnostic_test::{
    DiagnosticTest, TestFinalization, TestResult, TestStatus,
};
use herdbook_core::repository::AuditLogRepository;
use herdbook_core::{ActorContext, LockKey, LockSet, TransactionCoordinator, UnitOfWork};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{self, AuditRecorder, snapshot};
use crate::validate;

/// Input for [`DiagnosticLedger::submit_sample`].
#[derive(Debug, Clone)]
pub struct SubmitSample {
    pub animal_id: Uuid,
    /// Must match the animal's registered tag number.
    pub tag_number: String,
    pub sample_date: DateTime<Utc>,
    pub detection_tag: String,
}

impl SubmitSample {
    fn validated(self, now: DateTime<Utc>) -> HerdResult<Self> {
        let tag_number = validate::required("tag_number", &self.tag_number)?;
        let detection_tag = validate::required("detection_tag", &self.detection_tag)?;
        if self.sample_date > now {
            return Err(HerdError::validation("sample_date is in the future"));
        }
        Ok(Self {
            tag_number,
            detection_tag,
            ..self
        })
    }
}

/// Input for [`DiagnosticLedger::finalize_result`].
#[derive(Debug, Clone)]
pub struct FinalizeResult {
    pub test_id: Uuid,
    pub result: TestResult,
    pub result_date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl FinalizeResult {
    fn validated(self) -> HerdResult<Self> {
        if self.result == TestResult::Pending {
            return Err(HerdError::validation(
                "a test cannot be finalized with a Pending result",
            ));
        }
        let notes = validate::optional(self.notes.as_deref());
        Ok(Self { notes, ..self })
    }
}

pub struct DiagnosticLedger<C: TransactionCoordinator, S: AuditLogRepository> {
    coordinator: C,
    audit: AuditRecorder<S>,
}

impl<C: TransactionCoordinator, S: AuditLogRepository> DiagnosticLedger<C, S> {
    pub fn new(coordinator: C, audit: AuditRecorder<S>) -> Self {
        Self { coordinator, audit }
    }

    /// Open a PENDING test for the animal and hand it the detection tag.
    pub async fn submit_sample(
        &self,
        ctx: &ActorContext,
        input: SubmitSample,
    ) -> HerdResult<DiagnosticTest> {
        let input = input.validated(Utc::now())?;

        // 1. Lock the animal and the detection tag value. Two animals
        //    claiming the same tag serialize on the tag key.
        let locks = LockSet::new()
            .with(LockKey::Animal(input.animal_id))
            .with(LockKey::DetectionTag(input.detection_tag.clone()));
        let mut unit = self.coordinator.begin("diagnostic_test.submit", locks).await?;

        // 2. Preconditions.
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
        if animal.tag_number != input.tag_number {
            return Err(HerdError::validation(format!(
                "tag number {} does not belong to animal {}",
                input.tag_number, animal.id
            )));
        }
        if let Some(open) = unit.open_test_for_animal(animal.id).await? {
            return Err(HerdError::conflict(format!(
                "animal {} already has open test {}",
                animal.tag_number, open.id
            )));
        }
        if let Some(holder) = unit.animal_by_detection_tag(&input.detection_tag).await? {
            if holder.id != animal.id {
                return Err(HerdError::conflict(format!(
                    "detection tag {} is held by animal {}",
                    input.detection_tag, holder.tag_number
                )));
            }
        }

        // 3. Stage the test and the tag assignment together.
        let now = Utc::now();
        let test = DiagnosticTest {
            id: Uuid::new_v4(),
            animal_id: animal.id,
            tag_number: animal.tag_number.clone(),
            detection_tag: input.detection_tag.clone(),
            sample_date: input.sample_date,
            status: TestStatus::Pending,
            result: None,
            result_date: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let changes = AnimalChanges {
            detection_tag: Some(Some(input.detection_tag.clone())),
            ..Default::default()
        };
        let mut after = animal.clone();
        changes.apply_to(&mut after);

        unit.insert_diagnostic_test(&test);
        unit.update_animal(animal.id, &changes);
        unit.commit().await?;

        info!(test_id = %test.id, animal_id = %animal.id, "sample submitted");

        // 4. Audit.
        self.audit
            .record_all([
                audit::entry(
                    ctx,
                    AuditAction::SampleSubmitted,
                    AuditEntity::DiagnosticTest,
                    test.id,
                    None,
                    snapshot(&test),
                ),
                audit::entry(
                    ctx,
                    AuditAction::DetectionTagAssigned,
                    AuditEntity::Animal,
                    animal.id,
                    Some(json!({ "detection_tag": animal.detection_tag })),
                    Some(json!({ "detection_tag": after.detection_tag })),
                ),
            ])
            .await;

        Ok(test)
    }

    /// Finalize a PENDING test and derive the animal's purpose from the
    /// result.
    ///
    /// When the animal no longer exists the test is still finalized and the
    /// audit entry is recorded with a `Degraded` outcome.
    pub async fn finalize_result(
        &self,
        ctx: &ActorContext,
        input: FinalizeResult,
    ) -> HerdResult<DiagnosticTest> {
        let input = input.validated()?;

        // 1. Resolve the test's animal, then lock both.
        let animal_id = self.animal_of_test(input.test_id).await?;
        let locks = LockSet::new()
            .with(LockKey::DiagnosticTest(input.test_id))
            .with(LockKey::Animal(animal_id));
        let mut unit = self.coordinator.begin("diagnostic_test.finalize", locks).await?;

        // 2. Preconditions.
        let test = unit
            .diagnostic_test(input.test_id)
            .await?
            .ok_or_else(|| HerdError::not_found("diagnostic_test", input.test_id))?;
        if test.status != TestStatus::Pending {
            return Err(HerdError::conflict(format!(
                "test {} is already finalized",
                test.id
            )));
        }
        if input.result_date < test.sample_date {
            return Err(HerdError::validation(
                "result_date precedes the sample date",
            ));
        }
        let animal = unit.animal(animal_id).await?;

        // 3. Stage the finalization and, when the animal exists, the
        //    derived animal fields.
        let finalization = TestFinalization {
            result: input.result,
            result_date: input.result_date,
            notes: input.notes.clone(),
        };
        unit.finalize_diagnostic_test(test.id, &finalization);

        let animal_update = animal.map(|animal| {
            let changes = AnimalChanges {
                test_result: Some(input.result),
                purpose: input.result.derived_purpose(),
                ..Default::default()
            };
            let mut after = animal.clone();
            changes.apply_to(&mut after);
            (animal, changes, after)
        });
        if let Some((animal, changes, _)) = &animal_update {
            unit.update_animal(animal.id, changes);
        }
        unit.commit().await?;

        let mut finalized = test.clone();
        finalized.status = TestStatus::Finalized;
        finalized.result = Some(input.result);
        finalized.result_date = Some(input.result_date);
        if input.notes.is_some() {
            finalized.notes = input.notes;
        }
        finalized.updated_at = Utc::now();

        // 4. Audit.
        let mut test_entry = audit::entry(
            ctx,
            AuditAction::ResultFinalized,
            AuditEntity::DiagnosticTest,
            test.id,
            snapshot(&test),
            snapshot(&finalized),
        );
        match animal_update {
            Some((before, _, after)) => {
                info!(test_id = %test.id, result = input.result.as_str(), "result finalized");
                self.audit
                    .record_all([
                        test_entry,
                        audit::entry(
                            ctx,
                            AuditAction::DiagnosisApplied,
                            AuditEntity::Animal,
                            before.id,
                            Some(json!({
                                "purpose": before.purpose,
                                "test_result": before.test_result,
                            })),
                            Some(json!({
                                "purpose": after.purpose,
                                "test_result": after.test_result,
                            })),
                        ),
                    ])
                    .await;
            }
            None => {
                warn!(
                    test_id = %test.id,
                    animal_id = %animal_id,
                    "result finalized but the animal no longer exists"
                );
                test_entry.outcome = AuditOutcome::Degraded;
                self.audit.record(test_entry).await;
            }
        }

        Ok(finalized)
    }

    /// Delete a PENDING test and release its detection tag.
    pub async fn delete_sample(&self, ctx: &ActorContext, test_id: Uuid) -> HerdResult<()> {
        let animal_id = self.animal_of_test(test_id).await?;
        let locks = LockSet::new()
            .with(LockKey::DiagnosticTest(test_id))
            .with(LockKey::Animal(animal_id));
        let mut unit = self.coordinator.begin("diagnostic_test.delete", locks).await?;

        let test = unit
            .diagnostic_test(test_id)
            .await?
            .ok_or_else(|| HerdError::not_found("diagnostic_test", test_id))?;
        if test.status != TestStatus::Pending {
            return Err(HerdError::conflict(format!(
                "test {} is finalized and cannot be deleted",
                test.id
            )));
        }

        let holder = unit
            .animal(animal_id)
            .await?
            .filter(|a| a.detection_tag.as_deref() == Some(test.detection_tag.as_str()));

        unit.delete_diagnostic_test(test.id);
        if let Some(animal) = &holder {
            unit.update_animal(
                animal.id,
                &AnimalChanges {
                    detection_tag: Some(None),
                    ..Default::default()
                },
            );
        }
        unit.commit().await?;

        info!(test_id = %test.id, "sample deleted");

        let mut entries = vec![audit::entry(
            ctx,
            AuditAction::SampleDeleted,
            AuditEntity::DiagnosticTest,
            test.id,
            snapshot(&test),
            None,
        )];
        if let Some(animal) = holder {
            entries.push(audit::entry(
                ctx,
                AuditAction::DetectionTagCleared,
                AuditEntity::Animal,
                animal.id,
                Some(json!({ "detection_tag": animal.detection_tag })),
                Some(json!({ "detection_tag": null })),
            ));
        }
        self.audit.record_all(entries).await;

        Ok(())
    }

    /// Read the (immutable) animal reference of a test under a lock on the
    /// test alone.
    async fn animal_of_test(&self, test_id: Uuid) -> HerdResult<Uuid> {
        let mut probe = self
            .coordinator
            .begin(
                "diagnostic_test.resolve",
                LockSet::new().with(LockKey::DiagnosticTest(test_id)),
            )
            .await?;
        let test = probe.diagnostic_test(test_id).await?;
        probe.rollback().await;
        test.map(|t| t.animal_id)
            .ok_or_else(|| HerdError::not_found("diagnostic_test", test_id))
    }
}
