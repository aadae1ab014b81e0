//! Integration tests for the Herdbook repository implementations using
//! in-memory SurrealDB.

use chrono::{Duration, Utc};
use herdbook_core::models::animal::{
    Animal, AnimalCategory, AnimalChanges, AnimalStatus, PregnancyStatus, Purpose,
};
use herdbook_core::models::audit::{
    ActorType, AuditAction, AuditEntity, AuditOutcome, CreateAuditLogEntry,
};
use herdbook_core::models::diagnostic_test::{DiagnosticTest, TestFinalization, TestResult, TestStatus};
use herdbook_core::models::habitat::{
    Habitat, HabitatAssignment, HabitatKind, HabitatStatus, HabitatTransfer,
};
use herdbook_core::models::sale::{SaleApproval, SaleRecord, SaleStatus, SaleType};
use herdbook_core::repository::{
    AnimalRepository, AuditLogRepository, DiagnosticTestRepository, HabitatRepository,
    Pagination, SaleRepository,
};
use herdbook_core::{ErrorKind, LockSet, TransactionCoordinator, UnitOfWork};
use herdbook_db::repository::{
    SurrealAnimalRepository, SurrealAuditLogRepository, SurrealDiagnosticTestRepository,
    SurrealHabitatRepository, SurrealSaleRepository,
};
use herdbook_db::{CoordinatorConfig, SurrealCoordinator};
use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    herdbook_db::run_migrations(&db).await.unwrap();
    db
}

/// Writes a fresh breeding cow through a unit of work, the only write path
/// for animals.
async fn insert_cow(coord: &SurrealCoordinator<Db>, tag_number: &str) -> Animal {
    let now = Utc::now();
    let animal = Animal {
        id: Uuid::new_v4(),
        tag_number: tag_number.into(),
        detection_tag: None,
        category: AnimalCategory::Cow,
        purpose: Purpose::Breeding,
        test_result: None,
        pregnancy_status: PregnancyStatus::Unknown,
        habitat_id: None,
        sale_status: None,
        sale_price_cents: None,
        sold_at: None,
        status: AnimalStatus::Active,
        created_at: now,
        updated_at: now,
    };
    let mut unit = coord.begin("test.register", LockSet::new()).await.unwrap();
    unit.insert_animal(&animal);
    unit.commit().await.unwrap();
    animal
}

// -----------------------------------------------------------------------
// Animals
// -----------------------------------------------------------------------

#[tokio::test]
async fn inserted_animal_is_readable() {
    let db = setup().await;
    let repo = SurrealAnimalRepository::new(db.clone());
    let coord = SurrealCoordinator::new(db, CoordinatorConfig::default());

    let animal = insert_cow(&coord, "BE-001").await;

    let fetched = repo.get_by_id(animal.id).await.unwrap();
    assert_eq!(fetched.id, animal.id);
    assert_eq!(fetched.tag_number, "BE-001");
    assert_eq!(fetched.purpose, Purpose::Breeding);
    assert_eq!(fetched.pregnancy_status, PregnancyStatus::Unknown);
    assert!(fetched.is_active());
    assert!(fetched.detection_tag.is_none());

    let by_tag = repo.get_by_tag_number("BE-001").await.unwrap();
    assert_eq!(by_tag.id, animal.id);
}

#[tokio::test]
async fn staged_animal_changes_are_applied() {
    let db = setup().await;
    let repo = SurrealAnimalRepository::new(db.clone());
    let coord = SurrealCoordinator::new(db, CoordinatorConfig::default());
    let animal = insert_cow(&coord, "BE-003").await;

    let mut unit = coord.begin("test.update", LockSet::new()).await.unwrap();
    unit.update_animal(
        animal.id,
        &AnimalChanges {
            category: Some(AnimalCategory::Heifer),
            pregnancy_status: Some(PregnancyStatus::Pregnant),
            ..AnimalChanges::default()
        },
    );
    unit.commit().await.unwrap();

    let updated = repo.get_by_id(animal.id).await.unwrap();
    assert_eq!(updated.category, AnimalCategory::Heifer);
    assert_eq!(updated.pregnancy_status, PregnancyStatus::Pregnant);
    assert_eq!(updated.tag_number, "BE-003");
}

#[tokio::test]
async fn list_and_delete_animals() {
    let db = setup().await;
    let repo = SurrealAnimalRepository::new(db.clone());
    let coord = SurrealCoordinator::new(db, CoordinatorConfig::default());
    for tag in ["BE-010", "BE-011", "BE-012"] {
        insert_cow(&coord, tag).await;
    }

    let page = repo
        .list(Pagination {
            offset: 0,
            limit: 2,
        })
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);

    let victim = repo.get_by_tag_number("BE-011").await.unwrap();
    let mut unit = coord.begin("test.delete", LockSet::new()).await.unwrap();
    unit.delete_animal(victim.id);
    unit.commit().await.unwrap();

    let err = repo.get_by_id(victim.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(repo.list(Pagination::default()).await.unwrap().total, 2);
}

#[tokio::test]
async fn missing_animal_is_not_found() {
    let db = setup().await;
    let repo = SurrealAnimalRepository::new(db);

    let err = repo.get_by_id(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(repo.find_by_detection_tag("nope").await.unwrap().is_none());
}

// -----------------------------------------------------------------------
// Records written through the coordinator, read back through repositories
// -----------------------------------------------------------------------

#[tokio::test]
async fn diagnostic_tests_round_trip() {
    let db = setup().await;
    let tests = SurrealDiagnosticTestRepository::new(db.clone());
    let coord = SurrealCoordinator::new(db, CoordinatorConfig::default());

    let animal = insert_cow(&coord, "BE-020").await;
    let now = Utc::now();
    let test = DiagnosticTest {
        id: Uuid::new_v4(),
        animal_id: animal.id,
        tag_number: animal.tag_number.clone(),
        detection_tag: "DT-20".into(),
        sample_date: now - Duration::days(1),
        status: TestStatus::Pending,
        result: None,
        result_date: None,
        notes: None,
        created_at: now,
        updated_at: now,
    };

    let mut unit = coord.begin("test.submit", LockSet::new()).await.unwrap();
    unit.insert_diagnostic_test(&test);
    unit.commit().await.unwrap();

    let open = tests.find_open_for_animal(animal.id).await.unwrap().unwrap();
    assert_eq!(open.id, test.id);
    assert!(open.is_open());

    let mut unit = coord.begin("test.finalize", LockSet::new()).await.unwrap();
    unit.finalize_diagnostic_test(
        test.id,
        &TestFinalization {
            result: TestResult::Negative,
            result_date: now,
            notes: Some("clear".into()),
        },
    );
    unit.commit().await.unwrap();

    let finalized = tests.get_by_id(test.id).await.unwrap();
    assert_eq!(finalized.status, TestStatus::Finalized);
    assert_eq!(finalized.result, Some(TestResult::Negative));
    assert_eq!(finalized.notes.as_deref(), Some("clear"));
    assert!(tests.find_open_for_animal(animal.id).await.unwrap().is_none());
    assert_eq!(tests.list_by_animal(animal.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn habitat_assignments_and_history() {
    let db = setup().await;
    let habitats = SurrealHabitatRepository::new(db.clone());
    let coord = SurrealCoordinator::new(db, CoordinatorConfig::default());

    let animal = insert_cow(&coord, "BE-030").await;
    let now = Utc::now();
    let habitat = Habitat {
        id: Uuid::new_v4(),
        name: "Barn A".into(),
        kind: HabitatKind::Shelter,
        capacity: Some(2),
        status: HabitatStatus::Active,
        created_at: now,
        updated_at: now,
    };

    let mut unit = coord.begin("test.habitat", LockSet::new()).await.unwrap();
    unit.insert_habitat(&habitat);
    unit.insert_assignment(&HabitatAssignment {
        id: Uuid::new_v4(),
        habitat_id: habitat.id,
        animal_id: animal.id,
        assigned_at: now,
    });
    unit.insert_transfer(&HabitatTransfer {
        id: Uuid::new_v4(),
        animal_id: animal.id,
        from_habitat_id: None,
        to_habitat_id: habitat.id,
        reason: Some("intake".into()),
        actor_id: "tester".into(),
        transferred_at: now,
    });
    unit.commit().await.unwrap();

    let stored = habitats.get_by_id(habitat.id).await.unwrap();
    assert_eq!(stored.capacity, Some(2));
    assert_eq!(stored.kind, HabitatKind::Shelter);

    let assignments = habitats.list_assignments(habitat.id).await.unwrap();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].animal_id, animal.id);

    let history = habitats.transfer_history(animal.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_habitat_id, None);
    assert_eq!(history[0].reason.as_deref(), Some("intake"));

    let page = habitats.list(Pagination::default()).await.unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn sale_approval_is_read_back() {
    let db = setup().await;
    let sales = SurrealSaleRepository::new(db.clone());
    let coord = SurrealCoordinator::new(db, CoordinatorConfig::default());

    let animal = insert_cow(&coord, "BE-040").await;
    let now = Utc::now();
    let sale = SaleRecord {
        id: Uuid::new_v4(),
        animal_id: animal.id,
        sale_type: SaleType::Breeding,
        status: SaleStatus::Pending,
        price_cents: 150_000,
        counterparty: "Hill Farm".into(),
        approval: None,
        cancellation: None,
        created_at: now,
        updated_at: now,
    };

    let mut unit = coord.begin("test.sale", LockSet::new()).await.unwrap();
    unit.insert_sale(&sale);
    unit.commit().await.unwrap();

    let pending = sales.get_by_id(sale.id).await.unwrap();
    assert_eq!(pending.status, SaleStatus::Pending);
    assert!(pending.approval.is_none());

    let mut unit = coord.begin("test.approve", LockSet::new()).await.unwrap();
    unit.complete_sale(
        sale.id,
        &SaleApproval {
            approved_by: "manager".into(),
            approved_at: now,
            notes: None,
            invoice_number: Some("INV-7".into()),
        },
    );
    unit.commit().await.unwrap();

    let completed = sales.get_by_id(sale.id).await.unwrap();
    assert_eq!(completed.status, SaleStatus::Completed);
    let approval = completed.approval.unwrap();
    assert_eq!(approval.approved_by, "manager");
    assert_eq!(approval.invoice_number.as_deref(), Some("INV-7"));
    assert!(completed.cancellation.is_none());

    assert_eq!(sales.list_by_animal(animal.id).await.unwrap().len(), 1);
}

// -----------------------------------------------------------------------
// Audit log
// -----------------------------------------------------------------------

#[tokio::test]
async fn audit_entries_are_appended_and_listed() {
    let db = setup().await;
    let repo = SurrealAuditLogRepository::new(db);
    let entity_id = Uuid::new_v4().to_string();

    let entry = repo
        .append(CreateAuditLogEntry {
            actor_id: "tester".into(),
            actor_type: ActorType::User,
            action: AuditAction::SampleSubmitted,
            entity_type: AuditEntity::DiagnosticTest,
            entity_id: entity_id.clone(),
            outcome: AuditOutcome::Success,
            before: None,
            after: Some(json!({ "status": "Pending" })),
        })
        .await
        .unwrap();
    assert_eq!(entry.action, "diagnostic_test.submitted");
    assert!(entry.before.is_none());
    assert_eq!(entry.after, Some(json!({ "status": "Pending" })));

    let listed = repo
        .list_for_entity(AuditEntity::DiagnosticTest, &entity_id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, entry.id);

    let page = repo.list(Pagination::default()).await.unwrap();
    assert_eq!(page.total, 1);
}
