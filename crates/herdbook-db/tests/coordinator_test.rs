//! Integration tests for the SurrealDB transaction coordinator using
//! in-memory SurrealDB.

use std::time::Duration;

use chrono::Utc;
use herdbook_core::models::animal::{
    Animal, AnimalCategory, AnimalChanges, AnimalStatus, PregnancyStatus, Purpose,
};
use herdbook_core::models::habitat::{Habitat, HabitatAssignment, HabitatKind, HabitatStatus};
use herdbook_core::repository::{AnimalRepository, HabitatRepository};
use herdbook_core::{
    HerdError, InternalError, LockKey, LockSet, TransactionCoordinator, UnitOfWork,
};
use herdbook_db::repository::{SurrealAnimalRepository, SurrealHabitatRepository};
use herdbook_db::{CoordinatorConfig, SurrealCoordinator};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    herdbook_db::run_migrations(&db).await.unwrap();
    db
}

fn coordinator(db: &Surreal<Db>, config: CoordinatorConfig) -> SurrealCoordinator<Db> {
    SurrealCoordinator::new(db.clone(), config)
}

fn new_animal(tag_number: &str) -> Animal {
    let now = Utc::now();
    Animal {
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
    }
}

fn new_habitat(capacity: Option<u32>) -> Habitat {
    let now = Utc::now();
    Habitat {
        id: Uuid::new_v4(),
        name: "North paddock".into(),
        kind: HabitatKind::Paddock,
        capacity,
        status: HabitatStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn commit_applies_every_staged_write() {
    let db = setup().await;
    let coord = coordinator(&db, CoordinatorConfig::default());
    let animal = new_animal("AT-100");
    let habitat = new_habitat(Some(4));

    let mut unit = coord.begin("test.seed", LockSet::new()).await.unwrap();
    unit.insert_animal(&animal);
    unit.insert_habitat(&habitat);
    unit.insert_assignment(&HabitatAssignment {
        id: Uuid::new_v4(),
        habitat_id: habitat.id,
        animal_id: animal.id,
        assigned_at: Utc::now(),
    });
    unit.update_animal(
        animal.id,
        &AnimalChanges {
            habitat_id: Some(Some(habitat.id)),
            detection_tag: Some(Some("DT-1".into())),
            ..Default::default()
        },
    );
    assert_eq!(unit.staged_writes(), 4);
    unit.commit().await.unwrap();

    let animals = SurrealAnimalRepository::new(db.clone());
    let stored = animals.get_by_id(animal.id).await.unwrap();
    assert_eq!(stored.tag_number, "AT-100");
    assert_eq!(stored.habitat_id, Some(habitat.id));
    assert_eq!(stored.detection_tag.as_deref(), Some("DT-1"));

    let habitats = SurrealHabitatRepository::new(db);
    let occupancy = habitats.occupancy(habitat.id).await.unwrap();
    assert_eq!(occupancy.occupied, 1);
    assert_eq!(occupancy.remaining(), Some(3));
}

#[tokio::test]
async fn reads_inside_a_unit_see_committed_state() {
    let db = setup().await;
    let coord = coordinator(&db, CoordinatorConfig::default());
    let animal = new_animal("AT-101");

    let mut unit = coord.begin("test.seed", LockSet::new()).await.unwrap();
    unit.insert_animal(&animal);
    unit.commit().await.unwrap();

    let mut unit = coord
        .begin("test.read", LockSet::new().with(LockKey::Animal(animal.id)))
        .await
        .unwrap();
    let found = unit.animal(animal.id).await.unwrap().unwrap();
    assert_eq!(found.id, animal.id);
    let by_tag = unit.animal_by_tag_number("AT-101").await.unwrap();
    assert_eq!(by_tag.map(|a| a.id), Some(animal.id));
    assert!(unit.animal(Uuid::new_v4()).await.unwrap().is_none());
    assert_eq!(unit.animal_reference_count(animal.id).await.unwrap(), 0);
    unit.rollback().await;
}

#[tokio::test]
async fn dropped_unit_applies_nothing() {
    let db = setup().await;
    let coord = coordinator(&db, CoordinatorConfig::default());
    let animal = new_animal("AT-102");

    {
        let mut unit = coord.begin("test.drop", LockSet::new()).await.unwrap();
        unit.insert_animal(&animal);
    }

    let animals = SurrealAnimalRepository::new(db);
    let err = animals.get_by_id(animal.id).await.unwrap_err();
    assert!(matches!(err, HerdError::NotFound { .. }));
}

#[tokio::test]
async fn rollback_applies_nothing() {
    let db = setup().await;
    let coord = coordinator(&db, CoordinatorConfig::default());
    let habitat = new_habitat(None);

    let mut unit = coord.begin("test.rollback", LockSet::new()).await.unwrap();
    unit.insert_habitat(&habitat);
    unit.rollback().await;

    let habitats = SurrealHabitatRepository::new(db);
    assert!(habitats.get_by_id(habitat.id).await.is_err());
}

#[tokio::test]
async fn failing_statement_cancels_the_whole_batch() {
    let db = setup().await;
    let coord = coordinator(&db, CoordinatorConfig::default());
    let habitat = new_habitat(None);
    let first = new_animal("AT-103");
    // Same tag number violates the unique index.
    let duplicate = new_animal("AT-103");

    let mut unit = coord.begin("test.duplicate", LockSet::new()).await.unwrap();
    unit.insert_habitat(&habitat);
    unit.insert_animal(&first);
    unit.insert_animal(&duplicate);
    let err = unit.commit().await.unwrap_err();
    assert!(matches!(err, HerdError::Internal(InternalError::Storage)));

    let habitats = SurrealHabitatRepository::new(db.clone());
    assert!(habitats.get_by_id(habitat.id).await.is_err());
    let animals = SurrealAnimalRepository::new(db);
    assert!(animals.get_by_id(first.id).await.is_err());
}

#[tokio::test]
async fn storage_failure_message_is_generic() {
    let db = setup().await;
    let coord = coordinator(&db, CoordinatorConfig::default());

    let mut unit = coord.begin("test.leak", LockSet::new()).await.unwrap();
    unit.insert_animal(&new_animal("AT-104"));
    unit.insert_animal(&new_animal("AT-104"));
    let err = unit.commit().await.unwrap_err();

    let message = err.to_string();
    assert!(!message.contains("idx_animal_tag_number"));
    assert!(!message.contains("animal"));
}

#[tokio::test]
async fn exhausted_pool_fails_with_pool_exhausted() {
    let db = setup().await;
    let coord = coordinator(
        &db,
        CoordinatorConfig {
            max_concurrent_units: 1,
            acquire_timeout: Duration::from_millis(50),
            unit_timeout: Duration::from_secs(5),
        },
    );

    let held = coord
        .begin("test.hold", LockSet::new().with(LockKey::Animal(Uuid::from_u128(1))))
        .await
        .unwrap();
    assert_eq!(coord.available_slots(), 0);

    let err = coord
        .begin("test.wait", LockSet::new().with(LockKey::Animal(Uuid::from_u128(2))))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, HerdError::Internal(InternalError::PoolExhausted)));

    drop(held);
    assert_eq!(coord.available_slots(), 1);
    let unit = coord.begin("test.after", LockSet::new()).await;
    assert!(unit.is_ok());
}

#[tokio::test]
async fn contended_lock_times_out_at_the_unit_deadline() {
    let db = setup().await;
    let coord = coordinator(
        &db,
        CoordinatorConfig {
            max_concurrent_units: 4,
            acquire_timeout: Duration::from_secs(5),
            unit_timeout: Duration::from_millis(80),
        },
    );
    let key = LockKey::Habitat(Uuid::from_u128(9));

    let _held = coord
        .begin("test.hold", LockSet::new().with(key.clone()))
        .await
        .unwrap();
    let err = coord
        .begin("test.wait", LockSet::new().with(key))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, HerdError::Internal(InternalError::Timeout)));
}

#[tokio::test]
async fn overlapping_units_run_one_after_another() {
    let db = setup().await;
    let coord = coordinator(&db, CoordinatorConfig::default());
    let key = LockKey::Animal(Uuid::from_u128(42));

    let first = coord
        .begin("test.first", LockSet::new().with(key.clone()))
        .await
        .unwrap();

    let contender = coord.clone();
    let waiter = tokio::spawn(async move {
        let unit = contender
            .begin("test.second", LockSet::new().with(key))
            .await
            .unwrap();
        unit.rollback().await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    first.rollback().await;
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
}
