//! Animal Registry against in-memory SurrealDB.

mod common;

use std::sync::Arc;

use common::{ctx, harness};
use herdbook_core::ErrorKind;
use herdbook_core::models::animal::{
    AnimalCategory, AnimalStatus, PregnancyStatus, Purpose, UpdateAnimal,
};
use herdbook_core::models::audit::AuditEntity;
use herdbook_core::models::sale::SaleType;
use herdbook_core::repository::{
    AnimalRepository, AuditLogRepository, DiagnosticTestRepository, HabitatRepository,
};
use herdbook_ops::{AssignAnimals, CreateSale, RegisterAnimal};
use uuid::Uuid;

#[tokio::test]
async fn registration_defaults_and_duplicate_tags() {
    let h = harness().await;
    let cow = h.animal("R-1").await;
    assert_eq!(cow.purpose, Purpose::Breeding);
    assert_eq!(cow.pregnancy_status, PregnancyStatus::Unknown);
    assert_eq!(cow.status, AnimalStatus::Active);
    assert!(cow.detection_tag.is_none());

    let stored = h.animal_repo.get_by_tag_number("R-1").await.unwrap();
    assert_eq!(stored.id, cow.id);

    let err = h
        .registry
        .register(
            &ctx(),
            RegisterAnimal {
                tag_number: " R-1 ".into(),
                category: AnimalCategory::Heifer,
                purpose: None,
                pregnancy_status: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = h
        .registry
        .register(
            &ctx(),
            RegisterAnimal {
                tag_number: "".into(),
                category: AnimalCategory::Heifer,
                purpose: None,
                pregnancy_status: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn detail_updates_are_applied_and_audited() {
    let h = harness().await;
    let cow = h.animal("R-2").await;

    let updated = h
        .registry
        .update_details(
            &ctx(),
            cow.id,
            UpdateAnimal {
                category: None,
                pregnancy_status: Some(PregnancyStatus::Pregnant),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.pregnancy_status, PregnancyStatus::Pregnant);
    assert_eq!(updated.category, cow.category);

    let stored = h.animal_repo.get_by_id(cow.id).await.unwrap();
    assert_eq!(stored.pregnancy_status, PregnancyStatus::Pregnant);

    let err = h
        .registry
        .update_details(&ctx(), cow.id, UpdateAnimal::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let log = h
        .audit_log
        .list_for_entity(AuditEntity::Animal, &cow.id.to_string())
        .await
        .unwrap();
    let actions: Vec<&str> = log.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, ["animal.registered", "animal.updated"]);
    assert!(log[1].before.is_some());
    assert!(log[1].after.is_some());
}

#[tokio::test]
async fn retirement_releases_the_habitat() {
    let h = harness().await;
    let pen = h.habitat("Pen R", Some(1)).await;
    let cow = h.animal("R-3").await;
    h.habitats
        .assign_animals(
            &ctx(),
            AssignAnimals {
                habitat_id: pen.id,
                animal_ids: vec![cow.id],
            },
        )
        .await
        .unwrap();

    let retired = h
        .registry
        .retire(&ctx(), cow.id, Some("old age".into()))
        .await
        .unwrap();
    assert_eq!(retired.status, AnimalStatus::Retired);
    assert!(retired.habitat_id.is_none());

    let stored = h.animal_repo.get_by_id(cow.id).await.unwrap();
    assert_eq!(stored.status, AnimalStatus::Retired);
    assert!(stored.habitat_id.is_none());
    assert_eq!(h.habitat_repo.occupancy(pen.id).await.unwrap().occupied, 0);

    let err = h.registry.retire(&ctx(), cow.id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = h
        .registry
        .update_details(
            &ctx(),
            cow.id,
            UpdateAnimal {
                category: Some(AnimalCategory::Cow),
                pregnancy_status: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn retired_animals_are_refused_by_other_managers() {
    let h = harness().await;
    let pen = h.habitat("Pen S", None).await;
    let cow = h.animal("R-4").await;
    h.registry.retire(&ctx(), cow.id, None).await.unwrap();

    let err = h
        .ledger
        .submit_sample(&ctx(), common::sample_for(&cow, "D-R4"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = h
        .habitats
        .assign_animals(
            &ctx(),
            AssignAnimals {
                habitat_id: pen.id,
                animal_ids: vec![cow.id],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn retiring_with_a_pending_sale_is_a_conflict() {
    let h = harness().await;
    let cow = h.animal("R-5").await;
    h.sales
        .create_sale(
            &ctx(),
            CreateSale {
                animal_id: cow.id,
                sale_type: SaleType::Breeding,
                price_cents: 50_000,
                counterparty: "Valley Farm".into(),
            },
        )
        .await
        .unwrap();

    let err = h.registry.retire(&ctx(), cow.id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(
        h.animal_repo.get_by_id(cow.id).await.unwrap().status,
        AnimalStatus::Active
    );
}

#[tokio::test]
async fn deletion_requires_an_unreferenced_animal() {
    let h = harness().await;
    let sampled = h.animal("R-6").await;
    let test = h.sample(&sampled, "D-R6").await;

    let err = h.registry.delete(&ctx(), sampled.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("R-6 has 1 test"));
    assert!(h.animal_repo.get_by_id(sampled.id).await.is_ok());
    let open = h.test_repo.get_by_id(test.id).await.unwrap();
    let owner = h.animal_repo.get_by_id(open.animal_id).await.unwrap();
    assert_eq!(owner.tag_number, "R-6");

    let pen = h.habitat("Pen T", None).await;
    let clean = h.animal("R-7").await;
    h.habitats
        .assign_animals(
            &ctx(),
            AssignAnimals {
                habitat_id: pen.id,
                animal_ids: vec![clean.id],
            },
        )
        .await
        .unwrap();

    h.registry.delete(&ctx(), clean.id).await.unwrap();
    let err = h.animal_repo.get_by_id(clean.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.habitat_repo.occupancy(pen.id).await.unwrap().occupied, 0);

    let err = h.registry.delete(&ctx(), Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn concurrent_registrations_of_one_tag_admit_exactly_one() {
    let h = Arc::new(harness().await);

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let h = Arc::clone(&h);
            tokio::spawn(async move {
                h.registry
                    .register(
                        &ctx(),
                        RegisterAnimal {
                            tag_number: "R-RACE".into(),
                            category: if i % 2 == 0 {
                                AnimalCategory::Cow
                            } else {
                                AnimalCategory::Heifer
                            },
                            purpose: None,
                            pregnancy_status: None,
                        },
                    )
                    .await
            })
        })
        .collect();

    let mut registered = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(animal) => registered.push(animal),
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict, "unexpected error: {e}"),
        }
    }

    assert_eq!(registered.len(), 1);
    let stored = h.animal_repo.get_by_tag_number("R-RACE").await.unwrap();
    assert_eq!(stored.id, registered[0].id);
    assert_eq!(h.animal_repo.list(Default::default()).await.unwrap().total, 1);
}
