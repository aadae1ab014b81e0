//! Shared setup for the manager integration tests: an in-memory SurrealDB,
//! one coordinator and every manager wired to the real audit log.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use herdbook_core::ActorContext;
use herdbook_core::models::animal::{Animal, AnimalCategory};
use herdbook_core::models::diagnostic_test::DiagnosticTest;
use herdbook_core::models::habitat::{CreateHabitat, Habitat, HabitatKind};
use herdbook_db::repository::{
    SurrealAnimalRepository, SurrealAuditLogRepository, SurrealDiagnosticTestRepository,
    SurrealHabitatRepository, SurrealSaleRepository,
};
use herdbook_db::{CoordinatorConfig, SurrealCoordinator};
use herdbook_ops::{
    AnimalRegistry, AuditRecorder, DiagnosticLedger, HabitatManager, OpsConfig, RegisterAnimal,
    SaleManager, SubmitSample,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

pub type Coordinator = SurrealCoordinator<Db>;
pub type AuditLog = SurrealAuditLogRepository<Db>;

pub struct Harness {
    pub db: Surreal<Db>,
    pub coordinator: Coordinator,
    pub recorder: AuditRecorder<AuditLog>,
    pub registry: AnimalRegistry<Coordinator, AuditLog>,
    pub ledger: DiagnosticLedger<Coordinator, AuditLog>,
    pub habitats: HabitatManager<Coordinator, AuditLog>,
    pub sales: SaleManager<Coordinator, AuditLog>,
    pub animal_repo: SurrealAnimalRepository<Db>,
    pub test_repo: SurrealDiagnosticTestRepository<Db>,
    pub habitat_repo: SurrealHabitatRepository<Db>,
    pub sale_repo: SurrealSaleRepository<Db>,
    pub audit_log: AuditLog,
}

pub async fn setup_db() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    herdbook_db::run_migrations(&db).await.unwrap();
    db
}

pub async fn harness() -> Harness {
    harness_with(CoordinatorConfig::default(), OpsConfig::default()).await
}

pub async fn harness_with(config: CoordinatorConfig, ops: OpsConfig) -> Harness {
    let db = setup_db().await;
    let coordinator = SurrealCoordinator::new(db.clone(), config);
    let audit_log = SurrealAuditLogRepository::new(db.clone());
    let recorder = AuditRecorder::new(audit_log.clone());

    Harness {
        registry: AnimalRegistry::new(coordinator.clone(), recorder.clone()),
        ledger: DiagnosticLedger::new(coordinator.clone(), recorder.clone()),
        habitats: HabitatManager::new(coordinator.clone(), recorder.clone(), ops),
        sales: SaleManager::new(coordinator.clone(), recorder.clone()),
        animal_repo: SurrealAnimalRepository::new(db.clone()),
        test_repo: SurrealDiagnosticTestRepository::new(db.clone()),
        habitat_repo: SurrealHabitatRepository::new(db.clone()),
        sale_repo: SurrealSaleRepository::new(db.clone()),
        audit_log,
        recorder,
        coordinator,
        db,
    }
}

pub fn ctx() -> ActorContext {
    ActorContext::user("vet-1")
}

impl Harness {
    pub async fn animal(&self, tag_number: &str) -> Animal {
        self.registry
            .register(
                &ctx(),
                RegisterAnimal {
                    tag_number: tag_number.into(),
                    category: AnimalCategory::Cow,
                    purpose: None,
                    pregnancy_status: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn habitat(&self, name: &str, capacity: Option<u32>) -> Habitat {
        self.habitats
            .create_habitat(
                &ctx(),
                CreateHabitat {
                    name: name.into(),
                    kind: HabitatKind::Paddock,
                    capacity,
                },
            )
            .await
            .unwrap()
    }

    pub async fn sample(&self, animal: &Animal, detection_tag: &str) -> DiagnosticTest {
        self.ledger
            .submit_sample(&ctx(), sample_for(animal, detection_tag))
            .await
            .unwrap()
    }
}

pub fn sample_for(animal: &Animal, detection_tag: &str) -> SubmitSample {
    SubmitSample {
        animal_id: animal.id,
        tag_number: animal.tag_number.clone(),
        sample_date: Utc::now() - Duration::hours(2),
        detection_tag: detection_tag.into(),
    }
}
