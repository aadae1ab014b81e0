//! SurrealDB-backed [`TransactionCoordinator`].
//!
//! A unit acquires its advisory locks, then a slot of the bounded pool.
//! Reads go straight to the database while the locks are held; writes are
//! rendered to SurrealQL and buffered. `commit` wraps the buffer in a single
//! `BEGIN TRANSACTION … COMMIT TRANSACTION` query so that any failing
//! statement cancels the whole batch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use herdbook_core::error::{HerdError, HerdResult};
use herdbook_core::models::animal::{Animal, AnimalChanges};
use herdbook_core::models::diagnostic_test::{DiagnosticTest, TestFinalization, TestStatus};
use herdbook_core::models::habitat::{Habitat, HabitatAssignment, HabitatTransfer};
use herdbook_core::models::sale::{SaleApproval, SaleCancellation, SaleRecord, SaleStatus};
use herdbook_core::{LockSet, TransactionCoordinator, UnitOfWork};
use serde_json::Value;
use surrealdb::{Connection, Surreal};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::DbError;
use crate::lock::{HeldLocks, LockTable};
use crate::repository::{animal, diagnostic_test, habitat, sale};

/// Limits applied to every unit of work.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Units allowed to hold a storage slot at the same time.
    pub max_concurrent_units: usize,
    /// How long `begin` waits for a storage slot.
    pub acquire_timeout: Duration,
    /// Deadline of a unit, measured from `begin`.
    pub unit_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_units: 16,
            acquire_timeout: Duration::from_secs(5),
            unit_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct SurrealCoordinator<C: Connection> {
    db: Surreal<C>,
    locks: LockTable,
    pool: Arc<Semaphore>,
    config: CoordinatorConfig,
}

impl<C: Connection> SurrealCoordinator<C> {
    pub fn new(db: Surreal<C>, config: CoordinatorConfig) -> Self {
        let slots = config.max_concurrent_units.max(1);
        Self {
            db,
            locks: LockTable::new(),
            pool: Arc::new(Semaphore::new(slots)),
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Storage slots not currently held by a unit.
    pub fn available_slots(&self) -> usize {
        self.pool.available_permits()
    }
}

impl<C: Connection> TransactionCoordinator for SurrealCoordinator<C> {
    type Unit = SurrealUnitOfWork<C>;

    async fn begin(&self, operation: &'static str, locks: LockSet) -> HerdResult<Self::Unit> {
        let deadline = Instant::now() + self.config.unit_timeout;

        let held = timeout_at(deadline, self.locks.acquire(&locks))
            .await
            .map_err(|_| DbError::Timeout { operation })?;

        let permit = match timeout(
            self.config.acquire_timeout,
            Arc::clone(&self.pool).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => return Err(DbError::PoolExhausted { operation }.into()),
        };

        debug!(operation, locks = held.len(), "unit of work started");

        Ok(SurrealUnitOfWork {
            db: self.db.clone(),
            operation,
            deadline,
            statements: Vec::new(),
            bindings: Vec::new(),
            _permit: permit,
            _locks: held,
        })
    }
}

/// One open unit of work. See [`UnitOfWork`].
pub struct SurrealUnitOfWork<C: Connection> {
    db: Surreal<C>,
    operation: &'static str,
    deadline: Instant,
    statements: Vec<String>,
    bindings: Vec<(String, Value)>,
    // Field order matters: the pool slot is returned before the locks.
    _permit: OwnedSemaphorePermit,
    _locks: HeldLocks,
}

impl<C: Connection> SurrealUnitOfWork<C> {
    /// Bind `value` under a fresh parameter name and return its reference.
    fn param(&mut self, value: impl Into<Value>) -> String {
        let name = format!("p{}", self.bindings.len());
        let reference = format!("${name}");
        self.bindings.push((name, value.into()));
        reference
    }

    /// Like [`param`](Self::param), but `None` renders as `NONE`.
    fn opt(&mut self, value: Option<impl Into<Value>>) -> String {
        match value {
            Some(v) => self.param(v),
            None => "NONE".to_string(),
        }
    }

    fn time(&mut self, value: DateTime<Utc>) -> String {
        format!("<datetime>{}", self.param(value.to_rfc3339()))
    }

    fn opt_time(&mut self, value: Option<DateTime<Utc>>) -> String {
        match value {
            Some(v) => self.time(v),
            None => "NONE".to_string(),
        }
    }

    fn record(&mut self, table: &str, id: Uuid) -> String {
        format!("type::record('{table}', {})", self.param(id.to_string()))
    }

    fn stage(&mut self, statement: String) {
        self.statements.push(statement);
    }

    async fn read<T>(
        &self,
        query: impl Future<Output = Result<T, DbError>>,
    ) -> HerdResult<T> {
        match timeout_at(self.deadline, query).await {
            Ok(result) => result.map_err(HerdError::from),
            Err(_) => Err(DbError::Timeout {
                operation: self.operation,
            }
            .into()),
        }
    }

    fn render(&self) -> String {
        let mut sql = String::from("BEGIN TRANSACTION;\n");
        for statement in &self.statements {
            sql.push_str(statement);
            sql.push_str(";\n");
        }
        sql.push_str("COMMIT TRANSACTION;");
        sql
    }
}

impl<C: Connection> UnitOfWork for SurrealUnitOfWork<C> {
    async fn animal(&mut self, id: Uuid) -> HerdResult<Option<Animal>> {
        self.read(animal::fetch_animal(&self.db, id)).await
    }

    async fn animal_by_tag_number(&mut self, tag_number: &str) -> HerdResult<Option<Animal>> {
        self.read(animal::fetch_animal_by_tag_number(&self.db, tag_number))
            .await
    }

    async fn animal_by_detection_tag(
        &mut self,
        detection_tag: &str,
    ) -> HerdResult<Option<Animal>> {
        self.read(animal::fetch_animal_by_detection_tag(&self.db, detection_tag))
            .await
    }

    async fn diagnostic_test(&mut self, id: Uuid) -> HerdResult<Option<DiagnosticTest>> {
        self.read(diagnostic_test::fetch_test(&self.db, id)).await
    }

    async fn open_test_for_animal(&mut self, animal_id: Uuid) -> HerdResult<Option<DiagnosticTest>> {
        self.read(diagnostic_test::fetch_open_test(&self.db, animal_id))
            .await
    }

    async fn habitat(&mut self, id: Uuid) -> HerdResult<Option<Habitat>> {
        self.read(habitat::fetch_habitat(&self.db, id)).await
    }

    async fn occupancy(&mut self, habitat_id: Uuid) -> HerdResult<u64> {
        self.read(habitat::count_occupancy(&self.db, habitat_id))
            .await
    }

    async fn sale(&mut self, id: Uuid) -> HerdResult<Option<SaleRecord>> {
        self.read(sale::fetch_sale(&self.db, id)).await
    }

    async fn pending_sale_for_animal(&mut self, animal_id: Uuid) -> HerdResult<Option<SaleRecord>> {
        self.read(sale::fetch_pending_sale(&self.db, animal_id))
            .await
    }

    async fn animal_reference_count(&mut self, animal_id: Uuid) -> HerdResult<u64> {
        self.read(animal::count_references(&self.db, animal_id))
            .await
    }

    // -----------------------------------------------------------------------
    // Animals
    // -----------------------------------------------------------------------

    fn insert_animal(&mut self, a: &Animal) {
        let record = self.record("animal", a.id);
        let tag_number = self.param(a.tag_number.clone());
        let detection_tag = self.opt(a.detection_tag.clone());
        let category = self.param(a.category.as_str());
        let purpose = self.param(a.purpose.as_str());
        let test_result = self.opt(a.test_result.map(|r| r.as_str()));
        let pregnancy = self.param(a.pregnancy_status.as_str());
        let habitat_id = self.opt(a.habitat_id.map(|h| h.to_string()));
        let sale_status = self.opt(a.sale_status.map(|s| s.as_str()));
        let sale_price = self.opt(a.sale_price_cents);
        let sold_at = self.opt_time(a.sold_at);
        let status = self.param(a.status.as_str());
        let created_at = self.time(a.created_at);
        let updated_at = self.time(a.updated_at);
        self.stage(format!(
            "CREATE {record} SET tag_number = {tag_number}, \
             detection_tag = {detection_tag}, category = {category}, \
             purpose = {purpose}, test_result = {test_result}, \
             pregnancy_status = {pregnancy}, habitat_id = {habitat_id}, \
             sale_status = {sale_status}, sale_price_cents = {sale_price}, \
             sold_at = {sold_at}, status = {status}, \
             created_at = {created_at}, updated_at = {updated_at}"
        ));
    }

    fn update_animal(&mut self, id: Uuid, changes: &AnimalChanges) {
        if changes.is_empty() {
            return;
        }
        let mut sets = Vec::new();
        if let Some(category) = changes.category {
            sets.push(format!("category = {}", self.param(category.as_str())));
        }
        if let Some(pregnancy) = changes.pregnancy_status {
            sets.push(format!("pregnancy_status = {}", self.param(pregnancy.as_str())));
        }
        if let Some(detection_tag) = &changes.detection_tag {
            let value = self.opt(detection_tag.clone());
            sets.push(format!("detection_tag = {value}"));
        }
        if let Some(purpose) = changes.purpose {
            sets.push(format!("purpose = {}", self.param(purpose.as_str())));
        }
        if let Some(result) = changes.test_result {
            sets.push(format!("test_result = {}", self.param(result.as_str())));
        }
        if let Some(habitat_id) = changes.habitat_id {
            let value = self.opt(habitat_id.map(|h| h.to_string()));
            sets.push(format!("habitat_id = {value}"));
        }
        if let Some(sale_status) = changes.sale_status {
            sets.push(format!("sale_status = {}", self.param(sale_status.as_str())));
        }
        if let Some(price) = changes.sale_price_cents {
            sets.push(format!("sale_price_cents = {}", self.param(price)));
        }
        if let Some(sold_at) = changes.sold_at {
            sets.push(format!("sold_at = {}", self.time(sold_at)));
        }
        if let Some(status) = changes.status {
            sets.push(format!("status = {}", self.param(status.as_str())));
        }
        sets.push("updated_at = time::now()".to_string());

        let record = self.record("animal", id);
        self.stage(format!("UPDATE {record} SET {}", sets.join(", ")));
    }

    fn delete_animal(&mut self, id: Uuid) {
        let animal_id = self.param(id.to_string());
        self.stage(format!(
            "DELETE habitat_assignment WHERE animal_id = {animal_id}"
        ));
        self.stage(format!("DELETE type::record('animal', {animal_id})"));
    }

    // -----------------------------------------------------------------------
    // Diagnostic tests
    // -----------------------------------------------------------------------

    fn insert_diagnostic_test(&mut self, t: &DiagnosticTest) {
        let record = self.record("diagnostic_test", t.id);
        let animal_id = self.param(t.animal_id.to_string());
        let tag_number = self.param(t.tag_number.clone());
        let detection_tag = self.param(t.detection_tag.clone());
        let sample_date = self.time(t.sample_date);
        let status = self.param(t.status.as_str());
        let result = self.opt(t.result.map(|r| r.as_str()));
        let result_date = self.opt_time(t.result_date);
        let notes = self.opt(t.notes.clone());
        let created_at = self.time(t.created_at);
        let updated_at = self.time(t.updated_at);
        self.stage(format!(
            "CREATE {record} SET animal_id = {animal_id}, \
             tag_number = {tag_number}, detection_tag = {detection_tag}, \
             sample_date = {sample_date}, status = {status}, \
             result = {result}, result_date = {result_date}, notes = {notes}, \
             created_at = {created_at}, updated_at = {updated_at}"
        ));
    }

    fn finalize_diagnostic_test(&mut self, id: Uuid, finalization: &TestFinalization) {
        let record = self.record("diagnostic_test", id);
        let status = self.param(TestStatus::Finalized.as_str());
        let result = self.param(finalization.result.as_str());
        let result_date = self.time(finalization.result_date);
        let mut sets = vec![
            format!("status = {status}"),
            format!("result = {result}"),
            format!("result_date = {result_date}"),
        ];
        if let Some(notes) = &finalization.notes {
            sets.push(format!("notes = {}", self.param(notes.clone())));
        }
        sets.push("updated_at = time::now()".to_string());
        self.stage(format!("UPDATE {record} SET {}", sets.join(", ")));
    }

    fn delete_diagnostic_test(&mut self, id: Uuid) {
        let record = self.record("diagnostic_test", id);
        self.stage(format!("DELETE {record}"));
    }

    // -----------------------------------------------------------------------
    // Habitats
    // -----------------------------------------------------------------------

    fn insert_habitat(&mut self, h: &Habitat) {
        let record = self.record("habitat", h.id);
        let name = self.param(h.name.clone());
        let kind = self.param(h.kind.as_str());
        let capacity = self.opt(h.capacity);
        let status = self.param(h.status.as_str());
        let created_at = self.time(h.created_at);
        let updated_at = self.time(h.updated_at);
        self.stage(format!(
            "CREATE {record} SET name = {name}, kind = {kind}, \
             capacity = {capacity}, status = {status}, \
             created_at = {created_at}, updated_at = {updated_at}"
        ));
    }

    fn insert_assignment(&mut self, a: &HabitatAssignment) {
        let record = self.record("habitat_assignment", a.id);
        let habitat_id = self.param(a.habitat_id.to_string());
        let animal_id = self.param(a.animal_id.to_string());
        let assigned_at = self.time(a.assigned_at);
        self.stage(format!(
            "CREATE {record} SET habitat_id = {habitat_id}, \
             animal_id = {animal_id}, assigned_at = {assigned_at}"
        ));
    }

    fn remove_assignment(&mut self, animal_id: Uuid) {
        let animal_id = self.param(animal_id.to_string());
        self.stage(format!(
            "DELETE habitat_assignment WHERE animal_id = {animal_id}"
        ));
    }

    fn insert_transfer(&mut self, t: &HabitatTransfer) {
        let record = self.record("habitat_transfer", t.id);
        let animal_id = self.param(t.animal_id.to_string());
        let from = self.opt(t.from_habitat_id.map(|h| h.to_string()));
        let to = self.param(t.to_habitat_id.to_string());
        let reason = self.opt(t.reason.clone());
        let actor_id = self.param(t.actor_id.clone());
        let transferred_at = self.time(t.transferred_at);
        self.stage(format!(
            "CREATE {record} SET animal_id = {animal_id}, \
             from_habitat_id = {from}, to_habitat_id = {to}, \
             reason = {reason}, actor_id = {actor_id}, \
             transferred_at = {transferred_at}"
        ));
    }

    // -----------------------------------------------------------------------
    // Sales
    // -----------------------------------------------------------------------

    fn insert_sale(&mut self, s: &SaleRecord) {
        let record = self.record("sale_record", s.id);
        let animal_id = self.param(s.animal_id.to_string());
        let sale_type = self.param(s.sale_type.as_str());
        let status = self.param(s.status.as_str());
        let price = self.param(s.price_cents);
        let counterparty = self.param(s.counterparty.clone());
        let created_at = self.time(s.created_at);
        let updated_at = self.time(s.updated_at);
        self.stage(format!(
            "CREATE {record} SET animal_id = {animal_id}, \
             sale_type = {sale_type}, status = {status}, \
             price_cents = {price}, counterparty = {counterparty}, \
             created_at = {created_at}, updated_at = {updated_at}"
        ));
    }

    fn complete_sale(&mut self, id: Uuid, approval: &SaleApproval) {
        let record = self.record("sale_record", id);
        let status = self.param(SaleStatus::Completed.as_str());
        let approved_by = self.param(approval.approved_by.clone());
        let approved_at = self.time(approval.approved_at);
        let notes = self.opt(approval.notes.clone());
        let invoice = self.opt(approval.invoice_number.clone());
        self.stage(format!(
            "UPDATE {record} SET status = {status}, \
             approved_by = {approved_by}, approved_at = {approved_at}, \
             approval_notes = {notes}, invoice_number = {invoice}, \
             updated_at = time::now()"
        ));
    }

    fn cancel_sale(&mut self, id: Uuid, cancellation: &SaleCancellation) {
        let record = self.record("sale_record", id);
        let status = self.param(SaleStatus::Cancelled.as_str());
        let reason = self.param(cancellation.reason.clone());
        let cancelled_at = self.time(cancellation.cancelled_at);
        self.stage(format!(
            "UPDATE {record} SET status = {status}, \
             cancellation_reason = {reason}, cancelled_at = {cancelled_at}, \
             updated_at = time::now()"
        ));
    }

    fn staged_writes(&self) -> usize {
        self.statements.len()
    }

    async fn commit(mut self) -> HerdResult<()> {
        if self.statements.is_empty() {
            debug!(operation = self.operation, "unit of work committed (no writes)");
            return Ok(());
        }

        let operation = self.operation;
        let sql = self.render();
        let staged = self.statements.len();
        let bindings = std::mem::take(&mut self.bindings);
        self.statements.clear();

        let mut query = self.db.query(sql);
        for binding in bindings {
            query = query.bind(binding);
        }

        let response = match timeout_at(self.deadline, query).await {
            Ok(response) => response,
            Err(_) => return Err(DbError::Timeout { operation }.into()),
        };
        response
            .map_err(|e| DbError::Transaction {
                operation,
                message: e.to_string(),
            })?
            .check()
            .map_err(|e| DbError::Transaction {
                operation,
                message: e.to_string(),
            })?;

        debug!(operation, staged, "unit of work committed");
        Ok(())
    }

    async fn rollback(mut self) {
        let discarded = self.statements.len();
        self.statements.clear();
        self.bindings.clear();
        debug!(operation = self.operation, discarded, "unit of work rolled back");
    }
}

impl<C: Connection> Drop for SurrealUnitOfWork<C> {
    fn drop(&mut self) {
        if !self.statements.is_empty() {
            warn!(
                operation = self.operation,
                discarded = self.statements.len(),
                "unit of work dropped without commit"
            );
        }
    }
}
