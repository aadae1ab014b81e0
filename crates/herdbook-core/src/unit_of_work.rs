//! Unit-of-work contract for multi-record writes.
//!
//! A unit is opened with [`TransactionCoordinator::begin`] and a
//! [`LockSet`] naming every entity the operation checks or mutates. The
//! lifecycle is:
//!
//! 1. `begin` acquires the advisory locks (in a global order) and a slot of
//!    the bounded storage pool;
//! 2. the caller reads through the unit and validates its preconditions;
//! 3. the caller stages writes (no I/O happens while staging);
//! 4. `commit` applies every staged write atomically, or `rollback`
//!    discards them.
//!
//! Dropping a unit without committing discards the staged writes. Locks and
//! the pool slot are held until the unit is consumed or dropped, so the
//! check and the act are never separated by a concurrent writer.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::error::HerdResult;
use crate::models::{
    animal::{Animal, AnimalChanges},
    diagnostic_test::{DiagnosticTest, TestFinalization},
    habitat::{Habitat, HabitatAssignment, HabitatTransfer},
    sale::{SaleApproval, SaleCancellation, SaleRecord},
};

/// Key of a per-entity advisory lock.
///
/// The derived ordering is the global acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Animal(Uuid),
    TagNumber(String),
    DetectionTag(String),
    DiagnosticTest(Uuid),
    Habitat(Uuid),
    Sale(Uuid),
}

/// Ordered, de-duplicated set of lock keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockSet(BTreeSet<LockKey>);

impl LockSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: LockKey) -> Self {
        self.0.insert(key);
        self
    }

    pub fn insert(&mut self, key: LockKey) {
        self.0.insert(key);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LockKey> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<LockKey> for LockSet {
    fn from_iter<I: IntoIterator<Item = LockKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<LockKey> for LockSet {
    fn extend<I: IntoIterator<Item = LockKey>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for LockSet {
    type Item = LockKey;
    type IntoIter = std::collections::btree_set::IntoIter<LockKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Opens units of work.
pub trait TransactionCoordinator: Send + Sync {
    type Unit: UnitOfWork;

    /// Acquire `locks` and a pool slot, then hand out a unit. `operation`
    /// names the unit in logs.
    fn begin(
        &self,
        operation: &'static str,
        locks: LockSet,
    ) -> impl Future<Output = HerdResult<Self::Unit>> + Send;
}

/// One atomic set of writes plus the reads that justify them.
pub trait UnitOfWork: Send {
    // -----------------------------------------------------------------------
    // Reads (under the unit's locks)
    // -----------------------------------------------------------------------

    fn animal(&mut self, id: Uuid) -> impl Future<Output = HerdResult<Option<Animal>>> + Send;
    fn animal_by_tag_number(
        &mut self,
        tag_number: &str,
    ) -> impl Future<Output = HerdResult<Option<Animal>>> + Send;
    fn animal_by_detection_tag(
        &mut self,
        detection_tag: &str,
    ) -> impl Future<Output = HerdResult<Option<Animal>>> + Send;
    fn diagnostic_test(
        &mut self,
        id: Uuid,
    ) -> impl Future<Output = HerdResult<Option<DiagnosticTest>>> + Send;
    fn open_test_for_animal(
        &mut self,
        animal_id: Uuid,
    ) -> impl Future<Output = HerdResult<Option<DiagnosticTest>>> + Send;
    fn habitat(&mut self, id: Uuid) -> impl Future<Output = HerdResult<Option<Habitat>>> + Send;
    fn occupancy(&mut self, habitat_id: Uuid) -> impl Future<Output = HerdResult<u64>> + Send;
    fn sale(&mut self, id: Uuid) -> impl Future<Output = HerdResult<Option<SaleRecord>>> + Send;
    fn pending_sale_for_animal(
        &mut self,
        animal_id: Uuid,
    ) -> impl Future<Output = HerdResult<Option<SaleRecord>>> + Send;
    /// Number of diagnostic tests, sale records and transfer rows referencing
    /// the animal.
    fn animal_reference_count(
        &mut self,
        animal_id: Uuid,
    ) -> impl Future<Output = HerdResult<u64>> + Send;

    // -----------------------------------------------------------------------
    // Staged writes
    // -----------------------------------------------------------------------

    fn insert_animal(&mut self, animal: &Animal);
    fn update_animal(&mut self, id: Uuid, changes: &AnimalChanges);
    fn delete_animal(&mut self, id: Uuid);

    fn insert_diagnostic_test(&mut self, test: &DiagnosticTest);
    fn finalize_diagnostic_test(&mut self, id: Uuid, finalization: &TestFinalization);
    fn delete_diagnostic_test(&mut self, id: Uuid);

    fn insert_habitat(&mut self, habitat: &Habitat);
    fn insert_assignment(&mut self, assignment: &HabitatAssignment);
    /// Remove whatever assignment the animal currently holds.
    fn remove_assignment(&mut self, animal_id: Uuid);
    fn insert_transfer(&mut self, transfer: &HabitatTransfer);

    fn insert_sale(&mut self, sale: &SaleRecord);
    fn complete_sale(&mut self, id: Uuid, approval: &SaleApproval);
    fn cancel_sale(&mut self, id: Uuid, cancellation: &SaleCancellation);

    /// Number of writes staged so far.
    fn staged_writes(&self) -> usize;

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    fn commit(self) -> impl Future<Output = HerdResult<()>> + Send;
    fn rollback(self) -> impl Future<Output = ()> + Send;
}
