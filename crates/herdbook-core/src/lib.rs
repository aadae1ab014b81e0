//! Herdbook Core — domain models, repository traits, the unit-of-work
//! contract and the shared error taxonomy.

pub mod context;
pub mod error;
pub mod models;
pub mod repository;
pub mod unit_of_work;

pub use context::ActorContext;
pub use error::{ErrorKind, HerdError, HerdResult, InternalError};
pub use unit_of_work::{LockKey, LockSet, TransactionCoordinator, UnitOfWork};
