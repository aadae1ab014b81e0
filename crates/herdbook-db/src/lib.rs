//! Herdbook Database — SurrealDB storage for the herd.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema migrations ([`run_migrations`])
//! - Repository implementations of the `herdbook-core` traits
//! - The transaction coordinator ([`SurrealCoordinator`]) that backs every
//!   multi-record write with advisory locks, a bounded unit pool and a
//!   single atomic commit
//! - Error types ([`DbError`])

mod connection;
pub mod coordinator;
mod error;
pub mod lock;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbCredentials, DbManager};
pub use coordinator::{CoordinatorConfig, SurrealCoordinator, SurrealUnitOfWork};
pub use error::DbError;
pub use schema::{latest_version, run_migrations};
