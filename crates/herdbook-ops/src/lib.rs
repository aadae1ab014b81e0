//! Herdbook Ops — the managers that own each entity and keep related
//! records consistent.
//!
//! Every write goes through a [`TransactionCoordinator`] unit of work and is
//! followed by a best-effort audit entry. The managers are generic over the
//! coordinator and the audit sink so this crate has no dependency on the
//! database crate.
//!
//! [`TransactionCoordinator`]: herdbook_core::TransactionCoordinator

pub mod audit;
pub mod config;
pub mod diagnostics;
pub mod habitats;
pub mod registry;
pub mod sales;
mod validate;

pub use audit::{AuditFailure, AuditRecorder};
pub use config::OpsConfig;
pub use diagnostics::{DiagnosticLedger, FinalizeResult, SubmitSample};
pub use habitats::{AssignAnimals, HabitatManager, ReleaseAnimals, TransferAnimals, TransferSingle};
pub use registry::{AnimalRegistry, RegisterAnimal};
pub use sales::{ApproveSale, CancelSale, CreateSale, SaleManager};
