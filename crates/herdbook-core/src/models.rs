//! Domain models for Herdbook.
//!
//! Records reference each other by identifier only; no model embeds
//! another.

pub mod animal;
pub mod audit;
pub mod habitat;
pub mod sale;
