//! facegate-ledger — In-memory inventory ledger and audit log.
//!
//! The ledger applies whole sold-item batches as one unit (clamped at zero,
//! unknown SKUs inserted at zero); the audit log records every mutation in
//! insertion order and is never truncated.

pub mod audit;
pub mod ledger;

pub use audit::{AuditEntry, AuditLog};
pub use ledger::{BatchOutcome, InventoryLedger};
