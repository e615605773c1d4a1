//! facegated — the Facegate daemon.
//!
//! Hosts two services over one HTTP surface: face verification (the
//! authentication gate) and the inventory ledger with its audit log.
//! The inventory endpoint trusts that its caller authenticated first; it
//! performs no verification of its own. See DESIGN.md for that boundary.

pub mod config;
pub mod engine;
pub mod http;
