//! Abstract interfaces for rollcall components.
//!
//! These traits define the contracts for:
//! - Ledger storage (attendance records, accounts, audit log)

pub mod ledger_store;

pub use ledger_store::{LedgerStore, StorageError};
