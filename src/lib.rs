//! Rollcall - attendance streaks and points ledger.
//!
//! A storage-backed engine for community servers: daily check-ins with
//! streak accounting, a points ledger with an immutable audit log, and
//! peer gratitude transfers. All writes are optimistic conditional
//! writes; replays are deduplicated through causation keys.

pub mod config;
pub mod engine;
pub mod interfaces;
pub mod model;
pub mod service;
pub mod storage;
pub mod utils;
