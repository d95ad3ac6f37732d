//! Shared utilities for integration tests.
//!
//! Builds the service over the in-memory store and fixes instants to
//! the default +09:00 offset so day arithmetic stays readable.

// Each test binary uses a subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};

use rollcall::config::Config;
use rollcall::service::Rollcall;
use rollcall::storage::MemoryLedgerStore;

/// Service over a fresh in-memory store with the default test config.
pub async fn memory_service() -> (Rollcall, Arc<MemoryLedgerStore>) {
    memory_service_with(Config::for_test()).await
}

/// Service over a fresh in-memory store with the given config.
pub async fn memory_service_with(config: Config) -> (Rollcall, Arc<MemoryLedgerStore>) {
    let store = Arc::new(MemoryLedgerStore::new());
    let service = Rollcall::builder(config)
        .with_store(store.clone())
        .build()
        .await
        .expect("service should build");
    (service, store)
}

/// Noon local time on epoch day `n` under the default +09:00 offset.
pub fn at_day(n: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(n * 86_400 + 3 * 3_600, 0).expect("instant in range")
}

/// `at_day(n)` shifted to an arbitrary second of the UTC day.
pub fn at_day_second(n: i64, second: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(n * 86_400 + second, 0).expect("instant in range")
}
