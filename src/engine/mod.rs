//! Ledger engines.
//!
//! Stateless orchestration over a [`LedgerStore`]: day resolution,
//! attendance check-ins, points adjustments, and gratitude transfers.
//! Every read-modify-write round is optimistic; losing a race surfaces
//! as a storage condition failure and is replayed with backoff.

pub mod attendance;
pub mod day_key;
pub mod gratitude;
pub mod points;

pub use attendance::{AttendanceEngine, CheckInOutcome, MilestoneSchedule, RewardSchedule};
pub use day_key::DayKey;
pub use gratitude::{GratitudeEngine, GratitudeOutcome};
pub use points::{AdjustmentOutcome, PointsLedger};

use std::future::Future;
use std::time::Duration;

use crate::interfaces::ledger_store::StorageError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced by the engines.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Rejected before any state was touched.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Conditional writes kept losing to other writers. Nothing was
    /// changed by this call.
    #[error("Concurrent modification on user {user_id}: gave up after {attempts} attempts")]
    ConcurrentModification { user_id: String, attempts: u32 },

    /// The adjustment would have driven the balance below zero.
    #[error("Insufficient balance for user {user_id}: {balance} cannot absorb {delta}")]
    InsufficientBalance {
        user_id: String,
        balance: i64,
        delta: i64,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Longest accepted user id.
pub const MAX_USER_ID_LEN: usize = 64;

/// Validate an externally supplied user id.
///
/// Colons are reserved as the causation-key separator, whitespace would
/// make log fields and keys ambiguous.
pub(crate) fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(LedgerError::InvalidInput("empty user id".to_string()));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(LedgerError::InvalidInput(format!(
            "user id longer than {MAX_USER_ID_LEN} bytes"
        )));
    }
    if user_id.chars().any(|c| c.is_whitespace() || c == ':') {
        return Err(LedgerError::InvalidInput(format!(
            "user id {user_id:?} contains whitespace or ':'"
        )));
    }
    Ok(())
}

/// Run a storage call under the configured deadline.
///
/// A timed-out call has unknown outcome on the server side; it surfaces
/// as `Unavailable` and is never silently retried here.
pub(crate) async fn with_deadline<T>(
    limit: Duration,
    op: &str,
    fut: impl Future<Output = std::result::Result<T, StorageError>>,
) -> std::result::Result<T, StorageError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Unavailable(format!(
            "{op} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
