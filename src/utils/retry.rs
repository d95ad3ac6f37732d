//! Retry utilities: backoff builders and retryable error classification.
//!
//! Uses `backon` for exponential backoff with jitter. Conditional-write
//! conflicts are the only failures replayed inline; everything else
//! propagates to the caller.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::engine::LedgerError;
use crate::interfaces::ledger_store::StorageError;

/// Backoff for replaying a read-modify-write round after losing a race.
///
/// - Min delay: 5ms
/// - Max delay: 200ms
/// - Max attempts: from ledger config (default 3)
/// - Jitter enabled
pub fn conflict_backoff(max_retries: u32) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(200))
        .with_max_times(max_retries as usize)
        .with_jitter()
}

/// Determines if a failure is a lost conditional write, worth replaying.
///
/// Non-retryable:
/// - `InvalidInput`, `InsufficientBalance`: deterministic rejections,
///   replaying cannot change the answer.
/// - `Unavailable`: unknown outcome; the caller decides whether to
///   resubmit under the same causation key.
pub fn is_write_conflict(error: &LedgerError) -> bool {
    matches!(
        error,
        LedgerError::Storage(StorageError::ConditionFailed { .. })
    )
}

/// Determines if a failed write may be resubmitted later under the same
/// causation key without risking double application.
pub fn is_recoverable(error: &LedgerError) -> bool {
    matches!(
        error,
        LedgerError::ConcurrentModification { .. } | LedgerError::Storage(_)
    )
}
