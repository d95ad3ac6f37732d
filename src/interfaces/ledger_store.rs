//! Ledger storage interface.

use async_trait::async_trait;

use crate::engine::day_key::DayKey;
use crate::model::{AuditEntry, PointsAccount, UserAttendanceRecord};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A conditional write found different stored state than the caller
    /// claimed to have observed.
    #[error("Write condition failed for user {user_id}: {detail}")]
    ConditionFailed { user_id: String, detail: String },

    #[error("Malformed stored document: {0}")]
    MalformedDocument(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[cfg(feature = "mongodb")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// Interface for ledger persistence.
///
/// Implementations:
/// - `MemoryLedgerStore`: in-process storage for tests and local runs
/// - `MongoLedgerStore`: MongoDB storage
///
/// All writes are conditional: the caller states what it last observed
/// and the store refuses the write when stored state differs, returning
/// `ConditionFailed` so the caller can re-read and replay.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch a user's attendance record, if any.
    async fn get_attendance(&self, user_id: &str) -> Result<Option<UserAttendanceRecord>>;

    /// Write an attendance record, conditioned on the stored
    /// `last_check_in_day` still being `expected_last_day`.
    /// `None` means the record must not exist yet.
    async fn put_attendance(
        &self,
        record: &UserAttendanceRecord,
        expected_last_day: Option<DayKey>,
    ) -> Result<()>;

    /// Fetch a user's points account, if any.
    async fn get_account(&self, user_id: &str) -> Result<Option<PointsAccount>>;

    /// Commit a balance adjustment: persist the updated account and
    /// append its audit entry as one atomic unit, conditioned on the
    /// stored account version still being `expected_version`.
    /// `None` means the account must not exist yet.
    ///
    /// A duplicate causation key on the entry is also reported as
    /// `ConditionFailed`; the caller resolves it by looking the key up.
    async fn commit_adjustment(
        &self,
        expected_version: Option<u64>,
        account: &PointsAccount,
        entry: &AuditEntry,
    ) -> Result<()>;

    /// Look up the audit entry previously recorded under a causation key.
    async fn find_audit_by_causation(
        &self,
        user_id: &str,
        causation_key: &str,
    ) -> Result<Option<AuditEntry>>;

    /// All audit entries for a user, oldest first.
    async fn audit_entries(&self, user_id: &str) -> Result<Vec<AuditEntry>>;

    /// Most recent audit entries for a user, newest first.
    async fn recent_audit(&self, user_id: &str, limit: u32) -> Result<Vec<AuditEntry>>;
}
