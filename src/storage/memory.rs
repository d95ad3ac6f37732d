//! In-memory implementation of the ledger store.
//!
//! Backs local runs and the test suite. Fault switches let tests stage
//! storage outages and permanent write conflicts.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::engine::day_key::DayKey;
use crate::interfaces::ledger_store::{LedgerStore, Result, StorageError};
use crate::model::{AuditEntry, PointsAccount, UserAttendanceRecord};

/// Ledger store holding everything in process memory.
#[derive(Default)]
pub struct MemoryLedgerStore {
    attendance: RwLock<HashMap<String, UserAttendanceRecord>>,
    accounts: RwLock<HashMap<String, PointsAccount>>,
    audit: RwLock<HashMap<String, Vec<AuditEntry>>>,
    fail_puts: RwLock<bool>,
    conflict_commits: RwLock<bool>,
    commits_until_fault: RwLock<Option<u32>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every attendance write fail as `Unavailable`.
    pub async fn set_fail_puts(&self, fail: bool) {
        *self.fail_puts.write().await = fail;
    }

    /// Make every adjustment commit fail as `Unavailable`.
    pub async fn set_fail_commits(&self, fail: bool) {
        *self.commits_until_fault.write().await = if fail { Some(0) } else { None };
    }

    /// Let `n` adjustment commits succeed, then fail the rest as
    /// `Unavailable` until the switch is cleared.
    pub async fn fail_commits_after(&self, n: u32) {
        *self.commits_until_fault.write().await = Some(n);
    }

    /// Make every adjustment commit fail as `ConditionFailed`.
    pub async fn set_conflict_commits(&self, conflict: bool) {
        *self.conflict_commits.write().await = conflict;
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_attendance(&self, user_id: &str) -> Result<Option<UserAttendanceRecord>> {
        Ok(self.attendance.read().await.get(user_id).cloned())
    }

    async fn put_attendance(
        &self,
        record: &UserAttendanceRecord,
        expected_last_day: Option<DayKey>,
    ) -> Result<()> {
        if *self.fail_puts.read().await {
            return Err(StorageError::Unavailable(
                "injected attendance fault".to_string(),
            ));
        }
        let mut attendance = self.attendance.write().await;
        let stored = attendance
            .get(&record.user_id)
            .map(|r| r.last_check_in_day);
        if stored != expected_last_day {
            return Err(StorageError::ConditionFailed {
                user_id: record.user_id.clone(),
                detail: format!("expected last day {expected_last_day:?}, stored {stored:?}"),
            });
        }
        attendance.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn get_account(&self, user_id: &str) -> Result<Option<PointsAccount>> {
        Ok(self.accounts.read().await.get(user_id).cloned())
    }

    async fn commit_adjustment(
        &self,
        expected_version: Option<u64>,
        account: &PointsAccount,
        entry: &AuditEntry,
    ) -> Result<()> {
        {
            let mut remaining = self.commits_until_fault.write().await;
            if let Some(n) = remaining.as_mut() {
                if *n == 0 {
                    return Err(StorageError::Unavailable(
                        "injected commit fault".to_string(),
                    ));
                }
                *n -= 1;
            }
        }
        if *self.conflict_commits.read().await {
            return Err(StorageError::ConditionFailed {
                user_id: account.user_id.clone(),
                detail: "injected write conflict".to_string(),
            });
        }

        // Lock order: accounts before audit, everywhere.
        let mut accounts = self.accounts.write().await;
        let mut audit = self.audit.write().await;

        let stored_version = accounts.get(&account.user_id).map(|a| a.version);
        if stored_version != expected_version {
            return Err(StorageError::ConditionFailed {
                user_id: account.user_id.clone(),
                detail: format!(
                    "expected version {expected_version:?}, stored {stored_version:?}"
                ),
            });
        }

        if let Some(key) = &entry.causation_key {
            let duplicate = audit
                .get(&entry.user_id)
                .is_some_and(|entries| {
                    entries.iter().any(|e| e.causation_key.as_deref() == Some(key))
                });
            if duplicate {
                return Err(StorageError::ConditionFailed {
                    user_id: entry.user_id.clone(),
                    detail: format!("duplicate causation key {key}"),
                });
            }
        }

        accounts.insert(account.user_id.clone(), account.clone());
        audit
            .entry(entry.user_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn find_audit_by_causation(
        &self,
        user_id: &str,
        causation_key: &str,
    ) -> Result<Option<AuditEntry>> {
        let audit = self.audit.read().await;
        Ok(audit.get(user_id).and_then(|entries| {
            entries
                .iter()
                .find(|e| e.causation_key.as_deref() == Some(causation_key))
                .cloned()
        }))
    }

    async fn audit_entries(&self, user_id: &str) -> Result<Vec<AuditEntry>> {
        let audit = self.audit.read().await;
        Ok(audit.get(user_id).cloned().unwrap_or_default())
    }

    async fn recent_audit(&self, user_id: &str, limit: u32) -> Result<Vec<AuditEntry>> {
        let audit = self.audit.read().await;
        Ok(audit
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .rev()
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::model::AdjustReason;

    fn record(user_id: &str, day: i64, streak: u32) -> UserAttendanceRecord {
        UserAttendanceRecord {
            user_id: user_id.to_string(),
            last_check_in_day: DayKey::from_days(day),
            current_streak: streak,
            longest_streak: streak,
            updated_at: Utc::now(),
        }
    }

    fn account(user_id: &str, balance: i64, version: u64) -> PointsAccount {
        PointsAccount {
            user_id: user_id.to_string(),
            balance,
            version,
            updated_at: Utc::now(),
        }
    }

    fn entry(user_id: &str, delta: i64, balance: i64, key: Option<&str>) -> AuditEntry {
        AuditEntry {
            entry_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            delta,
            reason: AdjustReason::Bonus,
            resulting_balance: balance,
            created_at: Utc::now(),
            causation_key: key.map(str::to_string),
            counterparty: None,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_attendance_conditional_put() {
        let store = MemoryLedgerStore::new();

        store
            .put_attendance(&record("user-1", 10, 1), None)
            .await
            .unwrap();

        // Second fresh insert loses.
        let err = store
            .put_attendance(&record("user-1", 10, 1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ConditionFailed { .. }));

        // Stale expectation loses.
        let err = store
            .put_attendance(&record("user-1", 11, 2), Some(DayKey::from_days(9)))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ConditionFailed { .. }));

        // Correct expectation wins.
        store
            .put_attendance(&record("user-1", 11, 2), Some(DayKey::from_days(10)))
            .await
            .unwrap();
        let stored = store.get_attendance("user-1").await.unwrap().unwrap();
        assert_eq!(stored.current_streak, 2);
    }

    #[tokio::test]
    async fn test_commit_version_check() {
        let store = MemoryLedgerStore::new();

        store
            .commit_adjustment(None, &account("user-1", 10, 1), &entry("user-1", 10, 10, None))
            .await
            .unwrap();

        let err = store
            .commit_adjustment(None, &account("user-1", 20, 1), &entry("user-1", 10, 20, None))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ConditionFailed { .. }));

        store
            .commit_adjustment(
                Some(1),
                &account("user-1", 20, 2),
                &entry("user-1", 10, 20, None),
            )
            .await
            .unwrap();
        assert_eq!(store.get_account("user-1").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_causation_key_backstop() {
        let store = MemoryLedgerStore::new();

        store
            .commit_adjustment(
                None,
                &account("user-1", 10, 1),
                &entry("user-1", 10, 10, Some("grant:1")),
            )
            .await
            .unwrap();

        let err = store
            .commit_adjustment(
                Some(1),
                &account("user-1", 20, 2),
                &entry("user-1", 10, 20, Some("grant:1")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ConditionFailed { .. }));

        let found = store
            .find_audit_by_causation("user-1", "grant:1")
            .await
            .unwrap();
        assert_eq!(found.unwrap().resulting_balance, 10);
    }

    #[tokio::test]
    async fn test_recent_audit_newest_first() {
        let store = MemoryLedgerStore::new();

        for (version, balance) in [(1u64, 10i64), (2, 20), (3, 30)] {
            let expected = if version == 1 { None } else { Some(version - 1) };
            store
                .commit_adjustment(
                    expected,
                    &account("user-1", balance, version),
                    &entry("user-1", 10, balance, None),
                )
                .await
                .unwrap();
        }

        let recent = store.recent_audit("user-1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].resulting_balance, 30);
        assert_eq!(recent[1].resulting_balance, 20);

        let all = store.audit_entries("user-1").await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].resulting_balance, 10);
    }

    #[tokio::test]
    async fn test_fault_switches() {
        let store = MemoryLedgerStore::new();

        store.set_fail_puts(true).await;
        let err = store
            .put_attendance(&record("user-1", 10, 1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        store.set_fail_puts(false).await;

        store.fail_commits_after(1).await;
        store
            .commit_adjustment(None, &account("user-1", 10, 1), &entry("user-1", 10, 10, None))
            .await
            .unwrap();
        let err = store
            .commit_adjustment(
                Some(1),
                &account("user-1", 20, 2),
                &entry("user-1", 10, 20, None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }
}
