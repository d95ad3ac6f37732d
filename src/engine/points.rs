//! Points ledger: versioned balances over an append-only audit log.

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::engine::{validate_user_id, with_deadline, LedgerError, Result};
use crate::interfaces::ledger_store::LedgerStore;
use crate::model::{AdjustmentRequest, AuditEntry, PointsAccount};
use crate::utils::retry::{conflict_backoff, is_write_conflict};

/// Outcome of an adjustment submission.
#[derive(Debug, Clone, PartialEq)]
pub enum AdjustmentOutcome {
    /// The adjustment was committed by this call.
    Applied { entry_id: Uuid, balance: i64 },
    /// An entry under the same causation key was already on the log;
    /// its recorded outcome is returned and nothing was re-applied.
    Duplicate { entry_id: Uuid, balance: i64 },
}

impl AdjustmentOutcome {
    /// Balance after the adjustment, whether applied now or earlier.
    pub fn balance(&self) -> i64 {
        match self {
            AdjustmentOutcome::Applied { balance, .. }
            | AdjustmentOutcome::Duplicate { balance, .. } => *balance,
        }
    }
}

/// Balance movement over a [`LedgerStore`].
pub struct PointsLedger {
    store: Arc<dyn LedgerStore>,
    allow_negative: bool,
    max_retries: u32,
    op_timeout: Duration,
}

impl PointsLedger {
    pub fn new(store: Arc<dyn LedgerStore>, policy: &LedgerConfig, op_timeout: Duration) -> Self {
        Self {
            store,
            allow_negative: policy.allow_negative_balance,
            max_retries: policy.max_retries,
            op_timeout,
        }
    }

    /// Apply a balance adjustment.
    ///
    /// The round is read-modify-write under the account version; a lost
    /// race is replayed with backoff before surfacing as
    /// `ConcurrentModification`. Requests carrying a causation key are
    /// idempotent across submissions and processes.
    pub async fn apply(&self, request: &AdjustmentRequest) -> Result<AdjustmentOutcome> {
        validate_user_id(&request.user_id)?;
        if let Some(counterparty) = &request.counterparty {
            validate_user_id(counterparty)?;
        }
        if request.delta == 0 {
            return Err(LedgerError::InvalidInput(
                "zero-delta adjustment".to_string(),
            ));
        }

        let outcome = (|| self.try_apply(request))
            .retry(conflict_backoff(self.max_retries))
            .when(is_write_conflict)
            .notify(|err: &LedgerError, dur: Duration| {
                debug!(error = %err, delay = ?dur, "adjustment lost a write race, retrying");
            })
            .await;

        match outcome {
            Err(err) if is_write_conflict(&err) => Err(LedgerError::ConcurrentModification {
                user_id: request.user_id.clone(),
                attempts: self.max_retries + 1,
            }),
            other => other,
        }
    }

    async fn try_apply(&self, request: &AdjustmentRequest) -> Result<AdjustmentOutcome> {
        // Replays resolve from the audit log without touching the account.
        if let Some(key) = &request.causation_key {
            let prior = with_deadline(
                self.op_timeout,
                "find_audit_by_causation",
                self.store.find_audit_by_causation(&request.user_id, key),
            )
            .await?;
            if let Some(entry) = prior {
                return Ok(AdjustmentOutcome::Duplicate {
                    entry_id: entry.entry_id,
                    balance: entry.resulting_balance,
                });
            }
        }

        let stored = with_deadline(
            self.op_timeout,
            "get_account",
            self.store.get_account(&request.user_id),
        )
        .await?;

        let (expected_version, balance, version) = match &stored {
            Some(account) => (Some(account.version), account.balance, account.version + 1),
            None => (None, 0, 1),
        };

        let new_balance = balance.checked_add(request.delta).ok_or_else(|| {
            LedgerError::InvalidInput(format!("balance overflow applying {}", request.delta))
        })?;
        if new_balance < 0 && !self.allow_negative {
            return Err(LedgerError::InsufficientBalance {
                user_id: request.user_id.clone(),
                balance,
                delta: request.delta,
            });
        }

        let account = PointsAccount {
            user_id: request.user_id.clone(),
            balance: new_balance,
            version,
            updated_at: Utc::now(),
        };
        let entry = AuditEntry {
            entry_id: Uuid::new_v4(),
            user_id: request.user_id.clone(),
            delta: request.delta,
            reason: request.reason,
            resulting_balance: new_balance,
            created_at: Utc::now(),
            causation_key: request.causation_key.clone(),
            counterparty: request.counterparty.clone(),
            note: request.note.clone(),
        };

        with_deadline(
            self.op_timeout,
            "commit_adjustment",
            self.store
                .commit_adjustment(expected_version, &account, &entry),
        )
        .await?;

        debug!(
            user_id = %request.user_id,
            delta = request.delta,
            reason = %request.reason,
            balance = new_balance,
            "adjustment committed"
        );

        Ok(AdjustmentOutcome::Applied {
            entry_id: entry.entry_id,
            balance: new_balance,
        })
    }

    /// Current balance; 0 for users with no account.
    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        Ok(self.account(user_id).await?.map(|a| a.balance).unwrap_or(0))
    }

    /// The stored account, if any.
    pub async fn account(&self, user_id: &str) -> Result<Option<PointsAccount>> {
        validate_user_id(user_id)?;
        let account = with_deadline(
            self.op_timeout,
            "get_account",
            self.store.get_account(user_id),
        )
        .await?;
        Ok(account)
    }
}
