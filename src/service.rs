//! High-level service facade.
//!
//! `Rollcall` wires the engines over one store and exposes the calls a
//! front end (bot command layer, HTTP handler) uses directly. The
//! check-in path orchestrates two records: attendance first, then the
//! points accrual; when the second write fails recoverably the caller
//! receives the unfinished accrual instead of an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::attendance::{AttendanceEngine, CheckInOutcome, MilestoneSchedule, RewardSchedule};
use crate::engine::day_key::DayKey;
use crate::engine::gratitude::{slot_prefix, GratitudeEngine, GratitudeOutcome};
use crate::engine::points::{AdjustmentOutcome, PointsLedger};
use crate::engine::{validate_user_id, with_deadline, LedgerError, Result};
use crate::interfaces::ledger_store::LedgerStore;
use crate::model::{AdjustReason, AdjustmentRequest, AuditEntry};
use crate::storage::init_storage;

/// Result of a check-in as reported to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckInReport {
    /// Attendance recorded and points credited.
    Completed {
        day: DayKey,
        streak: u32,
        longest_streak: u32,
        points_awarded: i64,
        balance: i64,
    },
    /// The user had already checked in on this local day.
    AlreadyCheckedIn {
        day: DayKey,
        streak: u32,
        longest_streak: u32,
    },
    /// Attendance recorded but the points credit has not landed.
    /// Resubmit `accrual` through [`Rollcall::apply_adjustment`] to
    /// complete it; replays are deduplicated on the audit log.
    PointsPending {
        day: DayKey,
        streak: u32,
        longest_streak: u32,
        accrual: AdjustmentRequest,
    },
}

/// A user's streak standing.
#[derive(Debug, Clone, PartialEq)]
pub struct StreakStanding {
    pub current: u32,
    pub longest: u32,
    pub last_check_in_day: Option<DayKey>,
}

/// Attendance totals for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceSummary {
    pub user_id: String,
    pub checked_in_today: bool,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_check_ins: u64,
    pub points_from_check_ins: i64,
}

/// Gratitude totals for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct GratitudeSummary {
    pub user_id: String,
    pub sent_today: u32,
    pub remaining_today: u32,
    pub total_sent: u64,
    pub total_received: u64,
    pub points_from_sent: i64,
    pub points_from_received: i64,
}

/// Reconciliation of a recorded balance against its audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceAudit {
    pub user_id: String,
    pub recorded_balance: i64,
    pub replayed_balance: i64,
    pub entries: u64,
    pub consistent: bool,
}

/// Builder for [`Rollcall`].
pub struct RollcallBuilder {
    config: Config,
    store: Option<Arc<dyn LedgerStore>>,
    schedule: Option<Arc<dyn RewardSchedule>>,
}

impl RollcallBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            schedule: None,
        }
    }

    /// Use an already constructed store instead of `config.storage`.
    pub fn with_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the milestone schedule from `config.rewards`.
    pub fn with_reward_schedule(mut self, schedule: Arc<dyn RewardSchedule>) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub async fn build(self) -> Result<Rollcall> {
        let offset = self.config.attendance.utc_offset().ok_or_else(|| {
            LedgerError::InvalidInput(format!(
                "utc_offset_secs {} is out of range",
                self.config.attendance.utc_offset_secs
            ))
        })?;
        // A slot is claimed by its ledger entry, and entries must move
        // points, so a send has to credit at least one per side.
        if self.config.gratitude.points_per_side < 1 {
            return Err(LedgerError::InvalidInput(format!(
                "gratitude points_per_side {} must be at least 1",
                self.config.gratitude.points_per_side
            )));
        }

        let store = match self.store {
            Some(store) => store,
            None => init_storage(&self.config.storage).await?,
        };
        let op_timeout = Duration::from_millis(self.config.storage.timeout_ms);
        let schedule = self
            .schedule
            .unwrap_or_else(|| Arc::new(MilestoneSchedule::from_config(&self.config.rewards)));

        let ledger = Arc::new(PointsLedger::new(
            store.clone(),
            &self.config.ledger,
            op_timeout,
        ));
        let attendance = AttendanceEngine::new(
            store.clone(),
            schedule,
            offset,
            &self.config.ledger,
            op_timeout,
        );
        let gratitude = GratitudeEngine::new(ledger.clone(), offset, &self.config.gratitude);

        info!(storage = ?self.config.storage.storage_type, "ledger service ready");

        Ok(Rollcall {
            store,
            attendance,
            ledger,
            gratitude,
            offset,
            op_timeout,
            config: self.config,
        })
    }
}

/// Attendance and points service over one ledger store.
pub struct Rollcall {
    store: Arc<dyn LedgerStore>,
    attendance: AttendanceEngine,
    ledger: Arc<PointsLedger>,
    gratitude: GratitudeEngine,
    offset: FixedOffset,
    op_timeout: Duration,
    config: Config,
}

impl std::fmt::Debug for Rollcall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rollcall")
            .field("offset", &self.offset)
            .field("op_timeout", &self.op_timeout)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Rollcall {
    pub fn builder(config: Config) -> RollcallBuilder {
        RollcallBuilder::new(config)
    }

    /// Check `user_id` in at `instant` and credit the day's points.
    pub async fn check_in(&self, user_id: &str, instant: DateTime<Utc>) -> Result<CheckInReport> {
        let outcome = self.attendance.check_in(user_id, instant).await?;
        let (day, streak, longest_streak, points_awarded, causation_key) = match outcome {
            CheckInOutcome::AlreadyCheckedIn {
                day,
                streak,
                longest_streak,
            } => {
                return Ok(CheckInReport::AlreadyCheckedIn {
                    day,
                    streak,
                    longest_streak,
                })
            }
            CheckInOutcome::Accepted {
                day,
                streak,
                longest_streak,
                points_awarded,
                causation_key,
            } => (day, streak, longest_streak, points_awarded, causation_key),
        };

        if points_awarded == 0 {
            return Ok(CheckInReport::Completed {
                day,
                streak,
                longest_streak,
                points_awarded,
                balance: self.ledger.balance(user_id).await?,
            });
        }

        let accrual = AdjustmentRequest::new(user_id, points_awarded, AdjustReason::CheckIn)
            .with_causation_key(causation_key);

        match self.ledger.apply(&accrual).await {
            Ok(outcome) => {
                info!(
                    user_id,
                    day = %day,
                    streak,
                    points = points_awarded,
                    "check-in completed"
                );
                Ok(CheckInReport::Completed {
                    day,
                    streak,
                    longest_streak,
                    points_awarded,
                    balance: outcome.balance(),
                })
            }
            Err(err) if crate::utils::retry::is_recoverable(&err) => {
                warn!(
                    user_id,
                    day = %day,
                    error = %err,
                    "attendance recorded but points accrual is pending"
                );
                Ok(CheckInReport::PointsPending {
                    day,
                    streak,
                    longest_streak,
                    accrual,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Submit a balance adjustment (admin grants, corrections, or the
    /// replay of a pending accrual).
    pub async fn apply_adjustment(&self, request: &AdjustmentRequest) -> Result<AdjustmentOutcome> {
        self.ledger.apply(request).await
    }

    /// Current balance; 0 for users with no account.
    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        self.ledger.balance(user_id).await
    }

    /// Current and longest streak.
    pub async fn streak(&self, user_id: &str) -> Result<StreakStanding> {
        let standing = self.attendance.standing(user_id).await?;
        Ok(match standing {
            Some(record) => StreakStanding {
                current: record.current_streak,
                longest: record.longest_streak,
                last_check_in_day: Some(record.last_check_in_day),
            },
            None => StreakStanding {
                current: 0,
                longest: 0,
                last_check_in_day: None,
            },
        })
    }

    /// Send thanks from `sender` to `recipient`.
    pub async fn send_gratitude(
        &self,
        sender: &str,
        recipient: &str,
        instant: DateTime<Utc>,
        note: Option<&str>,
    ) -> Result<GratitudeOutcome> {
        self.gratitude.send(sender, recipient, instant, note).await
    }

    /// Most recent audit entries, newest first.
    pub async fn recent_activity(&self, user_id: &str, limit: u32) -> Result<Vec<AuditEntry>> {
        validate_user_id(user_id)?;
        let entries = with_deadline(
            self.op_timeout,
            "recent_audit",
            self.store.recent_audit(user_id, limit),
        )
        .await?;
        Ok(entries)
    }

    /// Attendance totals as of `instant`.
    pub async fn attendance_summary(
        &self,
        user_id: &str,
        instant: DateTime<Utc>,
    ) -> Result<AttendanceSummary> {
        let standing = self.attendance.standing(user_id).await?;
        let today = crate::engine::day_key::resolve(instant, self.offset)?;

        let entries = self.all_audit(user_id).await?;
        let check_ins: Vec<&AuditEntry> = entries
            .iter()
            .filter(|e| e.reason == AdjustReason::CheckIn)
            .collect();

        Ok(AttendanceSummary {
            user_id: user_id.to_string(),
            checked_in_today: standing
                .as_ref()
                .is_some_and(|r| r.last_check_in_day == today),
            current_streak: standing.as_ref().map(|r| r.current_streak).unwrap_or(0),
            longest_streak: standing.as_ref().map(|r| r.longest_streak).unwrap_or(0),
            total_check_ins: check_ins.len() as u64,
            points_from_check_ins: check_ins.iter().map(|e| e.delta).sum(),
        })
    }

    /// Gratitude totals as of `instant`.
    pub async fn gratitude_summary(
        &self,
        user_id: &str,
        instant: DateTime<Utc>,
    ) -> Result<GratitudeSummary> {
        validate_user_id(user_id)?;
        let today = crate::engine::day_key::resolve(instant, self.offset)?;
        let entries = self.all_audit(user_id).await?;

        let today_prefix = slot_prefix(user_id, today);
        let mut sent_today = 0u32;
        let mut total_sent = 0u64;
        let mut total_received = 0u64;
        let mut points_from_sent = 0i64;
        let mut points_from_received = 0i64;
        for entry in &entries {
            match entry.reason {
                AdjustReason::GratitudeSent => {
                    total_sent += 1;
                    points_from_sent += entry.delta;
                    if entry
                        .causation_key
                        .as_deref()
                        .is_some_and(|k| k.starts_with(&today_prefix))
                    {
                        sent_today += 1;
                    }
                }
                AdjustReason::GratitudeReceived => {
                    total_received += 1;
                    points_from_received += entry.delta;
                }
                _ => {}
            }
        }

        let quota = self.gratitude.daily_quota();
        Ok(GratitudeSummary {
            user_id: user_id.to_string(),
            sent_today,
            remaining_today: quota.saturating_sub(sent_today),
            total_sent,
            total_received,
            points_from_sent,
            points_from_received,
        })
    }

    /// Replay the audit log against the recorded balance.
    ///
    /// `consistent` demands both that the per-entry running balances
    /// chain correctly and that the final sum equals the account.
    pub async fn verify_balance(&self, user_id: &str) -> Result<BalanceAudit> {
        let recorded_balance = self.ledger.balance(user_id).await?;
        let entries = self.all_audit(user_id).await?;

        let mut replayed_balance = 0i64;
        let mut chain_ok = true;
        for entry in &entries {
            replayed_balance += entry.delta;
            if entry.resulting_balance != replayed_balance {
                chain_ok = false;
            }
        }

        Ok(BalanceAudit {
            user_id: user_id.to_string(),
            recorded_balance,
            replayed_balance,
            entries: entries.len() as u64,
            consistent: chain_ok && recorded_balance == replayed_balance,
        })
    }

    async fn all_audit(&self, user_id: &str) -> Result<Vec<AuditEntry>> {
        let entries = with_deadline(
            self.op_timeout,
            "audit_entries",
            self.store.audit_entries(user_id),
        )
        .await?;
        Ok(entries)
    }

    /// The configuration this service was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryLedgerStore;

    async fn service_with(config: Config) -> Rollcall {
        Rollcall::builder(config)
            .with_store(Arc::new(MemoryLedgerStore::new()))
            .build()
            .await
            .unwrap()
    }

    /// Noon local time on day `n` under the default offset.
    fn at_day(n: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(n * 86_400 + 3 * 3_600, 0).unwrap()
    }

    #[tokio::test]
    async fn test_check_in_credits_points() {
        let service = service_with(Config::for_test()).await;

        let report = service.check_in("user-1", at_day(200)).await.unwrap();
        assert!(matches!(
            report,
            CheckInReport::Completed {
                streak: 1,
                points_awarded: 100,
                balance: 100,
                ..
            }
        ));
        assert_eq!(service.balance("user-1").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_streak_scenario() {
        // Check-ins on days 1, 2, skip 3, then 4: three awards, the
        // streak resets after the gap, the longest stays at two.
        let mut config = Config::for_test();
        config.rewards.base_points = 10;
        let service = service_with(config).await;

        service.check_in("user-1", at_day(201)).await.unwrap();
        service.check_in("user-1", at_day(202)).await.unwrap();
        service.check_in("user-1", at_day(204)).await.unwrap();

        assert_eq!(service.balance("user-1").await.unwrap(), 30);
        let standing = service.streak("user-1").await.unwrap();
        assert_eq!(standing.current, 1);
        assert_eq!(standing.longest, 2);

        let audit = service.verify_balance("user-1").await.unwrap();
        assert!(audit.consistent);
        assert_eq!(audit.entries, 3);
    }

    #[tokio::test]
    async fn test_second_check_in_awards_nothing() {
        let service = service_with(Config::for_test()).await;

        service.check_in("user-1", at_day(200)).await.unwrap();
        let report = service.check_in("user-1", at_day(200)).await.unwrap();
        assert!(matches!(report, CheckInReport::AlreadyCheckedIn { .. }));
        assert_eq!(service.balance("user-1").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_builder_rejects_pointless_gratitude() {
        let mut config = Config::for_test();
        config.gratitude.points_per_side = 0;

        let err = Rollcall::builder(config)
            .with_store(Arc::new(MemoryLedgerStore::new()))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_streak_for_unknown_user() {
        let service = service_with(Config::for_test()).await;
        let standing = service.streak("user-9").await.unwrap();
        assert_eq!(standing.current, 0);
        assert_eq!(standing.last_check_in_day, None);
    }

    #[tokio::test]
    async fn test_attendance_summary() {
        let service = service_with(Config::for_test()).await;

        service.check_in("user-1", at_day(200)).await.unwrap();
        service.check_in("user-1", at_day(201)).await.unwrap();

        let summary = service
            .attendance_summary("user-1", at_day(201))
            .await
            .unwrap();
        assert!(summary.checked_in_today);
        assert_eq!(summary.total_check_ins, 2);
        assert_eq!(summary.points_from_check_ins, 200);

        let summary = service
            .attendance_summary("user-1", at_day(202))
            .await
            .unwrap();
        assert!(!summary.checked_in_today);
    }
}
