//! Attendance engine: daily check-ins and streak accounting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;

use crate::config::{LedgerConfig, RewardsConfig};
use crate::engine::day_key::{self, DayKey};
use crate::engine::{validate_user_id, with_deadline, LedgerError, Result};
use crate::interfaces::ledger_store::LedgerStore;
use crate::model::UserAttendanceRecord;
use crate::utils::retry::{conflict_backoff, is_write_conflict};

/// Maps a freshly extended streak onto the points it earns.
///
/// The engine only evaluates the schedule; it never interprets it.
/// A schedule returning 0 suppresses the accrual for that day.
pub trait RewardSchedule: Send + Sync {
    fn points_for(&self, streak: u32) -> i64;
}

/// Flat base award plus bonuses at configured streak lengths.
#[derive(Debug, Clone)]
pub struct MilestoneSchedule {
    base: i64,
    milestones: HashMap<u32, i64>,
}

impl MilestoneSchedule {
    pub fn from_config(config: &RewardsConfig) -> Self {
        Self {
            base: config.base_points,
            milestones: config.milestones.clone(),
        }
    }
}

impl RewardSchedule for MilestoneSchedule {
    fn points_for(&self, streak: u32) -> i64 {
        self.base + self.milestones.get(&streak).copied().unwrap_or(0)
    }
}

/// Outcome of a check-in attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckInOutcome {
    /// First check-in of this local day; the attendance record was
    /// written and the points accrual is owed under `causation_key`.
    Accepted {
        day: DayKey,
        streak: u32,
        longest_streak: u32,
        points_awarded: i64,
        causation_key: String,
    },
    /// The user had already checked in on this local day.
    AlreadyCheckedIn {
        day: DayKey,
        streak: u32,
        longest_streak: u32,
    },
}

/// The causation key owed for a user's check-in on a day.
pub fn check_in_key(user_id: &str, day: DayKey) -> String {
    format!("checkin:{user_id}:{day}")
}

/// Streak and attendance record maintenance over a [`LedgerStore`].
pub struct AttendanceEngine {
    store: Arc<dyn LedgerStore>,
    schedule: Arc<dyn RewardSchedule>,
    offset: FixedOffset,
    max_retries: u32,
    op_timeout: Duration,
}

impl AttendanceEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        schedule: Arc<dyn RewardSchedule>,
        offset: FixedOffset,
        policy: &LedgerConfig,
        op_timeout: Duration,
    ) -> Self {
        Self {
            store,
            schedule,
            offset,
            max_retries: policy.max_retries,
            op_timeout,
        }
    }

    /// Record a check-in for `user_id` at `instant`.
    ///
    /// At most one check-in per user per local day: replays and racing
    /// duplicates resolve to `AlreadyCheckedIn`. Lost conditional writes
    /// are replayed with backoff before surfacing as
    /// `ConcurrentModification`.
    pub async fn check_in(&self, user_id: &str, instant: DateTime<Utc>) -> Result<CheckInOutcome> {
        validate_user_id(user_id)?;
        let today = day_key::resolve(instant, self.offset)?;

        let outcome = (|| self.try_check_in(user_id, today))
            .retry(conflict_backoff(self.max_retries))
            .when(is_write_conflict)
            .notify(|err: &LedgerError, dur: Duration| {
                debug!(error = %err, delay = ?dur, "check-in lost a write race, retrying");
            })
            .await;

        match outcome {
            Err(err) if is_write_conflict(&err) => Err(LedgerError::ConcurrentModification {
                user_id: user_id.to_string(),
                attempts: self.max_retries + 1,
            }),
            other => other,
        }
    }

    async fn try_check_in(&self, user_id: &str, today: DayKey) -> Result<CheckInOutcome> {
        let prior = with_deadline(
            self.op_timeout,
            "get_attendance",
            self.store.get_attendance(user_id),
        )
        .await?;

        if let Some(record) = &prior {
            if record.last_check_in_day == today {
                return Ok(CheckInOutcome::AlreadyCheckedIn {
                    day: today,
                    streak: record.current_streak,
                    longest_streak: record.longest_streak,
                });
            }
            if today < record.last_check_in_day {
                return Err(LedgerError::InvalidInput(format!(
                    "instant resolves to {today}, before the recorded day {}",
                    record.last_check_in_day
                )));
            }
        }

        let current_streak = match &prior {
            Some(record) if record.last_check_in_day == today.pred() => record.current_streak + 1,
            _ => 1,
        };
        let longest_streak = prior
            .as_ref()
            .map(|record| record.longest_streak)
            .unwrap_or(0)
            .max(current_streak);
        let expected_last_day = prior.as_ref().map(|record| record.last_check_in_day);

        let record = UserAttendanceRecord {
            user_id: user_id.to_string(),
            last_check_in_day: today,
            current_streak,
            longest_streak,
            updated_at: Utc::now(),
        };

        with_deadline(
            self.op_timeout,
            "put_attendance",
            self.store.put_attendance(&record, expected_last_day),
        )
        .await?;

        let points_awarded = self.schedule.points_for(current_streak);
        debug!(
            user_id,
            day = %today,
            streak = current_streak,
            points = points_awarded,
            "check-in accepted"
        );

        Ok(CheckInOutcome::Accepted {
            day: today,
            streak: current_streak,
            longest_streak,
            points_awarded,
            causation_key: check_in_key(user_id, today),
        })
    }

    /// The user's stored attendance standing, if any.
    pub async fn standing(&self, user_id: &str) -> Result<Option<UserAttendanceRecord>> {
        validate_user_id(user_id)?;
        let record = with_deadline(
            self.op_timeout,
            "get_attendance",
            self.store.get_attendance(user_id),
        )
        .await?;
        Ok(record)
    }

    /// The local day `instant` falls on for this engine.
    pub fn day_of(&self, instant: DateTime<Utc>) -> Result<DayKey> {
        day_key::resolve(instant, self.offset)
    }
}
