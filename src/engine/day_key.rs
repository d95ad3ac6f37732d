//! Local-day resolution.
//!
//! Attendance semantics run on day keys: whole days elapsed since the
//! Unix epoch, counted in the ledger's fixed UTC offset. Day boundaries
//! fall at local midnight regardless of where the process runs.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::engine::{LedgerError, Result};

/// Seconds in one day.
pub const SECONDS_PER_DAY: i64 = 86_400;

// Day number of 1970-01-01 counted from 0001-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Days since 1970-01-01 in the ledger's local offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(i64);

impl DayKey {
    pub const fn from_days(days: i64) -> Self {
        Self(days)
    }

    pub const fn as_days(self) -> i64 {
        self.0
    }

    /// The following local day.
    pub const fn succ(self) -> Self {
        Self(self.0 + 1)
    }

    /// The preceding local day.
    pub const fn pred(self) -> Self {
        Self(self.0 - 1)
    }
}

impl fmt::Display for DayKey {
    /// Renders as the ISO calendar date (`2024-03-10`) this key names.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = i32::try_from(self.0)
            .ok()
            .and_then(|days| days.checked_add(EPOCH_DAYS_FROM_CE))
            .and_then(NaiveDate::from_num_days_from_ce_opt);
        match date {
            Some(date) => write!(f, "{date}"),
            None => write!(f, "day#{}", self.0),
        }
    }
}

/// Resolve an instant to its local day under `offset`.
///
/// Instants that fall before the epoch after shifting into the local
/// offset are rejected as `InvalidInput`.
pub fn resolve(instant: DateTime<Utc>, offset: FixedOffset) -> Result<DayKey> {
    let shifted = instant
        .timestamp()
        .checked_add(i64::from(offset.local_minus_utc()))
        .ok_or_else(|| LedgerError::InvalidInput("instant out of range".to_string()))?;
    if shifted < 0 {
        return Err(LedgerError::InvalidInput(
            "instant precedes the epoch".to_string(),
        ));
    }
    Ok(DayKey(shifted / SECONDS_PER_DAY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn test_boundary_follows_local_midnight() {
        // 14:59:59 UTC is 23:59:59 in +09:00; one second later rolls the day.
        let before = Utc.with_ymd_and_hms(2024, 3, 10, 14, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap();

        let d1 = resolve(before, kst()).unwrap();
        let d2 = resolve(after, kst()).unwrap();

        assert_eq!(d2, d1.succ());
        assert_eq!(d1.to_string(), "2024-03-10");
        assert_eq!(d2.to_string(), "2024-03-11");
    }

    #[test]
    fn test_epoch_is_day_zero() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let instant = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let day = resolve(instant, utc).unwrap();
        assert_eq!(day, DayKey::from_days(0));
        assert_eq!(day.to_string(), "1970-01-01");
    }

    #[test]
    fn test_pre_epoch_rejected() {
        // Midnight UTC on 1970-01-01 is still 1969 in a western offset.
        let west = FixedOffset::west_opt(5 * 3600).unwrap();
        let instant = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let err = resolve(instant, west).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[test]
    fn test_succ_pred_ordering() {
        let day = DayKey::from_days(20_000);
        assert_eq!(day.succ().pred(), day);
        assert!(day.pred() < day);
        assert!(day < day.succ());
    }
}
