//! Core ledger records.
//!
//! Three record families, all keyed by user id: the attendance standing,
//! the points account, and the append-only audit log. Attendance and
//! account records are mutable under conditional writes; audit entries
//! are never updated once written.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::day_key::DayKey;

/// Per-user attendance standing. At most one record per user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAttendanceRecord {
    pub user_id: String,
    /// Local day of the most recent accepted check-in.
    pub last_check_in_day: DayKey,
    /// Length of the consecutive-day run ending at `last_check_in_day`.
    pub current_streak: u32,
    /// Best run the user has ever achieved.
    pub longest_streak: u32,
    pub updated_at: DateTime<Utc>,
}

/// Per-user points balance with a version counter for conditional writes.
#[derive(Debug, Clone, PartialEq)]
pub struct PointsAccount {
    pub user_id: String,
    pub balance: i64,
    /// Incremented on every committed adjustment.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Why a balance moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdjustReason {
    /// Daily check-in award.
    CheckIn,
    /// One-off bonus grant.
    Bonus,
    /// Manual grant or revocation by an operator.
    AdminAdjust,
    /// Compensating entry fixing an earlier mistake.
    Correction,
    /// Sender side of a gratitude transfer.
    GratitudeSent,
    /// Recipient side of a gratitude transfer.
    GratitudeReceived,
}

impl AdjustReason {
    /// Stable code used in stored documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustReason::CheckIn => "check_in",
            AdjustReason::Bonus => "bonus",
            AdjustReason::AdminAdjust => "admin_adjust",
            AdjustReason::Correction => "correction",
            AdjustReason::GratitudeSent => "gratitude_sent",
            AdjustReason::GratitudeReceived => "gratitude_received",
        }
    }

    /// Parse a stored reason code.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "check_in" => Some(AdjustReason::CheckIn),
            "bonus" => Some(AdjustReason::Bonus),
            "admin_adjust" => Some(AdjustReason::AdminAdjust),
            "correction" => Some(AdjustReason::Correction),
            "gratitude_sent" => Some(AdjustReason::GratitudeSent),
            "gratitude_received" => Some(AdjustReason::GratitudeReceived),
            _ => None,
        }
    }
}

impl std::fmt::Display for AdjustReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable line on a user's audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub user_id: String,
    /// Signed points movement.
    pub delta: i64,
    pub reason: AdjustReason,
    /// Balance immediately after this entry was applied.
    pub resulting_balance: i64,
    pub created_at: DateTime<Utc>,
    /// Idempotency key. At most one entry per (user, key).
    pub causation_key: Option<String>,
    /// Other party: transfer peer for gratitude, operator for admin entries.
    pub counterparty: Option<String>,
    pub note: Option<String>,
}

/// Instruction to move a balance, addressed to the points ledger.
///
/// A request carrying a causation key may be resubmitted any number of
/// times; only the first submission changes state.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentRequest {
    pub user_id: String,
    pub delta: i64,
    pub reason: AdjustReason,
    pub causation_key: Option<String>,
    pub counterparty: Option<String>,
    pub note: Option<String>,
}

impl AdjustmentRequest {
    pub fn new(user_id: impl Into<String>, delta: i64, reason: AdjustReason) -> Self {
        Self {
            user_id: user_id.into(),
            delta,
            reason,
            causation_key: None,
            counterparty: None,
            note: None,
        }
    }

    pub fn with_causation_key(mut self, key: impl Into<String>) -> Self {
        self.causation_key = Some(key.into());
        self
    }

    pub fn with_counterparty(mut self, who: impl Into<String>) -> Self {
        self.counterparty = Some(who.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_round_trip() {
        for reason in [
            AdjustReason::CheckIn,
            AdjustReason::Bonus,
            AdjustReason::AdminAdjust,
            AdjustReason::Correction,
            AdjustReason::GratitudeSent,
            AdjustReason::GratitudeReceived,
        ] {
            assert_eq!(AdjustReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(AdjustReason::parse("unknown"), None);
    }

    #[test]
    fn test_request_builders() {
        let request = AdjustmentRequest::new("user-1", 50, AdjustReason::Bonus)
            .with_causation_key("grant:7")
            .with_counterparty("admin-1")
            .with_note("season reward");
        assert_eq!(request.delta, 50);
        assert_eq!(request.causation_key.as_deref(), Some("grant:7"));
        assert_eq!(request.counterparty.as_deref(), Some("admin-1"));
        assert_eq!(request.note.as_deref(), Some("season reward"));
    }
}
