//! Gratitude transfers: paired credits bounded by a daily quota.
//!
//! Quota state is never stored. Each send occupies a slot `1..=quota`
//! in the sender's local day, and a slot is claimed by committing the
//! sender-side credit under that slot's causation key. A taken slot
//! answers `Duplicate`, so the claim loop simply advances; when every
//! slot answers `Duplicate` the quota is spent.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, warn};

use crate::config::GratitudeConfig;
use crate::engine::day_key::{self, DayKey};
use crate::engine::points::{AdjustmentOutcome, PointsLedger};
use crate::engine::{validate_user_id, LedgerError, Result};
use crate::model::{AdjustReason, AdjustmentRequest};
use crate::utils::retry::is_recoverable;

/// Outcome of a gratitude send.
#[derive(Debug, Clone, PartialEq)]
pub enum GratitudeOutcome {
    /// Both sides were credited.
    Sent {
        slot: u32,
        remaining_today: u32,
        sender_balance: i64,
        recipient_balance: i64,
    },
    /// Every slot for the day is already spent; nothing was written.
    QuotaExhausted { quota: u32 },
    /// The sender-side credit committed but the recipient credit did
    /// not land. Resubmit `accrual` to complete the transfer; replays
    /// are deduplicated under its causation key.
    RecipientPending {
        slot: u32,
        sender_balance: i64,
        accrual: AdjustmentRequest,
    },
}

/// Prefix shared by all slot keys a sender mints on one day.
pub fn slot_prefix(sender: &str, day: DayKey) -> String {
    format!("gratitude:{sender}:{day}:")
}

/// Causation key for the sender-side credit of a slot.
pub fn sent_key(sender: &str, day: DayKey, slot: u32) -> String {
    format!("{}{slot}:out", slot_prefix(sender, day))
}

/// Causation key for the recipient-side credit of a slot.
///
/// Keyed by the sender and slot so both halves of one transfer share
/// their identity, while transfers from different senders never collide
/// on the recipient's log.
pub fn received_key(sender: &str, day: DayKey, slot: u32) -> String {
    format!("{}{slot}:in", slot_prefix(sender, day))
}

/// Peer-to-peer thanks over the points ledger.
pub struct GratitudeEngine {
    ledger: Arc<PointsLedger>,
    offset: FixedOffset,
    points_per_side: i64,
    daily_quota: u32,
    max_note_chars: usize,
}

impl GratitudeEngine {
    pub fn new(ledger: Arc<PointsLedger>, offset: FixedOffset, config: &GratitudeConfig) -> Self {
        Self {
            ledger,
            offset,
            points_per_side: config.points_per_side,
            daily_quota: config.daily_quota,
            max_note_chars: config.max_note_chars,
        }
    }

    /// Send thanks from `sender` to `recipient`.
    pub async fn send(
        &self,
        sender: &str,
        recipient: &str,
        instant: DateTime<Utc>,
        note: Option<&str>,
    ) -> Result<GratitudeOutcome> {
        validate_user_id(sender)?;
        validate_user_id(recipient)?;
        if sender == recipient {
            return Err(LedgerError::InvalidInput(
                "cannot send gratitude to yourself".to_string(),
            ));
        }
        let day = day_key::resolve(instant, self.offset)?;
        let note = self.normalize_note(note);

        // Claim a slot by committing the sender-side credit.
        let mut claimed = None;
        for slot in 1..=self.daily_quota {
            let mut request = AdjustmentRequest::new(
                sender,
                self.points_per_side,
                AdjustReason::GratitudeSent,
            )
            .with_causation_key(sent_key(sender, day, slot))
            .with_counterparty(recipient);
            request.note = note.clone();

            match self.ledger.apply(&request).await? {
                AdjustmentOutcome::Applied { balance, .. } => {
                    claimed = Some((slot, balance));
                    break;
                }
                AdjustmentOutcome::Duplicate { .. } => continue,
            }
        }
        let (slot, sender_balance) = match claimed {
            Some(claim) => claim,
            None => {
                debug!(sender, day = %day, quota = self.daily_quota, "gratitude quota spent");
                return Ok(GratitudeOutcome::QuotaExhausted {
                    quota: self.daily_quota,
                });
            }
        };

        let mut accrual = AdjustmentRequest::new(
            recipient,
            self.points_per_side,
            AdjustReason::GratitudeReceived,
        )
        .with_causation_key(received_key(sender, day, slot))
        .with_counterparty(sender);
        accrual.note = note;

        match self.ledger.apply(&accrual).await {
            Ok(outcome) => {
                debug!(
                    sender,
                    recipient,
                    slot,
                    points = self.points_per_side,
                    "gratitude sent"
                );
                Ok(GratitudeOutcome::Sent {
                    slot,
                    remaining_today: self.daily_quota - slot,
                    sender_balance,
                    recipient_balance: outcome.balance(),
                })
            }
            Err(err) if is_recoverable(&err) => {
                warn!(
                    sender,
                    recipient,
                    slot,
                    error = %err,
                    "sender credited but recipient credit is pending"
                );
                Ok(GratitudeOutcome::RecipientPending {
                    slot,
                    sender_balance,
                    accrual,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Configured sends per sender per local day.
    pub fn daily_quota(&self) -> u32 {
        self.daily_quota
    }

    /// Trim, cap at `max_note_chars` characters, drop what ends up blank.
    fn normalize_note(&self, note: Option<&str>) -> Option<String> {
        let trimmed = note?.trim();
        let capped: String = trimmed.chars().take(self.max_note_chars).collect();
        if capped.is_empty() {
            return None;
        }
        Some(capped)
    }
}
