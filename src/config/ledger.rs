//! Ledger policy configuration types.

use serde::Deserialize;

/// Points ledger policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// When false, any adjustment that would take a balance below zero
    /// is rejected with `InsufficientBalance`.
    pub allow_negative_balance: bool,
    /// Replays of a read-modify-write round after a lost conditional
    /// write, before giving up with `ConcurrentModification`.
    pub max_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            allow_negative_balance: false,
            max_retries: 3,
        }
    }
}
