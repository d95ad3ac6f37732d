//! Attendance configuration types.

use chrono::FixedOffset;
use serde::Deserialize;

/// Attendance configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    /// Offset from UTC, in seconds, at which the attendance day rolls
    /// over. Positive values are east of Greenwich.
    pub utc_offset_secs: i32,
}

impl AttendanceConfig {
    /// The configured offset, or `None` when out of chrono's +/-24h range.
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_secs)
    }
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            // KST: day boundaries at midnight UTC+9.
            utc_offset_secs: 9 * 3600,
        }
    }
}
