//! Gratitude transfer configuration types.

use serde::Deserialize;

/// Gratitude transfer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GratitudeConfig {
    /// Points credited to each side of a transfer.
    pub points_per_side: i64,
    /// Sends a user may make per local day.
    pub daily_quota: u32,
    /// Longest accepted note, in characters.
    pub max_note_chars: usize,
}

impl Default for GratitudeConfig {
    fn default() -> Self {
        Self {
            points_per_side: 5,
            daily_quota: 2,
            max_note_chars: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gratitude_config_default() {
        let config = GratitudeConfig::default();
        assert_eq!(config.points_per_side, 5);
        assert_eq!(config.daily_quota, 2);
        assert_eq!(config.max_note_chars, 200);
    }
}
