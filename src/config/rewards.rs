//! Reward schedule configuration types.

use std::collections::HashMap;

use serde::Deserialize;

/// Check-in reward configuration.
///
/// Every accepted check-in earns `base_points`; streak lengths listed in
/// `milestones` earn that bonus on top the day the streak reaches them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    /// Points for every accepted check-in.
    pub base_points: i64,
    /// Extra points at specific streak lengths, e.g. `{7: 50, 30: 300}`.
    pub milestones: HashMap<u32, i64>,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            base_points: 100,
            milestones: HashMap::new(),
        }
    }
}
