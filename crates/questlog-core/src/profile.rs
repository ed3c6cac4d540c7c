//! The singleton user profile.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Progression and streak counters for the one local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub level: u32,
    /// EXP earned inside the current level.
    pub total_exp: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Last day the daily completion threshold was met.
    pub last_completion_date: Option<NaiveDate>,
    pub meditation_minutes: u64,
    pub meditation_level: u8,
    pub meditation_streak: u32,
    pub last_meditation_date: Option<NaiveDate>,
    pub onboarded: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            level: 1,
            total_exp: 0,
            current_streak: 0,
            longest_streak: 0,
            last_completion_date: None,
            meditation_minutes: 0,
            meditation_level: 1,
            meditation_streak: 0,
            last_meditation_date: None,
            onboarded: false,
        }
    }
}
