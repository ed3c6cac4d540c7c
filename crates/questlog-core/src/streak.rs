//! Consecutive-day streaks.
//!
//! The mission streak counts days on which at least `threshold` of the
//! scheduled daily missions were completed. The meditation streak counts days
//! with at least one saved session.
//!
//! A streak whose last qualifying day is older than yesterday is stale: it is
//! reported as 0 and written back as 0 the next time the profile is saved.
//! Whether a qualifying day extends or restarts the streak depends only on
//! whether the previous qualifying day was yesterday.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::clock::Clock;
use crate::error::Result;
use crate::mission::{completion_rate, Mission};
use crate::profile::Profile;
use crate::storage::StreakConfig;
use crate::store::Store;

/// Result of a daily streak evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StreakOutcome {
    /// Today was already counted.
    AlreadyCounted,
    /// No daily missions are scheduled today, so the day is not evaluated.
    NothingScheduled,
    /// Not enough of today's missions are done yet.
    BelowThreshold { rate: f64 },
    /// Yesterday counted too; the streak grew.
    Extended { streak: u32 },
    /// A new streak began at 1.
    Started { streak: u32 },
}

fn is_live(last: Option<NaiveDate>, today: NaiveDate) -> bool {
    last.is_some_and(|d| d >= today - Duration::days(1))
}

/// Streak value as of `today`, treating stale streaks as broken.
pub fn effective_streak(streak: u32, last: Option<NaiveDate>, today: NaiveDate) -> u32 {
    if is_live(last, today) {
        streak
    } else {
        0
    }
}

/// Zero out stale mission and meditation streaks. Returns whether anything changed.
pub fn decay_stale(profile: &mut Profile, today: NaiveDate) -> bool {
    let mut changed = false;
    if profile.current_streak > 0 && !is_live(profile.last_completion_date, today) {
        tracing::debug!(streak = profile.current_streak, "mission streak lapsed");
        profile.current_streak = 0;
        changed = true;
    }
    if profile.meditation_streak > 0 && !is_live(profile.last_meditation_date, today) {
        tracing::debug!(streak = profile.meditation_streak, "meditation streak lapsed");
        profile.meditation_streak = 0;
        changed = true;
    }
    changed
}

/// Evaluate `today` for the mission streak, updating `profile` in place.
pub fn evaluate_daily(
    profile: &mut Profile,
    missions: &[Mission],
    today: NaiveDate,
    threshold: f64,
) -> StreakOutcome {
    if profile.last_completion_date == Some(today) {
        return StreakOutcome::AlreadyCounted;
    }
    decay_stale(profile, today);

    let Some(rate) = completion_rate(missions, today) else {
        return StreakOutcome::NothingScheduled;
    };
    if rate < threshold {
        return StreakOutcome::BelowThreshold { rate };
    }

    let yesterday = today - Duration::days(1);
    let outcome = if profile.last_completion_date == Some(yesterday) {
        profile.current_streak += 1;
        StreakOutcome::Extended {
            streak: profile.current_streak,
        }
    } else {
        profile.current_streak = 1;
        StreakOutcome::Started { streak: 1 }
    };
    profile.longest_streak = profile.longest_streak.max(profile.current_streak);
    profile.last_completion_date = Some(today);
    outcome
}

/// Count `today` for the meditation streak. Returns false if today was
/// already counted.
pub fn advance_meditation_streak(profile: &mut Profile, today: NaiveDate) -> bool {
    if profile.last_meditation_date == Some(today) {
        return false;
    }
    let yesterday = today - Duration::days(1);
    profile.meditation_streak = if profile.last_meditation_date == Some(yesterday) {
        profile.meditation_streak + 1
    } else {
        1
    };
    profile.last_meditation_date = Some(today);
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakSummary {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_completion_date: Option<NaiveDate>,
    pub meditation_streak: u32,
    pub last_meditation_date: Option<NaiveDate>,
}

pub struct StreakEngine<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    config: &'a StreakConfig,
}

impl<'a> StreakEngine<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock, config: &'a StreakConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Evaluate today's completion rate and extend or start the streak.
    pub fn check_daily_streak(&self) -> Result<StreakOutcome> {
        let today = self.clock.today();
        let threshold = self.config.threshold;
        let outcome = self.store.transact(|txn| {
            let missions: Vec<Mission> = txn.load()?;
            let mut profile: Profile = txn.load()?;
            let before = profile.clone();
            let outcome = evaluate_daily(&mut profile, &missions, today, threshold);
            if profile != before {
                txn.save(&profile)?;
            }
            Ok(outcome)
        })?;
        tracing::debug!(?outcome, %today, "daily streak evaluated");
        Ok(outcome)
    }

    /// Streak counters as of today.
    pub fn summary(&self) -> Result<StreakSummary> {
        let today = self.clock.today();
        let profile: Profile = self.store.get()?;
        Ok(StreakSummary {
            current_streak: effective_streak(
                profile.current_streak,
                profile.last_completion_date,
                today,
            ),
            longest_streak: profile.longest_streak,
            last_completion_date: profile.last_completion_date,
            meditation_streak: effective_streak(
                profile.meditation_streak,
                profile.last_meditation_date,
                today,
            ),
            last_meditation_date: profile.last_meditation_date,
        })
    }
}
