//! EXP, levels and titles.
//!
//! A profile holds the EXP earned inside its current level. Clearing level N
//! costs `N * exp_per_level`; surplus carries into the next level, so a single
//! large award can cross several levels at once.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::meditation::level_name;
use crate::mission::{Mission, MissionTimers};
use crate::profile::Profile;
use crate::storage::{Config, ProgressionConfig};
use crate::store::{Store, Txn};
use crate::streak::{decay_stale, effective_streak, evaluate_daily, StreakOutcome};

impl ProgressionConfig {
    /// EXP needed to clear `level`.
    pub fn exp_required_for(&self, level: u32) -> u64 {
        u64::from(level.max(1)).saturating_mul(self.exp_per_level)
    }

    /// Streak-independent part of a mission's reward.
    pub fn base_reward(&self, difficulty: u8) -> u32 {
        self.base_exp.saturating_mul(u32::from(difficulty))
    }

    pub fn streak_bonus(&self, streak: u32) -> u32 {
        streak
            .saturating_mul(self.streak_bonus_per_day)
            .min(self.streak_bonus_cap)
    }

    /// EXP granted for completing a mission of `difficulty` with `streak` days running.
    pub fn mission_exp(&self, difficulty: u8, streak: u32) -> u32 {
        self.base_reward(difficulty)
            .saturating_add(self.streak_bonus(streak))
    }
}

/// A rank shown next to the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Title {
    /// Lowest level carrying this title.
    pub level: u32,
    pub name: &'static str,
    pub emoji: &'static str,
}

/// Ascending by level; the first entry starts at level 1.
pub const TITLES: [Title; 6] = [
    Title { level: 1, name: "Novice", emoji: "🌱" },
    Title { level: 5, name: "Apprentice", emoji: "🔥" },
    Title { level: 10, name: "Adventurer", emoji: "⚔️" },
    Title { level: 20, name: "Hero", emoji: "🛡️" },
    Title { level: 35, name: "Master", emoji: "👑" },
    Title { level: 50, name: "Legend", emoji: "🌟" },
];

/// Highest title whose threshold is at or below `level`.
pub fn title_for(level: u32) -> &'static Title {
    TITLES
        .iter()
        .rev()
        .find(|t| t.level <= level)
        .unwrap_or(&TITLES[0])
}

/// Result of adding EXP to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AwardOutcome {
    pub leveled_up: bool,
    pub levels_gained: u32,
    pub level: u32,
    pub total_exp: u64,
    /// EXP still needed to clear the new level.
    pub exp_to_next: u64,
}

/// Add `amount` to the profile and roll over any completed levels.
pub fn apply_award(profile: &mut Profile, amount: u64, config: &ProgressionConfig) -> AwardOutcome {
    let start = profile.level.max(1);
    profile.level = start;
    profile.total_exp = profile.total_exp.saturating_add(amount);
    while profile.total_exp >= config.exp_required_for(profile.level) {
        if profile.level == u32::MAX {
            break;
        }
        profile.total_exp -= config.exp_required_for(profile.level);
        profile.level += 1;
    }
    let levels_gained = profile.level - start;
    if levels_gained > 0 {
        tracing::info!(level = profile.level, levels_gained, "level up");
    }
    AwardOutcome {
        leveled_up: levels_gained > 0,
        levels_gained,
        level: profile.level,
        total_exp: profile.total_exp,
        exp_to_next: config
            .exp_required_for(profile.level)
            .saturating_sub(profile.total_exp),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionOutcome {
    pub mission_id: String,
    pub title: String,
    pub exp: u32,
    pub award: AwardOutcome,
    pub streak: StreakOutcome,
    /// Stopwatch reading when a running mission timer was stopped by this completion.
    pub timer_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completion {
    Completed(CompletionOutcome),
    /// The mission was already completed today; nothing changed.
    AlreadyCompleted { mission_id: String },
}

impl Completion {
    pub fn outcome(&self) -> Option<&CompletionOutcome> {
        match self {
            Completion::Completed(outcome) => Some(outcome),
            Completion::AlreadyCompleted { .. } => None,
        }
    }
}

pub(crate) fn award_in(
    txn: &mut Txn<'_>,
    today: NaiveDate,
    amount: u64,
    config: &ProgressionConfig,
) -> Result<AwardOutcome> {
    let mut profile: Profile = txn.load()?;
    decay_stale(&mut profile, today);
    let outcome = apply_award(&mut profile, amount, config);
    txn.save(&profile)?;
    Ok(outcome)
}

/// Complete a mission for `today` inside an open transaction.
pub(crate) fn complete_in(
    txn: &mut Txn<'_>,
    today: NaiveDate,
    now: NaiveDateTime,
    config: &Config,
    mission_id: &str,
) -> Result<Completion> {
    let mut missions: Vec<Mission> = txn.load()?;
    let mission = missions
        .iter_mut()
        .find(|m| m.id == mission_id)
        .ok_or_else(|| CoreError::mission_not_found(mission_id))?;
    if !mission.record_completion(today) {
        return Ok(Completion::AlreadyCompleted {
            mission_id: mission_id.to_string(),
        });
    }
    let difficulty = mission.difficulty;
    let title = mission.title.clone();
    txn.save(&missions)?;

    let mut timers: MissionTimers = txn.load()?;
    let timer_secs = timers.stop(mission_id, now);
    if timer_secs.is_some() {
        txn.save(&timers)?;
    }

    let mut profile: Profile = txn.load()?;
    decay_stale(&mut profile, today);
    let exp = config
        .progression
        .mission_exp(difficulty, profile.current_streak);
    let award = apply_award(&mut profile, exp.into(), &config.progression);
    let streak = evaluate_daily(&mut profile, &missions, today, config.streak.threshold);
    txn.save(&profile)?;

    Ok(Completion::Completed(CompletionOutcome {
        mission_id: mission_id.to_string(),
        title,
        exp,
        award,
        streak,
        timer_secs,
    }))
}

/// Profile as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub level: u32,
    pub title: Title,
    pub total_exp: u64,
    pub exp_required: u64,
    pub exp_to_next: u64,
    /// Progress through the current level, 0-100.
    pub level_percent: u8,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub meditation_minutes: u64,
    pub meditation_level: u8,
    pub meditation_level_name: &'static str,
    pub meditation_streak: u32,
    pub onboarded: bool,
}

pub struct ProgressionEngine<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    config: &'a Config,
}

impl<'a> ProgressionEngine<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock, config: &'a Config) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn title_for(&self, level: u32) -> &'static Title {
        title_for(level)
    }

    pub fn exp_required_for(&self, level: u32) -> u64 {
        self.config.progression.exp_required_for(level)
    }

    /// Reward for a mission of `difficulty` given the current streak.
    pub fn mission_exp(&self, difficulty: u8) -> Result<u32> {
        let profile: Profile = self.store.get()?;
        let streak = effective_streak(
            profile.current_streak,
            profile.last_completion_date,
            self.clock.today(),
        );
        Ok(self.config.progression.mission_exp(difficulty, streak))
    }

    /// Add EXP to the profile and persist it.
    pub fn award(&self, amount: u64) -> Result<AwardOutcome> {
        let today = self.clock.today();
        self.store
            .transact(|txn| award_in(txn, today, amount, &self.config.progression))
    }

    /// Mark a mission done for today, granting EXP and evaluating the streak.
    ///
    /// # Errors
    /// `NotFound` if no mission has `mission_id`.
    pub fn complete_mission(&self, mission_id: &str) -> Result<Completion> {
        let today = self.clock.today();
        let now = self.clock.now();
        let completion = self
            .store
            .transact(|txn| complete_in(txn, today, now, self.config, mission_id))?;
        match &completion {
            Completion::Completed(outcome) => tracing::info!(
                mission_id,
                exp = outcome.exp,
                level = outcome.award.level,
                "mission completed"
            ),
            Completion::AlreadyCompleted { .. } => {
                tracing::debug!(mission_id, "mission already completed today")
            }
        }
        Ok(completion)
    }

    pub fn profile(&self) -> Result<Profile> {
        self.store.get()
    }

    /// Record that the first-run introduction was dismissed. Returns whether
    /// the flag changed.
    pub fn mark_onboarded(&self) -> Result<bool> {
        let changed = self.store.transact(|txn| {
            let mut profile: Profile = txn.load()?;
            if profile.onboarded {
                return Ok(false);
            }
            profile.onboarded = true;
            txn.save(&profile)?;
            Ok(true)
        })?;
        if changed {
            tracing::info!("profile onboarded");
        }
        Ok(changed)
    }

    pub fn profile_summary(&self) -> Result<ProfileSummary> {
        let today = self.clock.today();
        let profile: Profile = self.store.get()?;
        let level = profile.level.max(1);
        let exp_required = self.exp_required_for(level);
        let level_percent =
            (u128::from(profile.total_exp.min(exp_required)) * 100 / u128::from(exp_required)) as u8;
        Ok(ProfileSummary {
            level,
            title: *title_for(level),
            total_exp: profile.total_exp,
            exp_required,
            exp_to_next: exp_required.saturating_sub(profile.total_exp),
            level_percent,
            current_streak: effective_streak(
                profile.current_streak,
                profile.last_completion_date,
                today,
            ),
            longest_streak: profile.longest_streak,
            meditation_minutes: profile.meditation_minutes,
            meditation_level: profile.meditation_level,
            meditation_level_name: level_name(profile.meditation_level),
            meditation_streak: effective_streak(
                profile.meditation_streak,
                profile.last_meditation_date,
                today,
            ),
            onboarded: profile.onboarded,
        })
    }
}
