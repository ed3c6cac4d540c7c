//! Read models for the dashboard: today's progress, the next mission,
//! weekly heatmap, 30-day trend and meditation summary.
//!
//! Nothing here writes to the store.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::clock::Clock;
use crate::error::Result;
use crate::meditation::{level_name, MeditationRecord};
use crate::mission::{completion_counts, scheduled_on, sort_by_schedule, Mission};
use crate::profile::Profile;
use crate::store::Store;
use crate::streak::effective_streak;

/// Days shown on the trend chart, ending today.
pub const TREND_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodayProgress {
    pub date: NaiveDate,
    pub completed: usize,
    pub total: usize,
    /// Rounded; 0 when nothing is scheduled.
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextMission {
    /// `None` once every mission scheduled today is done.
    pub mission: Option<Mission>,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatCell {
    pub date: NaiveDate,
    pub completed: usize,
    pub total: usize,
    pub rate: f64,
    /// 0 (nothing done) ..= 4 (everything done).
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeditationSummary {
    pub total_minutes: u64,
    pub sessions: usize,
    pub streak: u32,
    pub level: u8,
    pub level_name: &'static str,
    /// Mean focus rating to one decimal; `None` before the first session.
    pub average_focus: Option<f64>,
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (done as f64 / total as f64 * 100.0).round() as u8
}

fn rate(done: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        done as f64 / total as f64
    }
}

pub fn heat_level(rate: f64) -> u8 {
    if rate >= 1.0 {
        4
    } else if rate >= 0.8 {
        3
    } else if rate >= 0.5 {
        2
    } else if rate > 0.0 {
        1
    } else {
        0
    }
}

pub fn today_progress(missions: &[Mission], date: NaiveDate) -> TodayProgress {
    let (completed, total) = completion_counts(missions, date);
    TodayProgress {
        date,
        completed,
        total,
        percent: percent(completed, total),
    }
}

/// The earliest pending mission still ahead of `now`, else the first pending one.
///
/// Pending missions are ordered by scheduled time with untimed ones last, so
/// the fallback is the earliest-timed pending mission, not the first added.
pub fn next_mission(missions: &[Mission], now: NaiveDateTime) -> NextMission {
    let today = now.date();
    let clock_time = now.format("%H:%M").to_string();
    let mut pending: Vec<Mission> = scheduled_on(missions, today)
        .into_iter()
        .filter(|m| !m.is_completed_on(today))
        .cloned()
        .collect();
    sort_by_schedule(&mut pending);

    let upcoming = pending
        .iter()
        .position(|m| m.scheduled_time.as_deref().is_some_and(|t| t >= clock_time.as_str()));
    let mission = match upcoming {
        Some(idx) => Some(pending[idx].clone()),
        None => pending.first().cloned(),
    };
    NextMission {
        mission,
        pending: pending.len(),
    }
}

/// Monday through Sunday of the week containing `today`.
pub fn weekly_heatmap(missions: &[Mission], today: NaiveDate) -> Vec<HeatCell> {
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    (0..7)
        .map(|offset| {
            let date = monday + Duration::days(offset);
            let (completed, total) = completion_counts(missions, date);
            let rate = rate(completed, total);
            HeatCell {
                date,
                completed,
                total,
                rate,
                level: heat_level(rate),
            }
        })
        .collect()
}

/// Completion percentage for each of the last [`TREND_DAYS`] days, oldest first.
pub fn monthly_trend(missions: &[Mission], today: NaiveDate) -> Vec<TrendPoint> {
    (0..TREND_DAYS)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            let (completed, total) = completion_counts(missions, date);
            TrendPoint {
                date,
                percent: percent(completed, total),
            }
        })
        .collect()
}

pub fn meditation_summary(
    profile: &Profile,
    records: &[MeditationRecord],
    today: NaiveDate,
) -> MeditationSummary {
    let average_focus = (!records.is_empty()).then(|| {
        let sum: u64 = records.iter().map(|r| u64::from(r.focus_rating)).sum();
        (sum as f64 / records.len() as f64 * 10.0).round() / 10.0
    });
    MeditationSummary {
        total_minutes: profile.meditation_minutes,
        sessions: records.len(),
        streak: effective_streak(
            profile.meditation_streak,
            profile.last_meditation_date,
            today,
        ),
        level: profile.meditation_level,
        level_name: level_name(profile.meditation_level),
        average_focus,
    }
}

/// Store-backed dashboard queries.
pub struct Dashboard<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> Dashboard<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    fn missions(&self) -> Result<Vec<Mission>> {
        self.store.get()
    }

    pub fn today_progress(&self) -> Result<TodayProgress> {
        Ok(today_progress(&self.missions()?, self.clock.today()))
    }

    pub fn next_mission(&self) -> Result<NextMission> {
        Ok(next_mission(&self.missions()?, self.clock.now()))
    }

    pub fn weekly_heatmap(&self) -> Result<Vec<HeatCell>> {
        Ok(weekly_heatmap(&self.missions()?, self.clock.today()))
    }

    pub fn monthly_trend(&self) -> Result<Vec<TrendPoint>> {
        Ok(monthly_trend(&self.missions()?, self.clock.today()))
    }

    pub fn meditation_summary(&self) -> Result<MeditationSummary> {
        let profile: Profile = self.store.get()?;
        let records: Vec<MeditationRecord> = self.store.get()?;
        Ok(meditation_summary(&profile, &records, self.clock.today()))
    }
}
