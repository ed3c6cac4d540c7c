//! Per-mission stopwatches for the today board.
//!
//! A timer is just a start timestamp; elapsed time is derived on demand, so
//! nothing ticks in the background and a stopped timer cannot fire again.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::Mission;
use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::store::Store;

/// Running timers keyed by mission id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionTimers {
    #[serde(default)]
    running: BTreeMap<String, NaiveDateTime>,
}

impl MissionTimers {
    /// Returns false if the timer was already running; the original start is kept.
    pub fn start(&mut self, mission_id: &str, now: NaiveDateTime) -> bool {
        if self.running.contains_key(mission_id) {
            return false;
        }
        self.running.insert(mission_id.to_string(), now);
        true
    }

    /// Stop and dispose the timer, returning elapsed seconds.
    pub fn stop(&mut self, mission_id: &str, now: NaiveDateTime) -> Option<u64> {
        let started = self.running.remove(mission_id)?;
        Some(seconds_between(started, now))
    }

    /// Returns whether a timer was running.
    pub fn remove(&mut self, mission_id: &str) -> bool {
        self.running.remove(mission_id).is_some()
    }

    pub fn elapsed(&self, mission_id: &str, now: NaiveDateTime) -> Option<u64> {
        self.running
            .get(mission_id)
            .map(|started| seconds_between(*started, now))
    }

    pub fn is_running(&self, mission_id: &str) -> bool {
        self.running.contains_key(mission_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NaiveDateTime)> + '_ {
        self.running.iter().map(|(id, at)| (id.as_str(), *at))
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }
}

fn seconds_between(start: NaiveDateTime, end: NaiveDateTime) -> u64 {
    (end - start).num_seconds().max(0) as u64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningTimer {
    pub mission_id: String,
    pub title: String,
    pub started_at: NaiveDateTime,
    pub elapsed_secs: u64,
}

/// Store-backed access to mission timers.
pub struct MissionTimerBoard<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> MissionTimerBoard<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Start the stopwatch for a mission. Returns false if it was already running.
    pub fn start(&self, mission_id: &str) -> Result<bool> {
        let now = self.clock.now();
        let started = self.store.transact(|txn| {
            let missions: Vec<Mission> = txn.load()?;
            if !missions.iter().any(|m| m.id == mission_id) {
                return Err(CoreError::mission_not_found(mission_id));
            }
            let mut timers: MissionTimers = txn.load()?;
            let started = timers.start(mission_id, now);
            if started {
                txn.save(&timers)?;
            }
            Ok(started)
        })?;
        tracing::debug!(mission_id, started, "mission timer start");
        Ok(started)
    }

    /// Stop the stopwatch, returning elapsed seconds if it was running.
    pub fn stop(&self, mission_id: &str) -> Result<Option<u64>> {
        let now = self.clock.now();
        self.store.transact(|txn| {
            let mut timers: MissionTimers = txn.load()?;
            let elapsed = timers.stop(mission_id, now);
            if elapsed.is_some() {
                txn.save(&timers)?;
            }
            Ok(elapsed)
        })
    }

    pub fn elapsed(&self, mission_id: &str) -> Result<Option<u64>> {
        let timers: MissionTimers = self.store.get()?;
        Ok(timers.elapsed(mission_id, self.clock.now()))
    }

    /// All running timers with their mission titles.
    pub fn running(&self) -> Result<Vec<RunningTimer>> {
        let now = self.clock.now();
        let timers: MissionTimers = self.store.get()?;
        let missions: Vec<Mission> = self.store.get()?;
        Ok(timers
            .iter()
            .map(|(id, started_at)| RunningTimer {
                mission_id: id.to_string(),
                title: missions
                    .iter()
                    .find(|m| m.id == id)
                    .map(|m| m.title.clone())
                    .unwrap_or_default(),
                started_at,
                elapsed_secs: seconds_between(started_at, now),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::mission::{MissionRepository, NewMission};
    use crate::storage::ProgressionConfig;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn start_is_idempotent_and_stop_disposes() {
        let mut timers = MissionTimers::default();
        assert!(timers.start("m", t0()));
        assert!(!timers.start("m", t0() + Duration::seconds(30)));
        assert_eq!(timers.elapsed("m", t0() + Duration::seconds(90)), Some(90));
        assert_eq!(timers.stop("m", t0() + Duration::seconds(95)), Some(95));
        assert_eq!(timers.stop("m", t0() + Duration::seconds(99)), None);
        assert!(timers.is_empty());
    }

    #[test]
    fn clock_going_backwards_reads_zero() {
        let mut timers = MissionTimers::default();
        timers.start("m", t0());
        assert_eq!(timers.elapsed("m", t0() - Duration::seconds(5)), Some(0));
    }

    #[test]
    fn board_requires_existing_mission() {
        let store = Store::in_memory().unwrap();
        let clock = FixedClock::new(t0());
        let board = MissionTimerBoard::new(&store, &clock);
        assert!(board.start("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn board_lists_running_with_titles() {
        let store = Store::in_memory().unwrap();
        let clock = FixedClock::new(t0());
        let progression = ProgressionConfig::default();
        let repo = MissionRepository::new(&store, &clock, &progression);
        let m = repo.add(NewMission::daily("Push-ups")).unwrap();

        let board = MissionTimerBoard::new(&store, &clock);
        assert!(board.start(&m.id).unwrap());
        clock.advance(Duration::seconds(42));

        let running = board.running().unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].title, "Push-ups");
        assert_eq!(running[0].elapsed_secs, 42);

        assert_eq!(board.stop(&m.id).unwrap(), Some(42));
        assert!(board.running().unwrap().is_empty());
    }

    #[test]
    fn deleting_mission_disposes_timer() {
        let store = Store::in_memory().unwrap();
        let clock = FixedClock::new(t0());
        let progression = ProgressionConfig::default();
        let repo = MissionRepository::new(&store, &clock, &progression);
        let m = repo.add(NewMission::daily("Walk")).unwrap();
        let board = MissionTimerBoard::new(&store, &clock);
        board.start(&m.id).unwrap();

        repo.delete(&m.id).unwrap();
        assert_eq!(board.elapsed(&m.id).unwrap(), None);
    }
}
