//! Store-backed session control and the save flow.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use super::{
    meditation_level_for, MeditationRecord, MeditationSession, SessionSnapshot, SessionState,
    Technique, MAX_FOCUS_RATING,
};
use crate::clock::Clock;
use crate::error::{CoreError, Result, ValidationError};
use crate::mission::{scheduled_on, Mission};
use crate::profile::Profile;
use crate::progression::{award_in, complete_in, AwardOutcome, Completion, CompletionOutcome};
use crate::storage::{Config, MeditationConfig};
use crate::store::{Store, Txn};
use crate::streak::advance_meditation_streak;

/// Everything a save changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveOutcome {
    pub record: MeditationRecord,
    pub minutes_added: u64,
    pub meditation_minutes: u64,
    pub meditation_level: u8,
    pub meditation_level_up: bool,
    pub meditation_streak: u32,
    /// Meditation mission completed by this session, if any.
    pub completed_mission: Option<CompletionOutcome>,
    pub exp: u64,
    pub award: AwardOutcome,
}

fn minutes_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d+)\s*(?:분|min(?:ute)?s?\b)").ok())
        .as_ref()
}

/// Minutes a mission title asks for, e.g. "Meditation 10 min" or "명상 5분".
pub fn required_minutes(title: &str) -> Option<u64> {
    let caps = minutes_pattern()?.captures(title)?;
    Some(caps[1].parse().unwrap_or(u64::MAX))
}

fn is_meditation_title(title: &str, keywords: &[String]) -> bool {
    let title = title.to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .any(|k| !k.is_empty() && title.contains(&k))
}

/// First mission scheduled on `date`, not yet done, that names a meditation
/// keyword and whose minutes requirement `elapsed_secs` satisfies.
pub fn find_meditation_mission<'m>(
    missions: &'m [Mission],
    date: NaiveDate,
    elapsed_secs: u64,
    keywords: &[String],
) -> Option<&'m Mission> {
    scheduled_on(missions, date).into_iter().find(|m| {
        !m.is_completed_on(date)
            && is_meditation_title(&m.title, keywords)
            && required_minutes(&m.title.to_lowercase())
                .map_or(true, |min| elapsed_secs >= min.saturating_mul(60))
    })
}

fn session_exp(elapsed_secs: u64, config: &MeditationConfig) -> u64 {
    let divisor = config.secs_per_exp.max(1);
    ((elapsed_secs + divisor / 2) / divisor).max(config.min_exp)
}

fn save_in(
    txn: &mut Txn<'_>,
    session: &MeditationSession,
    focus_rating: u8,
    memo: &str,
    today: NaiveDate,
    now: NaiveDateTime,
    config: &Config,
) -> Result<SaveOutcome> {
    if session.state() != SessionState::Finished {
        return Err(CoreError::IllegalTransition {
            state: session.state().as_str(),
            action: "save",
        });
    }
    let elapsed = session.elapsed_secs();
    if elapsed == 0 {
        return Err(ValidationError::InvalidValue {
            field: "duration",
            message: "cannot save a session with no elapsed time".into(),
        }
        .into());
    }
    if focus_rating > MAX_FOCUS_RATING {
        return Err(ValidationError::OutOfRange {
            field: "focus_rating",
            min: 0,
            max: MAX_FOCUS_RATING.into(),
            value: focus_rating.into(),
        }
        .into());
    }

    let record = MeditationRecord {
        id: Uuid::new_v4().to_string(),
        date: today,
        duration: elapsed,
        technique: session.technique(),
        focus_rating,
        memo: memo.trim().to_string(),
    };
    txn.modify(|records: &mut Vec<MeditationRecord>| records.push(record.clone()))?;

    let minutes_added = (elapsed + 30) / 60;
    let mut profile: Profile = txn.load()?;
    let previous_level = profile.meditation_level;
    profile.meditation_minutes += minutes_added;
    advance_meditation_streak(&mut profile, today);
    profile.meditation_level = meditation_level_for(profile.meditation_minutes);
    txn.save(&profile)?;

    let missions: Vec<Mission> = txn.load()?;
    let target = find_meditation_mission(&missions, today, elapsed, &config.meditation.keywords)
        .map(|m| m.id.clone());
    let completed_mission = match target {
        Some(id) => match complete_in(txn, today, now, config, &id)? {
            Completion::Completed(outcome) => Some(outcome),
            Completion::AlreadyCompleted { .. } => None,
        },
        None => None,
    };

    let exp = session_exp(elapsed, &config.meditation);
    let award = award_in(txn, today, exp, &config.progression)?;

    Ok(SaveOutcome {
        record,
        minutes_added,
        meditation_minutes: profile.meditation_minutes,
        meditation_level: profile.meditation_level,
        meditation_level_up: profile.meditation_level > previous_level,
        meditation_streak: profile.meditation_streak,
        completed_mission,
        exp,
        award,
    })
}

/// Drives the persisted session and saves finished sessions.
pub struct MeditationService<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    config: &'a Config,
}

impl<'a> MeditationService<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock, config: &'a Config) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Save a finished session held by the caller, then reset it to `Idle`.
    ///
    /// # Errors
    /// `IllegalTransition` unless the session is `Finished`; `Validation` for
    /// zero elapsed time or a focus rating above 5. Nothing is written on error.
    pub fn save(
        &self,
        session: &mut MeditationSession,
        focus_rating: u8,
        memo: &str,
    ) -> Result<SaveOutcome> {
        let today = self.clock.today();
        let now = self.clock.now();
        let outcome = self
            .store
            .transact(|txn| save_in(txn, session, focus_rating, memo, today, now, self.config))?;
        session.reset();
        log_saved(&outcome);
        Ok(outcome)
    }

    /// Save the stored session and clear it in the same commit.
    pub fn save_active(&self, focus_rating: u8, memo: &str) -> Result<SaveOutcome> {
        let today = self.clock.today();
        let now = self.clock.now();
        let outcome = self.store.transact(|txn| {
            let mut session: MeditationSession = txn.load()?;
            session.sync(now);
            let outcome = save_in(txn, &session, focus_rating, memo, today, now, self.config)?;
            session.reset();
            txn.save(&session)?;
            Ok(outcome)
        })?;
        log_saved(&outcome);
        Ok(outcome)
    }

    /// Current session, caught up with the wall clock.
    pub fn session(&self) -> Result<MeditationSession> {
        self.update(|_| Ok(()))
    }

    pub fn status(&self) -> Result<SessionSnapshot> {
        Ok(self.session()?.snapshot())
    }

    /// Start the stored session. `None` falls back to the configured defaults.
    pub fn start(
        &self,
        minutes: Option<u32>,
        technique: Option<Technique>,
    ) -> Result<MeditationSession> {
        let minutes = minutes.unwrap_or(self.config.meditation.default_minutes);
        let technique = technique.unwrap_or(self.config.meditation.default_technique);
        let min_secs = self.config.meditation.min_session_secs;
        let session = self.update(|s| {
            s.set_min_session_secs(min_secs);
            s.start(minutes, technique)
        })?;
        tracing::info!(minutes, %technique, "meditation started");
        Ok(session)
    }

    pub fn pause(&self) -> Result<MeditationSession> {
        self.update(MeditationSession::pause)
    }

    pub fn resume(&self) -> Result<MeditationSession> {
        self.update(MeditationSession::resume)
    }

    pub fn toggle_pause(&self) -> Result<MeditationSession> {
        self.update(|s| s.toggle_pause().map(|_| ()))
    }

    /// Apply `secs` manual ticks.
    pub fn tick(&self, secs: u64) -> Result<MeditationSession> {
        self.update(|s| {
            s.advance(secs);
            Ok(())
        })
    }

    /// Stop the running session. A fixed session that reached its target
    /// while nobody was watching is already finished and stops as-is.
    pub fn stop(&self) -> Result<MeditationSession> {
        let now = self.clock.now();
        let session = self.store.transact(|txn| {
            let mut session: MeditationSession = txn.load()?;
            let was_running = session.state() == SessionState::Running;
            session.sync(now);
            if !(was_running && session.state() == SessionState::Finished) {
                session.stop()?;
            }
            txn.save(&session)?;
            Ok(session)
        })?;
        tracing::info!(
            state = session.state().as_str(),
            elapsed = session.elapsed_secs(),
            "meditation stopped"
        );
        Ok(session)
    }

    pub fn reset(&self) -> Result<MeditationSession> {
        self.update(|s| {
            s.reset();
            Ok(())
        })
    }

    /// All saved records, oldest first.
    pub fn records(&self) -> Result<Vec<MeditationRecord>> {
        self.store.get()
    }

    /// Sync the stored session with the clock, apply `f`, and persist.
    fn update(
        &self,
        f: impl FnOnce(&mut MeditationSession) -> Result<()>,
    ) -> Result<MeditationSession> {
        let now = self.clock.now();
        self.store.transact(|txn| {
            let mut session: MeditationSession = txn.load()?;
            let before = session.clone();
            session.sync(now);
            f(&mut session)?;
            session.sync(now);
            if session != before {
                txn.save(&session)?;
            }
            Ok(session)
        })
    }
}

fn log_saved(outcome: &SaveOutcome) {
    tracing::info!(
        duration = outcome.record.duration,
        exp = outcome.exp,
        mission = outcome.completed_mission.as_ref().map(|c| c.mission_id.as_str()),
        "meditation saved"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::mission::{MissionRepository, NewMission};
    use chrono::Duration;

    #[test]
    fn minutes_requirement_parsing() {
        assert_eq!(required_minutes("명상 10분"), Some(10));
        assert_eq!(required_minutes("meditation 5 min"), Some(5));
        assert_eq!(required_minutes("meditation 15minutes"), Some(15));
        assert_eq!(required_minutes("morning meditation"), None);
        assert_eq!(required_minutes("3 mindful breaths"), None);
    }

    #[test]
    fn exp_has_floor() {
        let cfg = MeditationConfig::default();
        assert_eq!(session_exp(30, &cfg), 5);
        assert_eq!(session_exp(300, &cfg), 25);
        assert_eq!(session_exp(66, &cfg), 6);
    }

    struct Fixture {
        store: Store,
        clock: FixedClock,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Store::in_memory().unwrap(),
                clock: FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()),
                config: Config::default(),
            }
        }

        fn service(&self) -> MeditationService<'_> {
            MeditationService::new(&self.store, &self.clock, &self.config)
        }

        fn repo(&self) -> MissionRepository<'_> {
            MissionRepository::new(&self.store, &self.clock, &self.config.progression)
        }

        fn finished(&self, secs: u64) -> MeditationSession {
            let mut session = MeditationSession::default();
            session.start(0, Technique::Breath).unwrap();
            session.advance(secs);
            session.stop().unwrap();
            session
        }
    }

    #[test]
    fn stop_after_target_passed_unattended() {
        let f = Fixture::new();
        f.service().start(Some(5), None).unwrap();
        f.clock.advance(Duration::minutes(20));

        let stopped = f.service().stop().unwrap();
        assert_eq!(stopped.state(), SessionState::Finished);
        assert_eq!(stopped.elapsed_secs(), 300);

        // Stopping an already finished session is still an error.
        let err = f.service().stop().unwrap_err();
        assert!(matches!(err, CoreError::IllegalTransition { action: "stop", .. }));
        assert!(f.service().save_active(4, "").is_ok());
    }

    #[test]
    fn save_requires_finished_session() {
        let f = Fixture::new();
        let mut session = MeditationSession::default();
        session.start(5, Technique::Breath).unwrap();
        session.advance(60);
        let err = f.service().save(&mut session, 3, "").unwrap_err();
        assert!(matches!(err, CoreError::IllegalTransition { action: "save", .. }));
        assert!(f.service().records().unwrap().is_empty());
    }

    #[test]
    fn save_rejects_bad_rating_without_writing() {
        let f = Fixture::new();
        let mut session = f.finished(120);
        let err = f.service().save(&mut session, 6, "").unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::OutOfRange { .. })));
        assert_eq!(session.state(), SessionState::Finished);
        assert!(f.service().records().unwrap().is_empty());
        assert_eq!(f.store.get::<Profile>().unwrap(), Profile::default());
    }

    #[test]
    fn save_updates_profile_and_resets() {
        let f = Fixture::new();
        let mut session = f.finished(330);
        let outcome = f.service().save(&mut session, 4, "  calm  ").unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(outcome.record.memo, "calm");
        assert_eq!(outcome.minutes_added, 6);
        assert_eq!(outcome.exp, 28);
        assert_eq!(outcome.meditation_streak, 1);
        assert!(outcome.completed_mission.is_none());

        let profile: Profile = f.store.get().unwrap();
        assert_eq!(profile.meditation_minutes, 6);
        assert_eq!(profile.total_exp, 28);
        assert_eq!(profile.last_meditation_date, Some(f.clock.today()));
        assert_eq!(f.service().records().unwrap().len(), 1);
    }

    #[test]
    fn save_completes_matching_mission() {
        let f = Fixture::new();
        let repo = f.repo();
        repo.add(NewMission::daily("Read 20 pages")).unwrap();
        let long = repo.add(NewMission::daily("명상 10분")).unwrap();
        let short = repo.add(NewMission::daily("Meditation 5 min")).unwrap();

        let mut session = f.finished(6 * 60);
        let outcome = f.service().save(&mut session, 5, "").unwrap();
        let completed = outcome.completed_mission.unwrap();
        assert_eq!(completed.mission_id, short.id);
        assert!(!repo.require(&long.id).unwrap().is_completed_on(f.clock.today()));

        // Mission EXP (40) plus session EXP (30) on top of a fresh profile.
        let profile: Profile = f.store.get().unwrap();
        assert_eq!(profile.total_exp, 70);
    }

    #[test]
    fn level_up_reported() {
        let f = Fixture::new();
        f.store
            .set(&Profile {
                meditation_minutes: 55,
                ..Profile::default()
            })
            .unwrap();
        let mut session = f.finished(5 * 60);
        let outcome = f.service().save(&mut session, 3, "").unwrap();
        assert_eq!(outcome.meditation_level, 2);
        assert!(outcome.meditation_level_up);
    }

    #[test]
    fn stored_session_follows_wall_clock() {
        let f = Fixture::new();
        let service = f.service();
        service.start(Some(0), Some(Technique::Silent)).unwrap();
        f.clock.advance(Duration::seconds(95));
        assert_eq!(service.status().unwrap().elapsed_secs, 95);

        service.pause().unwrap();
        f.clock.advance(Duration::minutes(10));
        service.resume().unwrap();
        f.clock.advance(Duration::seconds(5));

        let stopped = service.stop().unwrap();
        assert_eq!(stopped.state(), SessionState::Finished);
        assert_eq!(stopped.elapsed_secs(), 100);

        let outcome = service.save_active(4, "").unwrap();
        assert_eq!(outcome.record.duration, 100);
        assert_eq!(outcome.record.technique, Technique::Silent);
        assert_eq!(service.session().unwrap().state(), SessionState::Idle);
    }

    #[test]
    fn start_uses_configured_defaults() {
        let f = Fixture::new();
        let session = f.service().start(None, None).unwrap();
        assert_eq!(session.duration_secs(), 300);
        assert_eq!(session.technique(), Technique::Breath);
        assert!(f.service().start(None, None).is_err());
    }
}
