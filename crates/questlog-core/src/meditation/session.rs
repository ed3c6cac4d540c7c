//! Meditation session state machine.
//!
//! The session does not own a thread. Callers either `tick()` once per second
//! or `sync(now)` with the wall clock, which converts real elapsed time into
//! whole-second ticks and carries the sub-second remainder.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running (paused flag) -> Finished -> Idle
//!            |                                  ^
//!            +---- stop() under minimum --------+
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::Technique;
use crate::error::{CoreError, Result};

/// Free-mode sessions fill their progress ring over this many seconds.
pub const FREE_MODE_RING_SECS: u64 = 30 * 60;

const DEFAULT_MIN_SESSION_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    /// Stopped or ran out; waiting to be saved or reset.
    Finished,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeditationSession {
    state: SessionState,
    paused: bool,
    technique: Technique,
    /// Target length; 0 means free mode (count up, no auto-finish).
    duration_secs: u64,
    elapsed_secs: u64,
    min_session_secs: u64,
    /// Wall-clock anchor for `sync`; cleared while paused or not running.
    last_sync: Option<NaiveDateTime>,
    carry_ms: u64,
}

impl Default for MeditationSession {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SESSION_SECS)
    }
}

/// Read-only view for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub paused: bool,
    pub technique: Technique,
    pub technique_name: &'static str,
    pub duration_secs: u64,
    pub elapsed_secs: u64,
    /// Fixed mode only.
    pub remaining_secs: Option<u64>,
    /// 0.0 .. 1.0
    pub progress: f64,
}

impl MeditationSession {
    pub fn new(min_session_secs: u64) -> Self {
        Self {
            state: SessionState::Idle,
            paused: false,
            technique: Technique::default(),
            duration_secs: 0,
            elapsed_secs: 0,
            min_session_secs,
            last_sync: None,
            carry_ms: 0,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn technique(&self) -> Technique {
        self.technique
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn min_session_secs(&self) -> u64 {
        self.min_session_secs
    }

    pub fn is_free_mode(&self) -> bool {
        self.duration_secs == 0
    }

    pub fn remaining_secs(&self) -> Option<u64> {
        (!self.is_free_mode()).then(|| self.duration_secs.saturating_sub(self.elapsed_secs))
    }

    fn is_counting(&self) -> bool {
        self.state == SessionState::Running && !self.paused
    }

    pub fn progress(&self) -> f64 {
        if self.state == SessionState::Idle {
            return 0.0;
        }
        let total = if self.is_free_mode() {
            FREE_MODE_RING_SECS
        } else {
            self.duration_secs
        };
        (self.elapsed_secs as f64 / total as f64).min(1.0)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            paused: self.paused,
            technique: self.technique,
            technique_name: self.technique.display_name(),
            duration_secs: self.duration_secs,
            elapsed_secs: self.elapsed_secs,
            remaining_secs: self.remaining_secs(),
            progress: self.progress(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn set_min_session_secs(&mut self, secs: u64) {
        self.min_session_secs = secs;
    }

    /// Begin a session of `minutes` (0 for free mode).
    pub fn start(&mut self, minutes: u32, technique: Technique) -> Result<()> {
        self.require(SessionState::Idle, "start")?;
        self.state = SessionState::Running;
        self.paused = false;
        self.technique = technique;
        self.duration_secs = u64::from(minutes) * 60;
        self.elapsed_secs = 0;
        self.last_sync = None;
        self.carry_ms = 0;
        Ok(())
    }

    /// One second passes. Returns true if this tick finished the session.
    pub fn tick(&mut self) -> bool {
        self.advance(1)
    }

    /// Apply `secs` ticks at once. Ignored unless running and not paused.
    /// Returns true if the session finished.
    pub fn advance(&mut self, secs: u64) -> bool {
        if !self.is_counting() || secs == 0 {
            return false;
        }
        if self.is_free_mode() {
            self.elapsed_secs = self.elapsed_secs.saturating_add(secs);
            return false;
        }
        self.elapsed_secs = (self.elapsed_secs + secs).min(self.duration_secs);
        if self.elapsed_secs >= self.duration_secs {
            self.finish();
            return true;
        }
        false
    }

    /// Catch up with the wall clock. The first call after start or resume
    /// only sets the anchor. Returns true if the session finished.
    pub fn sync(&mut self, now: NaiveDateTime) -> bool {
        if !self.is_counting() {
            self.last_sync = None;
            return false;
        }
        let Some(last) = self.last_sync.replace(now) else {
            return false;
        };
        let delta_ms = (now - last).num_milliseconds().max(0) as u64 + self.carry_ms;
        self.carry_ms = delta_ms % 1000;
        self.advance(delta_ms / 1000)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.require(SessionState::Running, "pause")?;
        self.paused = true;
        self.last_sync = None;
        self.carry_ms = 0;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.require(SessionState::Running, "resume")?;
        self.paused = false;
        Ok(())
    }

    /// Returns the new paused flag.
    pub fn toggle_pause(&mut self) -> Result<bool> {
        if self.paused {
            self.resume()?;
        } else {
            self.pause()?;
        }
        Ok(self.paused)
    }

    /// End a running session. Sessions shorter than the minimum are
    /// discarded back to `Idle`; longer ones become `Finished`.
    pub fn stop(&mut self) -> Result<SessionState> {
        self.require(SessionState::Running, "stop")?;
        if self.elapsed_secs < self.min_session_secs {
            tracing::debug!(elapsed = self.elapsed_secs, "session too short, discarded");
            self.reset();
        } else {
            self.finish();
        }
        Ok(self.state)
    }

    /// Back to `Idle` from any state, dropping elapsed time.
    pub fn reset(&mut self) {
        *self = Self::new(self.min_session_secs);
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn finish(&mut self) {
        self.state = SessionState::Finished;
        self.paused = false;
        self.last_sync = None;
        self.carry_ms = 0;
    }

    fn require(&self, expected: SessionState, action: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoreError::IllegalTransition {
                state: self.state.as_str(),
                action,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(7, 0, 0)
            .unwrap()
    }

    fn running(minutes: u32) -> MeditationSession {
        let mut session = MeditationSession::default();
        session.start(minutes, Technique::Breath).unwrap();
        session
    }

    #[test]
    fn start_only_from_idle() {
        let mut session = running(5);
        let err = session.start(5, Technique::Silent).unwrap_err();
        assert!(matches!(
            err,
            CoreError::IllegalTransition { state: "running", action: "start" }
        ));
        assert_eq!(session.technique(), Technique::Breath);
    }

    #[test]
    fn fixed_mode_auto_finishes() {
        let mut session = running(1);
        for _ in 0..59 {
            assert!(!session.tick());
        }
        assert_eq!(session.remaining_secs(), Some(1));
        assert!(session.tick());
        assert_eq!(session.state(), SessionState::Finished);
        assert_eq!(session.elapsed_secs(), 60);

        // Finished sessions ignore ticks.
        assert!(!session.tick());
        assert_eq!(session.elapsed_secs(), 60);
    }

    #[test]
    fn free_mode_counts_up() {
        let mut session = running(0);
        assert!(!session.advance(4000));
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.remaining_secs(), None);
        assert_eq!(session.progress(), 1.0);
    }

    #[test]
    fn paused_and_idle_ticks_are_ignored() {
        let mut idle = MeditationSession::default();
        let before = idle.clone();
        idle.tick();
        assert_eq!(idle, before);

        let mut session = running(5);
        session.advance(3);
        session.pause().unwrap();
        session.advance(100);
        assert_eq!(session.elapsed_secs(), 3);
        assert!(!session.toggle_pause().unwrap());
        session.tick();
        assert_eq!(session.elapsed_secs(), 4);
    }

    #[test]
    fn short_stop_discards() {
        let mut session = running(5);
        session.advance(9);
        assert_eq!(session.stop().unwrap(), SessionState::Idle);
        assert_eq!(session.elapsed_secs(), 0);
    }

    #[test]
    fn minimum_stop_finishes() {
        let mut session = running(5);
        session.advance(10);
        assert_eq!(session.stop().unwrap(), SessionState::Finished);
        assert_eq!(session.elapsed_secs(), 10);
        assert!(session.stop().is_err());
        assert!(session.pause().is_err());
    }

    #[test]
    fn reset_keeps_minimum() {
        let mut session = MeditationSession::new(30);
        session.start(0, Technique::Loving).unwrap();
        session.advance(20);
        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.min_session_secs(), 30);
    }

    #[test]
    fn sync_carries_subsecond_remainder() {
        let mut session = running(0);
        assert!(!session.sync(t0()));
        assert_eq!(session.elapsed_secs(), 0);

        session.sync(t0() + Duration::milliseconds(1500));
        assert_eq!(session.elapsed_secs(), 1);
        session.sync(t0() + Duration::milliseconds(3000));
        assert_eq!(session.elapsed_secs(), 3);
    }

    #[test]
    fn sync_skips_paused_time() {
        let mut session = running(0);
        session.sync(t0());
        session.sync(t0() + Duration::seconds(30));
        session.pause().unwrap();
        session.sync(t0() + Duration::seconds(300));
        session.resume().unwrap();
        session.sync(t0() + Duration::seconds(310));
        session.sync(t0() + Duration::seconds(320));
        assert_eq!(session.elapsed_secs(), 40);
    }

    #[test]
    fn sync_finishes_fixed_session() {
        let mut session = running(5);
        session.sync(t0());
        assert!(session.sync(t0() + Duration::minutes(12)));
        assert_eq!(session.elapsed_secs(), 300);
        assert_eq!(session.state(), SessionState::Finished);
    }

    #[test]
    fn snapshot_reports_progress() {
        let mut session = running(10);
        session.advance(150);
        let snap = session.snapshot();
        assert_eq!(snap.remaining_secs, Some(450));
        assert_eq!(snap.progress, 0.25);
        assert_eq!(snap.technique_name, "Breath observation");
    }

    #[test]
    fn persists_as_json() {
        let mut session = running(5);
        session.sync(t0());
        session.advance(42);
        let json = serde_json::to_string(&session).unwrap();
        let back: MeditationSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}
