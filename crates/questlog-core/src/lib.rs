//! # Questlog Core Library
//!
//! This library provides the core business logic for Questlog, a gamified
//! personal-habit tracker. All operations are available through the `questlog`
//! CLI binary, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Missions**: a boss > chapter > daily hierarchy with weekday scheduling
//! - **Progression**: EXP, levels, titles and the daily completion streak
//! - **Meditation**: a tick/sync-driven session state machine and the save flow
//! - **Store**: typed records over a key-value backend (SQLite or memory) with
//!   atomic transactions and per-key subscriptions
//!
//! ## Key Components
//!
//! - [`Questlog`]: application handle wiring store, clock and config
//! - [`Store`]: record persistence and change notification
//! - [`MissionRepository`]: mission CRUD
//! - [`ProgressionEngine`]: EXP awards and mission completion
//! - [`MeditationSession`] / [`MeditationService`]: sessions and saving
//! - [`Config`]: TOML configuration

pub mod app;
pub mod clock;
pub mod dashboard;
pub mod error;
pub mod meditation;
pub mod mission;
pub mod profile;
pub mod progression;
pub mod storage;
pub mod store;
pub mod streak;

pub use app::Questlog;
pub use clock::{Clock, FixedClock, SystemClock};
pub use dashboard::Dashboard;
pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use meditation::{
    MeditationRecord, MeditationService, MeditationSession, SaveOutcome, SessionState, Technique,
};
pub use mission::{
    Mission, MissionPatch, MissionRepository, MissionTimerBoard, MissionType, NewMission,
};
pub use profile::Profile;
pub use progression::{title_for, AwardOutcome, Completion, ProgressionEngine, Title};
pub use storage::{Config, Database};
pub use store::{KvBackend, MemoryBackend, Store, StoreChange, StoreKey, SubscriptionId};
pub use streak::{StreakEngine, StreakOutcome};
