//! Application handle wiring the store, clock and configuration together.

use std::path::Path;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::dashboard::Dashboard;
use crate::error::Result;
use crate::meditation::MeditationService;
use crate::mission::{MissionRepository, MissionTimerBoard};
use crate::progression::ProgressionEngine;
use crate::storage::{Config, Database};
use crate::store::Store;
use crate::streak::StreakEngine;

/// One opened questlog: a store, a clock and the loaded configuration.
///
/// Components are cheap views borrowed from this handle.
pub struct Questlog {
    store: Store,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl Questlog {
    pub fn new(store: Store, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Open the database and config in the default data directory.
    pub fn open_default() -> Result<Self> {
        let config = Config::load()?;
        let store = Store::new(Database::open()?)?;
        Ok(Self::new(store, Arc::new(SystemClock), config))
    }

    /// Open `questlog.db` and `config.toml` inside `dir`.
    pub fn open_in(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let config = Config::load_from(&dir.join("config.toml"))?;
        let store = Store::new(Database::open_at(&dir.join("questlog.db"))?)?;
        Ok(Self::new(store, Arc::new(SystemClock), config))
    }

    pub fn in_memory(clock: Arc<dyn Clock>, config: Config) -> Result<Self> {
        Ok(Self::new(Store::in_memory()?, clock, config))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn missions(&self) -> MissionRepository<'_> {
        MissionRepository::new(&self.store, self.clock(), &self.config.progression)
    }

    pub fn timers(&self) -> MissionTimerBoard<'_> {
        MissionTimerBoard::new(&self.store, self.clock())
    }

    pub fn progression(&self) -> ProgressionEngine<'_> {
        ProgressionEngine::new(&self.store, self.clock(), &self.config)
    }

    pub fn streaks(&self) -> StreakEngine<'_> {
        StreakEngine::new(&self.store, self.clock(), &self.config.streak)
    }

    pub fn meditation(&self) -> MeditationService<'_> {
        MeditationService::new(&self.store, self.clock(), &self.config)
    }

    pub fn dashboard(&self) -> Dashboard<'_> {
        Dashboard::new(&self.store, self.clock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::mission::NewMission;
    use chrono::NaiveDate;

    #[test]
    fn components_share_one_store() {
        let clock = Arc::new(FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()));
        let app = Questlog::in_memory(clock, Config::default()).unwrap();
        let m = app.missions().add(NewMission::daily("Walk")).unwrap();
        app.progression().complete_mission(&m.id).unwrap();
        assert_eq!(app.dashboard().today_progress().unwrap().percent, 100);
        assert_eq!(app.streaks().summary().unwrap().current_streak, 1);
    }

    #[test]
    fn open_in_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let app = Questlog::open_in(dir.path()).unwrap();
        app.missions().add(NewMission::boss("Ship")).unwrap();
        drop(app);
        assert!(dir.path().join("config.toml").exists());

        let reopened = Questlog::open_in(dir.path()).unwrap();
        assert_eq!(reopened.missions().list().unwrap().len(), 1);
    }
}
