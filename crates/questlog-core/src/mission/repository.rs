use uuid::Uuid;

use super::{
    scheduled_on, sort_by_schedule, subtree_ids, validate_fields, validate_parent,
    CompletionNote, Mission, MissionPatch, MissionTimers, MissionType, NewMission,
};
use crate::clock::Clock;
use crate::error::{CoreError, Result, ValidationError};
use crate::storage::ProgressionConfig;
use crate::store::Store;

/// CRUD over the mission list.
pub struct MissionRepository<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    progression: &'a ProgressionConfig,
}

impl<'a> MissionRepository<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock, progression: &'a ProgressionConfig) -> Self {
        Self {
            store,
            clock,
            progression,
        }
    }

    /// Validate and store a new mission.
    ///
    /// # Errors
    /// `Validation` for malformed fields or a parent that is missing or of
    /// the wrong tier.
    pub fn add(&self, new: NewMission) -> Result<Mission> {
        let created_at = self.clock.now();
        let mission = self.store.transact(|txn| {
            let mut missions: Vec<Mission> = txn.load()?;
            let fields = validate_fields(
                new.mission_type,
                &new.title,
                new.difficulty,
                new.estimated_minutes,
                new.parent_id.as_deref(),
                new.scheduled_time.as_deref(),
                &new.repeat_days,
            )?;
            validate_parent(new.mission_type, new.parent_id.as_deref(), &missions)?;

            let mission = Mission {
                id: Uuid::new_v4().to_string(),
                title: fields.title,
                mission_type: new.mission_type,
                difficulty: new.difficulty,
                estimated_minutes: new.estimated_minutes,
                parent_id: new.parent_id,
                scheduled_time: fields.scheduled_time,
                repeat_days: fields.repeat_days,
                exp_reward: self.progression.base_reward(new.difficulty),
                completed_dates: Vec::new(),
                streak: 0,
                completion_notes: Vec::new(),
                created_at,
            };
            missions.push(mission.clone());
            txn.save(&missions)?;
            Ok(mission)
        })?;

        tracing::info!(id = %mission.id, kind = %mission.mission_type, title = %mission.title, "mission added");
        Ok(mission)
    }

    /// Merge `patch` into the mission with `id`.
    ///
    /// # Errors
    /// `NotFound` if no such mission, `Validation` if the merged mission is invalid.
    pub fn update(&self, id: &str, patch: &MissionPatch) -> Result<Mission> {
        let updated = self.store.transact(|txn| {
            let mut missions: Vec<Mission> = txn.load()?;
            let idx = missions
                .iter()
                .position(|m| m.id == id)
                .ok_or_else(|| CoreError::mission_not_found(id))?;
            if patch.is_empty() {
                return Ok(missions[idx].clone());
            }

            let mut next = patch.apply_to(&missions[idx]);
            let fields = validate_fields(
                next.mission_type,
                &next.title,
                next.difficulty,
                next.estimated_minutes,
                next.parent_id.as_deref(),
                next.scheduled_time.as_deref(),
                &next.repeat_days,
            )?;
            validate_parent(next.mission_type, next.parent_id.as_deref(), &missions)?;

            next.title = fields.title;
            next.scheduled_time = fields.scheduled_time;
            next.repeat_days = fields.repeat_days;
            next.exp_reward = self.progression.base_reward(next.difficulty);
            missions[idx] = next.clone();
            txn.save(&missions)?;
            Ok(next)
        })?;

        tracing::info!(id = %updated.id, "mission updated");
        Ok(updated)
    }

    /// Remove the mission and every mission below it. Returns the removed ids.
    ///
    /// # Errors
    /// `NotFound` if no such mission.
    pub fn delete(&self, id: &str) -> Result<Vec<String>> {
        let removed = self.store.transact(|txn| {
            let mut missions: Vec<Mission> = txn.load()?;
            if !missions.iter().any(|m| m.id == id) {
                return Err(CoreError::mission_not_found(id));
            }
            let removed = subtree_ids(&missions, id);
            missions.retain(|m| !removed.contains(&m.id));
            txn.save(&missions)?;

            let mut timers: MissionTimers = txn.load()?;
            let mut stopped = false;
            for rid in &removed {
                stopped |= timers.remove(rid);
            }
            if stopped {
                txn.save(&timers)?;
            }
            Ok(removed)
        })?;

        tracing::info!(id, removed = removed.len(), "mission deleted");
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Result<Option<Mission>> {
        Ok(self.list()?.into_iter().find(|m| m.id == id))
    }

    /// Like [`get`](Self::get) but a missing mission is an error.
    pub fn require(&self, id: &str) -> Result<Mission> {
        self.get(id)?.ok_or_else(|| CoreError::mission_not_found(id))
    }

    pub fn list(&self) -> Result<Vec<Mission>> {
        self.store.get()
    }

    pub fn list_by_type(&self, mission_type: MissionType) -> Result<Vec<Mission>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|m| m.mission_type == mission_type)
            .collect())
    }

    /// Direct children of `id`.
    pub fn children_of(&self, id: &str) -> Result<Vec<Mission>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|m| m.parent_id.as_deref() == Some(id))
            .collect())
    }

    /// Daily missions scheduled for today, ordered by scheduled time.
    pub fn today_scheduled(&self) -> Result<Vec<Mission>> {
        self.scheduled_on(self.clock.today())
    }

    pub fn scheduled_on(&self, date: chrono::NaiveDate) -> Result<Vec<Mission>> {
        let missions = self.list()?;
        let mut scheduled: Vec<Mission> = scheduled_on(&missions, date).into_iter().cloned().collect();
        sort_by_schedule(&mut scheduled);
        Ok(scheduled)
    }

    /// Append a dated free-text note to the mission.
    pub fn add_note(&self, id: &str, note: &str) -> Result<Mission> {
        let note = note.trim();
        if note.is_empty() {
            return Err(ValidationError::Empty("note").into());
        }
        let date = self.clock.today();
        self.store.transact(|txn| {
            let mut missions: Vec<Mission> = txn.load()?;
            let mission = missions
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| CoreError::mission_not_found(id))?;
            mission.completion_notes.push(CompletionNote {
                date,
                note: note.to_string(),
            });
            let out = mission.clone();
            txn.save(&missions)?;
            Ok(out)
        })
    }
}
