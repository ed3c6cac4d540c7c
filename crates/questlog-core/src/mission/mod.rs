//! Missions: the boss > chapter > daily hierarchy.
//!
//! ```text
//! Boss (monthly)
//!   └── Chapter (weekly)      parent_id -> boss
//!         └── Daily (quest)   parent_id -> chapter
//! ```
//!
//! Only daily missions carry a schedule (`scheduled_time`, `repeat_days`)
//! and only they appear on the today board.

mod repository;
mod timer;

pub use repository::MissionRepository;
pub use timer::{MissionTimerBoard, MissionTimers, RunningTimer};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::clock::weekday_index;
use crate::error::ValidationError;

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;

/// Tier of a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionType {
    Boss,
    Chapter,
    Daily,
}

impl MissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionType::Boss => "boss",
            MissionType::Chapter => "chapter",
            MissionType::Daily => "daily",
        }
    }

    /// The tier a mission of this type may hang under.
    pub fn parent_type(&self) -> Option<MissionType> {
        match self {
            MissionType::Boss => None,
            MissionType::Chapter => Some(MissionType::Boss),
            MissionType::Daily => Some(MissionType::Chapter),
        }
    }
}

impl fmt::Display for MissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boss" => Ok(MissionType::Boss),
            "chapter" => Ok(MissionType::Chapter),
            "daily" | "quest" => Ok(MissionType::Daily),
            other => Err(ValidationError::InvalidValue {
                field: "type",
                message: format!("unknown mission type '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionNote {
    pub date: NaiveDate,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub mission_type: MissionType,
    pub difficulty: u8,
    pub estimated_minutes: u32,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// `HH:MM`, daily missions only.
    #[serde(default)]
    pub scheduled_time: Option<String>,
    /// Weekdays 0 = Sunday .. 6 = Saturday. Empty means every day.
    #[serde(default)]
    pub repeat_days: Vec<u8>,
    /// Base reward; the streak bonus is added when the mission is completed.
    pub exp_reward: u32,
    #[serde(default)]
    pub completed_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub completion_notes: Vec<CompletionNote>,
    pub created_at: NaiveDateTime,
}

impl Mission {
    pub fn is_completed_on(&self, date: NaiveDate) -> bool {
        self.completed_dates.contains(&date)
    }

    /// Daily missions only; empty `repeat_days` means every day.
    pub fn is_scheduled_on(&self, date: NaiveDate) -> bool {
        self.mission_type == MissionType::Daily
            && (self.repeat_days.is_empty() || self.repeat_days.contains(&weekday_index(date)))
    }

    /// Record a completion for `date`. Returns false when that day is already recorded.
    pub(crate) fn record_completion(&mut self, date: NaiveDate) -> bool {
        if self.is_completed_on(date) {
            return false;
        }
        self.completed_dates.push(date);
        self.streak += 1;
        true
    }
}

/// Input for creating a mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMission {
    pub title: String,
    #[serde(rename = "type")]
    pub mission_type: MissionType,
    pub difficulty: u8,
    pub estimated_minutes: u32,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub repeat_days: Vec<u8>,
}

impl NewMission {
    pub fn new(mission_type: MissionType, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            mission_type,
            difficulty: 2,
            estimated_minutes: 30,
            parent_id: None,
            scheduled_time: None,
            repeat_days: Vec::new(),
        }
    }

    pub fn boss(title: impl Into<String>) -> Self {
        Self::new(MissionType::Boss, title)
    }

    pub fn chapter(title: impl Into<String>) -> Self {
        Self::new(MissionType::Chapter, title)
    }

    pub fn daily(title: impl Into<String>) -> Self {
        Self::new(MissionType::Daily, title)
    }

    pub fn difficulty(mut self, difficulty: u8) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn estimated_minutes(mut self, minutes: u32) -> Self {
        self.estimated_minutes = minutes;
        self
    }

    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn at(mut self, hhmm: impl Into<String>) -> Self {
        self.scheduled_time = Some(hhmm.into());
        self
    }

    pub fn on_days(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.repeat_days = days.into_iter().collect();
        self
    }
}

/// Fields a caller may change on an existing mission. `None` leaves a field
/// alone; for optional fields `Some(None)` clears it. The mission type is
/// fixed at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub parent_id: Option<Option<String>>,
    #[serde(default)]
    pub scheduled_time: Option<Option<String>>,
    #[serde(default)]
    pub repeat_days: Option<Vec<u8>>,
}

impl MissionPatch {
    pub fn is_empty(&self) -> bool {
        *self == MissionPatch::default()
    }

    /// Apply onto a copy of `mission`; the result still needs validation.
    fn apply_to(&self, mission: &Mission) -> Mission {
        let mut next = mission.clone();
        if let Some(title) = &self.title {
            next.title = title.clone();
        }
        if let Some(difficulty) = self.difficulty {
            next.difficulty = difficulty;
        }
        if let Some(minutes) = self.estimated_minutes {
            next.estimated_minutes = minutes;
        }
        if let Some(parent_id) = &self.parent_id {
            next.parent_id = parent_id.clone();
        }
        if let Some(time) = &self.scheduled_time {
            next.scheduled_time = time.clone();
        }
        if let Some(days) = &self.repeat_days {
            next.repeat_days = days.clone();
        }
        next
    }
}

/// Normalised, validated mission fields.
struct Fields {
    title: String,
    scheduled_time: Option<String>,
    repeat_days: Vec<u8>,
}

fn validate_fields(
    mission_type: MissionType,
    title: &str,
    difficulty: u8,
    estimated_minutes: u32,
    parent_id: Option<&str>,
    scheduled_time: Option<&str>,
    repeat_days: &[u8],
) -> Result<Fields, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::Empty("title"));
    }
    if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty) {
        return Err(ValidationError::OutOfRange {
            field: "difficulty",
            min: MIN_DIFFICULTY.into(),
            max: MAX_DIFFICULTY.into(),
            value: difficulty.into(),
        });
    }
    if estimated_minutes == 0 {
        return Err(ValidationError::OutOfRange {
            field: "estimated_minutes",
            min: 1,
            max: u32::MAX.into(),
            value: 0,
        });
    }
    if mission_type == MissionType::Boss && parent_id.is_some() {
        return Err(ValidationError::FieldNotAllowed {
            field: "parent_id",
            mission_type: mission_type.as_str(),
        });
    }
    let is_daily = mission_type == MissionType::Daily;
    if !is_daily && scheduled_time.is_some() {
        return Err(ValidationError::FieldNotAllowed {
            field: "scheduled_time",
            mission_type: mission_type.as_str(),
        });
    }
    if !is_daily && !repeat_days.is_empty() {
        return Err(ValidationError::FieldNotAllowed {
            field: "repeat_days",
            mission_type: mission_type.as_str(),
        });
    }

    let scheduled_time = match scheduled_time.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(normalize_hhmm(raw)?),
        None => None,
    };

    if let Some(&bad) = repeat_days.iter().find(|d| **d > 6) {
        return Err(ValidationError::OutOfRange {
            field: "repeat_days",
            min: 0,
            max: 6,
            value: bad.into(),
        });
    }
    let mut repeat_days = repeat_days.to_vec();
    repeat_days.sort_unstable();
    repeat_days.dedup();

    Ok(Fields {
        title: title.to_string(),
        scheduled_time,
        repeat_days,
    })
}

/// Parse `H:MM`/`HH:MM` and return it zero-padded.
fn normalize_hhmm(raw: &str) -> Result<String, ValidationError> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| ValidationError::InvalidValue {
            field: "scheduled_time",
            message: format!("expected HH:MM, got '{raw}'"),
        })
}

/// Check that `parent_id`, if set, names an existing mission one tier up.
fn validate_parent(
    mission_type: MissionType,
    parent_id: Option<&str>,
    missions: &[Mission],
) -> Result<(), ValidationError> {
    let Some(parent_id) = parent_id else {
        return Ok(());
    };
    let expected = mission_type.parent_type().ok_or(ValidationError::FieldNotAllowed {
        field: "parent_id",
        mission_type: mission_type.as_str(),
    })?;
    let parent = missions
        .iter()
        .find(|m| m.id == parent_id)
        .ok_or_else(|| ValidationError::InvalidParent(format!("no mission with id {parent_id}")))?;
    if parent.mission_type != expected {
        return Err(ValidationError::InvalidParent(format!(
            "a {mission_type} mission must belong to a {expected}, not a {}",
            parent.mission_type
        )));
    }
    Ok(())
}

/// Daily missions scheduled on `date`.
pub fn scheduled_on(missions: &[Mission], date: NaiveDate) -> Vec<&Mission> {
    missions.iter().filter(|m| m.is_scheduled_on(date)).collect()
}

/// Ordering used on the today board: by scheduled time, untimed last.
pub fn sort_by_schedule(missions: &mut [Mission]) {
    missions.sort_by(|a, b| match (&a.scheduled_time, &b.scheduled_time) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// Completed / scheduled counts for `date`.
pub fn completion_counts(missions: &[Mission], date: NaiveDate) -> (usize, usize) {
    let scheduled = scheduled_on(missions, date);
    let done = scheduled.iter().filter(|m| m.is_completed_on(date)).count();
    (done, scheduled.len())
}

/// Fraction of `date`'s scheduled missions completed that day.
/// `None` when nothing was scheduled.
pub fn completion_rate(missions: &[Mission], date: NaiveDate) -> Option<f64> {
    match completion_counts(missions, date) {
        (_, 0) => None,
        (done, total) => Some(done as f64 / total as f64),
    }
}

/// `root` and everything below it, parents before children.
pub fn subtree_ids(missions: &[Mission], root: &str) -> Vec<String> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for m in missions {
        if let Some(parent) = m.parent_id.as_deref() {
            children.entry(parent).or_default().push(m.id.as_str());
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        order.push(id.to_string());
        if let Some(kids) = children.get(id) {
            stack.extend(kids.iter().rev());
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn mission(id: &str, mission_type: MissionType, parent: Option<&str>) -> Mission {
        Mission {
            id: id.to_string(),
            title: id.to_string(),
            mission_type,
            difficulty: 2,
            estimated_minutes: 30,
            parent_id: parent.map(str::to_string),
            scheduled_time: None,
            repeat_days: Vec::new(),
            exp_reward: 40,
            completed_dates: Vec::new(),
            streak: 0,
            completion_notes: Vec::new(),
            created_at: NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        }
    }

    fn sunday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
    }

    #[test]
    fn weekday_schedule() {
        let mut weekdays = mission("d", MissionType::Daily, None);
        weekdays.repeat_days = vec![1, 2, 3, 4, 5];
        for offset in 0..7 {
            let date = sunday() + Duration::days(offset);
            let expected = (1..=5).contains(&offset);
            assert_eq!(weekdays.is_scheduled_on(date), expected, "offset {offset}");
        }

        let every_day = mission("e", MissionType::Daily, None);
        assert!((0..7).all(|o| every_day.is_scheduled_on(sunday() + Duration::days(o))));
    }

    #[test]
    fn non_daily_never_scheduled() {
        let boss = mission("b", MissionType::Boss, None);
        assert!(!boss.is_scheduled_on(sunday()));
    }

    #[test]
    fn record_completion_is_once_per_day() {
        let mut m = mission("d", MissionType::Daily, None);
        assert!(m.record_completion(sunday()));
        assert!(!m.record_completion(sunday()));
        assert_eq!(m.completed_dates, vec![sunday()]);
        assert_eq!(m.streak, 1);
    }

    #[test]
    fn completion_rate_counts_scheduled_only() {
        let mut a = mission("a", MissionType::Daily, None);
        let b = mission("b", MissionType::Daily, None);
        let mut c = mission("c", MissionType::Boss, None);
        a.completed_dates.push(sunday());
        c.completed_dates.push(sunday());
        let all = vec![a, b, c];
        assert_eq!(completion_rate(&all, sunday()), Some(0.5));
        assert_eq!(completion_rate(&[], sunday()), None);
    }

    #[test]
    fn subtree_walks_all_levels() {
        let all = vec![
            mission("b", MissionType::Boss, None),
            mission("c1", MissionType::Chapter, Some("b")),
            mission("c2", MissionType::Chapter, Some("b")),
            mission("d1", MissionType::Daily, Some("c1")),
            mission("d2", MissionType::Daily, Some("c2")),
            mission("other", MissionType::Daily, None),
        ];
        let mut ids = subtree_ids(&all, "b");
        assert_eq!(ids[0], "b");
        ids.sort();
        assert_eq!(ids, vec!["b", "c1", "c2", "d1", "d2"]);
        assert_eq!(subtree_ids(&all, "d1"), vec!["d1"]);
    }

    #[test]
    fn validate_normalises_fields() {
        let fields = validate_fields(
            MissionType::Daily,
            "  Read  ",
            3,
            15,
            None,
            Some("7:05"),
            &[5, 1, 5, 3],
        )
        .unwrap();
        assert_eq!(fields.title, "Read");
        assert_eq!(fields.scheduled_time.as_deref(), Some("07:05"));
        assert_eq!(fields.repeat_days, vec![1, 3, 5]);
    }

    #[test]
    fn validate_rejects_bad_input() {
        let v = |t, title: &str, d, days: &[u8], time: Option<&str>| {
            validate_fields(t, title, d, 10, None, time, days).err()
        };
        assert_eq!(v(MissionType::Daily, " ", 2, &[], None), Some(ValidationError::Empty("title")));
        assert!(matches!(
            v(MissionType::Daily, "x", 6, &[], None),
            Some(ValidationError::OutOfRange { field: "difficulty", .. })
        ));
        assert!(matches!(
            v(MissionType::Daily, "x", 2, &[7], None),
            Some(ValidationError::OutOfRange { field: "repeat_days", .. })
        ));
        assert!(matches!(
            v(MissionType::Daily, "x", 2, &[], Some("25:00")),
            Some(ValidationError::InvalidValue { field: "scheduled_time", .. })
        ));
        assert!(matches!(
            v(MissionType::Boss, "x", 2, &[1], None),
            Some(ValidationError::FieldNotAllowed { field: "repeat_days", .. })
        ));
        assert!(matches!(
            v(MissionType::Chapter, "x", 2, &[], Some("08:00")),
            Some(ValidationError::FieldNotAllowed { field: "scheduled_time", .. })
        ));
    }

    #[test]
    fn parent_must_be_one_tier_up() {
        let all = vec![
            mission("b", MissionType::Boss, None),
            mission("c", MissionType::Chapter, Some("b")),
        ];
        assert!(validate_parent(MissionType::Chapter, Some("b"), &all).is_ok());
        assert!(validate_parent(MissionType::Daily, Some("c"), &all).is_ok());
        assert!(matches!(
            validate_parent(MissionType::Daily, Some("b"), &all),
            Err(ValidationError::InvalidParent(_))
        ));
        assert!(matches!(
            validate_parent(MissionType::Chapter, Some("missing"), &all),
            Err(ValidationError::InvalidParent(_))
        ));
    }

    #[test]
    fn schedule_sort_puts_untimed_last() {
        let mut a = mission("a", MissionType::Daily, None);
        let mut b = mission("b", MissionType::Daily, None);
        let c = mission("c", MissionType::Daily, None);
        a.scheduled_time = Some("21:00".into());
        b.scheduled_time = Some("06:30".into());
        let mut list = vec![c, a, b];
        sort_by_schedule(&mut list);
        let ids: Vec<_> = list.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn mission_type_parses() {
        assert_eq!("Boss".parse::<MissionType>().unwrap(), MissionType::Boss);
        assert_eq!("quest".parse::<MissionType>().unwrap(), MissionType::Daily);
        assert!("epic".parse::<MissionType>().is_err());
    }

    #[test]
    fn serialized_type_field_is_named_type() {
        let json = serde_json::to_value(mission("d", MissionType::Daily, None)).unwrap();
        assert_eq!(json["type"], "daily");
        assert!(json.get("mission_type").is_none());
    }
}
