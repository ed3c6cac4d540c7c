//! Mission management commands.

use std::str::FromStr;

use clap::Subcommand;
use questlog_core::{MissionPatch, MissionType, NewMission, Questlog};
use serde::Serialize;

use super::{print_json, CmdResult};

/// Comma-separated weekdays: numbers (0 = Sunday) or three-letter names.
/// An empty string means every day.
#[derive(Debug, Clone)]
pub struct Weekdays(Vec<u8>);

impl FromStr for Weekdays {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let lower = part.to_ascii_lowercase();
                if let Some(idx) = NAMES.iter().position(|n| lower.starts_with(n)) {
                    return Ok(idx as u8);
                }
                part.parse::<u8>()
                    .map_err(|_| format!("invalid weekday '{part}'"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Weekdays)
    }
}

#[derive(Subcommand)]
pub enum MissionAction {
    /// Create a mission
    Add {
        /// Mission title
        title: String,
        /// boss, chapter or daily
        #[arg(long = "type", default_value = "daily")]
        mission_type: MissionType,
        /// Difficulty 1-5
        #[arg(long, default_value = "2")]
        difficulty: u8,
        /// Estimated minutes
        #[arg(long, default_value = "30")]
        minutes: u32,
        /// Parent mission ID
        #[arg(long)]
        parent: Option<String>,
        /// Scheduled time (HH:MM), daily missions only
        #[arg(long)]
        at: Option<String>,
        /// Repeat days, e.g. "1,3,5" or "mon,wed,fri"
        #[arg(long)]
        days: Option<Weekdays>,
    },
    /// List missions
    List {
        /// Filter by type
        #[arg(long = "type")]
        mission_type: Option<MissionType>,
    },
    /// Show one mission
    Show {
        /// Mission ID
        id: String,
    },
    /// Change fields of a mission
    Edit {
        /// Mission ID
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        difficulty: Option<u8>,
        #[arg(long)]
        minutes: Option<u32>,
        #[arg(long, conflicts_with = "clear_parent")]
        parent: Option<String>,
        /// Detach from the parent mission
        #[arg(long)]
        clear_parent: bool,
        #[arg(long, conflicts_with = "clear_time")]
        at: Option<String>,
        /// Remove the scheduled time
        #[arg(long)]
        clear_time: bool,
        /// Repeat days; an empty string means every day
        #[arg(long)]
        days: Option<Weekdays>,
    },
    /// Delete a mission and everything under it
    Delete {
        /// Mission ID
        id: String,
    },
    /// Today's scheduled daily missions
    Today,
    /// Complete a mission for today
    Complete {
        /// Mission ID
        id: String,
    },
    /// Attach a note to a mission
    Note {
        /// Mission ID
        id: String,
        /// Note text
        note: String,
    },
    /// Start a mission stopwatch
    TimerStart {
        /// Mission ID
        id: String,
    },
    /// Stop a mission stopwatch
    TimerStop {
        /// Mission ID
        id: String,
    },
    /// List running stopwatches
    Timers,
}

#[derive(Serialize)]
struct TodayEntry {
    id: String,
    title: String,
    scheduled_time: Option<String>,
    difficulty: u8,
    exp_reward: u32,
    done: bool,
    timer_secs: Option<u64>,
}

pub fn run(action: MissionAction) -> CmdResult {
    let app = Questlog::open_default()?;
    let missions = app.missions();

    match action {
        MissionAction::Add {
            title,
            mission_type,
            difficulty,
            minutes,
            parent,
            at,
            days,
        } => {
            let mut new = NewMission::new(mission_type, title)
                .difficulty(difficulty)
                .estimated_minutes(minutes);
            new.parent_id = parent;
            new.scheduled_time = at;
            if let Some(Weekdays(days)) = days {
                new.repeat_days = days;
            }
            let mission = missions.add(new)?;
            print_json(&mission)?;
        }
        MissionAction::List { mission_type } => {
            let list = match mission_type {
                Some(t) => missions.list_by_type(t)?,
                None => missions.list()?,
            };
            print_json(&list)?;
        }
        MissionAction::Show { id } => {
            let mission = missions.require(&id)?;
            print_json(&mission)?;
        }
        MissionAction::Edit {
            id,
            title,
            difficulty,
            minutes,
            parent,
            clear_parent,
            at,
            clear_time,
            days,
        } => {
            let patch = MissionPatch {
                title,
                difficulty,
                estimated_minutes: minutes,
                parent_id: if clear_parent { Some(None) } else { parent.map(Some) },
                scheduled_time: if clear_time { Some(None) } else { at.map(Some) },
                repeat_days: days.map(|Weekdays(d)| d),
            };
            let mission = missions.update(&id, &patch)?;
            print_json(&mission)?;
        }
        MissionAction::Delete { id } => {
            let removed = missions.delete(&id)?;
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
        MissionAction::Today => {
            let today = app.clock().today();
            let timers = app.timers();
            let entries = missions
                .today_scheduled()?
                .into_iter()
                .map(|m| -> questlog_core::Result<TodayEntry> {
                    Ok(TodayEntry {
                        done: m.is_completed_on(today),
                        timer_secs: timers.elapsed(&m.id)?,
                        id: m.id,
                        title: m.title,
                        scheduled_time: m.scheduled_time,
                        difficulty: m.difficulty,
                        exp_reward: m.exp_reward,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&entries)?;
        }
        MissionAction::Complete { id } => {
            let completion = app.progression().complete_mission(&id)?;
            print_json(&completion)?;
        }
        MissionAction::Note { id, note } => {
            let mission = missions.add_note(&id, &note)?;
            print_json(&mission.completion_notes)?;
        }
        MissionAction::TimerStart { id } => {
            let started = app.timers().start(&id)?;
            print_json(&serde_json::json!({ "mission_id": id, "started": started }))?;
        }
        MissionAction::TimerStop { id } => {
            let elapsed = app.timers().stop(&id)?;
            print_json(&serde_json::json!({ "mission_id": id, "elapsed_secs": elapsed }))?;
        }
        MissionAction::Timers => {
            print_json(&app.timers().running()?)?;
        }
    }
    Ok(())
}
