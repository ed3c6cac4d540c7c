use clap::Subcommand;
use questlog_core::Questlog;

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's completion progress
    Today,
    /// The next mission to do today
    Next,
    /// Completion heatmap for this week (Monday first)
    Week,
    /// Completion percentage for the last 30 days
    Month,
    /// Meditation totals and average focus
    Meditation,
}

pub fn run(action: StatsAction) -> CmdResult {
    let app = Questlog::open_default()?;
    let dashboard = app.dashboard();

    match action {
        StatsAction::Today => print_json(&dashboard.today_progress()?)?,
        StatsAction::Next => print_json(&dashboard.next_mission()?)?,
        StatsAction::Week => print_json(&dashboard.weekly_heatmap()?)?,
        StatsAction::Month => print_json(&dashboard.monthly_trend()?)?,
        StatsAction::Meditation => print_json(&dashboard.meditation_summary()?)?,
    }
    Ok(())
}
