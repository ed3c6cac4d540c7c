//! Profile commands.

use clap::Subcommand;
use questlog_core::Questlog;

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Level, title, EXP and streaks
    Show,
    /// Mark the first-run introduction as seen
    Onboard,
}

pub fn run(action: ProfileAction) -> CmdResult {
    let app = Questlog::open_default()?;

    match action {
        ProfileAction::Show => {
            let summary = app.progression().profile_summary()?;
            print_json(&summary)?;
        }
        ProfileAction::Onboard => {
            let changed = app.progression().mark_onboarded()?;
            print_json(&serde_json::json!({ "onboarded": true, "changed": changed }))?;
        }
    }
    Ok(())
}
