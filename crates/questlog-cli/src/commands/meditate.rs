//! Meditation session commands.
//!
//! The session is persisted between invocations and advances with the wall
//! clock, so `start` in one run and `status` in the next shows real elapsed time.

use clap::Subcommand;
use questlog_core::{Questlog, Technique};

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum MeditateAction {
    /// Start a session
    Start {
        /// Length in minutes; 0 counts up without a target
        #[arg(long)]
        minutes: Option<u32>,
        /// breath, bodyscan, loving or silent
        #[arg(long)]
        technique: Option<Technique>,
    },
    /// Pause the running session
    Pause,
    /// Resume a paused session
    Resume,
    /// Advance the session manually
    Tick {
        /// Seconds to add
        #[arg(default_value = "1")]
        secs: u64,
    },
    /// Print the session state as JSON
    Status,
    /// Stop the session (short sessions are discarded, one past its target is already finished)
    Stop,
    /// Save a finished session
    Save {
        /// Focus rating 0-5
        #[arg(long, default_value = "0")]
        rating: u8,
        /// Free-text memo
        #[arg(long, default_value = "")]
        memo: String,
    },
    /// Discard the session
    Reset,
}

pub fn run(action: MeditateAction) -> CmdResult {
    let app = Questlog::open_default()?;
    let service = app.meditation();

    let session = match action {
        MeditateAction::Start { minutes, technique } => service.start(minutes, technique)?,
        MeditateAction::Pause => service.pause()?,
        MeditateAction::Resume => service.resume()?,
        MeditateAction::Tick { secs } => service.tick(secs)?,
        MeditateAction::Status => service.session()?,
        MeditateAction::Stop => service.stop()?,
        MeditateAction::Save { rating, memo } => {
            let outcome = service.save_active(rating, &memo)?;
            return print_json(&outcome);
        }
        MeditateAction::Reset => service.reset()?,
    };
    print_json(&session.snapshot())
}
