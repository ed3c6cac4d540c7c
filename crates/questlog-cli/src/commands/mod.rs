pub mod config;
pub mod meditate;
pub mod mission;
pub mod profile;
pub mod stats;

use serde::Serialize;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
