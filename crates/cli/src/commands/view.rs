use std::fs;
use std::path::Path;

use shopmate_agent::derive_view;
use shopmate_core::TurnEntry;

use crate::commands::CommandResult;

/// Reads a stored turn log and prints its display view as JSON.
pub fn run(path: &Path) -> CommandResult {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "view",
                "io",
                format!("could not read `{}`: {error}", path.display()),
                2,
            );
        }
    };

    let entries: Vec<TurnEntry> = match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(error) => {
            return CommandResult::failure(
                "view",
                "parse",
                format!("`{}` is not a turn log: {error}", path.display()),
                2,
            );
        }
    };

    if let Some(error) = entries.iter().find_map(|entry| entry.validate().err()) {
        return CommandResult::failure("view", "invalid_entry", error.to_string(), 2);
    }

    let view = derive_view(&entries);
    match serde_json::to_string_pretty(&view) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("view", "serialization", error.to_string(), 1),
    }
}
