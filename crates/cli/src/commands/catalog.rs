use pagepilot_core::ActionCatalog;

use crate::commands::CommandResult;

pub fn run(json: bool) -> CommandResult {
    let catalog = ActionCatalog::builtin();
    if !json {
        return CommandResult { exit_code: 0, output: catalog.render_detailed() };
    }

    match serde_json::to_string_pretty(catalog.definitions()) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("catalog", "serialization", error.to_string(), 1),
    }
}
