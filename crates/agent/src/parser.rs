use pagepilot_core::{ContextSnapshot, ParsedCommand};
use tracing::debug;

use crate::oracle::{OracleError, OracleSession};
use crate::prompt::parse_request;

/// Turns the current prompt into one structured command via the loop session.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandParser;

impl CommandParser {
    /// `Ok(None)` means the reply held no usable command. Oracle failures are returned
    /// as errors so the caller can tell them apart.
    pub async fn parse(
        &self,
        session: &dyn OracleSession,
        current_prompt: &str,
        context: &ContextSnapshot,
    ) -> Result<Option<ParsedCommand>, OracleError> {
        let reply = session.prompt(&parse_request(current_prompt, context)).await?;
        let command = parse_reply(&reply);
        debug!(
            event_name = "agent.parser.reply",
            session_id = session.id(),
            parsed = command.is_some(),
            action = command.as_ref().map(|command| command.action.as_str()).unwrap_or(""),
            "parsed oracle reply"
        );
        Ok(command)
    }
}

/// Decodes the first JSON object in free text (fenced or not) that is a usable command.
pub fn parse_reply(reply: &str) -> Option<ParsedCommand> {
    json_objects(reply).find_map(decode_command)
}

fn decode_command(candidate: &str) -> Option<ParsedCommand> {
    let mut command: ParsedCommand = serde_json::from_str(candidate).ok()?;

    let action = command.action.trim();
    if action.is_empty() {
        return None;
    }
    if !command.confidence.is_finite() || !(0.0..=1.0).contains(&command.confidence) {
        return None;
    }
    command.action = action.to_string();
    Some(command)
}

/// Every balanced `{...}` span, tried from each opening brace in order.
fn json_objects(text: &str) -> impl Iterator<Item = &str> + '_ {
    text.match_indices('{').filter_map(move |(start, _)| object_at(text, start))
}

fn object_at(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
