use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use voicequote_agent::runtime::{IntakeRuntime, SessionSummary};
use voicequote_agent::tools::ToolOutcome;

use crate::commands::CommandResult;

const COMMAND: &str = "replay";

#[derive(Debug, Serialize)]
struct ReplayReport {
    command: &'static str,
    status: &'static str,
    lines_read: usize,
    events_skipped: usize,
    outcomes: Vec<ToolOutcome>,
    session: SessionSummary,
}

/// Feeds a recorded session through a fresh reducer, one server event per
/// line. Blank lines and non-tool events are skipped.
pub fn run(path: &Path) -> CommandResult {
    let contents = match read_events(path) {
        Ok(contents) => contents,
        Err(error) => return CommandResult::failure(COMMAND, "io", format!("{error:#}"), 3),
    };

    let report = replay(&contents);
    CommandResult::report(COMMAND, 0, &report)
}

fn read_events(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("could not read `{}`", path.display()))
}

fn replay(contents: &str) -> ReplayReport {
    let mut runtime = IntakeRuntime::new();
    let mut lines_read = 0;
    let mut outcomes = Vec::new();

    for line in contents.lines().map(str::trim).filter(|line| !line.is_empty()) {
        lines_read += 1;
        if let Some(outcome) = runtime.handle_server_event(line) {
            outcomes.push(outcome);
        }
    }

    let session = runtime.into_summary();
    ReplayReport {
        command: COMMAND,
        status: if session.snapshot.is_finalized() { "finalized" } else { "collecting" },
        lines_read,
        events_skipped: lines_read - outcomes.len(),
        outcomes,
        session,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::replay;

    #[test]
    fn replay_skips_non_tool_events_and_keeps_order() {
        let contents = [
            json!({ "type": "session.created" }).to_string(),
            String::new(),
            json!({
                "type": "response.function_call_arguments.done",
                "call_id": "call_1",
                "name": "payload_upsert",
                "arguments": "{\"path\":\"vehicleDetails.make\",\"value\":\"Mazda\"}"
            })
            .to_string(),
            "{ not json".to_string(),
            json!({
                "type": "response.function_call_arguments.done",
                "call_id": "call_2",
                "name": "payload_upsert",
                "arguments": "{\"path\":\"vehicleDetails.year\",\"value\":\"soon\"}"
            })
            .to_string(),
        ]
        .join("\n");

        let report = replay(&contents);

        assert_eq!(report.lines_read, 4);
        assert_eq!(report.events_skipped, 2);
        let ids: Vec<&str> = report.outcomes.iter().map(|outcome| outcome.call_id.as_str()).collect();
        assert_eq!(ids, vec!["call_1", "call_2"]);
        assert!(report.outcomes[0].accepted());
        assert!(!report.outcomes[1].accepted());
        assert_eq!(report.status, "collecting");
        assert_eq!(report.session.snapshot.version, 1);
    }
}
