//! Dev-server event protocol parsing
//!
//! The dev server writes one JSON array of events per stdout line:
//! `[{"event": "app.started", "params": {"appId": "..."}}]`.
//! Anything else on stdout is plain log output.

use sandbox_core::ProtocolEvent;

/// Check that a line is wrapped in `[...]` before attempting a full parse
fn is_bracketed(line: &str) -> bool {
    line.starts_with('[') && line.ends_with(']')
}

/// Decode a stdout line into its protocol events.
///
/// Returns `None` for anything that is not a JSON array of
/// `{event: string, params: object}` objects.
pub fn parse_protocol_line(line: &str) -> Option<Vec<ProtocolEvent>> {
    let trimmed = line.trim();
    if !is_bracketed(trimmed) {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Predicate for [`ManagedProcess::wait_for_event`](crate::ManagedProcess::wait_for_event):
/// true when the line carries an event satisfying `matches`
pub fn line_has_event<F>(line: &str, matches: F) -> bool
where
    F: Fn(&ProtocolEvent) -> bool,
{
    parse_protocol_line(line).is_some_and(|events| events.iter().any(&matches))
}
