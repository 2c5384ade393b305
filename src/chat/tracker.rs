//! Correlates `tool_complete` events with the `tool_calling` entry they finish.
//!
//! The transport gives the two events no shared identifier other than the
//! tool name. The newest entry with that name that is still calling wins,
//! so a tool invoked twice in one turn completes last-in-first-matched.

use serde_json::Value;

use super::message::{ConversationMessage, ToolOutcome};

/// Finds the index of the newest `Calling` entry for `name`.
pub fn find_pending(messages: &[ConversationMessage], name: &str) -> Option<usize> {
    messages.iter().rposition(|message| {
        message
            .tool_invocation()
            .is_some_and(|call| call.name == name && call.is_calling())
    })
}

/// Completes the matching pending call in place.
///
/// Returns false when no entry matched; the completion is then dropped and
/// nothing new is appended.
pub fn complete_pending(
    messages: &mut [ConversationMessage],
    name: &str,
    outcome: ToolOutcome,
    latency_ms: Option<u64>,
) -> bool {
    let Some(index) = find_pending(messages, name) else {
        log::debug!("dropping completion for `{name}` with no pending call");
        return false;
    };
    let message = &mut messages[index];
    message.content = completion_text(name, &outcome);
    message
        .tool_invocation_mut()
        .is_some_and(|call| call.complete(outcome, latency_ms))
}

pub(crate) fn calling_text(name: &str) -> String {
    format!("Calling {name}")
}

fn completion_text(name: &str, outcome: &ToolOutcome) -> String {
    if outcome.success {
        return format!("{name} completed");
    }
    match outcome.error.as_deref() {
        Some(error) => format!("{name} failed: {error}"),
        None if outcome.data != Value::Null => format!("{name} failed: {}", outcome.data),
        None => format!("{name} failed"),
    }
}
