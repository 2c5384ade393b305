use std::fmt::Write;

use lexchat::chat::{
    group_messages, ChatState, ConversationMessage, MessageGroup, MessageKind, ToolInvocation,
    ToolStatus,
};

/// Renders the conversation as plain text, one block per display group.
pub fn render_state(state: &ChatState) -> String {
    let mut out = String::new();
    for group in group_messages(&state.messages) {
        match group {
            MessageGroup::Single(message) => render_single(&mut out, message),
            MessageGroup::ToolChain(chain) => render_chain(&mut out, &chain),
        }
    }
    if let Some(error) = &state.error {
        let _ = writeln!(out, "error: {error}");
    }
    out
}

fn render_single(out: &mut String, message: &ConversationMessage) {
    match &message.kind {
        MessageKind::User => {
            let _ = writeln!(out, "> {}\n", message.content);
        }
        MessageKind::Assistant => {
            let _ = writeln!(out, "{}\n", message.content);
        }
        MessageKind::Tool(_) => render_chain(out, &[message]),
    }
}

fn render_chain(out: &mut String, chain: &[&ConversationMessage]) {
    let steps: Vec<String> = chain
        .iter()
        .filter_map(|message| message.tool_invocation())
        .map(describe_call)
        .collect();
    let _ = writeln!(out, "[tools] {}\n", steps.join(" -> "));
}

fn describe_call(call: &ToolInvocation) -> String {
    match (call.status(), call.result()) {
        (ToolStatus::Calling, _) => format!("{} (running)", call.name),
        (ToolStatus::Complete, Some(result)) if !result.success => {
            let reason = result.error.as_deref().unwrap_or("failed");
            format!("{} (failed: {reason})", call.name)
        }
        (ToolStatus::Complete, _) => match call.latency_ms() {
            Some(ms) => format!("{} (done, {ms} ms)", call.name),
            None => format!("{} (done)", call.name),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexchat::chat::{ChatAction, ToolOutcome};
    use lexchat::stream::{
        CompletedPayload, StreamEvent, ToolCallPayload, ToolCallingPayload, ToolCompletePayload,
    };
    use serde_json::{json, Map};

    fn calling(name: &str) -> ChatAction {
        ChatAction::Event(StreamEvent::ToolCalling(ToolCallingPayload {
            iteration: None,
            tool_call: ToolCallPayload {
                name: name.into(),
                parameters: Map::new(),
            },
            timestamp: None,
        }))
    }

    fn complete(name: &str, success: bool, latency_ms: u64) -> ChatAction {
        ChatAction::Event(StreamEvent::ToolComplete(ToolCompletePayload {
            iteration: None,
            tool_call: ToolCallPayload {
                name: name.into(),
                parameters: Map::new(),
            },
            tool_result: ToolOutcome {
                success,
                data: json!(null),
                error: (!success).then(|| "no access".to_string()),
            },
            latency_ms: Some(latency_ms),
            timestamp: None,
        }))
    }

    #[test]
    fn renders_turn_with_collapsed_tools() {
        let state = [
            ChatAction::UserMessage("Is intent required?".into()),
            calling("search_cases"),
            calling("get_statute"),
            complete("search_cases", true, 820),
            complete("get_statute", false, 12),
            ChatAction::Event(StreamEvent::Completed(CompletedPayload {
                iteration: None,
                message: "Yes.".into(),
                tokens: None,
                timestamp: None,
            })),
        ]
        .into_iter()
        .fold(ChatState::new(), ChatState::reduce);

        let text = render_state(&state);

        assert_eq!(
            text,
            "> Is intent required?\n\n\
             [tools] search_cases (done, 820 ms) -> get_statute (failed: no access)\n\n\
             Yes.\n\n"
        );
    }

    #[test]
    fn renders_pending_call_and_error() {
        let state = [
            calling("search_cases"),
            ChatAction::Event(StreamEvent::Error {
                message: "Rate limited".into(),
            }),
        ]
        .into_iter()
        .fold(ChatState::new(), ChatState::reduce);

        assert_eq!(
            render_state(&state),
            "[tools] search_cases (running)\n\nerror: Rate limited\n"
        );
    }
}
