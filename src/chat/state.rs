use serde::{Deserialize, Serialize};

use crate::stream::StreamEvent;

use super::id::{ConversationId, ToolCallId};
use super::message::{ConversationMessage, ToolInvocation};
use super::tracker;

/// Error shown when no credential is available.
pub const NOT_AUTHENTICATED: &str = "Not authenticated";
/// Error shown when the transport fails or closes unexpectedly.
pub const CONNECTION_ERROR: &str = "Connection error. Please try again.";
/// Error shown when the server reports a timeout.
pub const TIMEOUT_ERROR: &str = "The request timed out. Please try again.";

/// Everything that can change a [`ChatState`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChatAction {
    /// The user's own text, appended before a stream opens.
    UserMessage(String),
    /// The stream connection opened.
    Opened,
    /// A decoded event from the stream.
    Event(StreamEvent),
    /// The transport failed or closed without an `end` event.
    TransportError(String),
    /// A request failed before any stream was opened.
    Failed(String),
    /// The caller disconnected.
    Closed,
    SetConversationId(ConversationId),
    Reset,
}

/// In-memory projection of one conversation for a single chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatState {
    pub messages: Vec<ConversationMessage>,
    pub is_streaming: bool,
    pub conversation_id: Option<ConversationId>,
    pub error: Option<String>,
    next_call_id: ToolCallId,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            is_streaming: false,
            conversation_id: None,
            error: None,
            next_call_id: ToolCallId::first(),
        }
    }
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one action and returns the resulting state.
    ///
    /// Messages are only ever appended, except for the in-place completion
    /// of a pending tool call.
    pub fn reduce(mut self, action: ChatAction) -> Self {
        match action {
            ChatAction::UserMessage(text) => {
                self.messages
                    .push(ConversationMessage::user().content(text).build());
            }
            ChatAction::Opened => {
                self.is_streaming = true;
                self.error = None;
            }
            ChatAction::Event(event) => self.apply_event(event),
            ChatAction::TransportError(message) | ChatAction::Failed(message) => {
                self.fail(message);
            }
            ChatAction::Closed => self.is_streaming = false,
            ChatAction::SetConversationId(id) => self.conversation_id = Some(id),
            ChatAction::Reset => return Self::default(),
        }
        self
    }

    fn apply_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Connected(_) | StreamEvent::Iteration(_) | StreamEvent::Heartbeat => {}
            StreamEvent::ToolCalling(payload) => {
                let call_id = self.allocate_call_id();
                let name = payload.tool_call.name;
                let content = tracker::calling_text(&name);
                let invocation = ToolInvocation::calling(call_id, name, payload.tool_call.parameters);
                self.messages
                    .push(ConversationMessage::tool(invocation).content(content).build());
            }
            StreamEvent::ToolComplete(payload) => {
                tracker::complete_pending(
                    &mut self.messages,
                    &payload.tool_call.name,
                    payload.tool_result,
                    payload.latency_ms,
                );
            }
            StreamEvent::Completed(payload) => {
                self.messages
                    .push(ConversationMessage::assistant().content(payload.message).build());
            }
            StreamEvent::Error { message } => self.fail(message),
            StreamEvent::End => self.is_streaming = false,
            StreamEvent::Timeout => self.fail(TIMEOUT_ERROR.to_string()),
        }
    }

    fn fail(&mut self, message: String) {
        self.error = Some(message);
        self.is_streaming = false;
    }

    fn allocate_call_id(&mut self) -> ToolCallId {
        let id = self.next_call_id;
        self.next_call_id = id.next();
        id
    }

    /// Tool calls that have not completed yet.
    pub fn pending_tool_calls(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.messages
            .iter()
            .filter_map(ConversationMessage::tool_invocation)
            .filter(|call| call.is_calling())
    }
}
