use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::{MessageId, ToolCallId};

/// Role of a participant in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The person asking the question
    User,
    /// The assistant's final answer for a turn
    Assistant,
    /// A server-side capability invoked mid-turn
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle of a tool call entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Calling,
    Complete,
}

/// Result reported by the server for a finished tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<String>,
}

/// Tool-specific part of a conversation message.
///
/// Status, result and latency only change through [`ToolInvocation::complete`],
/// so an entry moves from `Calling` to `Complete` exactly once.
///
/// ```compile_fail
/// use lexchat::chat::{ToolInvocation, ToolStatus};
///
/// fn reopen(call: &mut ToolInvocation) {
///     call.status = ToolStatus::Calling;
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: ToolCallId,
    pub name: String,
    pub parameters: Map<String, Value>,
    result: Option<ToolOutcome>,
    status: ToolStatus,
    latency_ms: Option<u64>,
}

impl ToolInvocation {
    /// A fresh invocation always starts in [`ToolStatus::Calling`].
    pub fn calling(call_id: ToolCallId, name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            call_id,
            name: name.into(),
            parameters,
            result: None,
            status: ToolStatus::Calling,
            latency_ms: None,
        }
    }

    pub fn status(&self) -> ToolStatus {
        self.status
    }

    pub fn is_calling(&self) -> bool {
        self.status == ToolStatus::Calling
    }

    /// Server outcome, present once the call is complete.
    pub fn result(&self) -> Option<&ToolOutcome> {
        self.result.as_ref()
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.latency_ms
    }

    /// Moves the call to `Complete`. Returns false if it already was.
    pub fn complete(&mut self, outcome: ToolOutcome, latency_ms: Option<u64>) -> bool {
        if !self.is_calling() {
            return false;
        }
        self.result = Some(outcome);
        self.latency_ms = latency_ms;
        self.status = ToolStatus::Complete;
        true
    }
}

/// What a message is, beyond its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageKind {
    User,
    Assistant,
    Tool(ToolInvocation),
}

/// A single entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: MessageId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub kind: MessageKind,
}

impl ConversationMessage {
    /// Create a new builder for a user message
    pub fn user() -> ConversationMessageBuilder {
        ConversationMessageBuilder::new(MessageKind::User)
    }

    /// Create a new builder for an assistant message
    pub fn assistant() -> ConversationMessageBuilder {
        ConversationMessageBuilder::new(MessageKind::Assistant)
    }

    /// Create a new builder for a tool message in `Calling` state
    pub fn tool(invocation: ToolInvocation) -> ConversationMessageBuilder {
        ConversationMessageBuilder::new(MessageKind::Tool(invocation))
    }

    pub fn role(&self) -> MessageRole {
        match self.kind {
            MessageKind::User => MessageRole::User,
            MessageKind::Assistant => MessageRole::Assistant,
            MessageKind::Tool(_) => MessageRole::Tool,
        }
    }

    pub fn is_tool(&self) -> bool {
        matches!(self.kind, MessageKind::Tool(_))
    }

    pub fn tool_invocation(&self) -> Option<&ToolInvocation> {
        match &self.kind {
            MessageKind::Tool(invocation) => Some(invocation),
            _ => None,
        }
    }

    pub(crate) fn tool_invocation_mut(&mut self) -> Option<&mut ToolInvocation> {
        match &mut self.kind {
            MessageKind::Tool(invocation) => Some(invocation),
            _ => None,
        }
    }
}

/// Builder for ConversationMessage
#[derive(Debug)]
pub struct ConversationMessageBuilder {
    kind: MessageKind,
    content: String,
    created_at: Option<DateTime<Utc>>,
}

impl ConversationMessageBuilder {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            content: String::new(),
            created_at: None,
        }
    }

    /// Set the message content
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Override the creation timestamp (defaults to now)
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Build the ConversationMessage with a fresh identifier
    pub fn build(self) -> ConversationMessage {
        ConversationMessage {
            id: MessageId::new(),
            content: self.content,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            kind: self.kind,
        }
    }
}
