mod group;
mod id;
mod message;
mod state;
mod tracker;

pub use group::{flatten_groups, group_messages, MessageGroup};
pub use id::{ConversationId, MessageId, ToolCallId};
pub use message::{
    ConversationMessage, ConversationMessageBuilder, MessageKind, MessageRole, ToolInvocation,
    ToolOutcome, ToolStatus,
};
pub use state::{ChatAction, ChatState, CONNECTION_ERROR, NOT_AUTHENTICATED, TIMEOUT_ERROR};
pub use tracker::{complete_pending, find_pending};
