//! Boundary to the remote orchestration API.

mod http;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::chat::ConversationId;
use crate::error::ChatStreamError;
use crate::stream::EventStream;

pub use http::HttpChatApi;

/// Body of the request that starts a chat turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartChatRequest {
    pub message: String,
    pub stream: bool,
    pub conversation_id: Option<ConversationId>,
}

impl StartChatRequest {
    pub fn streaming(message: impl Into<String>, conversation_id: Option<ConversationId>) -> Self {
        Self {
            message: message.into(),
            stream: true,
            conversation_id,
        }
    }
}

/// Successful answer to [`StartChatRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StartChatResponse {
    pub conversation_id: ConversationId,
    pub execution_id: String,
}

/// Operations the chat session needs from the server.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Starts a turn and returns the execution to stream.
    async fn start_chat(
        &self,
        request: &StartChatRequest,
        credential: &SecretString,
    ) -> Result<StartChatResponse, ChatStreamError>;

    /// Opens the event stream for an execution.
    async fn open_stream(
        &self,
        execution_id: &str,
        credential: &SecretString,
    ) -> Result<EventStream, ChatStreamError>;
}
