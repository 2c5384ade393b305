//! The chat session: owns one conversation state and at most one live
//! event-stream connection.

mod callbacks;
mod pump;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatApi, StartChatRequest};
use crate::chat::{ChatAction, ChatState, ConversationId, CONNECTION_ERROR, NOT_AUTHENTICATED};
use crate::credentials::CredentialProvider;

pub use callbacks::StreamCallbacks;

use pump::run_pump;

/// Result of [`ChatSession::connect`] and [`ChatSession::send`].
///
/// Failures are reported through [`ChatState::error`] and the error
/// callback; the outcome only tells the caller which path was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new stream is open and being pumped.
    Opened,
    /// A stream was already open; nothing changed.
    AlreadyConnected,
    /// The turn failed before a stream could be opened.
    Failed,
}

struct Connection {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Connection {
    fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

/// Chat state plus its stream connection, for a single chat view.
pub struct ChatSession<A> {
    api: A,
    credentials: Arc<dyn CredentialProvider>,
    callbacks: StreamCallbacks,
    state: Arc<watch::Sender<ChatState>>,
    connection: Option<Connection>,
}

impl<A: ChatApi> ChatSession<A> {
    pub fn new(api: A, credentials: impl CredentialProvider + 'static) -> Self {
        let (state, _) = watch::channel(ChatState::new());
        Self {
            api,
            credentials: Arc::new(credentials),
            callbacks: StreamCallbacks::default(),
            state: Arc::new(state),
            connection: None,
        }
    }

    pub fn with_callbacks(mut self, callbacks: StreamCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every published state.
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_open)
    }

    /// Starts a turn: requests an execution for `text`, then streams it.
    pub async fn send(&mut self, text: &str) -> ConnectOutcome {
        if self.is_connected() {
            log::warn!("ignoring message while a chat stream is open");
            return ConnectOutcome::AlreadyConnected;
        }
        let Some(credential) = self.credentials.credential() else {
            self.fail(NOT_AUTHENTICATED);
            return ConnectOutcome::Failed;
        };

        let conversation_id = self.state.borrow().conversation_id;
        let request = StartChatRequest::streaming(text, conversation_id);
        match self.api.start_chat(&request, &credential).await {
            Ok(response) => {
                log::debug!(
                    "conversation {} started execution {}",
                    response.conversation_id,
                    response.execution_id
                );
                self.set_conversation_id(response.conversation_id);
                self.connect(&response.execution_id, Some(text)).await
            }
            Err(err) => {
                log::warn!("failed to start chat: {err}");
                self.fail(&format!("Failed to send message: {err}"));
                ConnectOutcome::Failed
            }
        }
    }

    /// Opens the event stream for `execution_id`.
    ///
    /// A no-op with a warning while another stream is open. With
    /// `initial_text`, the user message is appended before the stream opens.
    pub async fn connect(&mut self, execution_id: &str, initial_text: Option<&str>) -> ConnectOutcome {
        if self.is_connected() {
            log::warn!("chat stream already open, ignoring connect for {execution_id}");
            return ConnectOutcome::AlreadyConnected;
        }
        self.connection = None;

        let Some(credential) = self.credentials.credential() else {
            self.fail(NOT_AUTHENTICATED);
            return ConnectOutcome::Failed;
        };

        if let Some(text) = initial_text {
            self.dispatch(ChatAction::UserMessage(text.to_string()));
        }

        let events = match self.api.open_stream(execution_id, &credential).await {
            Ok(events) => events,
            Err(err) => {
                log::warn!("failed to open chat stream {execution_id}: {err}");
                self.dispatch(ChatAction::TransportError(CONNECTION_ERROR.to_string()));
                self.callbacks.error(CONNECTION_ERROR);
                return ConnectOutcome::Failed;
            }
        };

        self.dispatch(ChatAction::Opened);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_pump(
            events,
            Arc::clone(&self.state),
            self.callbacks.clone(),
            cancel.clone(),
        ));
        self.connection = Some(Connection { cancel, task });
        ConnectOutcome::Opened
    }

    /// Closes the open stream, if any. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if !connection.is_open() {
            return;
        }
        connection.cancel.cancel();
        self.dispatch(ChatAction::Closed);
        log::debug!("chat stream disconnected");
    }

    pub fn set_conversation_id(&mut self, id: ConversationId) {
        self.dispatch(ChatAction::SetConversationId(id));
    }

    /// Drops the connection and empties the conversation.
    pub fn clear(&mut self) {
        self.disconnect();
        self.dispatch(ChatAction::Reset);
    }

    /// Waits until the current stream's pump has stopped.
    ///
    /// Cancel-safe: dropping the future leaves the connection in place.
    pub async fn wait(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        if let Err(err) = (&mut connection.task).await {
            log::warn!("chat stream task failed: {err}");
        }
        self.connection = None;
    }

    fn fail(&self, message: &str) {
        self.dispatch(ChatAction::Failed(message.to_string()));
        self.callbacks.error(message);
    }

    fn dispatch(&self, action: ChatAction) {
        self.state
            .send_modify(|current| *current = std::mem::take(current).reduce(action));
    }
}

impl<A> Drop for ChatSession<A> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests;
