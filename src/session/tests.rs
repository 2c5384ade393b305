use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use secrecy::SecretString;
use serde_json::{json, Map};

use super::*;
use crate::api::StartChatResponse;
use crate::chat::{MessageRole, ToolOutcome, ToolStatus, TIMEOUT_ERROR};
use crate::error::ChatStreamError;
use crate::stream::{
    CompletedPayload, ConnectedPayload, EventStream, IterationPayload, StreamEvent,
    ToolCallPayload, ToolCallingPayload, ToolCompletePayload,
};

type EventSender = UnboundedSender<Result<StreamEvent, ChatStreamError>>;

#[derive(Clone, Default)]
struct FakeApi {
    opened: Arc<AtomicUsize>,
    started: Arc<Mutex<Vec<StartChatRequest>>>,
    senders: Arc<Mutex<Vec<EventSender>>>,
    fail_open: bool,
    fail_start: bool,
}

impl FakeApi {
    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn push(&self, event: StreamEvent) {
        let senders = self.senders.lock().unwrap();
        let _ = senders.last().unwrap().unbounded_send(Ok(event));
    }

    fn push_transport_error(&self) {
        let senders = self.senders.lock().unwrap();
        let _ = senders
            .last()
            .unwrap()
            .unbounded_send(Err(ChatStreamError::HttpError("reset by peer".into())));
    }

    fn hang_up(&self) {
        self.senders.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn start_chat(
        &self,
        request: &StartChatRequest,
        _credential: &SecretString,
    ) -> Result<StartChatResponse, ChatStreamError> {
        self.started.lock().unwrap().push(request.clone());
        if self.fail_start {
            return Err(ChatStreamError::StatusError {
                status: 500,
                body: "boom".into(),
            });
        }
        Ok(StartChatResponse {
            conversation_id: ConversationId::new(42),
            execution_id: "exec-1".into(),
        })
    }

    async fn open_stream(
        &self,
        _execution_id: &str,
        _credential: &SecretString,
    ) -> Result<EventStream, ChatStreamError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(ChatStreamError::HttpError("refused".into()));
        }
        let (tx, rx) = unbounded();
        self.senders.lock().unwrap().push(tx);
        Ok(Box::pin(rx))
    }
}

fn token() -> Option<SecretString> {
    Some(SecretString::new("t".to_string()))
}

fn new_session(api: FakeApi) -> ChatSession<FakeApi> {
    ChatSession::new(api, token)
}

fn recorder() -> (StreamCallbacks, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let on_error = Arc::clone(&seen);
    let on_connected = Arc::clone(&seen);
    let on_iteration = Arc::clone(&seen);
    let on_completed = Arc::clone(&seen);
    let callbacks = StreamCallbacks::new()
        .on_error(move |message| on_error.lock().unwrap().push(format!("error:{message}")))
        .on_connected(move |p| {
            on_connected
                .lock()
                .unwrap()
                .push(format!("connected:{}", p.execution_id))
        })
        .on_iteration(move |p| {
            on_iteration
                .lock()
                .unwrap()
                .push(format!("iteration:{}", p.iteration))
        })
        .on_completed(move |p| {
            on_completed
                .lock()
                .unwrap()
                .push(format!("completed:{}", p.message))
        });
    (callbacks, seen)
}

async fn until(session: &ChatSession<FakeApi>, predicate: impl FnMut(&ChatState) -> bool) {
    let mut rx = session.subscribe();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("state not reached in time")
        .expect("state channel closed");
}

fn tool_calling(name: &str) -> StreamEvent {
    let mut parameters = Map::new();
    parameters.insert("query".into(), json!("theft"));
    StreamEvent::ToolCalling(ToolCallingPayload {
        iteration: Some(1),
        tool_call: ToolCallPayload {
            name: name.into(),
            parameters,
        },
        timestamp: None,
    })
}

fn tool_complete(name: &str, latency_ms: u64) -> StreamEvent {
    StreamEvent::ToolComplete(ToolCompletePayload {
        iteration: Some(1),
        tool_call: ToolCallPayload {
            name: name.into(),
            parameters: Map::new(),
        },
        tool_result: ToolOutcome {
            success: true,
            data: json!({"cases": [1, 2]}),
            error: None,
        },
        latency_ms: Some(latency_ms),
        timestamp: None,
    })
}

fn completed(text: &str) -> StreamEvent {
    StreamEvent::Completed(CompletedPayload {
        iteration: Some(1),
        message: text.into(),
        tokens: None,
        timestamp: None,
    })
}

#[tokio::test]
async fn connect_without_credential_fails_before_network() {
    let api = FakeApi::default();
    let (callbacks, seen) = recorder();
    let mut session = ChatSession::new(api.clone(), || None::<SecretString>).with_callbacks(callbacks);

    let outcome = session.connect("exec-1", Some("hello")).await;

    assert_eq!(outcome, ConnectOutcome::Failed);
    assert_eq!(api.opened(), 0);
    let state = session.state();
    assert_eq!(state.error.as_deref(), Some(NOT_AUTHENTICATED));
    assert!(state.messages.is_empty());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![format!("error:{NOT_AUTHENTICATED}")]
    );
}

#[tokio::test]
async fn connect_appends_user_message_and_starts_streaming() {
    let api = FakeApi::default();
    let mut session = new_session(api.clone());

    let outcome = session.connect("exec-1", Some("Is intent required?")).await;

    assert_eq!(outcome, ConnectOutcome::Opened);
    assert!(session.is_connected());
    let state = session.state();
    assert!(state.is_streaming);
    assert_eq!(state.error, None);
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].role(), MessageRole::User);
    assert_eq!(state.messages[0].content, "Is intent required?");
}

#[tokio::test]
async fn second_connect_keeps_existing_connection() {
    let api = FakeApi::default();
    let mut session = new_session(api.clone());

    session.connect("exec-1", None).await;
    let outcome = session.connect("exec-2", Some("ignored")).await;

    assert_eq!(outcome, ConnectOutcome::AlreadyConnected);
    assert_eq!(api.opened(), 1);
    assert!(session.is_connected());
    assert!(session.state().messages.is_empty());

    api.push(completed("still here"));
    until(&session, |s| s.messages.len() == 1).await;
}

#[tokio::test]
async fn tool_lifecycle_and_answer_then_end() {
    let api = FakeApi::default();
    let (callbacks, seen) = recorder();
    let mut session = new_session(api.clone()).with_callbacks(callbacks);
    session.connect("exec-1", Some("theft?")).await;

    api.push(StreamEvent::Connected(ConnectedPayload {
        execution_id: "exec-1".into(),
        message: None,
    }));
    api.push(StreamEvent::Iteration(IterationPayload {
        iteration: 1,
        status: Some("processing".into()),
        timestamp: None,
    }));
    api.push(tool_calling("search_cases"));
    api.push(StreamEvent::Heartbeat);
    api.push(tool_complete("search_cases", 820));
    api.push(completed("Theft requires intent."));
    api.push(StreamEvent::End);
    session.wait().await;

    let state = session.state();
    assert!(!state.is_streaming);
    assert_eq!(state.error, None);
    assert!(!session.is_connected());

    let roles: Vec<_> = state.messages.iter().map(|m| m.role()).collect();
    assert_eq!(
        roles,
        vec![MessageRole::User, MessageRole::Tool, MessageRole::Assistant]
    );
    let call = state.messages[1].tool_invocation().unwrap();
    assert_eq!(call.status(), ToolStatus::Complete);
    assert!(call.result().unwrap().success);
    assert_eq!(call.latency_ms(), Some(820));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "connected:exec-1".to_string(),
            "iteration:1".to_string(),
            "completed:Theft requires intent.".to_string(),
        ]
    );
}

#[tokio::test]
async fn error_event_closes_with_message() {
    let api = FakeApi::default();
    let (callbacks, seen) = recorder();
    let mut session = new_session(api.clone()).with_callbacks(callbacks);
    session.connect("exec-1", None).await;

    api.push(StreamEvent::Error {
        message: "Rate limited".into(),
    });
    session.wait().await;

    let state = session.state();
    assert_eq!(state.error.as_deref(), Some("Rate limited"));
    assert!(!state.is_streaming);
    assert!(!session.is_connected());
    assert_eq!(*seen.lock().unwrap(), vec!["error:Rate limited".to_string()]);
}

#[tokio::test]
async fn timeout_event_reports_timeout() {
    let api = FakeApi::default();
    let (callbacks, seen) = recorder();
    let mut session = new_session(api.clone()).with_callbacks(callbacks);
    session.connect("exec-1", None).await;

    api.push(StreamEvent::Timeout);
    session.wait().await;

    assert_eq!(session.state().error.as_deref(), Some(TIMEOUT_ERROR));
    assert_eq!(*seen.lock().unwrap(), vec![format!("error:{TIMEOUT_ERROR}")]);
}

#[tokio::test]
async fn transport_error_reports_connection_error() {
    let api = FakeApi::default();
    let mut session = new_session(api.clone());
    session.connect("exec-1", None).await;

    api.push_transport_error();
    session.wait().await;

    let state = session.state();
    assert_eq!(state.error.as_deref(), Some(CONNECTION_ERROR));
    assert!(!state.is_streaming);
}

#[tokio::test]
async fn stream_closing_without_end_is_a_transport_error() {
    let api = FakeApi::default();
    let mut session = new_session(api.clone());
    session.connect("exec-1", None).await;

    api.hang_up();
    session.wait().await;

    assert_eq!(session.state().error.as_deref(), Some(CONNECTION_ERROR));
}

fn slow_error_callbacks() -> StreamCallbacks {
    StreamCallbacks::new().on_error(|_| std::thread::sleep(Duration::from_millis(200)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_state_is_published_after_the_connection_closes() {
    let api = FakeApi::default();
    let mut session = new_session(api.clone()).with_callbacks(slow_error_callbacks());
    session.connect("exec-1", None).await;

    api.push(StreamEvent::Error {
        message: "Rate limited".into(),
    });
    until(&session, |s| s.error.is_some() && !s.is_streaming).await;

    assert!(!session.is_connected());
    let outcome = session.connect("exec-2", None).await;
    assert_eq!(outcome, ConnectOutcome::Opened);
    assert_eq!(api.opened(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transport_failure_is_published_after_the_connection_closes() {
    let api = FakeApi::default();
    let mut session = new_session(api.clone()).with_callbacks(slow_error_callbacks());
    session.connect("exec-1", None).await;

    api.push_transport_error();
    until(&session, |s| s.error.as_deref() == Some(CONNECTION_ERROR)).await;

    assert!(!session.is_connected());
    assert_eq!(session.connect("exec-2", None).await, ConnectOutcome::Opened);
}

#[tokio::test]
async fn failed_open_reports_connection_error() {
    let api = FakeApi {
        fail_open: true,
        ..FakeApi::default()
    };
    let (callbacks, seen) = recorder();
    let mut session = new_session(api).with_callbacks(callbacks);

    let outcome = session.connect("exec-1", Some("hi")).await;

    assert_eq!(outcome, ConnectOutcome::Failed);
    assert!(!session.is_connected());
    let state = session.state();
    assert_eq!(state.error.as_deref(), Some(CONNECTION_ERROR));
    assert_eq!(state.messages.len(), 1);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn disconnect_twice_is_harmless_and_stops_events() {
    let api = FakeApi::default();
    let mut session = new_session(api.clone());
    session.connect("exec-1", None).await;

    session.disconnect();
    assert!(!session.state().is_streaming);
    session.disconnect();
    assert!(!session.state().is_streaming);
    assert!(!session.is_connected());

    api.push(completed("too late"));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let state = session.state();
    assert!(state.messages.is_empty());
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn disconnect_without_connection_is_noop() {
    let mut session = new_session(FakeApi::default());
    let before = session.state();

    session.disconnect();

    assert_eq!(session.state(), before);
}

#[tokio::test]
async fn reconnect_after_end_opens_new_stream() {
    let api = FakeApi::default();
    let mut session = new_session(api.clone());
    session.connect("exec-1", None).await;
    api.push(StreamEvent::End);
    until(&session, |s| !s.is_streaming).await;
    session.wait().await;

    let outcome = session.connect("exec-2", Some("follow-up")).await;

    assert_eq!(outcome, ConnectOutcome::Opened);
    assert_eq!(api.opened(), 2);
}

#[tokio::test]
async fn send_starts_turn_and_remembers_conversation() {
    let api = FakeApi::default();
    let mut session = new_session(api.clone());

    let outcome = session.send("What is theft?").await;

    assert_eq!(outcome, ConnectOutcome::Opened);
    let state = session.state();
    assert_eq!(state.conversation_id, Some(ConversationId::new(42)));
    assert_eq!(state.messages[0].content, "What is theft?");

    api.push(StreamEvent::End);
    session.wait().await;
    session.send("And robbery?").await;

    let started = api.started.lock().unwrap();
    assert_eq!(started.len(), 2);
    assert_eq!(started[0].conversation_id, None);
    assert!(started[0].stream);
    assert_eq!(started[1].conversation_id, Some(ConversationId::new(42)));
}

#[tokio::test]
async fn send_while_streaming_is_ignored() {
    let api = FakeApi::default();
    let mut session = new_session(api.clone());
    session.send("first").await;

    let outcome = session.send("second").await;

    assert_eq!(outcome, ConnectOutcome::AlreadyConnected);
    assert_eq!(api.started.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_start_surfaces_error() {
    let api = FakeApi {
        fail_start: true,
        ..FakeApi::default()
    };
    let (callbacks, seen) = recorder();
    let mut session = new_session(api.clone()).with_callbacks(callbacks);

    let outcome = session.send("hi").await;

    assert_eq!(outcome, ConnectOutcome::Failed);
    assert_eq!(api.opened(), 0);
    let error = session.state().error.unwrap();
    assert!(error.starts_with("Failed to send message"));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn clear_resets_state_and_connection() {
    let api = FakeApi::default();
    let mut session = new_session(api.clone());
    session.send("hi").await;

    session.clear();

    assert!(!session.is_connected());
    assert_eq!(session.state(), ChatState::default());
}

#[tokio::test]
async fn subscribers_see_updates() {
    let api = FakeApi::default();
    let mut session = new_session(api.clone());
    let mut rx = session.subscribe();
    session.connect("exec-1", None).await;

    api.push(completed("answer"));
    let state = tokio::time::timeout(
        Duration::from_secs(2),
        rx.wait_for(|s| !s.messages.is_empty()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();

    assert_eq!(state.messages[0].content, "answer");
}
