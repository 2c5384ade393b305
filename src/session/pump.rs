use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatAction, ChatState, CONNECTION_ERROR, TIMEOUT_ERROR};
use crate::stream::{EventStream, StreamEvent};

use super::callbacks::StreamCallbacks;

/// Drives one open stream until it ends, fails or is cancelled.
pub(super) async fn run_pump(
    mut events: EventStream,
    state: Arc<watch::Sender<ChatState>>,
    callbacks: StreamCallbacks,
    cancel: CancellationToken,
) {
    let start_time = Instant::now();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = events.next() => next,
        };
        match next {
            Some(Ok(event)) => {
                if !handle_event(event, &state, &callbacks, &cancel) {
                    break;
                }
            }
            Some(Err(err)) => {
                log::warn!("chat stream transport error: {err}");
                fail_transport(&state, &callbacks, &cancel);
                break;
            }
            None => {
                log::warn!("chat stream closed without an end event");
                fail_transport(&state, &callbacks, &cancel);
                break;
            }
        }
    }

    log::debug!("chat stream finished in {:?}", start_time.elapsed());
}

/// Applies one event. Returns false once the connection is closed.
fn handle_event(
    event: StreamEvent,
    state: &watch::Sender<ChatState>,
    callbacks: &StreamCallbacks,
    cancel: &CancellationToken,
) -> bool {
    log::trace!("chat stream event `{}`", event.name());
    let terminal = event.is_terminal();
    let informational = matches!(
        event,
        StreamEvent::Connected(_) | StreamEvent::Iteration(_) | StreamEvent::Heartbeat
    );

    if !apply(state, cancel, ChatAction::Event(event.clone()), !informational, terminal) {
        return false;
    }

    match &event {
        StreamEvent::Connected(payload) => callbacks.connected(payload),
        StreamEvent::Iteration(payload) => callbacks.iteration(payload),
        StreamEvent::Completed(payload) => callbacks.completed(payload),
        StreamEvent::Error { message } => callbacks.error(message),
        StreamEvent::Timeout => callbacks.error(TIMEOUT_ERROR),
        _ => {}
    }

    !terminal
}

fn fail_transport(
    state: &watch::Sender<ChatState>,
    callbacks: &StreamCallbacks,
    cancel: &CancellationToken,
) {
    let action = ChatAction::TransportError(CONNECTION_ERROR.to_string());
    if apply(state, cancel, action, true, true) {
        callbacks.error(CONNECTION_ERROR);
    }
}

/// Reduces `action` unless the connection was cancelled. The cancellation
/// check and the update share the channel's write lock with `disconnect`.
///
/// With `close`, the token is cancelled before the lock is released, so a
/// subscriber woken by the closing state already sees the session as
/// disconnected.
fn apply(
    state: &watch::Sender<ChatState>,
    cancel: &CancellationToken,
    action: ChatAction,
    notify: bool,
    close: bool,
) -> bool {
    let mut applied = false;
    state.send_if_modified(|current| {
        if cancel.is_cancelled() {
            return false;
        }
        *current = std::mem::take(current).reduce(action);
        if close {
            cancel.cancel();
        }
        applied = true;
        notify
    });
    applied
}
