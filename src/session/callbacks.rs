use std::fmt;
use std::sync::Arc;

use crate::stream::{CompletedPayload, ConnectedPayload, IterationPayload};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Optional observers invoked by the stream pump.
///
/// Callbacks run after the state update they accompany has been published.
#[derive(Clone, Default)]
pub struct StreamCallbacks {
    on_connected: Option<Callback<ConnectedPayload>>,
    on_iteration: Option<Callback<IterationPayload>>,
    on_completed: Option<Callback<CompletedPayload>>,
    on_error: Option<Callback<str>>,
}

impl StreamCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connected(mut self, f: impl Fn(&ConnectedPayload) + Send + Sync + 'static) -> Self {
        self.on_connected = Some(Arc::new(f));
        self
    }

    pub fn on_iteration(mut self, f: impl Fn(&IterationPayload) + Send + Sync + 'static) -> Self {
        self.on_iteration = Some(Arc::new(f));
        self
    }

    pub fn on_completed(mut self, f: impl Fn(&CompletedPayload) + Send + Sync + 'static) -> Self {
        self.on_completed = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn connected(&self, payload: &ConnectedPayload) {
        if let Some(f) = &self.on_connected {
            f(payload);
        }
    }

    pub(crate) fn iteration(&self, payload: &IterationPayload) {
        if let Some(f) = &self.on_iteration {
            f(payload);
        }
    }

    pub(crate) fn completed(&self, payload: &CompletedPayload) {
        if let Some(f) = &self.on_completed {
            f(payload);
        }
    }

    pub(crate) fn error(&self, message: &str) {
        if let Some(f) = &self.on_error {
            f(message);
        }
    }
}

impl fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("on_connected", &self.on_connected.is_some())
            .field("on_iteration", &self.on_iteration.is_some())
            .field("on_completed", &self.on_completed.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
