use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};

use crate::config::ApiConfig;
use crate::error::ChatStreamError;
use crate::stream::{create_sse_stream, decode_or_skip, EventStream};

use super::{ChatApi, StartChatRequest, StartChatResponse};

/// reqwest-backed client for the chat endpoints.
///
/// The client uses `Arc` internally for configuration, making cloning cheap.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    config: Arc<ApiConfig>,
    client: Client,
}

impl HttpChatApi {
    pub fn new(config: ApiConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Creates the API client around an existing HTTP client.
    pub fn with_client(client: Client, config: ApiConfig) -> Self {
        Self {
            config: Arc::new(config),
            client,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn start_chat(
        &self,
        request: &StartChatRequest,
        credential: &SecretString,
    ) -> Result<StartChatResponse, ChatStreamError> {
        if log::log_enabled!(log::Level::Trace) {
            if let Ok(json) = serde_json::to_string(request) {
                log::trace!("start chat payload: {json}");
            }
        }

        let mut builder = self
            .client
            .post(self.config.endpoint("chat"))
            .bearer_auth(credential.expose_secret())
            .json(request);

        if let Some(timeout) = self.config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let resp = builder.send().await?;
        log::debug!("start chat HTTP status: {}", resp.status());
        let resp = check_status(resp).await?;

        let raw = resp.text().await?;
        serde_json::from_str(&raw).map_err(|err| ChatStreamError::ResponseFormatError {
            message: format!("invalid start chat response: {err}"),
            raw_response: raw,
        })
    }

    async fn open_stream(
        &self,
        execution_id: &str,
        credential: &SecretString,
    ) -> Result<EventStream, ChatStreamError> {
        if execution_id.trim().is_empty() {
            return Err(ChatStreamError::InvalidRequest(
                "execution id is empty".to_string(),
            ));
        }

        let url = self.config.endpoint(&format!("chat/stream/{execution_id}"));
        let resp = self
            .client
            .get(url)
            .query(&[("token", credential.expose_secret().as_str())])
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        log::debug!("chat stream HTTP status: {}", resp.status());
        let resp = check_status(resp).await?;

        Ok(create_sse_stream(resp, decode_or_skip))
    }
}

async fn check_status(resp: Response) -> Result<Response, ChatStreamError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(ChatStreamError::AuthError(format!("{status}: {body}")));
    }
    Err(ChatStreamError::StatusError {
        status: status.as_u16(),
        body,
    })
}
