use thiserror::Error;

/// Error types that can occur when talking to the chat API.
#[derive(Debug, Error)]
pub enum ChatStreamError {
    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    HttpError(String),
    /// The API answered with a non-success status
    #[error("HTTP status {status}: {body}")]
    StatusError { status: u16, body: String },
    /// Missing or rejected credential
    #[error("Auth error: {0}")]
    AuthError(String),
    /// Invalid request parameters or format
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// API response parsing or format error
    #[error("Response format error: {message}. Raw response: {raw_response}")]
    ResponseFormatError {
        message: String,
        raw_response: String,
    },
    /// JSON serialization/deserialization errors
    #[error("JSON parse error: {0}")]
    JsonError(String),
}

/// Converts reqwest HTTP errors into ChatStreamErrors
impl From<reqwest::Error> for ChatStreamError {
    fn from(err: reqwest::Error) -> Self {
        ChatStreamError::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for ChatStreamError {
    fn from(err: serde_json::Error) -> Self {
        ChatStreamError::JsonError(format!(
            "{} at line {} column {}",
            err,
            err.line(),
            err.column()
        ))
    }
}
