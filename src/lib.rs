//! Client for the legal-research chat stream.
//!
//! A turn starts with [`api::ChatApi::start_chat`], which returns an
//! execution id. [`session::ChatSession`] then opens the server-sent event
//! stream for that execution and reduces every event into a
//! [`chat::ChatState`]: an ordered log of user, assistant and tool
//! messages. [`chat::group_messages`] projects that log into display groups.
//!
//! ```no_run
//! use lexchat::{
//!     api::HttpChatApi, chat::group_messages, config::ApiConfig,
//!     credentials::StaticCredential, session::ChatSession,
//! };
//!
//! # async fn run() {
//! let api = HttpChatApi::new(ApiConfig::from_env());
//! let mut session = ChatSession::new(api, StaticCredential::new("token"));
//! session.send("Is intent required for theft?").await;
//! session.wait().await;
//!
//! let state = session.state();
//! for group in group_messages(&state.messages) {
//!     println!("{group:?}");
//! }
//! # }
//! ```

pub mod api;
pub mod chat;
pub mod config;
pub mod credentials;
pub mod error;
pub mod session;
pub mod stream;

pub use chat::{ChatState, ConversationMessage, MessageGroup};
pub use error::ChatStreamError;
pub use session::{ChatSession, ConnectOutcome, StreamCallbacks};
