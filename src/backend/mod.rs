//! Chat backends behind a single `ask(text) -> text` contract.

pub mod bard;
pub mod chatgpt;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

pub use bard::BardClient;
pub use chatgpt::ChatGptClient;

/// Per-request timeout for backend HTTP calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Messages (user and assistant) kept as conversation memory per client.
pub const MAX_HISTORY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Bard,
    ChatGpt,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Bard => write!(f, "Bard"),
            Backend::ChatGpt => write!(f, "ChatGPT"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bard" => Ok(Backend::Bard),
            "chatgpt" => Ok(Backend::ChatGpt),
            other => Err(format!("unknown chatbot '{other}' (expected bard or chatgpt)")),
        }
    }
}

#[derive(Debug)]
pub enum BackendError {
    Http(String),
    Api(String),
    Parse(String),
    Empty,
    /// Client can't be used as configured, e.g. no API key.
    Config(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Http(e) => write!(f, "HTTP error: {e}"),
            BackendError::Api(e) => write!(f, "API error: {e}"),
            BackendError::Parse(e) => write!(f, "Parse error: {e}"),
            BackendError::Empty => write!(f, "Empty response"),
            BackendError::Config(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// A conversational client. Conversation memory, if any, lives inside it.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn ask(&self, text: &str) -> Result<String, BackendError>;
}

/// Fans `ask` out to the client for the chosen backend.
#[derive(Clone)]
pub struct BackendAdapter {
    bard: Arc<dyn ChatClient>,
    chatgpt: Arc<dyn ChatClient>,
}

impl BackendAdapter {
    pub fn new(bard: Arc<dyn ChatClient>, chatgpt: Arc<dyn ChatClient>) -> Self {
        Self { bard, chatgpt }
    }

    pub async fn ask(&self, backend: Backend, text: &str) -> Result<String, BackendError> {
        debug!("Asking {backend} ({} chars)", text.len());
        match backend {
            Backend::Bard => self.bard.ask(text).await,
            Backend::ChatGpt => self.chatgpt.ask(text).await,
        }
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| BackendError::Http(format!("failed to build HTTP client: {e}")))
}

/// Drop the oldest entries so at most `MAX_HISTORY` remain.
pub(crate) fn trim_history<T>(history: &mut Vec<T>) {
    if history.len() > MAX_HISTORY {
        let excess = history.len() - MAX_HISTORY;
        history.drain(..excess);
    }
}
