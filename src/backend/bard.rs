//! Bard backend, served by Google's Gemini `generateContent` API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{http_client, trim_history, BackendError, ChatClient};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct BardClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
    history: Mutex<Vec<Content>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: &'a [Content],
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct Content {
    #[serde(default)]
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<Content>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, BackendError> {
        if let Some(error) = self.error {
            return Err(BackendError::Api(error.message));
        }

        let candidates = self.candidates.ok_or(BackendError::Empty)?;
        let content = candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or(BackendError::Empty)?;

        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        if text.trim().is_empty() {
            return Err(BackendError::Empty);
        }
        Ok(text)
    }
}

impl BardClient {
    pub fn new(api_key: String, model: String) -> Result<Self, BackendError> {
        info!("Initializing Bard client (model: {model})");
        Ok(Self {
            api_key,
            model,
            client: http_client()?,
            history: Mutex::new(Vec::new()),
        })
    }

    async fn generate(&self, contents: &[Content]) -> Result<String, BackendError> {
        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, self.model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&GenerateRequest { contents })
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Http(format!("failed to read response: {e}")))?;

        debug!("Gemini response status: {status}");

        if !status.is_success() {
            return Err(BackendError::Api(format!("{status}: {body}")));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| BackendError::Parse(e.to_string()))?;
        parsed.into_text()
    }
}

#[async_trait]
impl ChatClient for BardClient {
    async fn ask(&self, text: &str) -> Result<String, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::Config("bard API key is not set".into()));
        }

        let mut history = self.history.lock().await;
        history.push(Content::text("user", text));

        match self.generate(&history).await {
            Ok(reply) => {
                history.push(Content::text("model", &reply));
                trim_history(&mut history);
                Ok(reply)
            }
            Err(e) => {
                history.pop();
                Err(e)
            }
        }
    }
}
