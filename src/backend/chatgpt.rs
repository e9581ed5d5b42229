//! ChatGPT backend over the OpenAI chat completions API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{http_client, trim_history, BackendError, ChatClient};

pub struct ChatGptClient {
    api_key: String,
    api_base: String,
    model: String,
    http: reqwest::Client,
    history: Mutex<Vec<ApiMessage>>,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
}

#[derive(Serialize, Clone)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatGptClient {
    pub fn new(api_key: String, api_base: String, model: String) -> Result<Self, BackendError> {
        info!("Initializing ChatGPT client (model: {model})");
        Ok(Self {
            api_key,
            api_base,
            model,
            http: http_client()?,
            history: Mutex::new(Vec::new()),
        })
    }

    async fn complete(&self, messages: &[ApiMessage]) -> Result<String, BackendError> {
        let request = ApiRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(BackendError::Empty)
    }
}

#[async_trait]
impl ChatClient for ChatGptClient {
    async fn ask(&self, text: &str) -> Result<String, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::Config("openai_authorization is not set".into()));
        }

        // Held across the request so turns from different chats don't interleave.
        let mut history = self.history.lock().await;
        history.push(ApiMessage {
            role: "user",
            content: text.to_string(),
        });

        match self.complete(&history).await {
            Ok(reply) => {
                history.push(ApiMessage {
                    role: "assistant",
                    content: reply.clone(),
                });
                trim_history(&mut history);
                debug!("ChatGPT replied with {} chars", reply.len());
                Ok(reply)
            }
            Err(e) => {
                history.pop();
                Err(e)
            }
        }
    }
}
