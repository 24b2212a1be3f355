//! Optional worker-embedded chat client (feature `llm`).
//!
//! Workers that want an LLM in the loop can use [`BrainClient`]. Credentials
//! come from the environment; when they are absent the client never attempts
//! an HTTP call — it raises the suspension signal instead, handing the
//! prompt to whatever external agent supervises the job. Transient provider
//! errors (429 and 5xx) are retried inside the invocation with bounded
//! exponential backoff, so a rate-limit blip does not consume an item's
//! retry budget.

use std::time::Duration;

use serde_json::{Value, json};

use crate::message::Message;
use crate::worker::WorkerError;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Chat-completion client with the suspension fallback.
pub struct BrainClient {
    credentials: Option<String>,
    api_url: String,
    model: String,
    max_attempts: u32,
    client: reqwest::Client,
}

impl BrainClient {
    /// Resolve configuration from the environment (a `.env` file is honored):
    /// `BATCHLOOM_API_KEY` (falling back to `OPENAI_API_KEY`),
    /// `BATCHLOOM_API_URL`, `BATCHLOOM_MODEL`.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let credentials = std::env::var("BATCHLOOM_API_KEY")
            .ok()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        let api_url =
            std::env::var("BATCHLOOM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let model = std::env::var("BATCHLOOM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self {
            credentials,
            api_url,
            model,
            max_attempts: 3,
            client: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Run a chat completion over `messages`.
    ///
    /// Without credentials this returns [`WorkerError::Suspend`] carrying
    /// the messages, which the engine records as a pending prompt for the
    /// supervising agent. With credentials, 429/5xx responses and transport
    /// errors are retried with exponential backoff up to `max_attempts`;
    /// everything else maps to [`WorkerError::Provider`].
    pub async fn complete(&self, messages: &[Message]) -> Result<String, WorkerError> {
        let Some(key) = &self.credentials else {
            return Err(WorkerError::suspend_with_messages(messages));
        };

        let body = json!({
            "model": self.model,
            "messages": messages,
        });
        let mut delay = Duration::from_millis(500);

        for attempt in 1..=self.max_attempts {
            let response = self
                .client
                .post(self.api_url.as_str())
                .bearer_auth(key)
                .json(&body)
                .send()
                .await;

            let retryable = match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let payload: Value =
                            resp.json().await.map_err(|err| WorkerError::Provider {
                                provider: "llm",
                                message: format!("invalid completion response: {err}"),
                            })?;
                        let content = payload["choices"][0]["message"]["content"]
                            .as_str()
                            .ok_or(WorkerError::Provider {
                                provider: "llm",
                                message: "completion response missing content".to_string(),
                            })?;
                        return Ok(content.to_string());
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        format!("status {status}")
                    } else {
                        return Err(WorkerError::Provider {
                            provider: "llm",
                            message: format!("status {status}"),
                        });
                    }
                }
                Err(err) => err.to_string(),
            };

            if attempt == self.max_attempts {
                return Err(WorkerError::Provider {
                    provider: "llm",
                    message: format!("giving up after {attempt} attempts: {retryable}"),
                });
            }
            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        Err(WorkerError::Provider {
            provider: "llm",
            message: "no attempts configured".to_string(),
        })
    }
}
