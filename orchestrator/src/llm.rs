//! Language-model capability used by every agent role.
//!
//! The orchestrator treats a completion as an opaque call: prompt in, text and
//! token usage out, bounded by a timeout.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::PlanError;

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<Completion, PlanError>;
}

/// OpenAI-compatible `/chat/completions` client (Gemini, OpenAI, vLLM, ...).
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    limiter: DefaultDirectRateLimiter,
}

impl ChatCompletionsClient {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        let per_minute = NonZeroU32::new(config.llm_requests_per_minute).unwrap_or(NonZeroU32::MIN);
        if config.llm_api_key.is_none() {
            warn!("No language model API key configured; agent steps will fail");
        }
        Self {
            http,
            endpoint: config.llm_endpoint.trim_end_matches('/').to_string(),
            model: config.llm_model.clone(),
            api_key: config.llm_api_key.clone(),
            timeout: config.llm_timeout(),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn complete(&self, prompt: &Prompt) -> Result<Completion, PlanError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PlanError::Capability("no language model API key configured".into()))?;

        self.limiter.until_ready().await;

        let body = json!({
            "model": self.model,
            "temperature": 0.7,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
        });

        debug!(model = %self.model, prompt_chars = prompt.user.len(), "Calling language model");

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PlanError::Capability(format!(
                "language model returned {status}: {text}"
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| PlanError::malformed("language_model", e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PlanError::malformed("language_model", "empty completion"))?;

        Ok(Completion {
            text,
            usage: parsed.usage.unwrap_or_default(),
        })
    }
}

impl ChatCompletionsClient {
    fn classify(&self, err: reqwest::Error) -> PlanError {
        if err.is_timeout() {
            PlanError::CapabilityTimeout(self.timeout)
        } else {
            PlanError::Capability(err.to_string())
        }
    }
}
