//! OpenAI-compatible chat completion client.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{estimate_tokens, Generation, RemoteGenerator};
use crate::types::{HistoryEntry, Role};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the shop assistant of a crystal and trading-course storefront. \
Answer briefly and warmly in the customer's language. When recommending, mention concrete product \
types (crystal names, tiers, bundles, courses) so matching items can be shown.";

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

pub struct ExternalGenerator {
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: String,
    max_tokens: usize,
    temperature: f32,
    client: Client,
}

impl ExternalGenerator {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(120))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 512,
            temperature: 0.7,
            client,
        })
    }

    /// OpenAI's hosted endpoint.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::new("https://api.openai.com/v1/chat/completions", api_key, model)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_request(&self, message: &str, history: &[HistoryEntry]) -> serde_json::Value {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(json!({"role": "system", "content": self.system_prompt}));
        for entry in history {
            let role = match entry.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": entry.content}));
        }
        messages.push(json!({"role": "user", "content": message}));

        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": false
        })
    }

    /// Parse a response body as JSON, returning a clear error if the server returned HTML.
    fn parse_completion(body: &str, endpoint: &str) -> Result<ChatCompletion> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(anyhow!(
                "Endpoint {} returned HTML instead of JSON, service may be down. Response: {}",
                endpoint,
                preview
            ));
        }
        serde_json::from_str(body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!("Failed to parse JSON from {}: {}. Body: {}", endpoint, e, preview)
        })
    }
}

#[async_trait]
impl RemoteGenerator for ExternalGenerator {
    async fn generate(&self, message: &str, history: &[HistoryEntry]) -> Result<Generation> {
        let request = self.build_request(message, history);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("Request to {} timed out", self.endpoint)
                } else if e.is_connect() {
                    anyhow!("Failed to connect to {}: {}", self.endpoint, e)
                } else {
                    anyhow!("Request to {} failed: {}", self.endpoint, e)
                }
            })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!("API error ({}): {}", status, body));
        }

        let completion = Self::parse_completion(&body, &self.endpoint)?;
        let text = completion
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("Completion returned empty choices array"))?;

        let tokens_used = match completion.usage {
            Some(usage) => usage.total_tokens,
            None => {
                let prompt_chars: String = request.to_string();
                estimate_tokens(&prompt_chars) + estimate_tokens(&text)
            }
        };

        Ok(Generation { text, tokens_used })
    }
}
