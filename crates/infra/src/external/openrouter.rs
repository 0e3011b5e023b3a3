//! Chat-completions adapter for the extraction model.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use inboxpay_ai::{AiError, ExtractionOutcome, MessageContent, build_prompt, parse_candidate};

use super::{ExtractionOracle, OracleError, network_error};

pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Free-tier models answer slowly.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    /// `None` lets the account default model answer.
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
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

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_url: OPENROUTER_API_URL.to_string(),
            api_key: api_key.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Ask the model about one message.
    pub async fn extract(&self, message: &MessageContent) -> Result<ExtractionOutcome, OracleError> {
        let prompt = build_prompt(message);
        let request = ChatRequest {
            model: self.model.as_deref(),
            messages: [ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        let resp = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Network(network_error(e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| OracleError::Network(network_error(e)))?;

        if !status.is_success() {
            return Err(OracleError::Api {
                status: status.as_u16(),
                body,
            });
        }

        parse_reply(&body)
    }
}

/// Turn a chat-completions body into an outcome; the whole body is the audit value.
fn parse_reply(body: &str) -> Result<ExtractionOutcome, OracleError> {
    let raw_response: JsonValue = serde_json::from_str(body)
        .map_err(|e| AiError::MalformedResponse(format!("response body: {e}")))?;
    let reply: ChatResponse = serde_json::from_value(raw_response.clone())
        .map_err(|e| AiError::MalformedResponse(format!("response shape: {e}")))?;

    let content = reply
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or(AiError::EmptyResponse)?;

    let candidate = parse_candidate(&content)?;
    Ok(ExtractionOutcome::from_candidate(candidate, raw_response))
}

#[async_trait]
impl ExtractionOracle for OpenRouterClient {
    async fn extract_batch(&self, messages: &[MessageContent]) -> Result<Vec<ExtractionOutcome>, OracleError> {
        let mut outcomes = Vec::with_capacity(messages.len());
        // Sequential: free tiers reject concurrent requests.
        for message in messages {
            outcomes.push(self.extract(message).await?);
        }
        debug!(message_count = messages.len(), "extraction batch answered");
        Ok(outcomes)
    }
}
