//! Minimal OpenAI-compatible client implementing `TextGenerator`.
//!
//! We only call chat.completions and return the assistant text untouched;
//! structure is recovered later by `normalize`. Calls log model name, latency
//! and token usage (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::UpstreamError;
use crate::llm::{GenerationRequest, TextGenerator};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub timeout: Duration,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let timeout = std::env::var("UPSTREAM_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .filter(|s| *s > 0)
      .map(Duration::from_secs)
      .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

    Self::new(api_key, base_url, model, timeout)
  }

  pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> Option<Self> {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
      Ok(c) => c,
      Err(e) => {
        error!(target: "upstream", error = %e, "Failed to build HTTP client");
        return None;
      }
    };
    let base_url = base_url.trim_end_matches('/').to_string();
    Some(Self { client, api_key, base_url, model, timeout })
  }
}

#[async_trait]
impl TextGenerator for OpenAI {
  #[instrument(level = "info", skip_all, fields(model = %self.model, max_tokens = request.max_tokens, user_len = request.user.len()))]
  async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: request.system.clone() },
        ChatMessageReq { role: "user".into(), content: request.user.clone() },
      ],
      temperature: request.temperature,
      max_tokens: Some(request.max_tokens),
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "ibprep-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await
      .map_err(|e| {
        let msg = if e.is_timeout() { format!("request timed out after {:?}", self.timeout) } else { e.to_string() };
        UpstreamError::new(msg)
      })?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      error!(target: "upstream", %status, elapsed = ?start.elapsed(), "OpenAI returned an error status");
      return Err(UpstreamError::new(format!("OpenAI HTTP {}: {}", status, msg)).with_status(status.as_u16()));
    }

    let body: ChatCompletionResponse = res.json().await
      .map_err(|e| UpstreamError::new(format!("unexpected response envelope: {e}")))?;
    if let Some(usage) = &body.usage {
      info!(target: "upstream", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .filter(|t| !t.trim().is_empty())
      .ok_or_else(|| UpstreamError::new("response is missing the expected text payload"))?;

    info!(target: "upstream", elapsed = ?start.elapsed(), text_len = text.len(), "Model response received");
    Ok(text)
  }

  fn describe(&self) -> String {
    format!("openai:{}", self.model)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn provider_error_message_is_extracted() {
    let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Incorrect API key provided"));
    assert_eq!(extract_openai_error("<html>bad gateway</html>"), None);
  }

  #[test]
  fn request_serializes_role_tagged_messages() {
    let req = ChatCompletionRequest {
      model: "m".into(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: "s".into() },
        ChatMessageReq { role: "user".into(), content: "u".into() },
      ],
      temperature: 0.2,
      max_tokens: Some(256),
    };
    let v = serde_json::to_value(&req).unwrap();
    assert_eq!(v["messages"][0]["role"], "system");
    assert_eq!(v["messages"][1]["content"], "u");
    assert_eq!(v["max_tokens"], 256);
  }

  #[test]
  fn base_url_trailing_slash_is_trimmed() {
    let oa = OpenAI::new("k".into(), "http://localhost:8080/v1/".into(), "m".into(), Duration::from_secs(5)).unwrap();
    assert_eq!(oa.base_url, "http://localhost:8080/v1");
    assert_eq!(oa.describe(), "openai:m");
  }
}
