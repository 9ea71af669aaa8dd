// crates/core/src/openai.rs

//! OpenAI-compatible chat completions client.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Serialize;

use crate::ai_client::{AiClient, ChatRequest, ChatResponse};

const MAX_ATTEMPTS: u32 = 3;

/// Client for `<base_url>/chat/completions` (OpenAI, Azure OpenAI with a
/// compatible gateway, Ollama, vLLM, ...).
pub struct OpenAiClient {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        Self {
            client: Client::new(),
            url,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct CompletionsRequest<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a ChatRequest,
}

impl AiClient for OpenAiClient {
    fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = CompletionsRequest {
            model: &self.model,
            request: &request,
        };

        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Ok(json) = serde_json::to_string_pretty(&body) {
                tracing::debug!(url = %self.url, "chat request:\n{}", preview(&json, 2000));
            }
        }

        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let resp = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send();

            let r = match resp {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(attempt, "network error: {} - retrying", e);
                    last_error = Some(anyhow::anyhow!("network error: {}", e));
                    std::thread::sleep(Duration::from_secs(attempt as u64));
                    continue;
                }
            };

            let status = r.status();
            if !status.is_success() {
                let text = r.text().unwrap_or_default();

                if status.as_u16() == 429 || status.is_server_error() {
                    // 5s, 20s for rate limits; 2s, 4s for server errors
                    let delay = if status.as_u16() == 429 {
                        5 * attempt as u64 * attempt as u64
                    } else {
                        attempt as u64 * 2
                    };
                    tracing::warn!(
                        attempt,
                        %status,
                        "chat request failed, waiting {}s: {}",
                        delay,
                        preview(&text, 500)
                    );
                    last_error = Some(anyhow::anyhow!("HTTP {} - {}", status, text));
                    if attempt < MAX_ATTEMPTS {
                        std::thread::sleep(Duration::from_secs(delay));
                    }
                    continue;
                }

                anyhow::bail!("chat request failed: HTTP {} - {}", status, text);
            }

            let raw_text = r.text().context("failed to read response body")?;
            tracing::debug!("chat response: {}", preview(&raw_text, 500));

            return serde_json::from_str(&raw_text).context("failed to parse chat response");
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("request failed after retries")))
    }
}

/// At most `max` characters of `s`.
fn preview(s: &str, max: usize) -> &str {
    s.char_indices().nth(max).map_or(s, |(i, _)| &s[..i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_client::message;
    use serde_json::json;

    #[test]
    fn body_carries_model_next_to_request_fields() {
        let request = ChatRequest::new(vec![message::user("hello")]);
        let body = CompletionsRequest {
            model: "gpt-4o",
            request: &request,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value, json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hello"}]}));
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = OpenAiClient::new("https://api.openai.com/v1/", "key", "gpt-4o");
        assert_eq!(client.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(client.model(), "gpt-4o");
    }
}
