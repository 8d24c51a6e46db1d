//! Outbound vision-model call.
//!
//! One chat-completions POST per request: a text part carrying the resolved
//! prompt and an `image_url` part carrying the image reference (remote URL
//! or data URI). Single attempt: a non-success status, a network failure,
//! or the configured timeout is a terminal upstream error for the request.

use std::time::Duration;

use serde_json::Value;

use crate::config::VisionConfig;
use crate::error::ApiError;

pub struct VisionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key_env: String,
}

impl VisionClient {
    pub fn new(config: &VisionConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key_env: config.api_key_env.clone(),
        })
    }

    /// Send one prompt + image reference and return the analysis text.
    pub async fn analyze(&self, prompt: &str, image_url: &str) -> Result<String, ApiError> {
        let api_key = std::env::var(&self.api_key_env)
            .map_err(|_| ApiError::MissingCredential(self.api_key_env.clone()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    {
                        "type": "image_url",
                        "image_url": { "url": image_url, "detail": "auto" }
                    }
                ]
            }],
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("vision API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "vision API error {}: {}",
                status, body_text
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("invalid vision API response: {}", e)))?;

        extract_content(&json).ok_or_else(|| {
            ApiError::Upstream("vision API response missing choices[0].message.content".to_string())
        })
    }
}

/// Pull the analysis text out of a chat-completions response.
fn extract_content(json: &Value) -> Option<String> {
    json.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}
