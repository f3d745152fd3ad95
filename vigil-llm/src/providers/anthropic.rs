use crate::config::{ChatRequest, ChatResponse, MessageRole, Usage};
use crate::error::{LLMError, Result};
use crate::providers::ProviderClient;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

pub struct AnthropicProvider {
    api_key: String,
    client: Client,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.anthropic.com/v1".to_string(),
        }
    }
}

#[async_trait]
impl ProviderClient for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| "claude-3-haiku-20240307".to_string());

        let mut messages = Vec::new();
        let mut system = None;
        for msg in &request.messages {
            match msg.role {
                MessageRole::System => system = Some(msg.content.clone()),
                MessageRole::User => messages.push(json!({
                    "role": "user",
                    "content": msg.content,
                })),
            }
        }

        let max_tokens = request.max_tokens.unwrap_or(1024).min(4096);
        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
        });
        if let Some(sys) = system {
            body["system"] = json!(sys);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp.clamp(0.0, 1.0));
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .timeout(std::time::Duration::from_secs(60))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LLMError::RateLimit);
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LLMError::AuthenticationFailed);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let truncated = crate::providers::truncate_body(&text);
            return Err(LLMError::InvalidResponse(format!(
                "HTTP {status}: {truncated}"
            )));
        }

        let json: serde_json::Value = response.json().await?;
        let content = json["content"][0]["text"].as_str().unwrap_or("").to_string();
        let usage = json.get("usage").and_then(|u| {
            let input = u["input_tokens"].as_u64()?;
            let output = u["output_tokens"].as_u64()?;
            Some(Usage {
                prompt_tokens: input as u32,
                completion_tokens: output as u32,
                total_tokens: (input + output) as u32,
            })
        });

        Ok(ChatResponse {
            content,
            model: json["model"].as_str().unwrap_or(&model).to_string(),
            usage,
        })
    }
}
