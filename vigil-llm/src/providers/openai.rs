use crate::config::{ChatRequest, ChatResponse, MessageRole, Usage};
use crate::error::{LLMError, Result};
use crate::providers::ProviderClient;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

pub struct OpenAiProvider {
    api_key: String,
    client: Client,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let model = request.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());

        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp.clamp(0.0, 2.0));
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        let usage = json.get("usage").and_then(|u| {
            Some(Usage {
                prompt_tokens: u["prompt_tokens"].as_u64()? as u32,
                completion_tokens: u["completion_tokens"].as_u64()? as u32,
                total_tokens: u["total_tokens"].as_u64()? as u32,
            })
        });

        Ok(ChatResponse {
            content,
            model: json["model"].as_str().unwrap_or(&model).to_string(),
            usage,
        })
    }
}
