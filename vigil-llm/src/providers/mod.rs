pub mod anthropic;
pub mod openai;

use crate::config::{ChatRequest, ChatResponse};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn name(&self) -> &'static str;
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// Truncates an error response body to at most 500 bytes at a char
/// boundary, so a multi-byte UTF-8 sequence straddling byte 500 never
/// panics the slice.
pub(crate) fn truncate_body(text: &str) -> &str {
    if text.len() <= 500 {
        return text;
    }
    let mut end = 500;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
