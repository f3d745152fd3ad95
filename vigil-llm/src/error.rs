use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("api key not configured for provider: {0}")]
    MissingApiKey(String),

    #[error("http request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("call exceeded its deadline")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, LLMError>;
