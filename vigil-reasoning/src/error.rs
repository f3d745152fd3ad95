use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReasoningError {
    #[error("no reasoning credential configured")]
    Unavailable,

    #[error("llm error: {0}")]
    Llm(#[from] vigil_llm::LLMError),
}

pub type Result<T> = std::result::Result<T, ReasoningError>;
