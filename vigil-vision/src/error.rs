use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("frame source error: {0}")]
    FrameSource(String),

    #[error("frame source exhausted its retry budget")]
    FrameSourceExhausted,

    #[error("end of stream")]
    EndOfStream,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("llm error: {0}")]
    Llm(#[from] vigil_llm::LLMError),

    #[error("rate limited")]
    RateLimited,

    #[error("core error: {0}")]
    Core(#[from] vigil_core::Error),
}

pub type Result<T> = std::result::Result<T, VisionError>;
