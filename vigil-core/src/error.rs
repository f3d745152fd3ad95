use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("directive not found: {0}")]
    DirectiveNotFound(uuid::Uuid),

    #[error("camera not found: {0}")]
    CameraNotFound(String),

    #[error("alert not found: {0}")]
    AlertNotFound(uuid::Uuid),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
