use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("camera not found: {0}")]
    CameraNotFound(String),

    #[error("camera {0} already has a registered frame source")]
    AlreadyRegistered(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
