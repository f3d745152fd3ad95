//! Async orchestration layer: the per-camera tick loop and the supervisor
//! that starts/stops cameras in response to directive activity. Everything
//! synchronous and I/O-free lives in `vigil-engine`; this crate is where
//! that logic gets driven on a schedule against real collaborators.

pub mod camera_worker;
pub mod error;
pub mod supervisor;

pub use camera_worker::{CameraWorker, CameraWorkerConfig, FrameSourceFactory};
pub use error::{Result, WorkerError};
pub use supervisor::Supervisor;
