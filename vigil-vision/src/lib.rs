//! Frame acquisition, persistence, and vision-model analysis.

pub mod client;
pub mod config;
pub mod error;
pub mod frame_source;
pub mod frame_store;
pub mod rate_limiter;

pub use client::VisionClient;
pub use config::VisionConfig;
pub use error::{Result, VisionError};
pub use frame_source::{next_frame_with_retry, FrameSource, HttpFrameSource};
pub use frame_store::FrameStore;
pub use rate_limiter::RateLimiter;
