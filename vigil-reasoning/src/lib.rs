//! Reasoning-model client: interprets a sequence of vision observations
//! against an active directive. Only invoked when a directive is active.

pub mod client;
pub mod config;
pub mod error;

pub use client::ReasoningClient;
pub use config::ReasoningConfig;
pub use error::{ReasoningError, Result};
