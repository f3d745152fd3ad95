//! Provider-abstracted LLM client plumbing shared by `vigil-vision` and
//! `vigil-reasoning`. Neither of those crates talks to `reqwest` directly;
//! both go through `LLMManager::chat`.

pub mod cache;
pub mod config;
pub mod error;
pub mod manager;
pub mod providers;

pub use config::{ChatRequest, ChatResponse, LLMConfig, Message, MessageRole, Provider, Usage};
pub use error::{LLMError, Result};
pub use manager::LLMManager;
pub use providers::ProviderClient;
