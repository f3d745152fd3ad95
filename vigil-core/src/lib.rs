//! Shared data model and configuration for the Vigil surveillance pipeline.
//!
//! This crate has no behavior of its own beyond construction, validation, and
//! a handful of pure helper methods (`resolved_query_match`, `applies_to`,
//! tick interval math) — every other crate in the workspace depends on it for
//! the wire-level types that cross component boundaries.

pub mod config;
pub mod error;
pub mod types;

pub use config::VigilConfig;
pub use error::{Error, Result};
pub use types::*;
