//! HTTP + WebSocket front door for the Vigil pipeline: command intake,
//! camera control, alert queries, and the four push channels (spec 6).

pub mod directive_parser;
pub mod http;
pub mod state;
pub mod websocket;

pub use state::AppState;
