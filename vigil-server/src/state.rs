use std::sync::Arc;
use tokio::sync::broadcast;
use vigil_core::{AnalysisMessage, LiveFeedMessage};
use vigil_dispatch::AlertDispatcher;
use vigil_engine::DirectiveRegistry;
use vigil_worker::Supervisor;

use crate::directive_parser::DirectiveParser;

/// Everything an axum handler needs, assembled once in `main` and shared
/// via `Arc` (the `Clone` axum wants on `State` is cheap: every field here
/// is already reference-counted or a broadcast sender).
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DirectiveRegistry>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub supervisor: Arc<Supervisor>,
    pub live_feed_tx: broadcast::Sender<LiveFeedMessage>,
    pub analysis_tx: broadcast::Sender<AnalysisMessage>,
    pub parser: Arc<dyn DirectiveParser>,
}
