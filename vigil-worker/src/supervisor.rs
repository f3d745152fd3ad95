use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;
use vigil_core::{Alert, AlertKind, AlertSeverity, AlertSource, AnalysisMessage, CameraStatus, Directive, LiveFeedMessage};
use vigil_dispatch::AlertDispatcher;
use vigil_engine::DirectiveRegistry;

use crate::camera_worker::{CameraWorker, CameraWorkerConfig, FrameSourceFactory};
use crate::error::{Result, WorkerError};

/// Starts/stops `CameraWorker`s on API requests and owns the auto-start
/// policy when a directive arrives (spec 4.11). The single
/// `DirectiveRegistry` this struct is handed is the same instance the
/// command-intake API writes to — see DESIGN.md's note on the shared
/// singleton that the original system got wrong.
pub struct Supervisor {
    registry: Arc<DirectiveRegistry>,
    dispatcher: Arc<AlertDispatcher>,
    workers: DashMap<String, Arc<CameraWorker>>,
    /// Tracks which currently-running cameras were started automatically by
    /// `process_directive` rather than by an explicit `start_camera` call,
    /// so `remove_directive`'s auto-stop policy only ever stops cameras it
    /// itself started (spec 4.11: "only auto-stop cameras that were
    /// auto-started, not cameras the user manually started").
    auto_started: DashMap<String, bool>,
    factories: DashMap<String, FrameSourceFactory>,
    worker_config: CameraWorkerConfig,
}

impl Supervisor {
    pub fn new(
        registry: Arc<DirectiveRegistry>,
        dispatcher: Arc<AlertDispatcher>,
        worker_config: CameraWorkerConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            workers: DashMap::new(),
            auto_started: DashMap::new(),
            factories: DashMap::new(),
            worker_config,
        }
    }

    /// Registers a camera's frame-source factory and the collaborators its
    /// worker will use. Must be called once per camera before that camera
    /// can be started, typically during process wiring in `vigil-server`'s
    /// `main`.
    #[allow(clippy::too_many_arguments)]
    pub fn register_camera(
        &self,
        camera_id: impl Into<String>,
        source_factory: FrameSourceFactory,
        vision_client: Option<Arc<vigil_vision::VisionClient>>,
        reasoning_client: Option<Arc<vigil_reasoning::ReasoningClient>>,
        frame_store: Arc<vigil_vision::FrameStore>,
        decision_engine: Arc<vigil_engine::DecisionEngine>,
        live_feed_tx: broadcast::Sender<LiveFeedMessage>,
        analysis_tx: broadcast::Sender<AnalysisMessage>,
    ) {
        let camera_id = camera_id.into();
        let worker = Arc::new(CameraWorker::new(
            camera_id.clone(),
            self.worker_config.clone(),
            source_factory,
            self.registry.clone(),
            vision_client,
            reasoning_client,
            frame_store,
            decision_engine,
            self.dispatcher.clone(),
            live_feed_tx,
            analysis_tx,
        ));
        self.workers.insert(camera_id, worker);
    }

    /// Idempotent: starting an already-running camera is a no-op, returning
    /// its current state (spec "Round-trip / idempotence").
    pub fn start_camera(&self, camera_id: &str) -> Result<vigil_core::CameraState> {
        let worker = self
            .workers
            .get(camera_id)
            .ok_or_else(|| WorkerError::CameraNotFound(camera_id.to_string()))?;
        worker.start();
        Ok(worker.state())
    }

    pub async fn stop_camera(&self, camera_id: &str) -> Result<vigil_core::CameraState> {
        let worker = self
            .workers
            .get(camera_id)
            .ok_or_else(|| WorkerError::CameraNotFound(camera_id.to_string()))?
            .clone();
        worker.stop().await;
        self.auto_started.remove(camera_id);
        Ok(worker.state())
    }

    pub fn camera_state(&self, camera_id: &str) -> Option<vigil_core::CameraState> {
        self.workers.get(camera_id).map(|w| w.state())
    }

    pub fn list_cameras(&self) -> Vec<CameraStatus> {
        self.workers
            .iter()
            .map(|entry| CameraStatus {
                camera_id: entry.camera_id().to_string(),
                state: entry.state(),
                auto_started: self.auto_started.get(entry.camera_id()).map(|v| *v).unwrap_or(false),
            })
            .collect()
    }

    fn cameras_in_scope(&self, directive: &Directive) -> Vec<String> {
        match &directive.camera_scope {
            vigil_core::CameraScope::All => self.workers.iter().map(|e| e.camera_id().to_string()).collect(),
            vigil_core::CameraScope::Single(id) => {
                if self.workers.contains_key(id) {
                    vec![id.clone()]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Records the directive and auto-starts any STOPPED camera in its
    /// scope (spec 4.11). Re-processing the same directive id is a no-op
    /// at the registry layer; auto-start is still (harmlessly) re-evaluated
    /// since `start_camera` on a running camera is itself a no-op.
    pub fn process_directive(&self, directive: Directive) -> Uuid {
        let scoped_cameras = self.cameras_in_scope(&directive);
        let target = directive.target.clone();
        let kind = directive.kind;
        let id = self.registry.add(directive);

        for camera_id in scoped_cameras {
            let was_stopped = self
                .workers
                .get(&camera_id)
                .map(|w| w.state() == vigil_core::CameraState::Stopped)
                .unwrap_or(false);
            if was_stopped {
                if self.start_camera(&camera_id).is_ok() {
                    self.auto_started.insert(camera_id, true);
                }
            }
        }

        self.publish_system(
            AlertSeverity::Info,
            "directive_accepted",
            format!("Accepted {kind:?} directive: \"{target}\""),
        );
        id
    }

    /// Removes a directive and, per camera that now has no remaining
    /// active directive, stops it only if this `Supervisor` auto-started it
    /// (spec 4.11).
    pub async fn remove_directive(&self, id: Uuid) -> bool {
        let Some(directive) = self.registry.get(id) else {
            return false;
        };
        let removed = self.registry.remove(id);
        if !removed {
            return false;
        }

        for camera_id in self.cameras_in_scope(&directive) {
            if self.registry.active_any_for_camera(&camera_id) {
                continue;
            }
            let is_auto_started = self.auto_started.get(&camera_id).map(|v| *v).unwrap_or(false);
            if is_auto_started {
                let _ = self.stop_camera(&camera_id).await;
            }
        }
        true
    }

    fn publish_system(&self, severity: AlertSeverity, tag: &str, message: impl Into<String>) {
        let mut alert = Alert::new("*", severity, AlertKind::System, tag, message, AlertSource::Override);
        alert.reasons = vec![tag.to_string()];
        self.dispatcher.dispatch(alert);
    }

    /// Cancels every running camera, waiting up to the per-worker 5s
    /// ceiling for each (spec 5, "Supervisor shutdown").
    pub async fn shutdown(&self) {
        info!("supervisor shutting down all camera workers");
        let workers: Vec<Arc<CameraWorker>> = self.workers.iter().map(|e| e.value().clone()).collect();
        for worker in workers {
            worker.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU64, Ordering};
    use vigil_core::{CameraScope, DirectiveKind};
    use vigil_vision::FrameSource;

    struct StubSource {
        seq: AtomicU64,
    }

    #[async_trait]
    impl FrameSource for StubSource {
        async fn open(&mut self) -> vigil_vision::Result<()> {
            Ok(())
        }
        async fn next_frame(&mut self) -> vigil_vision::Result<vigil_core::Frame> {
            Ok(vigil_core::Frame {
                camera_id: "cam1".to_string(),
                captured_at: chrono::Utc::now(),
                jpeg_bytes: Bytes::new(),
                url: None,
                base64: None,
                sequence_no: self.seq.fetch_add(1, Ordering::SeqCst),
            })
        }
        async fn close(&mut self) {}
    }

    fn make_supervisor() -> Supervisor {
        let registry = Arc::new(DirectiveRegistry::new());
        let dispatcher = Arc::new(AlertDispatcher::new(50));
        let config = CameraWorkerConfig {
            tick_interval: std::time::Duration::from_millis(20),
            retry_base_delay: std::time::Duration::from_millis(1),
            retry_cap: std::time::Duration::from_millis(5),
            retry_max_attempts: 3,
            baseline_stability_frames: 3,
            history_window: 8,
            summary_interval: std::time::Duration::from_secs(120),
            consecutive_failure_threshold: 5,
        };
        let supervisor = Supervisor::new(registry, dispatcher, config);
        let (live_tx, _) = broadcast::channel(16);
        let (analysis_tx, _) = broadcast::channel(16);
        let frame_store = Arc::new(vigil_vision::FrameStore::new(std::env::temp_dir()));
        let decision_engine = Arc::new(vigil_engine::DecisionEngine::new(Default::default()));
        supervisor.register_camera(
            "cam1",
            Arc::new(|| Box::new(StubSource { seq: AtomicU64::new(0) }) as Box<dyn FrameSource>),
            None,
            None,
            frame_store,
            decision_engine,
            live_tx,
            analysis_tx,
        );
        supervisor
    }

    #[tokio::test]
    async fn start_camera_is_idempotent() {
        let supervisor = make_supervisor();
        assert_eq!(supervisor.start_camera("cam1").unwrap(), vigil_core::CameraState::Starting);
        assert_eq!(supervisor.start_camera("cam1").unwrap(), vigil_core::CameraState::Starting);
        supervisor.stop_camera("cam1").await.unwrap();
    }

    #[tokio::test]
    async fn stop_on_stopped_camera_is_a_noop() {
        let supervisor = make_supervisor();
        assert_eq!(supervisor.stop_camera("cam1").await.unwrap(), vigil_core::CameraState::Stopped);
    }

    #[tokio::test]
    async fn unknown_camera_returns_error() {
        let supervisor = make_supervisor();
        assert!(supervisor.start_camera("does-not-exist").is_err());
    }

    #[tokio::test]
    async fn process_directive_auto_starts_scoped_camera() {
        let supervisor = make_supervisor();
        let directive = Directive::new(DirectiveKind::SceneAnalysis, "watch the porch", CameraScope::All);
        supervisor.process_directive(directive);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_ne!(supervisor.camera_state("cam1").unwrap(), vigil_core::CameraState::Stopped);
        supervisor.stop_camera("cam1").await.unwrap();
    }

    #[tokio::test]
    async fn remove_directive_stops_only_auto_started_cameras() {
        let supervisor = make_supervisor();
        let directive = Directive::new(DirectiveKind::SceneAnalysis, "watch the porch", CameraScope::All);
        let id = supervisor.process_directive(directive);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(supervisor.remove_directive(id).await);
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(supervisor.camera_state("cam1").unwrap(), vigil_core::CameraState::Stopped);
    }

    #[tokio::test]
    async fn remove_directive_does_not_stop_manually_started_camera() {
        let supervisor = make_supervisor();
        supervisor.start_camera("cam1").unwrap();
        let directive = Directive::new(DirectiveKind::SceneAnalysis, "watch the porch", CameraScope::All);
        let id = supervisor.process_directive(directive);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(supervisor.remove_directive(id).await);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_ne!(supervisor.camera_state("cam1").unwrap(), vigil_core::CameraState::Stopped);
        supervisor.stop_camera("cam1").await.unwrap();
    }

    #[tokio::test]
    async fn reprocessing_same_directive_is_a_noop_in_registry() {
        let supervisor = make_supervisor();
        let directive = Directive::new(DirectiveKind::SceneAnalysis, "watch the porch", CameraScope::All);
        let id = directive.id;
        supervisor.process_directive(directive.clone());
        supervisor.process_directive(directive);
        assert_eq!(supervisor.registry.all().iter().filter(|d| d.id == id).count(), 1);
        supervisor.stop_camera("cam1").await.unwrap();
    }
}
