use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;
use vigil_core::{
    Alert, AlertKind, AlertSeverity, AlertSource, AnalysisMessage, BaselineState, CameraState,
    Directive, LiveFeedMessage, ObservationHistory,
};
use vigil_dispatch::AlertDispatcher;
use vigil_engine::{BaselineTracker, DecisionEngine, DecisionKind, SummaryAggregator};
use vigil_reasoning::ReasoningClient;
use vigil_vision::{next_frame_with_retry, FrameSource, FrameStore, VisionClient, VisionError};

/// Tunables for one `CameraWorker`'s tick loop. Distinct from
/// `vigil_core::VigilConfig` so a `Supervisor` could in principle run
/// cameras at different cadences; `vigil-server`'s `main` currently derives
/// one of these per camera from the single process-wide config.
#[derive(Debug, Clone)]
pub struct CameraWorkerConfig {
    pub tick_interval: Duration,
    pub retry_base_delay: Duration,
    pub retry_cap: Duration,
    pub retry_max_attempts: u32,
    pub baseline_stability_frames: u32,
    pub history_window: usize,
    pub summary_interval: Duration,
    pub consecutive_failure_threshold: u32,
}

/// Minimum gap between repeat `remote_degraded` warnings while a camera
/// stays degraded (spec "Persistent remote failure": "at most once every
/// 5 minutes, not once per tick").
const DEGRADED_ALERT_REPEAT_SECS: i64 = 300;

/// Factory for a fresh `FrameSource`, invoked each time a camera transitions
/// `STOPPED -> STARTING`. Boxed rather than stored pre-opened so repeated
/// start/stop cycles never reuse a closed source.
pub type FrameSourceFactory = Arc<dyn Fn() -> Box<dyn FrameSource> + Send + Sync>;

/// Per-camera control loop (spec 4.10). Owns its `BaselineTracker` and
/// per-directive `ObservationHistory` exclusively — nothing outside this
/// struct ever mutates them, which is what keeps the "temporal reasoning
/// without mutable global state" design note true in practice (see
/// DESIGN.md).
pub struct CameraWorker {
    camera_id: String,
    config: CameraWorkerConfig,
    source_factory: FrameSourceFactory,
    state: RwLock<CameraState>,
    stop_notify: Arc<Notify>,
    stopping: AtomicBool,

    registry: Arc<vigil_engine::DirectiveRegistry>,
    vision_client: Option<Arc<VisionClient>>,
    reasoning_client: Option<Arc<ReasoningClient>>,
    frame_store: Arc<FrameStore>,
    decision_engine: Arc<DecisionEngine>,
    dispatcher: Arc<AlertDispatcher>,

    baseline_tracker: BaselineTracker,
    history: DashMap<Uuid, ObservationHistory>,
    summary_aggregator: SummaryAggregator,

    live_feed_tx: broadcast::Sender<LiveFeedMessage>,
    analysis_tx: broadcast::Sender<AnalysisMessage>,

    vision_failure_streak: AtomicU32,
    remote_degraded: AtomicBool,
    last_degraded_alert_at: Mutex<Option<DateTime<Utc>>>,

    run_task: RwLock<Option<JoinHandle<()>>>,
    summary_task: RwLock<Option<JoinHandle<()>>>,
}

impl CameraWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera_id: impl Into<String>,
        config: CameraWorkerConfig,
        source_factory: FrameSourceFactory,
        registry: Arc<vigil_engine::DirectiveRegistry>,
        vision_client: Option<Arc<VisionClient>>,
        reasoning_client: Option<Arc<ReasoningClient>>,
        frame_store: Arc<FrameStore>,
        decision_engine: Arc<DecisionEngine>,
        dispatcher: Arc<AlertDispatcher>,
        live_feed_tx: broadcast::Sender<LiveFeedMessage>,
        analysis_tx: broadcast::Sender<AnalysisMessage>,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            config,
            source_factory,
            state: RwLock::new(CameraState::Stopped),
            stop_notify: Arc::new(Notify::new()),
            stopping: AtomicBool::new(false),
            registry,
            vision_client,
            reasoning_client,
            frame_store,
            decision_engine,
            dispatcher,
            baseline_tracker: BaselineTracker::new(),
            history: DashMap::new(),
            summary_aggregator: SummaryAggregator::new(),
            live_feed_tx,
            analysis_tx,
            vision_failure_streak: AtomicU32::new(0),
            remote_degraded: AtomicBool::new(false),
            last_degraded_alert_at: Mutex::new(None),
            run_task: RwLock::new(None),
            summary_task: RwLock::new(None),
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn state(&self) -> CameraState {
        *self.state.read()
    }

    /// `STOPPED -> STARTING`. A no-op on any other state (spec 4.10, Round
    /// trip/idempotence: "start_camera on a RUNNING camera is a no-op").
    pub fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.write();
            if *state != CameraState::Stopped && *state != CameraState::Failed {
                return;
            }
            *state = CameraState::Starting;
        }
        self.stopping.store(false, Ordering::SeqCst);

        let worker = self.clone();
        let handle = tokio::spawn(async move { worker.run_loop().await });
        *self.run_task.write() = Some(handle);

        let worker = self.clone();
        let handle = tokio::spawn(async move { worker.run_summary_timer().await });
        *self.summary_task.write() = Some(handle);
    }

    /// `RUNNING -> STOPPING -> STOPPED`. Idempotent on a stopped camera.
    /// Cancels any in-flight call at the next safe point and waits up to a
    /// 5 second ceiling before forcibly aborting (spec 5, "Cancellation &
    /// timeouts").
    pub async fn stop(self: &Arc<Self>) {
        if *self.state.read() == CameraState::Stopped {
            return;
        }
        {
            let mut state = self.state.write();
            if *state == CameraState::Running || *state == CameraState::Starting {
                *state = CameraState::Stopping;
            }
        }
        self.stopping.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();

        let run_handle = self.run_task.write().take();
        if let Some(handle) = run_handle {
            if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                warn!(camera_id = %self.camera_id, "camera worker did not stop within the 5s ceiling, task dropped");
            }
        }
        let summary_handle = self.summary_task.write().take();
        if let Some(handle) = summary_handle {
            handle.abort();
        }

        self.summary_aggregator.discard(&self.camera_id);
        for id in self.history.iter().map(|e| *e.key()).collect::<Vec<_>>() {
            self.history.remove(&id);
            self.baseline_tracker.clear(&self.camera_id, id);
        }
        self.vision_failure_streak.store(0, Ordering::SeqCst);
        self.remote_degraded.store(false, Ordering::SeqCst);
        *self.last_degraded_alert_at.lock() = None;
        *self.state.write() = CameraState::Stopped;
    }

    async fn run_loop(self: Arc<Self>) {
        let mut source = (self.source_factory)();
        if let Err(e) = source.open().await {
            warn!(camera_id = %self.camera_id, error = %e, "frame source failed to open");
            *self.state.write() = CameraState::Failed;
            return;
        }

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut first_frame = true;

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = self.stop_notify.notified() => break,
                _ = ticker.tick() => {}
            }
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            let frame_result = tokio::select! {
                _ = self.stop_notify.notified() => break,
                res = next_frame_with_retry(
                    source.as_mut(),
                    self.config.retry_base_delay,
                    self.config.retry_cap,
                    self.config.retry_max_attempts,
                ) => res,
            };

            match frame_result {
                Ok(mut frame) => {
                    if first_frame {
                        first_frame = false;
                        *self.state.write() = CameraState::Running;
                        self.publish_system(
                            AlertSeverity::Info,
                            "camera_started",
                            format!("Camera {} started", self.camera_id),
                        );
                    }
                    self.frame_store.persist(&mut frame).await;
                    if self.process_frame(frame).await.is_none() {
                        break;
                    }
                }
                Err(VisionError::EndOfStream) => {
                    info!(camera_id = %self.camera_id, "frame source reached end of stream");
                    break;
                }
                Err(VisionError::FrameSourceExhausted) => {
                    warn!(camera_id = %self.camera_id, "frame source retry budget exhausted, camera failed");
                    *self.state.write() = CameraState::Failed;
                    self.publish_system(
                        AlertSeverity::Warning,
                        "camera_failed",
                        format!("Camera {} failed after exhausting its retry budget", self.camera_id),
                    );
                    break;
                }
                Err(e) => {
                    warn!(camera_id = %self.camera_id, error = %e, "unexpected frame source error");
                }
            }
        }

        source.close().await;
        if *self.state.read() != CameraState::Failed {
            *self.state.write() = CameraState::Stopped;
        }
    }

    /// Returns `None` if a stop signal interrupted processing mid-tick, so
    /// `run_loop` can exit without leaving tracker state half-updated.
    async fn process_frame(&self, frame: vigil_core::Frame) -> Option<()> {
        let directives = self.registry.list_for_camera(&self.camera_id);
        self.reap_stale_state(&directives);

        let mut last_observation_summary = None;

        if directives.is_empty() {
            let obs = self.evaluate_one(None, &frame).await?;
            last_observation_summary = Some(obs.scene_description.clone());
        } else {
            for directive in &directives {
                let obs = self.evaluate_one(Some(directive), &frame).await?;
                last_observation_summary = Some(obs.scene_description.clone());
            }
        }

        let _ = self.live_feed_tx.send(LiveFeedMessage {
            camera_id: self.camera_id.clone(),
            timestamp: frame.captured_at,
            frame_base64: frame.base64.clone(),
            observation_summary: last_observation_summary.unwrap_or_default(),
        });

        Some(())
    }

    /// Runs the full per-directive pipeline (baseline retrieve/update,
    /// vision call, history append, reasoning call, decision, dispatch) for
    /// one `(camera, directive)` pair, or for the undirected case when
    /// `directive` is `None`. Returns `None` only when a stop signal raced
    /// an in-flight remote call.
    async fn evaluate_one(
        &self,
        directive: Option<&Directive>,
        frame: &vigil_core::Frame,
    ) -> Option<vigil_core::VisionObservation> {
        let requires_baseline = directive.map(|d| d.requires_baseline).unwrap_or(false);
        let directive_id = directive.map(|d| d.id);

        let pre_baseline: Option<BaselineState> = match (requires_baseline, directive_id) {
            (true, Some(id)) => self.baseline_tracker.get(&self.camera_id, id),
            _ => None,
        };

        let observation = match self.vision_client.as_ref() {
            Some(vision_client) => {
                let analyze = vision_client.analyze(frame, directive, pre_baseline.as_ref());
                let result = tokio::select! {
                    _ = self.stop_notify.notified() => return None,
                    res = analyze => res,
                };
                match result {
                    Ok(obs) => {
                        self.vision_failure_streak.store(0, Ordering::SeqCst);
                        self.remote_degraded.store(false, Ordering::SeqCst);
                        *self.last_degraded_alert_at.lock() = None;
                        obs
                    }
                    Err(VisionError::RateLimited) => {
                        self.note_vision_failure();
                        return Some(failed_observation());
                    }
                    Err(e) => {
                        warn!(camera_id = %self.camera_id, error = %e, "vision call failed, skipping frame");
                        self.note_vision_failure();
                        return Some(failed_observation());
                    }
                }
            }
            None => {
                // No vision credential configured: equivalent to every call
                // failing (spec "persistent remote" error category), but
                // without ever invoking the rate limiter.
                self.note_vision_failure();
                return Some(failed_observation());
            }
        };

        if let Some(id) = directive_id {
            self.history
                .entry(id)
                .or_insert_with(|| ObservationHistory::new(self.config.history_window))
                .push(observation.clone());
        }

        let post_baseline = match (requires_baseline, directive_id) {
            (true, Some(id)) => {
                let update = self.baseline_tracker.update(
                    &self.camera_id,
                    id,
                    &observation,
                    self.config.baseline_stability_frames,
                );
                if update.just_established {
                    self.publish_system(
                        AlertSeverity::Info,
                        "baseline_established",
                        format!(
                            "Baseline established on camera {}: \"{}\"",
                            self.camera_id, update.state.state_description
                        ),
                    );
                }
                Some(update.state)
            }
            _ => None,
        };

        let reasoning = match (directive, &self.reasoning_client) {
            (Some(d), Some(client)) => {
                let history_guard = self.history.get(&d.id);
                let empty = ObservationHistory::new(self.config.history_window);
                let history = history_guard.as_deref().unwrap_or(&empty);
                let fut = client.analyze_progression(d, post_baseline.as_ref(), &observation, history);
                let res = tokio::select! {
                    _ = self.stop_notify.notified() => return None,
                    res = fut => res,
                };
                res.ok()
            }
            _ => None,
        };

        let _ = self.analysis_tx.send(AnalysisMessage {
            camera_id: self.camera_id.clone(),
            timestamp: frame.captured_at,
            observation: observation.clone(),
        });

        let decision = self.decision_engine.decide(
            directive,
            &observation,
            post_baseline.as_ref(),
            reasoning.as_ref(),
        );

        match decision.kind {
            DecisionKind::Immediate => {
                let mut alert = Alert::new(
                    self.camera_id.clone(),
                    decision.severity.unwrap_or(AlertSeverity::Warning),
                    AlertKind::Immediate,
                    alert_title(directive, &observation),
                    observation
                        .query_details
                        .clone()
                        .unwrap_or_else(|| observation.scene_description.clone()),
                    decision.source.unwrap_or(AlertSource::Vision),
                );
                alert.confidence = decision.final_confidence;
                alert.detected_objects = observation.detected_labels();
                alert.reasons = decision.reasons.clone();
                alert.frame_url = frame.url.clone();
                alert.frame_base64 = frame.base64.clone();
                self.dispatcher.dispatch(alert);
            }
            DecisionKind::SummaryCandidate => {
                self.summary_aggregator
                    .collect(&self.camera_id, observation.clone(), frame.captured_at, frame);
            }
            DecisionKind::None => {}
        }

        Some(observation)
    }

    /// Fires `remote_degraded` once on the first run of
    /// `consecutive_failure_threshold` failures, then at most once every
    /// `DEGRADED_ALERT_REPEAT_SECS` while the stream stays degraded, so a
    /// camera stuck failing for hours doesn't flood the alerts channel with
    /// one warning per tick (spec "Persistent remote failure").
    fn note_vision_failure(&self) {
        let streak = self.vision_failure_streak.fetch_add(1, Ordering::SeqCst) + 1;
        if streak < self.config.consecutive_failure_threshold {
            return;
        }

        let now = Utc::now();
        let just_became_degraded = !self.remote_degraded.swap(true, Ordering::SeqCst);

        let should_fire = if just_became_degraded {
            true
        } else {
            let last = *self.last_degraded_alert_at.lock();
            match last {
                Some(t) => (now - t).num_seconds() >= DEGRADED_ALERT_REPEAT_SECS,
                None => true,
            }
        };

        if should_fire {
            *self.last_degraded_alert_at.lock() = Some(now);
            self.publish_system(
                AlertSeverity::Warning,
                "remote_degraded",
                format!(
                    "Vision model has failed {streak} consecutive calls on camera {}",
                    self.camera_id
                ),
            );
        }
    }

    /// Clears baseline/history state for any directive that is no longer
    /// active on this camera, surfacing the documented "BaselineTracker
    /// inconsistency" cleanup as a SYSTEM INFO alert (spec 4.11 failure
    /// semantics table).
    fn reap_stale_state(&self, active: &[Directive]) {
        let active_ids: std::collections::HashSet<Uuid> = active.iter().map(|d| d.id).collect();
        let stale: Vec<Uuid> = self
            .history
            .iter()
            .map(|e| *e.key())
            .filter(|id| !active_ids.contains(id))
            .collect();
        for id in stale {
            self.history.remove(&id);
            if self.baseline_tracker.get(&self.camera_id, id).is_some() {
                self.baseline_tracker.clear(&self.camera_id, id);
                self.publish_system(
                    AlertSeverity::Info,
                    "baseline_cleared",
                    format!(
                        "Cleared stale baseline on camera {} for a removed directive",
                        self.camera_id
                    ),
                );
            }
        }
    }

    async fn run_summary_timer(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.summary_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            tokio::select! {
                _ = self.stop_notify.notified() => break,
                _ = ticker.tick() => {}
            }
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            let window_minutes = (self.config.summary_interval.as_secs() / 60).max(1);
            if let Some(alert) = self.summary_aggregator.flush(&self.camera_id, window_minutes) {
                self.dispatcher.dispatch(alert);
            }
        }
    }

    fn publish_system(&self, severity: AlertSeverity, tag: &str, message: impl Into<String>) {
        let mut alert = Alert::new(
            self.camera_id.clone(),
            severity,
            AlertKind::System,
            tag,
            message,
            AlertSource::Override,
        );
        alert.reasons = vec![tag.to_string()];
        self.dispatcher.dispatch(alert);
    }
}

fn alert_title(directive: Option<&Directive>, observation: &vigil_core::VisionObservation) -> String {
    match directive {
        Some(d) => format!("{:?}: {}", d.kind, d.target),
        None => observation
            .activity
            .clone()
            .unwrap_or_else(|| "Notable activity detected".to_string()),
    }
}

fn failed_observation() -> vigil_core::VisionObservation {
    vigil_core::VisionObservation {
        scene_description: "Analysis failed".to_string(),
        activity: None,
        detections: Vec::new(),
        significance: 0,
        query_match: Some(false),
        query_confidence: None,
        query_details: None,
        baseline_match: Some(false),
        state_analysis: None,
        changes_detected: None,
        person_present: None,
    }
}
