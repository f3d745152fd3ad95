use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use uuid::Uuid;

/// The kind of thing an operator has asked Vigil to watch for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    ObjectDetection,
    ActivityDetection,
    Surveillance,
    SceneAnalysis,
    Anomaly,
    Tracking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraScope {
    Single(String),
    All,
}

impl CameraScope {
    pub fn applies_to(&self, camera_id: &str) -> bool {
        match self {
            CameraScope::Single(id) => id == camera_id,
            CameraScope::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveStatus {
    Active,
    Paused,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub id: Uuid,
    pub kind: DirectiveKind,
    pub target: String,
    pub requires_baseline: bool,
    pub camera_scope: CameraScope,
    pub created_at: DateTime<Utc>,
    pub status: DirectiveStatus,
}

impl Directive {
    pub fn new(kind: DirectiveKind, target: impl Into<String>, camera_scope: CameraScope) -> Self {
        let requires_baseline = matches!(
            kind,
            DirectiveKind::ActivityDetection | DirectiveKind::Anomaly | DirectiveKind::Surveillance
        );
        Self {
            id: Uuid::new_v4(),
            kind,
            target: target.into(),
            requires_baseline,
            camera_scope,
            created_at: Utc::now(),
            status: DirectiveStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, DirectiveStatus::Active)
    }
}

/// One captured frame from a camera. `jpeg_bytes` is the canonical payload;
/// `url`/`base64` are populated once the frame has been persisted or encoded.
#[derive(Debug, Clone)]
pub struct Frame {
    pub camera_id: String,
    pub captured_at: DateTime<Utc>,
    pub jpeg_bytes: Bytes,
    pub url: Option<String>,
    pub base64: Option<String>,
    pub sequence_no: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: u8,
}

/// What the vision model reported about one frame. Every optional field is
/// genuinely optional on the wire — a model's response may omit any of
/// them, and defensive parsing at the call site fills a `None` rather than
/// failing the whole call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionObservation {
    pub scene_description: String,
    pub activity: Option<String>,
    #[serde(default)]
    pub detections: Vec<Detection>,
    pub significance: u8,
    pub query_match: Option<bool>,
    pub query_confidence: Option<u8>,
    pub query_details: Option<String>,
    pub baseline_match: Option<bool>,
    pub state_analysis: Option<String>,
    pub changes_detected: Option<Vec<String>>,
    pub person_present: Option<bool>,
}

impl VisionObservation {
    /// True if the directive-match tie-break rule resolves to a match:
    /// an explicit `query_match` wins; absent that, confidence >= 50 counts.
    pub fn resolved_query_match(&self) -> bool {
        match self.query_match {
            Some(m) => m,
            None => self.query_confidence.unwrap_or(0) >= 50,
        }
    }

    pub fn detected_labels(&self) -> Vec<String> {
        self.detections.iter().map(|d| d.label.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct BaselineState {
    pub established: bool,
    pub state_description: String,
    pub person_was_present: bool,
    pub established_at: Option<DateTime<Utc>>,
    pub consistency_counter: u32,
}

impl Default for BaselineState {
    fn default() -> Self {
        Self {
            established: false,
            state_description: String::new(),
            person_was_present: false,
            established_at: None,
            consistency_counter: 0,
        }
    }
}

/// Bounded rolling window of recent observations for one camera.
#[derive(Debug, Clone)]
pub struct ObservationHistory {
    capacity: usize,
    entries: VecDeque<VisionObservation>,
}

impl ObservationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, observation: VisionObservation) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(observation);
    }

    pub fn latest(&self) -> Option<&VisionObservation> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VisionObservation> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Immediate,
    Summary,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    Vision,
    Reasoning,
    Override,
    Aggregator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub camera_id: String,
    pub severity: AlertSeverity,
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub confidence: Option<u8>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub detected_objects: Vec<String>,
    pub frame_url: Option<String>,
    pub frame_base64: Option<String>,
    #[serde(default)]
    pub reasons: Vec<String>,
    pub source: AlertSource,
    #[serde(default)]
    pub acknowledged: bool,
}

impl Alert {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera_id: impl Into<String>,
        severity: AlertSeverity,
        kind: AlertKind,
        title: impl Into<String>,
        message: impl Into<String>,
        source: AlertSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            camera_id: camera_id.into(),
            severity,
            kind,
            title: title.into(),
            message: message.into(),
            confidence: None,
            timestamp: Utc::now(),
            detected_objects: Vec::new(),
            frame_url: None,
            frame_base64: None,
            reasons: Vec::new(),
            source,
            acknowledged: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReasoningAlertPriority {
    Critical,
    Warning,
    Info,
}

impl From<ReasoningAlertPriority> for AlertSeverity {
    fn from(p: ReasoningAlertPriority) -> Self {
        match p {
            ReasoningAlertPriority::Critical => AlertSeverity::Critical,
            ReasoningAlertPriority::Warning => AlertSeverity::Warning,
            ReasoningAlertPriority::Info => AlertSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningDecision {
    pub event_occurred: bool,
    pub confidence_percentage: u8,
    pub reasoning: String,
    pub should_alert: bool,
    pub alert_priority: ReasoningAlertPriority,
    pub alert_message: String,
}

/// A single collected observation's contribution to a summary body: just
/// enough to print one line ("14:32:05 - a person was seen near the
/// entrance") without retaining the full `VisionObservation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEvent {
    pub timestamp: DateTime<Utc>,
    pub scene_description: String,
    pub significance: u8,
}

/// The body enumerates at most this many events (spec 4.8); older ones are
/// dropped as new ones arrive, oldest-first.
pub const SUMMARY_MAX_EVENTS: usize = 5;

#[derive(Debug, Clone)]
pub struct SummaryBucket {
    pub camera_id: String,
    pub window_start: DateTime<Utc>,
    pub observations_collected: u32,
    pub peak_significance: u8,
    pub peak_observation: Option<VisionObservation>,
    pub peak_frame_url: Option<String>,
    pub peak_frame_base64: Option<String>,
    pub events: VecDeque<SummaryEvent>,
    pub detected_objects: BTreeSet<String>,
}

impl SummaryBucket {
    pub fn new(camera_id: impl Into<String>, window_start: DateTime<Utc>) -> Self {
        Self {
            camera_id: camera_id.into(),
            window_start,
            observations_collected: 0,
            peak_significance: 0,
            peak_observation: None,
            peak_frame_url: None,
            peak_frame_base64: None,
            events: VecDeque::new(),
            detected_objects: BTreeSet::new(),
        }
    }

    /// `timestamp` is the frame's capture time, not wall-clock now — the
    /// summary body's timestamps should reflect when the event was actually
    /// seen, not when the bucket happened to get flushed.
    pub fn collect(&mut self, observation: VisionObservation, timestamp: DateTime<Utc>, frame: &Frame) {
        self.observations_collected += 1;
        for detection in &observation.detections {
            self.detected_objects.insert(detection.label.clone());
        }

        self.events.push_back(SummaryEvent {
            timestamp,
            scene_description: observation.scene_description.clone(),
            significance: observation.significance,
        });
        while self.events.len() > SUMMARY_MAX_EVENTS {
            self.events.pop_front();
        }

        if observation.significance >= self.peak_significance || self.peak_observation.is_none() {
            self.peak_significance = observation.significance;
            self.peak_frame_url = frame.url.clone();
            self.peak_frame_base64 = frame.base64.clone();
            self.peak_observation = Some(observation);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.observations_collected == 0
    }
}

/// One tick's worth of data for the `live-feed` push channel: a frame plus
/// a short prose summary of what the vision model saw, so UI clients can
/// render a live thumbnail without separately joining the `analysis`
/// stream (spec 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveFeedMessage {
    pub camera_id: String,
    pub timestamp: DateTime<Utc>,
    pub frame_base64: Option<String>,
    pub observation_summary: String,
}

/// One `VisionObservation`, addressed to a camera and a point in time, for
/// the `analysis` push channel (spec 6). `VisionObservation` itself has no
/// camera/time fields since it is also used as plain analysis input inside
/// the pipeline; this wrapper only exists at the wire boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMessage {
    pub camera_id: String,
    pub timestamp: DateTime<Utc>,
    pub observation: VisionObservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl std::fmt::Display for CameraState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CameraState::Stopped => "STOPPED",
            CameraState::Starting => "STARTING",
            CameraState::Running => "RUNNING",
            CameraState::Stopping => "STOPPING",
            CameraState::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStatus {
    pub camera_id: String,
    pub state: CameraState,
    pub auto_started: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_match_tie_break_uses_confidence_when_omitted() {
        let obs = VisionObservation {
            scene_description: "a porch".into(),
            activity: None,
            detections: vec![],
            significance: 10,
            query_match: None,
            query_confidence: Some(50),
            query_details: None,
            baseline_match: None,
            state_analysis: None,
            changes_detected: None,
            person_present: None,
        };
        assert!(obs.resolved_query_match());
    }

    #[test]
    fn query_match_tie_break_below_fifty_is_no_match() {
        let obs = VisionObservation {
            scene_description: "a porch".into(),
            activity: None,
            detections: vec![],
            significance: 10,
            query_match: None,
            query_confidence: Some(49),
            query_details: None,
            baseline_match: None,
            state_analysis: None,
            changes_detected: None,
            person_present: None,
        };
        assert!(!obs.resolved_query_match());
    }

    #[test]
    fn explicit_query_match_wins_over_confidence() {
        let obs = VisionObservation {
            scene_description: "a porch".into(),
            activity: None,
            detections: vec![],
            significance: 10,
            query_match: Some(false),
            query_confidence: Some(99),
            query_details: None,
            baseline_match: None,
            state_analysis: None,
            changes_detected: None,
            person_present: None,
        };
        assert!(!obs.resolved_query_match());
    }

    #[test]
    fn observation_history_drops_oldest_beyond_capacity() {
        let mut history = ObservationHistory::new(2);
        for i in 0..3u8 {
            history.push(VisionObservation {
                scene_description: format!("frame {i}"),
                activity: None,
                detections: vec![],
                significance: i,
                query_match: None,
                query_confidence: None,
                query_details: None,
                baseline_match: None,
                state_analysis: None,
                changes_detected: None,
                person_present: None,
            });
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().unwrap().significance, 2);
    }

    fn test_frame(url: Option<&str>, base64: Option<&str>) -> Frame {
        Frame {
            camera_id: "cam1".to_string(),
            captured_at: Utc::now(),
            jpeg_bytes: Bytes::new(),
            url: url.map(str::to_string),
            base64: base64.map(str::to_string),
            sequence_no: 0,
        }
    }

    #[test]
    fn summary_bucket_tracks_peak_significance() {
        let mut bucket = SummaryBucket::new("cam1", Utc::now());
        bucket.collect(
            VisionObservation {
                scene_description: "a".into(),
                activity: None,
                detections: vec![Detection { label: "person".into(), confidence: 80 }],
                significance: 55,
                query_match: None,
                query_confidence: None,
                query_details: None,
                baseline_match: None,
                state_analysis: None,
                changes_detected: None,
                person_present: None,
            },
            Utc::now(),
            &test_frame(Some("http://example/a.jpg"), None),
        );
        bucket.collect(
            VisionObservation {
                scene_description: "b".into(),
                activity: None,
                detections: vec![Detection { label: "dog".into(), confidence: 80 }],
                significance: 70,
                query_match: None,
                query_confidence: None,
                query_details: None,
                baseline_match: None,
                state_analysis: None,
                changes_detected: None,
                person_present: None,
            },
            Utc::now(),
            &test_frame(Some("http://example/b.jpg"), None),
        );
        assert_eq!(bucket.observations_collected, 2);
        assert_eq!(bucket.peak_significance, 70);
        assert_eq!(
            bucket.peak_observation.unwrap().scene_description,
            "b".to_string()
        );
        assert_eq!(bucket.peak_frame_url.as_deref(), Some("http://example/b.jpg"));
        assert_eq!(bucket.events.len(), 2);
        assert!(bucket.detected_objects.contains("person"));
        assert!(bucket.detected_objects.contains("dog"));
    }

    #[test]
    fn summary_bucket_caps_events_at_five() {
        let mut bucket = SummaryBucket::new("cam1", Utc::now());
        for i in 0..8 {
            bucket.collect(
                VisionObservation {
                    scene_description: format!("event {i}"),
                    activity: None,
                    detections: vec![],
                    significance: 10,
                    query_match: None,
                    query_confidence: None,
                    query_details: None,
                    baseline_match: None,
                    state_analysis: None,
                    changes_detected: None,
                    person_present: None,
                },
                Utc::now(),
                &test_frame(None, None),
            );
        }
        assert_eq!(bucket.observations_collected, 8);
        assert_eq!(bucket.events.len(), SUMMARY_MAX_EVENTS);
        assert_eq!(bucket.events.front().unwrap().scene_description, "event 3");
        assert_eq!(bucket.events.back().unwrap().scene_description, "event 7");
    }

    #[test]
    fn camera_scope_applies_to() {
        assert!(CameraScope::All.applies_to("anything"));
        assert!(CameraScope::Single("cam1".into()).applies_to("cam1"));
        assert!(!CameraScope::Single("cam1".into()).applies_to("cam2"));
    }
}
