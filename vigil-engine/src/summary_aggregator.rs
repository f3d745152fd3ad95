use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use vigil_core::{Alert, AlertKind, AlertSeverity, AlertSource, Frame, SummaryBucket, VisionObservation};

/// Per-camera timer-driven bucket of summary-candidate observations (spec
/// 4.8). A `CameraWorker` calls `collect` for every `SummaryCandidate`
/// decision and `flush` on its own fixed interval; the aggregator itself
/// does not own a clock or a task — it is driven externally, the same way
/// `DecisionEngine` is a pure function driven by the worker's tick loop.
#[derive(Default)]
pub struct SummaryAggregator {
    buckets: Mutex<HashMap<String, SummaryBucket>>,
}

impl SummaryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(
        &self,
        camera_id: &str,
        observation: VisionObservation,
        observed_at: DateTime<Utc>,
        frame: &Frame,
    ) {
        let mut buckets = self.buckets.lock();
        buckets
            .entry(camera_id.to_string())
            .or_insert_with(|| SummaryBucket::new(camera_id, Utc::now()))
            .collect(observation, observed_at, frame);
    }

    /// Flushes the bucket for one camera, producing a single `Alert` whose
    /// title and severity come from the peak-significance observation but
    /// whose body enumerates every collected event (spec 4.8: "title format
    /// `Activity summary (Nm) - Camera K`, body enumerating up to 5 events
    /// with compact timestamps, and union of detected objects").
    /// `window_minutes` is the configured summary interval, for the title;
    /// it has nothing to do with how long the bucket actually lived.
    /// An empty window produces nothing (spec "empty windows emit nothing").
    /// The bucket is reset regardless, whether or not it produced an alert.
    pub fn flush(&self, camera_id: &str, window_minutes: u64) -> Option<Alert> {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.remove(camera_id)?;
        if bucket.is_empty() {
            return None;
        }

        let severity = if bucket.peak_significance >= 80 {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };

        let body = bucket
            .events
            .iter()
            .map(|e| format!("{} - {}", e.timestamp.format("%H:%M:%S"), e.scene_description))
            .collect::<Vec<_>>()
            .join("\n");

        let mut alert = Alert::new(
            camera_id,
            severity,
            AlertKind::Summary,
            format!("Activity summary ({window_minutes}m) - Camera {camera_id}"),
            body,
            AlertSource::Aggregator,
        );
        alert.confidence = Some(bucket.peak_significance);
        alert.detected_objects = bucket.detected_objects.into_iter().collect();
        alert.frame_url = bucket.peak_frame_url;
        alert.frame_base64 = bucket.peak_frame_base64;
        alert.reasons = vec![format!(
            "summary_window:{}_observations",
            bucket.observations_collected
        )];
        Some(alert)
    }

    /// Discards a camera's in-progress bucket without flushing — called
    /// when a camera stops (spec: "camera stop discards the bucket without
    /// a final flush").
    pub fn discard(&self, camera_id: &str) {
        self.buckets.lock().remove(camera_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(significance: u8, desc: &str) -> VisionObservation {
        VisionObservation {
            scene_description: desc.to_string(),
            activity: None,
            detections: vec![vigil_core::Detection { label: "person".into(), confidence: 80 }],
            significance,
            query_match: None,
            query_confidence: None,
            query_details: None,
            baseline_match: None,
            state_analysis: None,
            changes_detected: None,
            person_present: None,
        }
    }

    fn frame(url: Option<&str>) -> Frame {
        Frame {
            camera_id: "cam1".to_string(),
            captured_at: Utc::now(),
            jpeg_bytes: bytes::Bytes::new(),
            url: url.map(str::to_string),
            base64: None,
            sequence_no: 0,
        }
    }

    #[test]
    fn empty_window_flushes_nothing() {
        let aggregator = SummaryAggregator::new();
        assert!(aggregator.flush("cam1", 2).is_none());
    }

    #[test]
    fn flush_emits_peak_significance_observation() {
        let aggregator = SummaryAggregator::new();
        aggregator.collect("cam1", observation(52, "a cat crossing the yard"), Utc::now(), &frame(Some("a.jpg")));
        aggregator.collect("cam1", observation(68, "a person at the gate"), Utc::now(), &frame(Some("b.jpg")));
        aggregator.collect("cam1", observation(55, "leaves blowing"), Utc::now(), &frame(Some("c.jpg")));

        let alert = aggregator.flush("cam1", 2).unwrap();
        assert_eq!(alert.confidence, Some(68));
        assert!(alert.message.contains("a person at the gate"));
        assert!(alert.message.contains("a cat crossing the yard"));
        assert!(alert.message.contains("leaves blowing"));
        assert_eq!(alert.title, "Activity summary (2m) - Camera cam1");
        assert_eq!(alert.kind, AlertKind::Summary);
        assert_eq!(alert.source, AlertSource::Aggregator);
        assert_eq!(alert.frame_url.as_deref(), Some("b.jpg"));
        assert_eq!(alert.detected_objects, vec!["person".to_string()]);
    }

    #[test]
    fn flush_resets_the_bucket() {
        let aggregator = SummaryAggregator::new();
        aggregator.collect("cam1", observation(60, "one"), Utc::now(), &frame(None));
        assert!(aggregator.flush("cam1", 2).is_some());
        assert!(aggregator.flush("cam1", 2).is_none());
    }

    #[test]
    fn discard_drops_bucket_without_alert() {
        let aggregator = SummaryAggregator::new();
        aggregator.collect("cam1", observation(60, "one"), Utc::now(), &frame(None));
        aggregator.discard("cam1");
        assert!(aggregator.flush("cam1", 2).is_none());
    }

    #[test]
    fn cameras_have_independent_buckets() {
        let aggregator = SummaryAggregator::new();
        aggregator.collect("cam1", observation(60, "cam1 event"), Utc::now(), &frame(None));
        assert!(aggregator.flush("cam2", 2).is_none());
        assert!(aggregator.flush("cam1", 2).is_some());
    }

    #[test]
    fn flush_caps_enumerated_events_at_five() {
        let aggregator = SummaryAggregator::new();
        for i in 0..7 {
            aggregator.collect(
                "cam1",
                observation(55, &format!("event {i}")),
                Utc::now(),
                &frame(None),
            );
        }
        let alert = aggregator.flush("cam1", 2).unwrap();
        assert!(!alert.message.contains("event 0"));
        assert!(!alert.message.contains("event 1"));
        assert!(alert.message.contains("event 6"));
        assert_eq!(alert.reasons, vec!["summary_window:7_observations".to_string()]);
    }
}
