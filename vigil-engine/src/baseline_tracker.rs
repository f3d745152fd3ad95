use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use uuid::Uuid;
use vigil_core::{BaselineState, VisionObservation};

/// Per-(camera, directive) "what does normal look like" memory. Owned by
/// exactly one `CameraWorker` in practice (spec 5), but implemented as a
/// keyed map so one worker can track baselines for several simultaneously
/// active directives on its camera without a baseline per directive leaking
/// into another camera's state.
#[derive(Default)]
pub struct BaselineTracker {
    states: DashMap<(String, Uuid), BaselineState>,
}

pub struct BaselineUpdate {
    pub state: BaselineState,
    pub just_established: bool,
}

impl BaselineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, camera_id: &str, directive_id: Uuid) -> Option<BaselineState> {
        self.states
            .get(&(camera_id.to_string(), directive_id))
            .map(|s| s.clone())
    }

    /// Destroys tracked state for a (camera, directive) pair — called when
    /// the directive is removed or the camera stops (spec "BaselineState
    /// lifecycle").
    pub fn clear(&self, camera_id: &str, directive_id: Uuid) {
        self.states.remove(&(camera_id.to_string(), directive_id));
    }

    /// Folds one observation into the forming or established baseline.
    /// Two observations are "consistent" when their normalized token sets
    /// have Jaccard overlap >= 0.6 and `person_present` agrees (spec 4.6).
    /// Returns the resulting state and whether this call is the one that
    /// just crossed the stability threshold.
    pub fn update(
        &self,
        camera_id: &str,
        directive_id: Uuid,
        observation: &VisionObservation,
        stability_frames: u32,
    ) -> BaselineUpdate {
        let key = (camera_id.to_string(), directive_id);
        let mut entry = self.states.entry(key).or_insert_with(BaselineState::default);

        if entry.established {
            // Established baselines never auto-change; only explicit
            // removal (via `clear`) destroys them (spec 4.6).
            return BaselineUpdate {
                state: entry.clone(),
                just_established: false,
            };
        }

        let person_present = observation.person_present.unwrap_or(false);
        let consistent = entry.consistency_counter > 0
            && is_consistent(&entry.state_description, entry.person_was_present, observation);

        if consistent {
            entry.consistency_counter += 1;
        } else {
            entry.state_description = observation.scene_description.clone();
            entry.person_was_present = person_present;
            entry.consistency_counter = 1;
        }

        let mut just_established = false;
        if entry.consistency_counter >= stability_frames {
            entry.established = true;
            entry.established_at = Some(Utc::now());
            just_established = true;
        }

        BaselineUpdate {
            state: entry.clone(),
            just_established,
        }
    }
}

fn is_consistent(baseline_description: &str, baseline_person: bool, observation: &VisionObservation) -> bool {
    let person_present = observation.person_present.unwrap_or(false);
    if person_present != baseline_person {
        return false;
    }
    jaccard_overlap(baseline_description, &observation.scene_description) >= 0.6
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn jaccard_overlap(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(desc: &str, person_present: bool) -> VisionObservation {
        VisionObservation {
            scene_description: desc.to_string(),
            activity: None,
            detections: vec![],
            significance: 10,
            query_match: None,
            query_confidence: None,
            query_details: None,
            baseline_match: None,
            state_analysis: None,
            changes_detected: None,
            person_present: Some(person_present),
        }
    }

    #[test]
    fn establishes_after_stability_frames() {
        let tracker = BaselineTracker::new();
        let camera = "cam1";
        let directive = Uuid::new_v4();

        let u1 = tracker.update(camera, directive, &observation("person seated in chair", true), 3);
        assert!(!u1.state.established);
        let u2 = tracker.update(camera, directive, &observation("person seated in a chair", true), 3);
        assert!(!u2.state.established);
        let u3 = tracker.update(camera, directive, &observation("a person seated in the chair", true), 3);
        assert!(u3.state.established);
        assert!(u3.just_established);
        assert!(u3.state.person_was_present);
    }

    #[test]
    fn inconsistent_observation_resets_counter_before_establishment() {
        let tracker = BaselineTracker::new();
        let camera = "cam1";
        let directive = Uuid::new_v4();

        tracker.update(camera, directive, &observation("person seated in chair", true), 3);
        tracker.update(camera, directive, &observation("completely different scene entirely", false), 3);
        let u = tracker.update(camera, directive, &observation("completely different scene again", false), 3);
        assert!(!u.state.established);
        assert_eq!(u.state.consistency_counter, 2);
    }

    #[test]
    fn established_baseline_does_not_auto_change() {
        let tracker = BaselineTracker::new();
        let camera = "cam1";
        let directive = Uuid::new_v4();
        for _ in 0..3 {
            tracker.update(camera, directive, &observation("person seated in chair", true), 3);
        }
        let established = tracker.get(camera, directive).unwrap();
        assert!(established.established);

        let after = tracker.update(camera, directive, &observation("empty room, no person visible", false), 3);
        assert_eq!(after.state.state_description, established.state_description);
        assert!(after.state.person_was_present);
    }

    #[test]
    fn clear_destroys_tracked_state() {
        let tracker = BaselineTracker::new();
        let camera = "cam1";
        let directive = Uuid::new_v4();
        tracker.update(camera, directive, &observation("a scene", true), 3);
        assert!(tracker.get(camera, directive).is_some());
        tracker.clear(camera, directive);
        assert!(tracker.get(camera, directive).is_none());
    }
}
