use vigil_core::{
    AlertSeverity, AlertSource, BaselineState, Directive, DirectiveKind, ReasoningDecision,
    VisionObservation,
};

/// Tunables for `DecisionEngine::decide`. The hazard keyword set is a
/// configurable `Vec<String>` rather than a compiled-in constant per the
/// spec's Open Question on keyword breadth (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct DecisionEngineConfig {
    pub object_threshold: u8,
    pub activity_threshold: u8,
    pub undirected_immediate_threshold: u8,
    pub summary_collect_threshold: u8,
    pub hazard_keywords: Vec<String>,
}

impl Default for DecisionEngineConfig {
    fn default() -> Self {
        Self {
            object_threshold: 60,
            activity_threshold: 40,
            undirected_immediate_threshold: 60,
            summary_collect_threshold: 50,
            hazard_keywords: HAZARD_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

const HAZARD_KEYWORDS: &[&str] = &[
    "weapon", "gun", "knife", "violence", "fight", "attack", "threat", "dangerous", "hazard",
    "fire", "smoke", "blood", "injury", "fall", "accident", "emergency", "suspicious",
    "intruder", "break", "damage", "vandal", "unusual", "anomaly",
];

/// What kind of decision this is, for the purposes of the dispatch policy
/// downstream: an `Immediate` decision goes straight to `AlertDispatcher`; a
/// `SummaryCandidate` is handed to `SummaryAggregator`; `None` is discarded.
/// Mutually exclusive by construction (spec 4.7 invariant, Testable
/// Properties 1-2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    Immediate,
    SummaryCandidate,
    None,
}

/// Tags *why* a layer fired, distinguishing a measured confidence from an
/// asserted policy constant. Layer B's forced 95 is policy, not measurement
/// — modeling it as a distinct variant (rather than overwriting a numeric
/// confidence field that elsewhere is assumed to come from the model) is
/// what the spec's Design Notes call out explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideReason {
    HazardKeyword,
    ActivityDisappearance,
    ReasoningOverride,
    DirectiveMatch,
    UndirectedSignificance,
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub should_alert: bool,
    pub kind: DecisionKind,
    pub severity: Option<AlertSeverity>,
    pub final_confidence: Option<u8>,
    pub reasons: Vec<String>,
    pub source: Option<AlertSource>,
    pub override_reason: Option<OverrideReason>,
}

impl Decision {
    fn none() -> Self {
        Self {
            should_alert: false,
            kind: DecisionKind::None,
            severity: None,
            final_confidence: None,
            reasons: Vec::new(),
            source: None,
            override_reason: None,
        }
    }

    fn summary_candidate() -> Self {
        Self {
            kind: DecisionKind::SummaryCandidate,
            ..Self::none()
        }
    }

    fn immediate(
        severity: AlertSeverity,
        confidence: u8,
        reasons: Vec<String>,
        source: AlertSource,
        override_reason: OverrideReason,
    ) -> Self {
        Self {
            should_alert: true,
            kind: DecisionKind::Immediate,
            severity: Some(severity),
            final_confidence: Some(confidence),
            reasons,
            source: Some(source),
            override_reason: Some(override_reason),
        }
    }
}

/// Pure synchronous function: no I/O, no clock reads beyond what callers
/// pass in, no shared state. Evaluated in strict layer order; the first
/// layer that fires wins (spec 4.7).
pub struct DecisionEngine {
    config: DecisionEngineConfig,
}

impl DecisionEngine {
    pub fn new(config: DecisionEngineConfig) -> Self {
        Self { config }
    }

    pub fn decide(
        &self,
        directive: Option<&Directive>,
        observation: &VisionObservation,
        baseline: Option<&BaselineState>,
        reasoning: Option<&ReasoningDecision>,
    ) -> Decision {
        if let Some(decision) = self.layer_a_hazard_keyword(observation) {
            return decision;
        }
        if let Some(decision) = self.layer_b_activity_emergency(directive, observation, baseline) {
            return decision;
        }
        if let Some(decision) = self.layer_c_reasoning_override(observation, reasoning) {
            return decision;
        }
        if let Some(decision) = self.layer_d_directive_match(directive, observation) {
            return decision;
        }
        if let Some(decision) = self.layer_e_undirected_significance(directive, observation) {
            return decision;
        }
        self.layer_f_summary_candidacy(observation)
    }

    /// Layer A — always active, no directive required.
    fn layer_a_hazard_keyword(&self, observation: &VisionObservation) -> Option<Decision> {
        let haystack = format!(
            "{} {}",
            observation.scene_description,
            observation.activity.as_deref().unwrap_or("")
        )
        .to_lowercase();
        let tokens: std::collections::HashSet<&str> = haystack
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let hit = self
            .config
            .hazard_keywords
            .iter()
            .find(|kw| tokens.contains(kw.to_lowercase().as_str()))?;

        let confidence = observation.significance.max(60);
        Some(Decision::immediate(
            AlertSeverity::Critical,
            confidence,
            vec![format!("hazard_keyword:{hit}")],
            AlertSource::Vision,
            OverrideReason::HazardKeyword,
        ))
    }

    /// Layer B — activity-detection emergency override.
    fn layer_b_activity_emergency(
        &self,
        directive: Option<&Directive>,
        observation: &VisionObservation,
        baseline: Option<&BaselineState>,
    ) -> Option<Decision> {
        let directive = directive.filter(|d| d.kind == DirectiveKind::ActivityDetection)?;
        let baseline = baseline.filter(|b| b.established)?;
        let _ = directive;

        if !baseline.person_was_present {
            return None;
        }
        let no_person_phrase = observation
            .scene_description
            .to_lowercase()
            .contains("no person");
        let current_has_person = observation.person_present.unwrap_or(false) && !no_person_phrase;
        if current_has_person {
            return None;
        }

        Some(Decision::immediate(
            AlertSeverity::Critical,
            95,
            vec!["presence_lost_override".to_string()],
            AlertSource::Override,
            OverrideReason::ActivityDisappearance,
        ))
    }

    /// Layer C — reasoning override. The reasoning model's verdict only
    /// overrides the threshold-based layers below it when it is more
    /// confident than the vision model's own observation
    /// (`confidence_percentage > vision.query_confidence`, spec 4.7 Layer
    /// C) — otherwise a weak reasoning call could downgrade a strong
    /// Layer D vision match instead of escalating it.
    fn layer_c_reasoning_override(
        &self,
        observation: &VisionObservation,
        reasoning: Option<&ReasoningDecision>,
    ) -> Option<Decision> {
        let reasoning = reasoning?;
        if !reasoning.should_alert {
            return None;
        }
        if reasoning.confidence_percentage <= observation.query_confidence.unwrap_or(0) {
            return None;
        }
        Some(Decision::immediate(
            reasoning.alert_priority.into(),
            reasoning.confidence_percentage,
            vec!["reasoning_override".to_string()],
            AlertSource::Reasoning,
            OverrideReason::ReasoningOverride,
        ))
    }

    /// Layer D — directive match threshold. Severity depends on the
    /// directive kind, not just the threshold crossing: `ObjectDetection`
    /// escalates to CRITICAL past 80 confidence, `ActivityDetection` is
    /// always CRITICAL (an activity match is itself the significant event,
    /// not a magnitude to grade), and every other directive kind stays at
    /// WARNING (spec 4.7).
    fn layer_d_directive_match(
        &self,
        directive: Option<&Directive>,
        observation: &VisionObservation,
    ) -> Option<Decision> {
        let directive = directive?;
        let confidence = observation.query_confidence.unwrap_or(0);

        // `query_match` is only meaningful for directives that ask the vision
        // model to match a specific target; other kinds alert on confidence
        // alone (spec 4.7 Layer D, "Other directive kinds").
        let requires_match = matches!(
            directive.kind,
            DirectiveKind::ObjectDetection | DirectiveKind::ActivityDetection
        );
        if requires_match && !observation.resolved_query_match() {
            return None;
        }

        let threshold = match directive.kind {
            DirectiveKind::ActivityDetection => self.config.activity_threshold,
            _ => self.config.object_threshold,
        };
        if confidence < threshold {
            return None;
        }

        let severity = match directive.kind {
            DirectiveKind::ActivityDetection => AlertSeverity::Critical,
            DirectiveKind::ObjectDetection if confidence >= 80 => AlertSeverity::Critical,
            _ => AlertSeverity::Warning,
        };

        Some(Decision::immediate(
            severity,
            confidence,
            vec![format!("directive_match:{:?}", directive.kind)],
            AlertSource::Vision,
            OverrideReason::DirectiveMatch,
        ))
    }

    /// Layer E — undirected significance.
    fn layer_e_undirected_significance(
        &self,
        directive: Option<&Directive>,
        observation: &VisionObservation,
    ) -> Option<Decision> {
        if directive.is_some() {
            return None;
        }
        if observation.significance < self.config.undirected_immediate_threshold {
            return None;
        }
        let severity = if observation.significance >= 80 {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        Some(Decision::immediate(
            severity,
            observation.significance,
            vec!["undirected_significance".to_string()],
            AlertSource::Vision,
            OverrideReason::UndirectedSignificance,
        ))
    }

    /// Layer F — summary candidacy. Always returns `Some`: this is the
    /// terminal layer.
    fn layer_f_summary_candidacy(&self, observation: &VisionObservation) -> Decision {
        if observation.significance >= self.config.summary_collect_threshold {
            Decision::summary_candidate()
        } else {
            Decision::none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{CameraScope, Detection, ReasoningAlertPriority};

    fn obs(significance: u8) -> VisionObservation {
        VisionObservation {
            scene_description: "a quiet porch".to_string(),
            activity: None,
            detections: vec![],
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

    fn engine() -> DecisionEngine {
        DecisionEngine::new(DecisionEngineConfig::default())
    }

    // S1 — Hazard keyword, no directive.
    #[test]
    fn s1_hazard_keyword_overrides_everything() {
        let observation = VisionObservation {
            scene_description: "man holding knife near counter".to_string(),
            detections: vec![Detection {
                label: "knife".to_string(),
                confidence: 70,
            }],
            significance: 35,
            ..obs(35)
        };
        let decision = engine().decide(None, &observation, None, None);
        assert!(decision.should_alert);
        assert_eq!(decision.kind, DecisionKind::Immediate);
        assert_eq!(decision.severity, Some(AlertSeverity::Critical));
        assert!(decision.final_confidence.unwrap() >= 60);
        assert!(decision.reasons.contains(&"hazard_keyword:knife".to_string()));
    }

    // S2 — Activity detection, person leaves.
    #[test]
    fn s2_activity_disappearance_forces_95() {
        let directive = Directive::new(
            DirectiveKind::ActivityDetection,
            "alert when person leaves",
            CameraScope::All,
        );
        let baseline = BaselineState {
            established: true,
            state_description: "person seated in chair".to_string(),
            person_was_present: true,
            established_at: Some(chrono::Utc::now()),
            consistency_counter: 3,
        };
        let observation = VisionObservation {
            scene_description: "empty chair, no person visible".to_string(),
            significance: 40,
            query_match: Some(false),
            query_confidence: Some(40),
            person_present: Some(false),
            ..obs(40)
        };
        let decision = engine().decide(Some(&directive), &observation, Some(&baseline), None);
        assert!(decision.should_alert);
        assert_eq!(decision.severity, Some(AlertSeverity::Critical));
        assert_eq!(decision.final_confidence, Some(95));
        assert!(decision.reasons.contains(&"presence_lost_override".to_string()));
        assert_eq!(decision.override_reason, Some(OverrideReason::ActivityDisappearance));
    }

    // S3 — Object detection, match below threshold.
    #[test]
    fn s3_below_threshold_object_match_falls_through() {
        let directive = Directive::new(DirectiveKind::ObjectDetection, "scissors", CameraScope::All);
        let observation = VisionObservation {
            query_match: Some(true),
            query_confidence: Some(55),
            significance: 40,
            ..obs(40)
        };
        let decision = engine().decide(Some(&directive), &observation, None, None);
        assert!(!decision.should_alert);
        assert_eq!(decision.kind, DecisionKind::None);
    }

    // S4 — Summary window candidacy.
    #[test]
    fn s4_significances_below_immediate_are_summary_candidates() {
        for significance in [52, 58, 54, 50] {
            let decision = engine().decide(None, &obs(significance), None, None);
            assert!(!decision.should_alert);
            assert_eq!(decision.kind, DecisionKind::SummaryCandidate);
        }
    }

    // S6 — Reasoning overrides low vision confidence.
    #[test]
    fn s6_reasoning_override_wins_over_low_vision_confidence() {
        let directive = Directive::new(DirectiveKind::ActivityDetection, "x", CameraScope::All);
        let observation = VisionObservation {
            query_confidence: Some(30),
            significance: 30,
            ..obs(30)
        };
        let reasoning = ReasoningDecision {
            event_occurred: true,
            confidence_percentage: 92,
            reasoning: "strong evidence".to_string(),
            should_alert: true,
            alert_priority: ReasoningAlertPriority::Critical,
            alert_message: "event".to_string(),
        };
        let decision = engine().decide(Some(&directive), &observation, None, Some(&reasoning));
        assert!(decision.should_alert);
        assert_eq!(decision.source, Some(AlertSource::Reasoning));
        assert_eq!(decision.final_confidence, Some(92));
    }

    #[test]
    fn reasoning_should_alert_false_does_not_fire_layer_c() {
        let observation = VisionObservation {
            query_confidence: Some(95),
            ..obs(30)
        };
        let reasoning = ReasoningDecision {
            event_occurred: false,
            confidence_percentage: 90,
            reasoning: "nothing notable".to_string(),
            should_alert: false,
            alert_priority: ReasoningAlertPriority::Info,
            alert_message: "".to_string(),
        };
        let decision = engine().decide(None, &observation, None, Some(&reasoning));
        // Layer C doesn't fire (should_alert is false); falls through to
        // Layer E using significance 30, which is below the undirected
        // threshold.
        assert_ne!(decision.source, Some(AlertSource::Reasoning));
        assert!(!decision.should_alert);
    }

    #[test]
    fn weak_reasoning_does_not_downgrade_a_stronger_layer_d_match() {
        let directive = Directive::new(DirectiveKind::ObjectDetection, "knife", CameraScope::All);
        let observation = VisionObservation {
            query_match: Some(true),
            query_confidence: Some(90),
            significance: 90,
            ..obs(90)
        };
        let reasoning = ReasoningDecision {
            event_occurred: true,
            confidence_percentage: 50,
            reasoning: "weak corroboration".to_string(),
            should_alert: true,
            alert_priority: ReasoningAlertPriority::Info,
            alert_message: "event".to_string(),
        };
        let decision = engine().decide(Some(&directive), &observation, None, Some(&reasoning));
        assert!(decision.should_alert);
        assert_eq!(decision.source, Some(AlertSource::Vision));
        assert_eq!(decision.severity, Some(AlertSeverity::Critical));
        assert_eq!(decision.final_confidence, Some(90));
    }

    #[test]
    fn reasoning_confidence_equal_to_vision_confidence_does_not_override() {
        let observation = VisionObservation {
            query_confidence: Some(70),
            significance: 30,
            ..obs(30)
        };
        let reasoning = ReasoningDecision {
            event_occurred: true,
            confidence_percentage: 70,
            reasoning: "same confidence".to_string(),
            should_alert: true,
            alert_priority: ReasoningAlertPriority::Critical,
            alert_message: "event".to_string(),
        };
        let decision = engine().decide(None, &observation, None, Some(&reasoning));
        assert_ne!(decision.source, Some(AlertSource::Reasoning));
    }

    #[test]
    fn other_directive_kind_alerts_without_query_match_when_confidence_clears_threshold() {
        let directive = Directive::new(DirectiveKind::Surveillance, "perimeter", CameraScope::All);
        let observation = VisionObservation {
            query_match: Some(false),
            query_confidence: Some(75),
            significance: 75,
            ..obs(75)
        };
        let decision = engine().decide(Some(&directive), &observation, None, None);
        assert!(decision.should_alert);
        assert_eq!(decision.severity, Some(AlertSeverity::Warning));
        assert_eq!(decision.source, Some(AlertSource::Vision));
        assert_eq!(decision.override_reason, Some(OverrideReason::DirectiveMatch));
    }

    #[test]
    fn other_directive_kind_with_no_query_match_field_still_alerts_on_confidence() {
        let directive = Directive::new(DirectiveKind::Anomaly, "perimeter", CameraScope::All);
        let observation = VisionObservation {
            query_match: None,
            query_confidence: Some(65),
            significance: 65,
            ..obs(65)
        };
        let decision = engine().decide(Some(&directive), &observation, None, None);
        assert!(decision.should_alert);
        assert_eq!(decision.severity, Some(AlertSeverity::Warning));
    }

    #[test]
    fn boundary_significance_59_no_alert() {
        let decision = engine().decide(None, &obs(59), None, None);
        assert!(!decision.should_alert);
    }

    #[test]
    fn boundary_significance_60_warning() {
        let decision = engine().decide(None, &obs(60), None, None);
        assert!(decision.should_alert);
        assert_eq!(decision.severity, Some(AlertSeverity::Warning));
    }

    #[test]
    fn boundary_significance_80_critical() {
        let decision = engine().decide(None, &obs(80), None, None);
        assert!(decision.should_alert);
        assert_eq!(decision.severity, Some(AlertSeverity::Critical));
    }

    #[test]
    fn boundary_activity_confidence_exactly_40_matches() {
        let directive = Directive::new(DirectiveKind::ActivityDetection, "x", CameraScope::All);
        let observation = VisionObservation {
            query_match: Some(true),
            query_confidence: Some(40),
            ..obs(10)
        };
        let decision = engine().decide(Some(&directive), &observation, None, None);
        assert!(decision.should_alert);
        // activity_detection is always CRITICAL, regardless of confidence magnitude.
        assert_eq!(decision.severity, Some(AlertSeverity::Critical));
    }

    #[test]
    fn object_directive_below_80_stays_warning() {
        let directive = Directive::new(DirectiveKind::ObjectDetection, "x", CameraScope::All);
        let observation = VisionObservation {
            query_match: Some(true),
            query_confidence: Some(75),
            ..obs(10)
        };
        let decision = engine().decide(Some(&directive), &observation, None, None);
        assert!(decision.should_alert);
        assert_eq!(decision.severity, Some(AlertSeverity::Warning));
    }

    #[test]
    fn object_directive_at_80_escalates_to_critical() {
        let directive = Directive::new(DirectiveKind::ObjectDetection, "x", CameraScope::All);
        let observation = VisionObservation {
            query_match: Some(true),
            query_confidence: Some(80),
            ..obs(10)
        };
        let decision = engine().decide(Some(&directive), &observation, None, None);
        assert!(decision.should_alert);
        assert_eq!(decision.severity, Some(AlertSeverity::Critical));
    }

    #[test]
    fn other_directive_kind_stays_warning_regardless_of_confidence() {
        let directive = Directive::new(DirectiveKind::Surveillance, "x", CameraScope::All);
        let observation = VisionObservation {
            query_match: Some(true),
            query_confidence: Some(99),
            ..obs(10)
        };
        let decision = engine().decide(Some(&directive), &observation, None, None);
        assert!(decision.should_alert);
        assert_eq!(decision.severity, Some(AlertSeverity::Warning));
    }

    #[test]
    fn boundary_activity_confidence_39_no_match() {
        let directive = Directive::new(DirectiveKind::ActivityDetection, "x", CameraScope::All);
        let observation = VisionObservation {
            query_match: Some(true),
            query_confidence: Some(39),
            ..obs(10)
        };
        let decision = engine().decide(Some(&directive), &observation, None, None);
        assert!(!decision.should_alert);
    }

    #[test]
    fn boundary_activity_confidence_39_with_person_present_no_alert() {
        let directive = Directive::new(DirectiveKind::ActivityDetection, "x", CameraScope::All);
        let baseline = BaselineState {
            established: true,
            state_description: "person seated".to_string(),
            person_was_present: true,
            established_at: Some(chrono::Utc::now()),
            consistency_counter: 3,
        };
        let observation = VisionObservation {
            query_match: Some(false),
            query_confidence: Some(39),
            person_present: Some(true),
            significance: 20,
            ..obs(20)
        };
        let decision = engine().decide(Some(&directive), &observation, Some(&baseline), None);
        assert!(!decision.should_alert);
    }

    #[test]
    fn invariant_should_alert_implies_immediate() {
        let decision = engine().decide(None, &obs(80), None, None);
        assert!(decision.should_alert);
        assert_eq!(decision.kind, DecisionKind::Immediate);
    }

    #[test]
    fn invariant_summary_candidate_implies_not_should_alert() {
        let decision = engine().decide(None, &obs(55), None, None);
        assert_eq!(decision.kind, DecisionKind::SummaryCandidate);
        assert!(!decision.should_alert);
    }
}
