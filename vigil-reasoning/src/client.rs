use crate::config::ReasoningConfig;
use crate::error::{ReasoningError, Result};
use tracing::warn;
use vigil_core::{BaselineState, Directive, ObservationHistory, ReasoningDecision, VisionObservation};
use vigil_llm::{ChatRequest, LLMManager, Message};

const SYSTEM_PROMPT: &str = "You are a surveillance reasoning analyst. You are given a monitoring \
directive, the camera's established baseline (if any), the current observation, and a short \
history of recent observations. Decide whether this sequence constitutes an event worth alerting \
on. Respond with a single JSON object only, with fields: event_occurred (bool), \
confidence_percentage (0-100 integer), reasoning (string), should_alert (bool), alert_priority \
(one of \"CRITICAL\", \"WARNING\", \"INFO\"), alert_message (string). Every field is required.";

/// Only invoked when a directive is active (spec 4.4). Unlike `VisionClient`,
/// a malformed or partial response is never safe to default — a reasoning
/// decision that silently defaults `should_alert` to `false` could suppress
/// a real event, and defaulting it to `true` could manufacture one. Either
/// way the call is `Unavailable` for that tick only; the pipeline falls back
/// to vision-only output (spec Error Handling, "Protocol" category).
pub struct ReasoningClient {
    manager: LLMManager,
}

impl ReasoningClient {
    /// Returns `None` (reported by the caller as `Unavailable` at startup)
    /// when no reasoning credential is configured — the component is then
    /// never called for the lifetime of the process (spec 4.4).
    pub fn new(config: &ReasoningConfig, api_key: Option<String>) -> Option<Self> {
        let llm_config = vigil_llm::LLMConfig {
            provider: config.provider,
            model: config.model.clone(),
            temperature: 0.1,
            max_tokens: 400,
            call_deadline_secs: config.call_deadline_secs,
            enable_caching: false,
            cache_ttl_seconds: 0,
            cache_capacity: 1,
        };
        let manager = LLMManager::new(llm_config, api_key)?;
        Some(Self { manager })
    }

    pub async fn analyze_progression(
        &self,
        directive: &Directive,
        baseline: Option<&BaselineState>,
        current: &VisionObservation,
        history: &ObservationHistory,
    ) -> Result<ReasoningDecision> {
        let prompt = build_prompt(directive, baseline, current, history);
        let request = ChatRequest {
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
            model: None,
            // Temperature bound low to favour reproducibility (spec 4.4).
            temperature: Some(0.1),
            max_tokens: Some(400),
        };

        let response = self.manager.chat(request).await?;
        parse_decision(&response.content).ok_or(ReasoningError::Unavailable)
    }
}

fn build_prompt(
    directive: &Directive,
    baseline: Option<&BaselineState>,
    current: &VisionObservation,
    history: &ObservationHistory,
) -> String {
    let mut out = format!(
        "Directive kind: {:?}\nDirective target: \"{}\"\n",
        directive.kind, directive.target
    );
    match baseline {
        Some(b) if b.established => {
            out.push_str(&format!(
                "Baseline established: \"{}\" (person_was_present={})\n",
                b.state_description, b.person_was_present
            ));
        }
        _ => out.push_str("Baseline: not established.\n"),
    }
    out.push_str(&format!(
        "Current observation: scene=\"{}\" significance={} query_confidence={:?} person_present={:?}\n",
        current.scene_description, current.significance, current.query_confidence, current.person_present
    ));
    out.push_str("Recent history (oldest first):\n");
    for (i, obs) in history.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, obs.scene_description));
    }
    out
}

fn parse_decision(raw: &str) -> Option<ReasoningDecision> {
    let json = extract_json_object(raw)?;
    match serde_json::from_str::<ReasoningDecision>(&json) {
        Ok(decision) => Some(clamp(decision)),
        Err(e) => {
            warn!(error = %e, "reasoning response failed strict parsing, call treated as unavailable");
            None
        }
    }
}

fn clamp(mut decision: ReasoningDecision) -> ReasoningDecision {
    decision.confidence_percentage = decision.confidence_percentage.min(100);
    decision
}

fn extract_json_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(raw[start..=end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::ReasoningAlertPriority;

    #[test]
    fn parses_well_formed_decision() {
        let raw = r#"{"event_occurred":true,"confidence_percentage":92,"reasoning":"person left",
            "should_alert":true,"alert_priority":"CRITICAL","alert_message":"gone"}"#;
        let decision = parse_decision(raw).unwrap();
        assert!(decision.should_alert);
        assert_eq!(decision.confidence_percentage, 92);
        assert_eq!(decision.alert_priority, ReasoningAlertPriority::Critical);
    }

    #[test]
    fn missing_required_field_is_unavailable() {
        let raw = r#"{"event_occurred":true,"confidence_percentage":92,"reasoning":"person left"}"#;
        assert!(parse_decision(raw).is_none());
    }

    #[test]
    fn non_json_response_is_unavailable() {
        assert!(parse_decision("I'm not sure, no structured answer here.").is_none());
    }

    #[test]
    fn clamps_overflowing_confidence() {
        let raw = r#"{"event_occurred":true,"confidence_percentage":250,"reasoning":"x",
            "should_alert":true,"alert_priority":"WARNING","alert_message":"x"}"#;
        let decision = parse_decision(raw).unwrap();
        assert_eq!(decision.confidence_percentage, 100);
    }
}
