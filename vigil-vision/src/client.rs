use crate::config::VisionConfig;
use crate::error::{Result, VisionError};
use crate::rate_limiter::RateLimiter;
use serde::Deserialize;
use tracing::{debug, warn};
use vigil_core::{BaselineState, Detection, Directive, Frame, VisionObservation};
use vigil_llm::{ChatRequest, LLMManager, Message};

const SYSTEM_PROMPT: &str = "You are a surveillance vision analyst. Describe the scene in the \
attached frame and respond with a single JSON object only. Fields: scene_description (string), \
activity (string), detections (array of {label, confidence 0-1}), significance (0-100 integer, \
how noteworthy this frame is). If a monitoring target is given, also include query_match (bool), \
query_confidence (0-100), query_details (string). If a baseline description is given, also \
include baseline_match (bool), state_analysis (string), changes_detected (array of strings), \
person_present (bool).";

/// Wraps the external vision model. Defensive by construction: a malformed
/// or partial response degrades to a low-significance observation rather
/// than failing the tick (spec 4.3, Design Notes "Dynamic JSON from
/// models").
pub struct VisionClient {
    manager: LLMManager,
    limiter: RateLimiter,
}

/// Mirrors the wire shape the model is asked to produce, but every field is
/// optional so a partial response still parses. `#[serde(default)]` fills
/// the rest; an entirely malformed document fails struct-level parsing and
/// is handled by `analyze`'s fallback path instead.
#[derive(Debug, Deserialize, Default)]
struct RawObservation {
    scene_description: Option<String>,
    activity: Option<String>,
    #[serde(default)]
    detections: Vec<RawDetection>,
    significance: Option<i64>,
    query_match: Option<bool>,
    query_confidence: Option<i64>,
    query_details: Option<String>,
    baseline_match: Option<bool>,
    state_analysis: Option<String>,
    changes_detected: Option<Vec<String>>,
    person_present: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    label: Option<String>,
    confidence: Option<f64>,
}

impl VisionClient {
    pub fn new(config: &VisionConfig, api_key: Option<String>) -> Option<Self> {
        let llm_config = vigil_llm::LLMConfig {
            provider: config.provider,
            model: config.model.clone(),
            temperature: 0.2,
            max_tokens: 512,
            call_deadline_secs: config.call_deadline_secs,
            enable_caching: config.enable_caching,
            cache_ttl_seconds: 30,
            cache_capacity: 256,
        };
        let manager = LLMManager::new(llm_config, api_key)?;
        Some(Self {
            manager,
            limiter: RateLimiter::new(config.rate_limit_per_minute),
        })
    }

    pub async fn analyze(
        &self,
        frame: &Frame,
        directive: Option<&Directive>,
        baseline: Option<&BaselineState>,
    ) -> Result<VisionObservation> {
        if !self.limiter.try_acquire() {
            return Err(VisionError::RateLimited);
        }

        let mut prompt = String::from("Analyze the attached frame.");
        if let Some(directive) = directive {
            prompt.push_str(&format!(
                "\nMonitoring target: \"{}\" (directive kind: {:?}).",
                directive.target, directive.kind
            ));
        }
        if let Some(baseline) = baseline.filter(|b| b.established) {
            prompt.push_str(&format!(
                "\nEstablished baseline description: \"{}\". person_was_present={}.",
                baseline.state_description, baseline.person_was_present
            ));
        }
        prompt.push_str(&format!(
            "\n[Frame data omitted from prompt: {} bytes of JPEG for camera {}]",
            frame.jpeg_bytes.len(),
            frame.camera_id
        ));

        let request = ChatRequest {
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
            model: None,
            temperature: Some(0.2),
            max_tokens: Some(512),
        };

        let response = self.manager.chat(request).await?;
        Ok(parse_observation(&response.content))
    }
}

/// Parses a vision model response tolerant of surrounding prose and trailing
/// commas. Never errors: a response that cannot be salvaged at all produces
/// the documented "Analysis failed" fallback observation (spec 4.3).
fn parse_observation(raw: &str) -> VisionObservation {
    match extract_json_object(raw).and_then(|json| serde_json::from_str::<RawObservation>(&json).ok()) {
        Some(raw_obs) => from_raw(raw_obs),
        None => {
            warn!("vision response could not be parsed as JSON, using failure fallback");
            failed_observation()
        }
    }
}

/// Finds the outermost `{...}` span in `raw` (tolerating leading/trailing
/// prose the model added around the JSON) and strips trailing commas before
/// the closing `}`/`]` of each object/array, which some models emit.
fn extract_json_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = &raw[start..=end];
    Some(strip_trailing_commas(candidate))
}

fn strip_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

fn from_raw(raw: RawObservation) -> VisionObservation {
    let significance = raw
        .significance
        .map(|s| s.clamp(0, 100) as u8)
        .unwrap_or(0);

    let query_confidence = raw.query_confidence.map(|c| c.clamp(0, 100) as u8);
    // Tie-break: if the model reported confidence but omitted the match
    // flag outright, resolve it now so downstream code always sees an
    // explicit value (spec 4.3 tie-break policy).
    let query_match = raw
        .query_match
        .or_else(|| query_confidence.map(|c| c >= 50));

    let detections = raw
        .detections
        .into_iter()
        .filter_map(|d| {
            let label = d.label?;
            let confidence = d.confidence.unwrap_or(0.0).clamp(0.0, 1.0);
            Some(Detection {
                label,
                confidence: (confidence * 100.0).round() as u8,
            })
        })
        .collect();

    VisionObservation {
        scene_description: raw.scene_description.unwrap_or_default(),
        activity: raw.activity,
        detections,
        significance,
        query_match,
        query_confidence,
        query_details: raw.query_details,
        baseline_match: raw.baseline_match,
        state_analysis: raw.state_analysis,
        changes_detected: raw.changes_detected,
        person_present: raw.person_present,
    }
}

fn failed_observation() -> VisionObservation {
    VisionObservation {
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
