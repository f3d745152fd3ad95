use vigil_core::DirectiveKind;

/// What the command-intake endpoint needs out of a natural-language
/// monitoring request. The real parser is an external collaborator (spec
/// 1, Out of scope: "The natural-language command parser (only its output
/// schema is consumed here)") — this crate only depends on this shape.
#[derive(Debug, Clone)]
pub struct ParsedDirective {
    pub kind: DirectiveKind,
    pub target: String,
    pub requires_baseline: bool,
}

pub trait DirectiveParser: Send + Sync {
    fn parse(&self, text: &str) -> ParsedDirective;
}

/// Keyword-heuristic stand-in for the external parser, used when no other
/// one is wired in. Good enough to exercise the rest of the pipeline in a
/// self-contained deployment; a production deployment is expected to
/// replace this with a call to the real command-parsing service.
pub struct KeywordDirectiveParser;

impl DirectiveParser for KeywordDirectiveParser {
    fn parse(&self, text: &str) -> ParsedDirective {
        let lower = text.to_lowercase();
        let kind = if contains_any(&lower, &["leaves", "leave", "enters", "enter", "activity", "presence"]) {
            DirectiveKind::ActivityDetection
        } else if contains_any(&lower, &["anomaly", "unusual", "anomalous"]) {
            DirectiveKind::Anomaly
        } else if contains_any(&lower, &["track", "follow"]) {
            DirectiveKind::Tracking
        } else if contains_any(&lower, &["surveil", "monitor", "watch over", "break-in", "break in"]) {
            DirectiveKind::Surveillance
        } else if contains_any(&lower, &["detect", "spot", "look for", "alert me if", "notice"]) {
            DirectiveKind::ObjectDetection
        } else {
            DirectiveKind::SceneAnalysis
        };
        let requires_baseline = matches!(
            kind,
            DirectiveKind::ActivityDetection | DirectiveKind::Anomaly | DirectiveKind::Surveillance
        );
        ParsedDirective {
            kind,
            target: text.trim().to_string(),
            requires_baseline,
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_activity_directive() {
        let parsed = KeywordDirectiveParser.parse("alert me when the person leaves the desk");
        assert_eq!(parsed.kind, DirectiveKind::ActivityDetection);
        assert!(parsed.requires_baseline);
    }

    #[test]
    fn detects_object_detection_directive() {
        let parsed = KeywordDirectiveParser.parse("detect scissors on the counter");
        assert_eq!(parsed.kind, DirectiveKind::ObjectDetection);
        assert!(!parsed.requires_baseline);
    }

    #[test]
    fn falls_back_to_scene_analysis() {
        let parsed = KeywordDirectiveParser.parse("just keep an eye on things");
        assert_eq!(parsed.kind, DirectiveKind::SceneAnalysis);
    }
}
