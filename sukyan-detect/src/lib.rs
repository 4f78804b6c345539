//! The composable detection pipeline (spec §4.6): each
//! [`DetectionMethod`] is evaluated independently into a
//! [`MethodOutcome`], then combined per [`Payload::detection_condition`]
//! into one verdict for the payload.

pub mod patterns;

use std::time::Duration;
use sukyan_types::{DetectionCondition, DetectionMethod, MethodOutcome, Payload, ResponsePart};

/// Everything a detection method might need to consult about one probe
/// (spec §4.4/§4.6): the response it got back, a baseline to diff against,
/// how long it took, and whether an out-of-band interaction fired.
#[derive(Debug, Clone, Default)]
pub struct DetectionContext<'a> {
    pub response_status: u16,
    pub response_body: &'a str,
    pub response_headers: &'a [(String, String)],
    pub baseline_status: Option<u16>,
    pub elapsed: Option<Duration>,
    pub oob_interaction_seen: bool,
}

impl<'a> DetectionContext<'a> {
    fn part_text(&self, part: ResponsePart) -> String {
        match part {
            ResponsePart::Body => self.response_body.to_string(),
            ResponsePart::Headers => self
                .response_headers
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join("\n"),
            ResponsePart::Raw => {
                let mut raw = self.part_text(ResponsePart::Headers);
                raw.push_str("\n\n");
                raw.push_str(self.response_body);
                raw
            }
        }
    }
}

/// Evaluates one detection method against one response.
pub fn evaluate_method(method: &DetectionMethod, ctx: &DetectionContext<'_>) -> MethodOutcome {
    match method {
        DetectionMethod::OobInteraction { confidence } => MethodOutcome {
            matched: ctx.oob_interaction_seen,
            description: "out-of-band interaction".to_string(),
            confidence: *confidence,
            issue_override: None,
        },
        DetectionMethod::Reflection { literal, confidence } => MethodOutcome {
            matched: ctx.response_body.contains(literal.as_str()),
            description: format!("reflected literal {literal:?}"),
            confidence: *confidence,
            issue_override: None,
        },
        DetectionMethod::TimeBased { sleep, confidence } => MethodOutcome {
            matched: ctx.elapsed.map(|elapsed| elapsed >= *sleep).unwrap_or(false),
            description: format!("response delayed by at least {sleep:?}"),
            confidence: *confidence,
            issue_override: None,
        },
        DetectionMethod::ResponseCheck {
            check,
            confidence,
            issue_override,
        } => MethodOutcome {
            matched: patterns::matches_response_check(*check, ctx.response_body),
            description: format!("{check:?} signature match"),
            confidence: *confidence,
            issue_override: issue_override.clone(),
        },
        DetectionMethod::ResponseCondition {
            status_code,
            contains,
            part,
            status_code_should_change,
            confidence,
            issue_override,
        } => evaluate_response_condition(
            *status_code,
            contains.as_deref(),
            part.unwrap_or(ResponsePart::Body),
            *status_code_should_change,
            *confidence,
            issue_override.clone(),
            ctx,
        ),
        DetectionMethod::BrowserEvents => MethodOutcome {
            matched: false,
            description: "browser-events detection is not implemented".to_string(),
            confidence: 0,
            issue_override: None,
        },
    }
}

fn evaluate_response_condition(
    status_code: Option<u16>,
    contains: Option<&str>,
    part: ResponsePart,
    status_code_should_change: Option<bool>,
    confidence: u8,
    issue_override: Option<String>,
    ctx: &DetectionContext<'_>,
) -> MethodOutcome {
    let mut matched = true;

    if let Some(expected) = status_code {
        matched &= ctx.response_status == expected;
    }
    if let Some(needle) = contains {
        matched &= ctx.part_text(part).contains(needle);
    }
    // Observed-source quirk (spec open question): status_code_should_change
    // is only consulted when a status-code predicate is also present.
    if let (Some(expected), Some(should_change)) = (status_code, status_code_should_change) {
        let _ = expected;
        let changed = ctx.baseline_status.is_some() && ctx.baseline_status != Some(ctx.response_status);
        matched &= changed == should_change;
    }

    MethodOutcome {
        matched,
        description: "response condition".to_string(),
        confidence,
        issue_override,
    }
}

/// The combined verdict for a payload's whole detection pipeline.
#[derive(Debug, Clone)]
pub struct PayloadVerdict {
    pub matched: bool,
    pub confidence: u8,
    pub issue_code: String,
    pub outcomes: Vec<MethodOutcome>,
}

/// Evaluates every detection method on `payload` and folds them per its
/// `detection_condition` (spec §4.6: AND requires every method to match,
/// OR requires at least one).
pub fn evaluate_payload(payload: &Payload, ctx: &DetectionContext<'_>) -> PayloadVerdict {
    let outcomes: Vec<MethodOutcome> = payload
        .detection_methods
        .iter()
        .map(|method| evaluate_method(method, ctx))
        .collect();

    let matched = match payload.detection_condition {
        DetectionCondition::And => !outcomes.is_empty() && outcomes.iter().all(|o| o.matched),
        DetectionCondition::Or => outcomes.iter().any(|o| o.matched),
    };

    let confidence = outcomes
        .iter()
        .filter(|o| o.matched)
        .map(|o| o.confidence)
        .max()
        .unwrap_or(0);

    let issue_code = outcomes
        .iter()
        .find(|o| o.matched)
        .and_then(|o| o.issue_override.clone())
        .unwrap_or_else(|| payload.issue_code.clone());

    PayloadVerdict {
        matched,
        confidence,
        issue_code,
        outcomes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sukyan_types::ResponseCheckKind;

    fn ctx<'a>(status: u16, body: &'a str) -> DetectionContext<'a> {
        DetectionContext {
            response_status: status,
            response_body: body,
            response_headers: &[],
            baseline_status: None,
            elapsed: None,
            oob_interaction_seen: false,
        }
    }

    #[test]
    fn reflection_matches_when_literal_present() {
        let method = DetectionMethod::Reflection {
            literal: "canary123".to_string(),
            confidence: 70,
        };
        let outcome = evaluate_method(&method, &ctx(200, "echo: canary123"));
        assert!(outcome.matched);
    }

    #[test]
    fn time_based_requires_elapsed_at_least_sleep() {
        let method = DetectionMethod::TimeBased {
            sleep: Duration::from_secs(5),
            confidence: 60,
        };
        let mut c = ctx(200, "");
        c.elapsed = Some(Duration::from_millis(4800));
        assert!(!evaluate_method(&method, &c).matched);
        c.elapsed = Some(Duration::from_secs(6));
        assert!(evaluate_method(&method, &c).matched);
    }

    #[test]
    fn response_check_detects_database_error_signature() {
        let method = DetectionMethod::ResponseCheck {
            check: ResponseCheckKind::DatabaseError,
            confidence: 90,
            issue_override: None,
        };
        let outcome = evaluate_method(&method, &ctx(500, "You have an error in your SQL syntax"));
        assert!(outcome.matched);
    }

    #[test]
    fn response_condition_with_no_predicates_matches_vacuously() {
        let method = DetectionMethod::ResponseCondition {
            status_code: None,
            contains: None,
            part: None,
            status_code_should_change: None,
            confidence: 50,
            issue_override: None,
        };
        assert!(evaluate_method(&method, &ctx(200, "")).matched);
    }

    #[test]
    fn status_code_should_change_is_ignored_without_a_status_code_predicate() {
        let method = DetectionMethod::ResponseCondition {
            status_code: None,
            contains: Some("ok".to_string()),
            part: None,
            status_code_should_change: Some(true),
            confidence: 50,
            issue_override: None,
        };
        let mut c = ctx(500, "ok");
        c.baseline_status = Some(500);
        assert!(evaluate_method(&method, &c).matched);
    }

    #[test]
    fn status_code_should_change_consults_baseline_when_status_code_is_set() {
        let method = DetectionMethod::ResponseCondition {
            status_code: Some(500),
            contains: None,
            part: None,
            status_code_should_change: Some(true),
            confidence: 50,
            issue_override: None,
        };
        let mut c = ctx(500, "");
        c.baseline_status = Some(200);
        assert!(evaluate_method(&method, &c).matched);
        c.baseline_status = Some(500);
        assert!(!evaluate_method(&method, &c).matched);
    }

    #[test]
    fn or_condition_matches_if_any_method_matches() {
        let payload = Payload {
            value: "x".to_string(),
            issue_code: "generic".to_string(),
            detection_condition: DetectionCondition::Or,
            detection_methods: vec![
                DetectionMethod::Reflection { literal: "nope".to_string(), confidence: 10 },
                DetectionMethod::ResponseCheck {
                    check: ResponseCheckKind::DatabaseError,
                    confidence: 85,
                    issue_override: Some("sqli-error-based".to_string()),
                },
            ],
            interaction_domain: None,
        };
        let verdict = evaluate_payload(&payload, &ctx(500, "SQL syntax error near"));
        assert!(verdict.matched);
        assert_eq!(verdict.confidence, 85);
        assert_eq!(verdict.issue_code, "sqli-error-based");
    }

    #[test]
    fn and_condition_requires_every_method_to_match() {
        let payload = Payload {
            value: "x".to_string(),
            issue_code: "generic".to_string(),
            detection_condition: DetectionCondition::And,
            detection_methods: vec![
                DetectionMethod::Reflection { literal: "missing".to_string(), confidence: 10 },
                DetectionMethod::OobInteraction { confidence: 90 },
            ],
            interaction_domain: None,
        };
        let mut c = ctx(200, "no match here");
        c.oob_interaction_seen = true;
        let verdict = evaluate_payload(&payload, &c);
        assert!(!verdict.matched);
    }
}
