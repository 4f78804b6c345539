use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePart {
    Raw,
    Body,
    Headers,
}

/// Correlation record for an out-of-band interaction (spec §3/§6). Resolved
/// asynchronously by the external OOB collector; the scan core only
/// reserves and records the correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionDomain {
    pub url: String,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCheckKind {
    DatabaseError,
    XpathError,
}

/// One of the composable predicates of spec §3/§4.6, dispatched by a single
/// match at the evaluation boundary (spec §9, polymorphism).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DetectionMethod {
    OobInteraction {
        confidence: u8,
    },
    ResponseCondition {
        status_code: Option<u16>,
        contains: Option<String>,
        part: Option<ResponsePart>,
        status_code_should_change: Option<bool>,
        confidence: u8,
        issue_override: Option<String>,
    },
    Reflection {
        literal: String,
        confidence: u8,
    },
    TimeBased {
        sleep: std::time::Duration,
        confidence: u8,
    },
    ResponseCheck {
        check: ResponseCheckKind,
        confidence: u8,
        issue_override: Option<String>,
    },
    /// Reserved; specified as a no-op here (spec §4.6).
    BrowserEvents,
}

impl DetectionMethod {
    pub fn base_confidence(&self) -> u8 {
        match self {
            Self::OobInteraction { confidence } => *confidence,
            Self::ResponseCondition { confidence, .. } => *confidence,
            Self::Reflection { confidence, .. } => *confidence,
            Self::TimeBased { confidence, .. } => *confidence,
            Self::ResponseCheck { confidence, .. } => *confidence,
            Self::BrowserEvents => 0,
        }
    }

    pub fn issue_override(&self) -> Option<&str> {
        match self {
            Self::ResponseCondition { issue_override, .. } => issue_override.as_deref(),
            Self::ResponseCheck { issue_override, .. } => issue_override.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionCondition {
    And,
    Or,
}

/// A concrete value to try at an insertion point, carrying the detection
/// pipeline that decides whether trying it found something (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub value: String,
    pub issue_code: String,
    pub detection_condition: DetectionCondition,
    pub detection_methods: Vec<DetectionMethod>,
    pub interaction_domain: Option<InteractionDomain>,
}

impl Payload {
    pub fn has_time_based(&self) -> bool {
        self.detection_methods
            .iter()
            .any(|m| matches!(m, DetectionMethod::TimeBased { .. }))
    }

    pub fn expected_sleep(&self) -> Option<std::time::Duration> {
        self.detection_methods.iter().find_map(|m| match m {
            DetectionMethod::TimeBased { sleep, .. } => Some(*sleep),
            _ => None,
        })
    }
}

/// Result of evaluating a single detection method against a response
/// (spec §4.6).
#[derive(Debug, Clone)]
pub struct MethodOutcome {
    pub matched: bool,
    pub description: String,
    pub confidence: u8,
    pub issue_override: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_based_payload_reports_expected_sleep() {
        let payload = Payload {
            value: "' OR SLEEP(5)-- ".to_string(),
            issue_code: "sqli-time".to_string(),
            detection_condition: DetectionCondition::Or,
            detection_methods: vec![DetectionMethod::TimeBased {
                sleep: std::time::Duration::from_secs(5),
                confidence: 50,
            }],
            interaction_domain: None,
        };
        assert!(payload.has_time_based());
        assert_eq!(
            payload.expected_sleep(),
            Some(std::time::Duration::from_secs(5))
        );
    }

    #[test]
    fn non_time_based_payload_has_no_expected_sleep() {
        let payload = Payload {
            value: "'".to_string(),
            issue_code: "sqli".to_string(),
            detection_condition: DetectionCondition::And,
            detection_methods: vec![DetectionMethod::ResponseCheck {
                check: ResponseCheckKind::DatabaseError,
                confidence: 80,
                issue_override: None,
            }],
            interaction_domain: None,
        };
        assert!(!payload.has_time_based());
        assert_eq!(payload.expected_sleep(), None);
    }
}
