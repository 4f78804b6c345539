//! Payload generator evaluation (spec §4.3): deciding, for a given
//! insertion point and scan context, which of a generator's payloads
//! should actually be launched.

pub mod platform;

pub use platform::*;

use sukyan_types::{
    InputResponseCondition, InsertionPoint, LaunchCondition, LaunchDefinition, LaunchOperator,
    Payload, PayloadGenerator, PlatformDefinition, ResponsePart, ScanMode,
};

/// A snapshot of the most recent response seen for the insertion point's
/// base request, consulted by [`LaunchCondition::ResponseCondition`].
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status_code: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl ResponseSnapshot {
    fn part_text(&self, part: ResponsePart) -> String {
        match part {
            ResponsePart::Body => self.body.clone(),
            ResponsePart::Headers => self
                .headers
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join("\n"),
            ResponsePart::Raw => {
                let mut raw = self.part_text(ResponsePart::Headers);
                raw.push_str("\n\n");
                raw.push_str(&self.body);
                raw
            }
        }
    }
}

/// Everything a launch condition might need to consult (spec §4.3).
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext<'a> {
    pub scan_mode: Option<ScanMode>,
    pub detected_platforms: &'a [String],
    /// Raw fingerprint tags detected for the target, consulted against
    /// `known_platforms`' software lists (spec §4.3's second `Platform`
    /// clause) independently of `detected_platforms`.
    pub detected_fingerprints: &'a [String],
    pub known_platforms: &'a [PlatformDefinition],
    pub insertion_point: Option<&'a InsertionPoint>,
    pub last_response: Option<&'a ResponseSnapshot>,
    pub is_websocket_message: bool,
}

/// Evaluates a single condition in isolation.
pub fn evaluate_condition(condition: &LaunchCondition, ctx: &EvaluationContext<'_>) -> bool {
    match condition {
        LaunchCondition::Platform { value } => {
            ctx.detected_platforms.iter().any(|p| p.eq_ignore_ascii_case(value))
                || ctx.known_platforms.iter().any(|platform| {
                    platform.name.eq_ignore_ascii_case(value)
                        && platform
                            .software
                            .iter()
                            .any(|software| ctx.detected_fingerprints.iter().any(|tag| tag.eq_ignore_ascii_case(software)))
                })
        }
        LaunchCondition::ScanMode { value } => match ctx.scan_mode {
            Some(mode) => mode == *value,
            None => false,
        },
        LaunchCondition::ParameterValueDataType { value } => ctx
            .insertion_point
            .map(|p| p.value_type == *value)
            .unwrap_or(false),
        LaunchCondition::ParameterName { names } => ctx
            .insertion_point
            .map(|p| names.iter().any(|n| n.eq_ignore_ascii_case(&p.name)))
            .unwrap_or(false),
        LaunchCondition::ResponseCondition { condition } => evaluate_response_condition(condition, ctx),
        LaunchCondition::AvoidWebSocketMessages { value } => !(*value && ctx.is_websocket_message),
    }
}

fn evaluate_response_condition(condition: &InputResponseCondition, ctx: &EvaluationContext<'_>) -> bool {
    let Some(response) = ctx.last_response else {
        return false;
    };
    if let Some(expected_status) = condition.status_code {
        if response.status_code != expected_status {
            return false;
        }
    }
    if let Some(contains) = &condition.contains {
        let part = condition.part.unwrap_or(ResponsePart::Body);
        if !response.part_text(part).contains(contains.as_str()) {
            return false;
        }
    }
    true
}

/// Folds a [`LaunchDefinition`]'s conditions with its operator. An empty
/// condition list always launches (spec §4.3 default-allow).
pub fn evaluate_launch(definition: &LaunchDefinition, ctx: &EvaluationContext<'_>) -> bool {
    if definition.conditions.is_empty() {
        return true;
    }
    match definition.operator {
        LaunchOperator::And => definition
            .conditions
            .iter()
            .all(|c| evaluate_condition(c, ctx)),
        LaunchOperator::Or => definition
            .conditions
            .iter()
            .any(|c| evaluate_condition(c, ctx)),
    }
}

/// Returns the generator's payloads if its launch conditions are satisfied,
/// or an empty vector otherwise -- the generator never partially fires.
pub fn select_payloads<'g>(generator: &'g PayloadGenerator, ctx: &EvaluationContext<'_>) -> &'g [Payload] {
    if evaluate_launch(&generator.launch, ctx) {
        &generator.payloads
    } else {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sukyan_types::{DetectionCondition, DetectionMethod, InsertionBehaviour, InsertionPointType, ValueType};

    fn point(name: &str, value_type: ValueType) -> InsertionPoint {
        InsertionPoint {
            point_type: InsertionPointType::Parameter,
            name: name.to_string(),
            value: "x".to_string(),
            value_type,
            original_data: String::new(),
            behaviour: InsertionBehaviour::default(),
        }
    }

    fn payload() -> Payload {
        Payload {
            value: "' OR 1=1--".to_string(),
            issue_code: "sqli".to_string(),
            detection_condition: DetectionCondition::Or,
            detection_methods: vec![DetectionMethod::Reflection {
                literal: "1=1".to_string(),
                confidence: 80,
            }],
            interaction_domain: None,
        }
    }

    #[test]
    fn empty_conditions_always_launch() {
        let def = LaunchDefinition {
            operator: LaunchOperator::And,
            conditions: vec![],
        };
        let ctx = EvaluationContext::default();
        assert!(evaluate_launch(&def, &ctx));
    }

    #[test]
    fn platform_condition_matches_via_named_platform_software_list() {
        let cond = LaunchCondition::Platform { value: "WordPress".to_string() };
        let platforms = vec![PlatformDefinition {
            name: "WordPress".to_string(),
            software: vec!["wp-content".to_string()],
        }];
        let fingerprints = vec!["WP-Content".to_string()];
        let mut ctx = EvaluationContext::default();
        ctx.known_platforms = &platforms;
        ctx.detected_fingerprints = &fingerprints;
        assert!(evaluate_condition(&cond, &ctx));
    }

    #[test]
    fn platform_condition_direct_match_does_not_need_platform_list() {
        let cond = LaunchCondition::Platform { value: "drupal".to_string() };
        let detected = vec!["Drupal".to_string()];
        let mut ctx = EvaluationContext::default();
        ctx.detected_platforms = &detected;
        assert!(evaluate_condition(&cond, &ctx));
    }

    #[test]
    fn scan_mode_condition_requires_exact_match() {
        let cond = LaunchCondition::ScanMode { value: ScanMode::Smart };
        let mut ctx = EvaluationContext::default();
        ctx.scan_mode = Some(ScanMode::Fast);
        assert!(!evaluate_condition(&cond, &ctx));
        ctx.scan_mode = Some(ScanMode::Fuzz);
        assert!(!evaluate_condition(&cond, &ctx));
        ctx.scan_mode = Some(ScanMode::Smart);
        assert!(evaluate_condition(&cond, &ctx));
    }

    #[test]
    fn parameter_name_condition_is_case_insensitive() {
        let p = point("Id", ValueType::Integer);
        let cond = LaunchCondition::ParameterName {
            names: vec!["id".to_string()],
        };
        let ctx = EvaluationContext {
            insertion_point: Some(&p),
            ..Default::default()
        };
        assert!(evaluate_condition(&cond, &ctx));
    }

    #[test]
    fn and_operator_requires_every_condition() {
        let p = point("id", ValueType::String);
        let def = LaunchDefinition {
            operator: LaunchOperator::And,
            conditions: vec![
                LaunchCondition::ParameterName { names: vec!["id".to_string()] },
                LaunchCondition::ParameterValueDataType { value: ValueType::Integer },
            ],
        };
        let ctx = EvaluationContext {
            insertion_point: Some(&p),
            ..Default::default()
        };
        assert!(!evaluate_launch(&def, &ctx));
    }

    #[test]
    fn avoid_websocket_messages_skips_when_flagged() {
        let cond = LaunchCondition::AvoidWebSocketMessages { value: true };
        let mut ctx = EvaluationContext::default();
        ctx.is_websocket_message = true;
        assert!(!evaluate_condition(&cond, &ctx));
        ctx.is_websocket_message = false;
        assert!(evaluate_condition(&cond, &ctx));
    }

    #[test]
    fn select_payloads_returns_empty_when_launch_fails() {
        let generator = PayloadGenerator {
            id: "g1".to_string(),
            launch: LaunchDefinition {
                operator: LaunchOperator::And,
                conditions: vec![LaunchCondition::ScanMode { value: ScanMode::Fuzz }],
            },
            payloads: vec![payload()],
        };
        let mut ctx = EvaluationContext::default();
        ctx.scan_mode = Some(ScanMode::Fast);
        assert!(select_payloads(&generator, &ctx).is_empty());
        ctx.scan_mode = Some(ScanMode::Fuzz);
        assert_eq!(select_payloads(&generator, &ctx).len(), 1);
    }
}
