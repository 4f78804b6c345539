use crate::detection::{Payload, ResponsePart};
use crate::insertion::ValueType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchOperator {
    And,
    Or,
}

/// A scan's aggression level, ordered `fast < smart < fuzz` (spec §3/§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScanMode {
    Fast,
    Smart,
    Fuzz,
}

/// A reused detection-method predicate evaluated against the *input* record
/// rather than a scan response (spec §3, `ResponseCondition` launch kind).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputResponseCondition {
    pub status_code: Option<u16>,
    pub contains: Option<String>,
    pub part: Option<ResponsePart>,
}

/// One predicate in a generator's launch definition (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LaunchCondition {
    Platform { value: String },
    ScanMode { value: ScanMode },
    ParameterValueDataType { value: ValueType },
    ParameterName { names: Vec<String> },
    ResponseCondition { condition: InputResponseCondition },
    AvoidWebSocketMessages { value: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchDefinition {
    pub operator: LaunchOperator,
    pub conditions: Vec<LaunchCondition>,
}

/// Declarative description of payloads, launch conditions, and detection
/// methods (spec §3/§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadGenerator {
    pub id: String,
    pub launch: LaunchDefinition,
    pub payloads: Vec<Payload>,
}

/// A named platform's known software fingerprints, used by the `Platform`
/// launch condition when it names a platform instead of a bare tag
/// (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformDefinition {
    pub name: String,
    pub software: Vec<String>,
}
