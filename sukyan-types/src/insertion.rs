use serde::{Deserialize, Serialize};

/// The guessed semantic type of an insertion point's current value
/// (spec §4.1, the data-type guesser).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    String,
    Integer,
    Float,
    Bool,
    Base64,
    Base32,
    Base36,
    Json,
    Xml,
}

/// Where in a request or message an insertion point lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertionPointType {
    Parameter,
    Header,
    Body,
    Cookie,
    UrlPath,
    FullBody,
    GraphqlVariable,
    GraphqlInlineArg,
    WsRawMessage,
    WsJsonObject,
    WsJsonArray,
    WsJsonField,
    WsJsonValue,
    WsJsonKey,
    WsJsonArrayItem,
    WsJsonArrayIndex,
    WsXmlTagName,
    WsXmlAttribute,
    WsXmlNamespacePrefix,
    WsXmlNamespaceUri,
    WsXmlProcessingInstruction,
    WsXmlElementContent,
}

impl InsertionPointType {
    pub fn is_body(&self) -> bool {
        matches!(self, Self::Body | Self::FullBody)
    }

    pub fn is_graphql(&self) -> bool {
        matches!(self, Self::GraphqlVariable | Self::GraphqlInlineArg)
    }

    pub fn is_websocket(&self) -> bool {
        matches!(
            self,
            Self::WsRawMessage
                | Self::WsJsonObject
                | Self::WsJsonArray
                | Self::WsJsonField
                | Self::WsJsonValue
                | Self::WsJsonKey
                | Self::WsJsonArrayItem
                | Self::WsJsonArrayIndex
                | Self::WsXmlTagName
                | Self::WsXmlAttribute
                | Self::WsXmlNamespacePrefix
                | Self::WsXmlNamespaceUri
                | Self::WsXmlProcessingInstruction
                | Self::WsXmlElementContent
        )
    }
}

/// Reflection/dynamic flags computed at analysis time for a point (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertionBehaviour {
    /// The original value was found verbatim somewhere in the response.
    pub reflected: bool,
    /// Repeated captures of this point showed a changing value (CSRF
    /// tokens, nonces, timestamps) -- a hint to skip naive equality checks.
    pub dynamic: bool,
}

/// A named, typed position where a payload can be substituted without
/// otherwise altering the wire form (spec §3 / glossary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertionPoint {
    #[serde(rename = "type")]
    pub point_type: InsertionPointType,
    pub name: String,
    pub value: String,
    pub value_type: ValueType,
    pub original_data: String,
    pub behaviour: InsertionBehaviour,
}

impl InsertionPoint {
    pub fn new(
        point_type: InsertionPointType,
        name: impl Into<String>,
        value: impl Into<String>,
        value_type: ValueType,
        original_data: impl Into<String>,
    ) -> Self {
        Self {
            point_type,
            name: name.into(),
            value: value.into(),
            value_type,
            original_data: original_data.into(),
            behaviour: InsertionBehaviour::default(),
        }
    }
}

/// Categories the caller scopes extraction to (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsertionCategory {
    Parameters,
    UrlPath,
    Headers,
    Cookies,
    Body,
    Graphql,
    WsRaw,
    WsJson,
    WsXml,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_types_are_flagged() {
        assert!(InsertionPointType::WsJsonField.is_websocket());
        assert!(!InsertionPointType::Parameter.is_websocket());
    }

    #[test]
    fn graphql_types_are_flagged() {
        assert!(InsertionPointType::GraphqlVariable.is_graphql());
        assert!(InsertionPointType::GraphqlInlineArg.is_graphql());
        assert!(!InsertionPointType::Body.is_graphql());
    }
}
