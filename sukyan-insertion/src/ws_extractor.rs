//! WebSocket message insertion-point extraction (spec §4.1): structural
//! addressing into JSON and XML payloads, falling back to a single raw
//! point for anything else.

use crate::guess::guess_value_type;
use serde_json::Value;
use sukyan_types::{InsertionPoint, InsertionPointType};

pub fn extract_ws_points(payload: &str) -> Vec<InsertionPoint> {
    let trimmed = payload.trim();

    let mut points = vec![InsertionPoint::new(
        InsertionPointType::WsRawMessage,
        "raw",
        payload,
        guess_value_type(payload),
        payload,
    )];

    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(trimmed).is_ok()
    {
        let value: Value = serde_json::from_str(trimmed).unwrap();
        points.extend(extract_json_points(&value, payload));
    } else if trimmed.starts_with('<') && trimmed.ends_with('>') {
        points.extend(extract_xml_points(trimmed));
    }

    points
}

fn extract_json_points(value: &Value, original: &str) -> Vec<InsertionPoint> {
    let mut points = Vec::new();
    match value {
        Value::Object(map) => {
            points.push(InsertionPoint::new(
                InsertionPointType::WsJsonObject,
                "$",
                value.to_string(),
                guess_value_type(&value.to_string()),
                original,
            ));
            for (key, child) in map {
                points.push(InsertionPoint::new(
                    InsertionPointType::WsJsonKey,
                    key.clone(),
                    key.clone(),
                    guess_value_type(key),
                    original,
                ));
                push_field_or_value(key, child, original, &mut points);
            }
        }
        Value::Array(items) => {
            points.push(InsertionPoint::new(
                InsertionPointType::WsJsonArray,
                "$",
                value.to_string(),
                guess_value_type(&value.to_string()),
                original,
            ));
            for (index, item) in items.iter().enumerate() {
                points.push(InsertionPoint::new(
                    InsertionPointType::WsJsonArrayIndex,
                    index.to_string(),
                    index.to_string(),
                    guess_value_type(&index.to_string()),
                    original,
                ));
                let item_str = scalar_or_json_string(item);
                points.push(InsertionPoint::new(
                    InsertionPointType::WsJsonArrayItem,
                    format!("[{index}]"),
                    item_str.clone(),
                    guess_value_type(&item_str),
                    original,
                ));
            }
        }
        _ => {}
    }
    points
}

fn push_field_or_value(key: &str, child: &Value, original: &str, points: &mut Vec<InsertionPoint>) {
    let value_str = scalar_or_json_string(child);
    match child {
        Value::Object(_) | Value::Array(_) => {
            points.push(InsertionPoint::new(
                InsertionPointType::WsJsonField,
                key,
                value_str.clone(),
                guess_value_type(&value_str),
                original,
            ));
        }
        _ => {
            points.push(InsertionPoint::new(
                InsertionPointType::WsJsonValue,
                key,
                value_str.clone(),
                guess_value_type(&value_str),
                original,
            ));
        }
    }
}

fn scalar_or_json_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

const PROCESSING_INSTRUCTION_RE: &str = r"<\?([\w.-]+)[^?]*\?>";
const TAG_RE: &str = r"<(?:([\w.-]+):)?([\w.-]+)((?:\s+[\w.:-]+\s*=\s*\x22[^\x22]*\x22)*)\s*/?>";
const ATTR_RE: &str = r#"([\w.:-]+)\s*=\s*"([^"]*)""#;

fn extract_xml_points(payload: &str) -> Vec<InsertionPoint> {
    let mut points = Vec::new();

    let pi_re = regex::Regex::new(PROCESSING_INSTRUCTION_RE).unwrap();
    for cap in pi_re.captures_iter(payload) {
        let target = cap.get(1).unwrap().as_str();
        points.push(InsertionPoint::new(
            InsertionPointType::WsXmlProcessingInstruction,
            target,
            cap.get(0).unwrap().as_str(),
            guess_value_type(target),
            payload,
        ));
    }

    let tag_re = regex::Regex::new(TAG_RE).unwrap();
    let attr_re = regex::Regex::new(ATTR_RE).unwrap();
    for cap in tag_re.captures_iter(payload) {
        let prefix = cap.get(1).map(|m| m.as_str());
        let local_name = cap.get(2).unwrap().as_str();
        let attrs_text = cap.get(3).map(|m| m.as_str()).unwrap_or_default();

        points.push(InsertionPoint::new(
            InsertionPointType::WsXmlTagName,
            local_name,
            local_name,
            guess_value_type(local_name),
            payload,
        ));
        if let Some(prefix) = prefix {
            points.push(InsertionPoint::new(
                InsertionPointType::WsXmlNamespacePrefix,
                prefix,
                prefix,
                guess_value_type(prefix),
                payload,
            ));
        }

        for attr_cap in attr_re.captures_iter(attrs_text) {
            let attr_name = attr_cap.get(1).unwrap().as_str();
            let attr_value = attr_cap.get(2).unwrap().as_str();
            if attr_name == "xmlns" || attr_name.starts_with("xmlns:") {
                points.push(InsertionPoint::new(
                    InsertionPointType::WsXmlNamespaceUri,
                    attr_name,
                    attr_value,
                    guess_value_type(attr_value),
                    payload,
                ));
            } else {
                points.push(InsertionPoint::new(
                    InsertionPointType::WsXmlAttribute,
                    attr_name,
                    attr_value,
                    guess_value_type(attr_value),
                    payload,
                ));
            }
        }
    }

    points.extend(extract_top_level_element_content(payload));
    points
}

fn extract_top_level_element_content(payload: &str) -> Vec<InsertionPoint> {
    let mut points = Vec::new();
    let open_re = regex::Regex::new(r"<([A-Za-z_][\w:.-]*)[^>]*>").unwrap();
    let mut pos = 0usize;
    while let Some(open) = open_re.find_at(payload, pos) {
        let name = open_re
            .captures(&payload[open.start()..open.end()])
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        let Some(name) = name else {
            pos = open.end();
            continue;
        };
        let close_tag = format!("</{name}>");
        if let Some(close_idx) = payload[open.end()..].find(&close_tag) {
            let content = &payload[open.end()..open.end() + close_idx];
            if !content.trim_start().starts_with('<') && !content.is_empty() {
                points.push(InsertionPoint::new(
                    InsertionPointType::WsXmlElementContent,
                    name.clone(),
                    content,
                    guess_value_type(content),
                    payload,
                ));
            }
            pos = open.end() + close_idx + close_tag.len();
        } else {
            pos = open.end();
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_yields_object_key_and_field_points() {
        let points = extract_ws_points(r#"{"action":"ping","id":1}"#);
        let types: Vec<&InsertionPointType> = points.iter().map(|p| &p.point_type).collect();
        assert!(types.contains(&&InsertionPointType::WsRawMessage));
        assert!(types.contains(&&InsertionPointType::WsJsonObject));
        assert!(types.contains(&&InsertionPointType::WsJsonKey));
        assert!(types.contains(&&InsertionPointType::WsJsonValue));
    }

    #[test]
    fn json_array_yields_array_item_and_index_points() {
        let points = extract_ws_points(r#"["a","b"]"#);
        let item_count = points
            .iter()
            .filter(|p| p.point_type == InsertionPointType::WsJsonArrayItem)
            .count();
        assert_eq!(item_count, 2);
    }

    #[test]
    fn xml_tag_and_attribute_are_extracted() {
        let points = extract_ws_points(r#"<msg type="chat">hello</msg>"#);
        assert!(points
            .iter()
            .any(|p| p.point_type == InsertionPointType::WsXmlTagName && p.name == "msg"));
        assert!(points
            .iter()
            .any(|p| p.point_type == InsertionPointType::WsXmlAttribute && p.name == "type"));
        assert!(points
            .iter()
            .any(|p| p.point_type == InsertionPointType::WsXmlElementContent && p.value == "hello"));
    }

    #[test]
    fn plain_text_payload_only_yields_raw_point() {
        let points = extract_ws_points("ping");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].point_type, InsertionPointType::WsRawMessage);
    }
}
