//! GraphQL insertion-point extraction (spec §4.1): variable paths pulled
//! from the `variables` object and inline arguments pulled from the
//! operation text itself.

use crate::guess::guess_value_type;
use crate::{InsertionError, Result};
use serde_json::Value;
use sukyan_types::{HistoryRecord, InsertionPoint, InsertionPointType};

/// Bounded depth for nested variable traversal (SPEC_FULL §9 default).
const MAX_VARIABLE_DEPTH: usize = 3;

#[derive(serde::Deserialize)]
struct GraphqlRequestBody {
    query: Option<String>,
    mutation: Option<String>,
    subscription: Option<String>,
    #[serde(default)]
    variables: Value,
}

pub fn is_graphql_request(history: &HistoryRecord) -> bool {
    let Some(content_type) = history.request_content_type.as_deref() else {
        return false;
    };
    if !content_type.contains("application/json") {
        return false;
    }
    let body = history.request_body_str();
    let Ok(parsed) = serde_json::from_str::<Value>(&body) else {
        return false;
    };
    let Some(obj) = parsed.as_object() else {
        return false;
    };
    ["query", "mutation", "subscription"]
        .iter()
        .any(|key| obj.get(*key).and_then(Value::as_str).is_some())
}

pub fn extract_graphql_points(history: &HistoryRecord) -> Result<Vec<InsertionPoint>> {
    if !is_graphql_request(history) {
        return Ok(Vec::new());
    }
    let body = history.request_body_str();
    let parsed: GraphqlRequestBody = serde_json::from_str(&body)
        .map_err(|e| InsertionError::MalformedGraphql(e.to_string()))?;

    let mut points = Vec::new();
    if let Value::Object(vars) = &parsed.variables {
        for (name, value) in vars {
            collect_variable_points(name.clone(), value, 0, &mut points);
        }
    }

    let operation_text = parsed
        .query
        .or(parsed.mutation)
        .or(parsed.subscription)
        .unwrap_or_default();
    points.extend(extract_inline_arguments(&operation_text));

    Ok(points)
}

fn collect_variable_points(path: String, value: &Value, depth: usize, out: &mut Vec<InsertionPoint>) {
    if depth >= MAX_VARIABLE_DEPTH {
        push_scalar_point(path, value, out);
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                collect_variable_points(format!("{path}.{key}"), child, depth + 1, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect_variable_points(format!("{path}[{index}]"), child, depth + 1, out);
            }
        }
        _ => push_scalar_point(path, value, out),
    }
}

fn push_scalar_point(path: String, value: &Value, out: &mut Vec<InsertionPoint>) {
    let value_str = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    out.push(InsertionPoint::new(
        InsertionPointType::GraphqlVariable,
        path,
        value_str.clone(),
        guess_value_type(&value_str),
        value.to_string(),
    ));
}

/// Scans `field(arg: value, ...)` call sites in the operation text, skipping
/// the leading `($var: Type, ...)` variable-definition list so declared
/// variable names never produce duplicate points.
fn extract_inline_arguments(operation_text: &str) -> Vec<InsertionPoint> {
    let mut points = Vec::new();
    let bytes = operation_text.as_bytes();
    let mut i = 0usize;
    let mut seen_selection_set = false;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                seen_selection_set = true;
                i += 1;
            }
            b'(' if seen_selection_set => {
                let close = match find_matching_paren(operation_text, i) {
                    Some(idx) => idx,
                    None => break,
                };
                let args_text = &operation_text[i + 1..close];
                points.extend(parse_argument_list(args_text));
                i = close + 1;
            }
            _ => i += 1,
        }
    }
    points
}

fn find_matching_paren(text: &str, open_idx: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, ch) in text.char_indices().skip(open_idx) {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_argument_list(args_text: &str) -> Vec<InsertionPoint> {
    args_text
        .split(',')
        .filter_map(|arg| {
            let (name, value) = arg.split_once(':')?;
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() || value.is_empty() || value.starts_with('$') {
                return None;
            }
            let unquoted = value.trim_matches('"');
            Some(InsertionPoint::new(
                InsertionPointType::GraphqlInlineArg,
                name,
                unquoted,
                guess_value_type(unquoted),
                value,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sukyan_common::HistoryId;

    fn graphql_history(body: &str) -> HistoryRecord {
        HistoryRecord {
            id: HistoryId::new("h1"),
            url: "http://t/graphql".to_string(),
            method: "POST".to_string(),
            request_headers: vec![],
            request_body: body.as_bytes().to_vec(),
            request_content_type: Some("application/json".to_string()),
            response_status: None,
            response_headers: vec![],
            response_body: vec![],
            workspace_id: None,
            scan_id: None,
        }
    }

    #[test]
    fn variable_only_request_yields_no_inline_args() {
        let body = r#"{"query":"query Q($id: ID!) { user(id: $id) { name } }","variables":{"id":"42"}}"#;
        let h = graphql_history(body);
        let points = extract_graphql_points(&h).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].point_type, InsertionPointType::GraphqlVariable);
        assert_eq!(points[0].name, "id");
    }

    #[test]
    fn inline_literal_argument_is_extracted() {
        let body = r#"{"query":"query { user(id: \"42\") { name } }","variables":{}}"#;
        let h = graphql_history(body);
        let points = extract_graphql_points(&h).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].point_type, InsertionPointType::GraphqlInlineArg);
        assert_eq!(points[0].name, "id");
        assert_eq!(points[0].value, "42");
    }

    #[test]
    fn nested_variable_paths_use_dotted_and_bracket_notation() {
        let body = r#"{"query":"mutation M($input: Input!) { create(input: $input) { id } }","variables":{"input":{"tags":["a","b"]}}}"#;
        let h = graphql_history(body);
        let points = extract_graphql_points(&h).unwrap();
        let names: Vec<&str> = points
            .iter()
            .filter(|p| p.point_type == InsertionPointType::GraphqlVariable)
            .map(|p| p.name.as_str())
            .collect();
        assert!(names.contains(&"input.tags[0]"));
        assert!(names.contains(&"input.tags[1]"));
    }

    #[test]
    fn non_graphql_json_body_yields_no_points() {
        let h = graphql_history(r#"{"hello":"world"}"#);
        assert!(extract_graphql_points(&h).unwrap().is_empty());
    }
}
