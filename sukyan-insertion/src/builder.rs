//! Request and WebSocket message rebuilding (spec §4.2): given an
//! [`InsertionPoint`] captured by the extractor and a replacement value,
//! reproduce the original request/message with only that locus changed.

use crate::{InsertionError, Result};
use serde_json::Value;
use sukyan_types::{HistoryRecord, InsertionPoint, InsertionPointType};

/// Rebuilds `history` with `point` replaced by `new_value`, leaving every
/// other byte of the request untouched.
pub fn build_request(
    history: &HistoryRecord,
    point: &InsertionPoint,
    new_value: &str,
) -> Result<HistoryRecord> {
    let mut rebuilt = history.clone();
    match point.point_type {
        InsertionPointType::Parameter => {
            rebuilt.url = replace_query_parameter(&history.url, &point.name, &point.value, new_value)?;
        }
        InsertionPointType::UrlPath => {
            rebuilt.url = replace_url_path_segment(&history.url, &point.value, new_value)?;
        }
        InsertionPointType::Header => {
            rebuilt.request_headers = replace_header(&history.request_headers, &point.name, new_value);
        }
        InsertionPointType::Cookie => {
            rebuilt.request_headers =
                replace_cookie(&history.request_headers, &point.name, new_value);
        }
        InsertionPointType::Body | InsertionPointType::FullBody => {
            let body = history.request_body_str();
            let new_body = replace_body_field(
                history.request_content_type.as_deref(),
                &body,
                point,
                new_value,
            )?;
            rebuilt.request_body = new_body.into_bytes();
        }
        InsertionPointType::GraphqlVariable => {
            let body = history.request_body_str();
            rebuilt.request_body = replace_graphql_variable(&body, &point.name, new_value)?.into_bytes();
        }
        InsertionPointType::GraphqlInlineArg => {
            let body = history.request_body_str();
            rebuilt.request_body = replace_graphql_inline_arg(&body, &point.name, new_value)?.into_bytes();
        }
        ref other => {
            return Err(InsertionError::UnsupportedInsertionPoint(format!("{other:?}")));
        }
    }
    Ok(rebuilt)
}

fn replace_query_parameter(url: &str, name: &str, old_value: &str, new_value: &str) -> Result<String> {
    let parsed = url::Url::parse(url).map_err(|e| InsertionError::MalformedUrl(e.to_string()))?;
    let mut replaced = false;
    let new_pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            if !replaced && k == name && v == old_value {
                replaced = true;
                (k.to_string(), new_value.to_string())
            } else {
                (k.to_string(), v.to_string())
            }
        })
        .collect();

    let mut rebuilt = parsed.clone();
    rebuilt.query_pairs_mut().clear().extend_pairs(&new_pairs);
    Ok(rebuilt.to_string())
}

fn replace_url_path_segment(url: &str, old_segment: &str, new_value: &str) -> Result<String> {
    let parsed = url::Url::parse(url).map_err(|e| InsertionError::MalformedUrl(e.to_string()))?;
    let mut replaced = false;
    let new_segments: Vec<String> = parsed
        .path_segments()
        .into_iter()
        .flatten()
        .map(|segment| {
            if !replaced && segment == old_segment {
                replaced = true;
                new_value.to_string()
            } else {
                segment.to_string()
            }
        })
        .collect();

    let mut rebuilt = parsed.clone();
    {
        let mut path_mut = rebuilt
            .path_segments_mut()
            .map_err(|_| InsertionError::MalformedUrl("cannot-be-a-base URL".to_string()))?;
        path_mut.clear();
        for segment in &new_segments {
            path_mut.push(segment);
        }
    }
    Ok(rebuilt.to_string())
}

fn replace_header(headers: &[(String, String)], name: &str, new_value: &str) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| {
            if k.eq_ignore_ascii_case(name) {
                (k.clone(), new_value.to_string())
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}

fn replace_cookie(headers: &[(String, String)], cookie_name: &str, new_value: &str) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| {
            if !k.eq_ignore_ascii_case("cookie") {
                return (k.clone(), v.clone());
            }
            let rebuilt = v
                .split(';')
                .map(|pair| {
                    let trimmed = pair.trim();
                    match trimmed.split_once('=') {
                        Some((name, _)) if name.trim() == cookie_name => {
                            format!("{}={}", name.trim(), new_value)
                        }
                        _ => trimmed.to_string(),
                    }
                })
                .collect::<Vec<_>>()
                .join("; ");
            (k.clone(), rebuilt)
        })
        .collect()
}

fn replace_body_field(
    content_type: Option<&str>,
    body: &str,
    point: &InsertionPoint,
    new_value: &str,
) -> Result<String> {
    if point.point_type == InsertionPointType::FullBody {
        return Ok(new_value.to_string());
    }
    let Some(content_type) = content_type else {
        return Err(InsertionError::MalformedBody {
            content_type: String::new(),
            reason: "no content-type for a body insertion point".to_string(),
        });
    };

    if content_type.contains("application/x-www-form-urlencoded") {
        let mut replaced = false;
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(body.as_bytes())
            .map(|(k, v)| {
                if !replaced && k == point.name {
                    replaced = true;
                    (k.to_string(), new_value.to_string())
                } else {
                    (k.to_string(), v.to_string())
                }
            })
            .collect();
        return Ok(url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish());
    }

    if content_type.contains("application/json") {
        let mut parsed: Value = serde_json::from_str(body).map_err(|e| InsertionError::MalformedBody {
            content_type: content_type.to_string(),
            reason: e.to_string(),
        })?;
        if let Some(obj) = parsed.as_object_mut() {
            obj.insert(point.name.clone(), coerce_json_scalar(new_value));
        }
        return Ok(parsed.to_string());
    }

    if content_type.contains("application/xml") || content_type.contains("text/xml") {
        let open_tag_re = regex::Regex::new(&format!(r"<{}(\s[^>]*)?>", regex::escape(&point.name))).unwrap();
        let close_tag = format!("</{}>", point.name);
        if let Some(open_match) = open_tag_re.find(body) {
            if let Some(close_idx) = body[open_match.end()..].find(&close_tag) {
                let mut rebuilt = String::with_capacity(body.len());
                rebuilt.push_str(&body[..open_match.end()]);
                rebuilt.push_str(new_value);
                rebuilt.push_str(&body[open_match.end() + close_idx..]);
                return Ok(rebuilt);
            }
        }
        return Err(InsertionError::MalformedBody {
            content_type: content_type.to_string(),
            reason: format!("element <{}> not found", point.name),
        });
    }

    if content_type.contains("multipart/form-data") {
        let boundary = content_type
            .split(';')
            .find_map(|part| part.trim().strip_prefix("boundary="))
            .map(|b| b.trim_matches('"').to_string());
        let Some(boundary) = boundary else {
            return Err(InsertionError::MalformedBody {
                content_type: content_type.to_string(),
                reason: "missing boundary".to_string(),
            });
        };
        let name_marker = format!("name=\"{}\"", point.name);
        if let Some(field_start) = body.find(&name_marker) {
            if let Some(header_end_rel) = body[field_start..].find("\r\n\r\n") {
                let content_start = field_start + header_end_rel + 4;
                let delimiter = format!("--{boundary}");
                if let Some(next_boundary_rel) = body[content_start..].find(&delimiter) {
                    let content_end = content_start + next_boundary_rel;
                    let mut rebuilt = String::with_capacity(body.len());
                    rebuilt.push_str(&body[..content_start]);
                    rebuilt.push_str(new_value);
                    rebuilt.push_str("\r\n");
                    rebuilt.push_str(&body[content_end..]);
                    return Ok(rebuilt);
                }
            }
        }
        return Err(InsertionError::MalformedBody {
            content_type: content_type.to_string(),
            reason: format!("field {} not found", point.name),
        });
    }

    Err(InsertionError::MalformedBody {
        content_type: content_type.to_string(),
        reason: "unsupported content-type for body insertion".to_string(),
    })
}

fn coerce_json_scalar(raw: &str) -> Value {
    if raw == "true" {
        return Value::Bool(true);
    }
    if raw == "false" {
        return Value::Bool(false);
    }
    if let Ok(n) = raw.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(n) {
            return Value::Number(number);
        }
    }
    Value::String(raw.to_string())
}

/// Walks a dotted/bracketed path like `input.tags[0]` into the `variables`
/// object of a GraphQL request body, replacing the leaf in place. A missing
/// path is not a hard error -- the caller is expected to log and skip, per
/// spec §4.2's "missing paths warn but don't fail".
fn replace_graphql_variable(body: &str, path: &str, new_value: &str) -> Result<String> {
    let mut parsed: Value = serde_json::from_str(body)
        .map_err(|e| InsertionError::MalformedGraphql(e.to_string()))?;
    let Some(variables) = parsed.get_mut("variables") else {
        return Ok(body.to_string());
    };
    set_at_path(variables, path, coerce_graphql_scalar(new_value));
    Ok(parsed.to_string())
}

fn coerce_graphql_scalar(raw: &str) -> Value {
    if raw == "true" {
        return Value::Bool(true);
    }
    if raw == "false" {
        return Value::Bool(false);
    }
    if let Ok(n) = raw.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(n) {
            return Value::Number(number);
        }
    }
    Value::String(raw.to_string())
}

fn set_at_path(root: &mut Value, path: &str, new_value: Value) {
    let segments = parse_path_segments(path);
    let mut current = root;
    for (idx, segment) in segments.iter().enumerate() {
        let is_last = idx == segments.len() - 1;
        match segment {
            PathSegment::Key(key) => {
                let Some(obj) = current.as_object_mut() else { return };
                if is_last {
                    obj.insert(key.clone(), new_value);
                    return;
                }
                let Some(next) = obj.get_mut(key) else { return };
                current = next;
            }
            PathSegment::Index(index) => {
                let Some(arr) = current.as_array_mut() else { return };
                if is_last {
                    if let Some(slot) = arr.get_mut(*index) {
                        *slot = new_value;
                    }
                    return;
                }
                let Some(next) = arr.get_mut(*index) else { return };
                current = next;
            }
        }
    }
}

enum PathSegment {
    Key(String),
    Index(usize),
}

fn parse_path_segments(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }
            rest = &rest[bracket..];
            while let Some(close) = rest.find(']') {
                if let Ok(index) = rest[1..close].parse::<usize>() {
                    segments.push(PathSegment::Index(index));
                }
                rest = &rest[close + 1..];
            }
        } else if !rest.is_empty() {
            segments.push(PathSegment::Key(rest.to_string()));
        }
    }
    segments
}

/// Replaces the first `name: value` argument occurrence in the operation
/// text, quoting the new value unless it is numeric or a `true`/`false`/
/// `null` literal (spec §4.2).
fn replace_graphql_inline_arg(body: &str, arg_name: &str, new_value: &str) -> Result<String> {
    let mut parsed: Value =
        serde_json::from_str(body).map_err(|e| InsertionError::MalformedGraphql(e.to_string()))?;
    let field_key = ["query", "mutation", "subscription"]
        .into_iter()
        .find(|key| parsed.get(*key).and_then(Value::as_str).is_some());
    let Some(field_key) = field_key else {
        return Ok(body.to_string());
    };
    let operation_text = parsed[field_key].as_str().unwrap_or_default().to_string();

    let pattern = format!(r#"(?P<name>\b{}\s*:\s*)(?P<value>"[^"]*"|[\w.\-]+)"#, regex::escape(arg_name));
    let re = regex::Regex::new(&pattern).unwrap();
    let replacement_literal = if matches!(new_value, "true" | "false" | "null") || new_value.parse::<f64>().is_ok() {
        new_value.to_string()
    } else {
        format!("\"{new_value}\"")
    };

    let mut replaced_once = false;
    let rewritten = re.replace(&operation_text, |caps: &regex::Captures| {
        if replaced_once {
            caps.get(0).unwrap().as_str().to_string()
        } else {
            replaced_once = true;
            format!("{}{}", &caps["name"], replacement_literal)
        }
    });

    parsed[field_key] = Value::String(rewritten.to_string());
    Ok(parsed.to_string())
}

/// Mutates a single WebSocket text message at the structural address
/// described by `point` (spec §4.2, WS targeted mutation). Raw messages
/// replace the whole payload.
pub fn build_ws_message(payload: &str, point: &InsertionPoint, new_value: &str) -> Result<String> {
    match point.point_type {
        InsertionPointType::WsRawMessage => Ok(new_value.to_string()),
        InsertionPointType::WsJsonObject | InsertionPointType::WsJsonArray => {
            serde_json::from_str::<Value>(new_value)
                .map_err(|e| InsertionError::MalformedBody {
                    content_type: "application/json".to_string(),
                    reason: e.to_string(),
                })?;
            Ok(new_value.to_string())
        }
        InsertionPointType::WsJsonField | InsertionPointType::WsJsonValue => {
            let mut value: Value = serde_json::from_str(payload).map_err(|e| InsertionError::MalformedBody {
                content_type: "application/json".to_string(),
                reason: e.to_string(),
            })?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert(point.name.clone(), coerce_json_scalar(new_value));
            }
            Ok(value.to_string())
        }
        InsertionPointType::WsJsonKey => {
            let mut value: Value = serde_json::from_str(payload).map_err(|e| InsertionError::MalformedBody {
                content_type: "application/json".to_string(),
                reason: e.to_string(),
            })?;
            if let Some(obj) = value.as_object_mut() {
                if let Some(existing) = obj.remove(&point.name) {
                    obj.insert(new_value.to_string(), existing);
                }
            }
            Ok(value.to_string())
        }
        InsertionPointType::WsJsonArrayItem => {
            let index: usize = point
                .name
                .trim_start_matches('[')
                .trim_end_matches(']')
                .parse()
                .unwrap_or(0);
            let mut value: Value = serde_json::from_str(payload).map_err(|e| InsertionError::MalformedBody {
                content_type: "application/json".to_string(),
                reason: e.to_string(),
            })?;
            if let Some(arr) = value.as_array_mut() {
                if let Some(slot) = arr.get_mut(index) {
                    *slot = coerce_json_scalar(new_value);
                }
            }
            Ok(value.to_string())
        }
        InsertionPointType::WsXmlTagName => {
            let open = regex::Regex::new(&format!(r"<{}(\s[^>]*)?>", regex::escape(&point.name))).unwrap();
            let close = format!("</{}>", point.name);
            let replaced_open = open.replacen(payload, 1, format!("<{new_value}$1>"));
            Ok(replaced_open.replacen(&close, &format!("</{new_value}>"), 1))
        }
        InsertionPointType::WsXmlAttribute | InsertionPointType::WsXmlNamespaceUri => {
            let pattern = format!(r#"{}\s*=\s*"[^"]*""#, regex::escape(&point.name));
            let re = regex::Regex::new(&pattern).unwrap();
            Ok(re
                .replacen(payload, 1, format!("{}=\"{new_value}\"", point.name))
                .to_string())
        }
        InsertionPointType::WsXmlElementContent => {
            let open_re = regex::Regex::new(&format!(r"<{}(\s[^>]*)?>", regex::escape(&point.name))).unwrap();
            let close_tag = format!("</{}>", point.name);
            if let Some(open_match) = open_re.find(payload) {
                if let Some(close_idx) = payload[open_match.end()..].find(&close_tag) {
                    let mut rebuilt = String::with_capacity(payload.len());
                    rebuilt.push_str(&payload[..open_match.end()]);
                    rebuilt.push_str(new_value);
                    rebuilt.push_str(&payload[open_match.end() + close_idx..]);
                    return Ok(rebuilt);
                }
            }
            Err(InsertionError::MalformedBody {
                content_type: "application/xml".to_string(),
                reason: format!("element <{}> not found", point.name),
            })
        }
        ref other => Err(InsertionError::UnsupportedInsertionPoint(format!("{other:?}"))),
    }
}
