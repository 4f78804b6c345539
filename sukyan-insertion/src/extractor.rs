//! HTTP insertion-point extraction (spec §4.1).

use crate::graphql;
use crate::guess::guess_value_type;
use crate::{InsertionError, Result};
use std::collections::HashSet;
use sukyan_types::{HistoryRecord, InsertionCategory, InsertionPoint, InsertionPointType};

pub fn extract_points(
    history: &HistoryRecord,
    categories: &HashSet<InsertionCategory>,
) -> Result<Vec<InsertionPoint>> {
    let mut points = Vec::new();

    if categories.contains(&InsertionCategory::Parameters) {
        points.extend(extract_query_parameters(history)?);
    }
    if categories.contains(&InsertionCategory::UrlPath) {
        points.extend(extract_url_path(history)?);
    }
    if categories.contains(&InsertionCategory::Headers) {
        points.extend(extract_headers(history));
    }
    if categories.contains(&InsertionCategory::Cookies) {
        points.extend(extract_cookies(history));
    }

    let mut body_point_count = 0;
    if categories.contains(&InsertionCategory::Body) {
        let body_points = extract_body(history)?;
        body_point_count = body_points.len();
        points.extend(body_points);
    }
    if body_point_count > 0 {
        points.push(InsertionPoint::new(
            InsertionPointType::FullBody,
            "fullbody",
            history.request_body_str().to_string(),
            guess_value_type(&history.request_body_str()),
            history.request_body_str().to_string(),
        ));
    }

    if categories.contains(&InsertionCategory::Graphql) {
        points.extend(graphql::extract_graphql_points(history)?);
    }

    Ok(points)
}

fn extract_query_parameters(history: &HistoryRecord) -> Result<Vec<InsertionPoint>> {
    let url = url::Url::parse(&history.url).map_err(|e| InsertionError::MalformedUrl(e.to_string()))?;
    Ok(url
        .query_pairs()
        .map(|(name, value)| {
            InsertionPoint::new(
                InsertionPointType::Parameter,
                name.to_string(),
                value.to_string(),
                guess_value_type(&value),
                history.url.clone(),
            )
        })
        .collect())
}

fn extract_url_path(history: &HistoryRecord) -> Result<Vec<InsertionPoint>> {
    let url = url::Url::parse(&history.url).map_err(|e| InsertionError::MalformedUrl(e.to_string()))?;
    Ok(url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            InsertionPoint::new(
                InsertionPointType::UrlPath,
                segment,
                segment,
                guess_value_type(segment),
                history.url.clone(),
            )
        })
        .collect())
}

fn extract_headers(history: &HistoryRecord) -> Vec<InsertionPoint> {
    history
        .request_headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("cookie"))
        .map(|(name, value)| {
            InsertionPoint::new(
                InsertionPointType::Header,
                name.clone(),
                value.clone(),
                guess_value_type(value),
                value.clone(),
            )
        })
        .collect()
}

fn extract_cookies(history: &HistoryRecord) -> Vec<InsertionPoint> {
    let Some(cookie_header) = history.header("cookie") else {
        return Vec::new();
    };
    cookie_header
        .split(';')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (name, value) = pair.split_once('=')?;
            Some(InsertionPoint::new(
                InsertionPointType::Cookie,
                name.trim(),
                value.trim(),
                guess_value_type(value.trim()),
                cookie_header.to_string(),
            ))
        })
        .collect()
}

fn extract_body(history: &HistoryRecord) -> Result<Vec<InsertionPoint>> {
    let Some(content_type) = history.request_content_type.as_deref() else {
        return Ok(Vec::new());
    };
    let body = history.request_body_str();

    if content_type.contains("application/x-www-form-urlencoded") {
        return Ok(url::form_urlencoded::parse(body.as_bytes())
            .map(|(name, value)| {
                InsertionPoint::new(
                    InsertionPointType::Body,
                    name.to_string(),
                    value.to_string(),
                    guess_value_type(&value),
                    body.to_string(),
                )
            })
            .collect());
    }

    if content_type.contains("application/json") {
        let parsed: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            InsertionError::MalformedBody {
                content_type: content_type.to_string(),
                reason: e.to_string(),
            }
        })?;
        let Some(obj) = parsed.as_object() else {
            return Ok(Vec::new());
        };
        return Ok(obj
            .iter()
            .map(|(key, value)| {
                let value_str = json_scalar_to_string(value);
                InsertionPoint::new(
                    InsertionPointType::Body,
                    key.clone(),
                    value_str.clone(),
                    guess_value_type(&value_str),
                    body.to_string(),
                )
            })
            .collect());
    }

    if content_type.contains("application/xml") || content_type.contains("text/xml") {
        return Ok(extract_top_level_xml_elements(&body)
            .into_iter()
            .map(|(name, value)| {
                InsertionPoint::new(
                    InsertionPointType::Body,
                    name,
                    value.clone(),
                    guess_value_type(&value),
                    body.to_string(),
                )
            })
            .collect());
    }

    if content_type.contains("multipart/form-data") {
        return Ok(extract_multipart_fields(content_type, &body)
            .into_iter()
            .map(|(name, value)| {
                InsertionPoint::new(
                    InsertionPointType::Body,
                    name,
                    value.clone(),
                    guess_value_type(&value),
                    body.to_string(),
                )
            })
            .collect());
    }

    Ok(Vec::new())
}

fn json_scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Approximate top-level-element extraction: matches `<tag ...>content</tag>`
/// pairs at depth zero only, leaving nested elements untouched (spec §4.1,
/// "top-level elements only").
fn extract_top_level_xml_elements(body: &str) -> Vec<(String, String)> {
    let mut results = Vec::new();
    let tag_re = regex::Regex::new(r"<([A-Za-z_][\w:.-]*)[^>]*>").unwrap();
    let mut pos = 0usize;
    while let Some(open) = tag_re.find_at(body, pos) {
        let name = tag_re
            .captures(&body[open.start()..open.end()])
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        let Some(name) = name else {
            pos = open.end();
            continue;
        };
        let close_tag = format!("</{name}>");
        if let Some(close_idx) = body[open.end()..].find(&close_tag) {
            let content_start = open.end();
            let content_end = open.end() + close_idx;
            results.push((name, body[content_start..content_end].to_string()));
            pos = content_end + close_tag.len();
        } else {
            pos = open.end();
        }
    }
    results
}

fn extract_multipart_fields(content_type: &str, body: &str) -> Vec<(String, String)> {
    let Some(boundary) = content_type
        .split(';')
        .find_map(|part| part.trim().strip_prefix("boundary="))
    else {
        return Vec::new();
    };
    let boundary = boundary.trim_matches('"');
    let delimiter = format!("--{boundary}");

    body.split(&delimiter)
        .filter_map(|part| {
            let part = part.trim_start_matches("\r\n").trim_end_matches("--");
            if part.trim().is_empty() {
                return None;
            }
            let (headers, content) = part.split_once("\r\n\r\n")?;
            if headers.contains("filename=") {
                return None;
            }
            let name = headers
                .split(';')
                .find_map(|segment| segment.trim().strip_prefix("name="))
                .map(|n| n.trim_matches('"').to_string())?;
            Some((name, content.trim_end_matches("\r\n").to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sukyan_common::HistoryId;

    fn history(url: &str, content_type: Option<&str>, body: &str, headers: Vec<(&str, &str)>) -> HistoryRecord {
        HistoryRecord {
            id: HistoryId::new("h1"),
            url: url.to_string(),
            method: "GET".to_string(),
            request_headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            request_body: body.as_bytes().to_vec(),
            request_content_type: content_type.map(|s| s.to_string()),
            response_status: None,
            response_headers: vec![],
            response_body: vec![],
            workspace_id: None,
            scan_id: None,
        }
    }

    #[test]
    fn query_parameters_produce_one_point_per_occurrence() {
        let h = history("http://t/users?id=1&id=2&name=bob", None, "", vec![]);
        let points = extract_query_parameters(&h).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].name, "id");
        assert_eq!(points[0].value, "1");
        assert_eq!(points[1].value, "2");
    }

    #[test]
    fn url_path_produces_one_point_per_segment() {
        let h = history("http://t/api/v1/users/42", None, "", vec![]);
        let points = extract_url_path(&h).unwrap();
        let names: Vec<&str> = points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["api", "v1", "users", "42"]);
    }

    #[test]
    fn cookie_header_is_excluded_from_plain_headers() {
        let h = history(
            "http://t/",
            None,
            "",
            vec![("Cookie", "a=1; b=2"), ("User-Agent", "curl")],
        );
        let headers = extract_headers(&h);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].name, "User-Agent");
    }

    #[test]
    fn cookies_are_split_on_semicolon_then_first_equals() {
        let h = history("http://t/", None, "", vec![("Cookie", "a=1; session=abc=def")]);
        let cookies = extract_cookies(&h);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "a");
        assert_eq!(cookies[0].value, "1");
        assert_eq!(cookies[1].name, "session");
        assert_eq!(cookies[1].value, "abc=def");
    }

    #[test]
    fn json_body_extracts_top_level_keys_only() {
        let h = history(
            "http://t/",
            Some("application/json"),
            r#"{"user":{"name":"bob"},"active":true}"#,
            vec![],
        );
        let points = extract_body(&h).unwrap();
        let names: Vec<&str> = points.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"user"));
        assert!(names.contains(&"active"));
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn urlencoded_body_produces_fullbody_point_too() {
        let h = history(
            "http://t/",
            Some("application/x-www-form-urlencoded"),
            "a=1&b=2",
            vec![],
        );
        let mut categories = HashSet::new();
        categories.insert(InsertionCategory::Body);
        let points = extract_points(&h, &categories).unwrap();
        assert!(points.iter().any(|p| p.point_type == InsertionPointType::FullBody));
        assert_eq!(points.iter().filter(|p| p.point_type == InsertionPointType::Body).count(), 2);
    }

    #[test]
    fn unrecognized_content_type_emits_no_fullbody_point() {
        let h = history("http://t/", Some("application/octet-stream"), "binarydata", vec![]);
        let mut categories = HashSet::new();
        categories.insert(InsertionCategory::Body);
        let points = extract_points(&h, &categories).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn multipart_skips_file_parts() {
        let body = "--BOUNDARY\r\nContent-Disposition: form-data; name=\"field\"\r\n\r\nvalue\r\n--BOUNDARY\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\r\nfiledata\r\n--BOUNDARY--";
        let h = history(
            "http://t/",
            Some("multipart/form-data; boundary=BOUNDARY"),
            body,
            vec![],
        );
        let points = extract_body(&h).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].name, "field");
        assert_eq!(points[0].value, "value");
    }
}
