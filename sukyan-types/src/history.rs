use serde::{Deserialize, Serialize};
use sukyan_common::{HistoryId, ScanId, WorkspaceId};

/// A header as captured on the wire: multi-valued and order-preserving, so
/// re-serialization never silently drops or reorders a duplicate header.
pub type HeaderList = Vec<(String, String)>;

/// An immutable record of one HTTP request/response pair. Created by the
/// proxy or crawler, never mutated or deleted by the scan core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: HistoryId,
    pub url: String,
    pub method: String,
    pub request_headers: HeaderList,
    pub request_body: Vec<u8>,
    pub request_content_type: Option<String>,
    pub response_status: Option<u16>,
    pub response_headers: HeaderList,
    pub response_body: Vec<u8>,
    pub workspace_id: Option<WorkspaceId>,
    pub scan_id: Option<ScanId>,
}

impl HistoryRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn request_body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.request_body)
    }

    pub fn response_body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.response_body)
    }
}

/// Filter used by `list_history` (spec §6, store contract).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub workspace_id: Option<WorkspaceId>,
    pub scan_id: Option<ScanId>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HistoryRecord {
        HistoryRecord {
            id: HistoryId::new("h1"),
            url: "http://t/users?id=1".to_string(),
            method: "GET".to_string(),
            request_headers: vec![("X-Dbg".to_string(), "foo".to_string())],
            request_body: Vec::new(),
            request_content_type: None,
            response_status: Some(200),
            response_headers: vec![],
            response_body: b"hello foo".to_vec(),
            workspace_id: None,
            scan_id: None,
        }
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let h = sample();
        assert_eq!(h.header("x-dbg"), Some("foo"));
        assert_eq!(h.header("missing"), None);
    }

    #[test]
    fn pagination_defaults_to_page_1() {
        let p = Pagination::default();
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, 500);
    }
}
