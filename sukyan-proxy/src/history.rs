//! Turns a proxied request/response pair into a `HistoryRecord` and hands
//! it to the store -- the proxy's half of the contract spec §6 names from
//! the scan core's side only.

use hyper::{HeaderMap, Method, Uri};
use std::sync::Arc;
use sukyan_common::{new_uuid, HistoryId, ScanId, WorkspaceId};
use sukyan_store::Store;
use sukyan_types::HistoryRecord;

pub struct CapturedExchange {
    pub method: Method,
    pub uri: Uri,
    pub request_headers: HeaderMap,
    pub request_body: Vec<u8>,
    pub response_status: Option<u16>,
    pub response_headers: HeaderMap,
    pub response_body: Vec<u8>,
}

pub async fn record(
    store: &Arc<dyn Store>,
    exchange: CapturedExchange,
    workspace_id: Option<WorkspaceId>,
    scan_id: Option<ScanId>,
) -> Option<HistoryId> {
    let record = HistoryRecord {
        id: HistoryId::new(new_uuid()),
        url: exchange.uri.to_string(),
        method: exchange.method.to_string(),
        request_headers: header_pairs(&exchange.request_headers),
        request_body: exchange.request_body,
        request_content_type: exchange
            .request_headers
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        response_status: exchange.response_status,
        response_headers: header_pairs(&exchange.response_headers),
        response_body: exchange.response_body,
        workspace_id,
        scan_id,
    };

    match store.create_history(record).await {
        Ok(stored) => Some(stored.id),
        Err(e) => {
            log::warn!("failed to persist captured history (continuing): {e}");
            None
        }
    }
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| (name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
        .collect()
}
